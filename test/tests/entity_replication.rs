use std::time::Duration;

use weave_shared::{
    BitWriter, Bunch, BunchHeader, ChannelIndex, ChannelKind, ConnectionConfig, ConnectionEvent,
    ConnectionState, ContentBlock, EntityChannel, EntityChannelError, EntityHeader, NetGuid,
    Payload, Serde, StandardHeader, SubObjectType,
};
use weave_test::{init_logging, LossyLink, TestPair};

fn door() -> NetGuid {
    NetGuid::new_static(1)
}

fn hinge() -> NetGuid {
    NetGuid::new_static(2)
}

fn dynamic(index: u32) -> NetGuid {
    NetGuid::new_dynamic(index)
}

fn connected_pair(config: ConnectionConfig) -> TestPair {
    init_logging();
    let mut pair = TestPair::new(config);
    assert!(pair.connect(20).unwrap());
    pair
}

fn open(pair: &mut TestPair, entity: NetGuid) -> ChannelIndex {
    let now = pair.now;
    pair.server
        .open_entity_channel(now, &mut pair.server_world, entity)
        .unwrap()
}

fn open_acked(pair: &TestPair, entity: &NetGuid) -> bool {
    pair.server
        .entity_channel(entity)
        .map_or(false, |channel| channel.core().open_acked())
}

fn replicate_now(pair: &mut TestPair) -> usize {
    let now = pair.now;
    let sent = pair
        .server
        .replicate_entities(now, &mut pair.server_world)
        .unwrap();
    pair.server_tick().unwrap();
    sent
}

// ========== Spawning And Updates ==========

#[test]
fn entity_and_sub_objects_reach_the_client() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    let part = dynamic(2);
    pair.server_world
        .spawn(entity, door())
        .set(entity, 0, 1)
        .set(entity, 1, 2)
        .attach(entity, part, hinge())
        .set(part, 5, 50);
    pair.server_world
        .set_spawn_params(entity, Payload::from_bytes(&[1, 2, 3]));

    let channel_index = open(&mut pair, entity);
    pair.run(5).unwrap();

    assert_eq!(pair.client_world.get(&entity, 0), Some(1));
    assert_eq!(pair.client_world.get(&entity, 1), Some(2));
    assert_eq!(pair.client_world.get(&part, 5), Some(50));
    assert_eq!(pair.client_world.object(&part).unwrap().class, hinge());
    assert_eq!(
        pair.client_world.spawn_params(&entity),
        Some(&Payload::from_bytes(&[1, 2, 3]))
    );
    assert!(pair.client_events().contains(&ConnectionEvent::EntityBound {
        channel_index,
        entity
    }));
    assert!(open_acked(&pair, &entity));

    pair.server_world.set(entity, 1, 3);
    pair.run(3).unwrap();
    assert_eq!(pair.client_world.get(&entity, 1), Some(3));
    assert_eq!(pair.client_world.constructed(), &[entity, part]);
}

#[test]
fn despawned_entity_is_destroyed_on_the_client() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    let part = dynamic(2);
    pair.server_world
        .spawn(entity, door())
        .attach(entity, part, hinge())
        .set(part, 0, 4);
    let channel_index = open(&mut pair, entity);
    pair.run(5).unwrap();
    assert!(pair.client_world.contains(&part));

    pair.server_world.despawn(&entity);
    pair.run(5).unwrap();

    assert!(!pair.client_world.contains(&entity));
    assert!(!pair.client_world.contains(&part));
    assert_eq!(pair.client_world.destroyed(), &[part, entity]);
    assert!(pair.server.entity_channel(&entity).is_none());
    assert!(pair.server_events().contains(&ConnectionEvent::ChannelClosed {
        channel_index,
        kind: ChannelKind::Entity,
        dormant: false
    }));
    assert!(pair.client.channel(channel_index).is_none());
}

#[test]
fn deleted_sub_object_is_destroyed() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    let part = dynamic(2);
    pair.server_world
        .spawn(entity, door())
        .attach(entity, part, hinge());
    open(&mut pair, entity);
    pair.run(5).unwrap();
    assert!(pair.client_world.contains(&part));

    pair.server_world.detach(&part);
    pair.run(5).unwrap();
    assert!(!pair.client_world.contains(&part));
    assert!(pair.client_world.contains(&entity));
    assert_eq!(pair.client_world.destroyed(), &[part]);
}

#[test]
fn stably_named_entity_is_resolved_not_constructed() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = NetGuid::new_static(40);
    pair.server_world.spawn_stable(entity, door()).set(entity, 0, 11);
    pair.client_world.spawn_stable(entity, door());

    open(&mut pair, entity);
    pair.run(5).unwrap();

    assert!(pair.client_world.constructed().is_empty());
    assert_eq!(pair.client_world.get(&entity, 0), Some(11));
}

#[test]
fn stalest_entity_replicates_first() {
    let mut config = ConnectionConfig::default();
    config.entity.max_entities_per_tick = 1;
    let mut pair = connected_pair(config);
    let first = dynamic(1);
    let second = dynamic(2);
    pair.server_world.spawn(first, door()).spawn(second, door());
    open(&mut pair, first);
    open(&mut pair, second);

    assert_eq!(replicate_now(&mut pair), 1);
    assert!(pair.server.entity_channel(&first).unwrap().last_update_time().is_some());
    assert!(pair.server.entity_channel(&second).unwrap().last_update_time().is_none());

    pair.advance(weave_test::TICK);
    assert_eq!(replicate_now(&mut pair), 1);
    assert!(pair.server.entity_channel(&second).unwrap().last_update_time().is_some());
}

#[test]
fn rep_key_gates_sub_object_updates() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    let part = dynamic(2);
    pair.server_world
        .spawn(entity, door())
        .attach(entity, part, hinge())
        .set(part, 0, 1);
    pair.server_world.set_rep_key(part, 1);
    open(&mut pair, entity);
    pair.run(5).unwrap();
    assert_eq!(pair.client_world.get(&part, 0), Some(1));

    // same key: the change is not looked at
    pair.server_world.set(part, 0, 2);
    pair.run(5).unwrap();
    assert_eq!(pair.client_world.get(&part, 0), Some(1));

    pair.server_world.set_rep_key(part, 2);
    pair.run(5).unwrap();
    assert_eq!(pair.client_world.get(&part, 0), Some(2));
}

#[test]
fn paused_entity_holds_updates() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    pair.server_world.spawn(entity, door()).set(entity, 0, 1);
    open(&mut pair, entity);
    pair.run(5).unwrap();

    pair.server_world.set_paused(entity, true);
    pair.server_world.set(entity, 0, 2);
    pair.run(5).unwrap();
    assert_eq!(pair.client_world.paused_changes(), &[(entity, true)]);
    assert_eq!(pair.client_world.get(&entity, 0), Some(1));

    pair.server_world.set_paused(entity, false);
    pair.run(5).unwrap();
    assert_eq!(
        pair.client_world.paused_changes(),
        &[(entity, true), (entity, false)]
    );
    assert_eq!(pair.client_world.get(&entity, 0), Some(2));
}

#[test]
fn lost_final_update_is_sent_again() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    pair.server_world.spawn(entity, door()).set(entity, 0, 1);
    open(&mut pair, entity);
    assert!(pair.run_until(20, |pair| open_acked(pair, &entity)).unwrap());

    // unreliable update lost with nothing sent after it; keepalives carry
    // the acks that reveal the loss
    pair.server_world.set(entity, 0, 2);
    assert_eq!(replicate_now(&mut pair), 1);
    pair.to_client.drop_upcoming(&[0]);
    pair.deliver_to_client().unwrap();

    assert!(pair
        .run_until(100, |pair| pair.client_world.get(&entity, 0) == Some(2))
        .unwrap());
}

// ========== Reliable Ordering ==========

#[test]
fn later_reliable_bunch_waits_for_the_lost_one() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    let first_part = dynamic(2);
    let second_part = dynamic(3);
    pair.server_world.spawn(entity, door());
    open(&mut pair, entity);
    assert!(pair.run_until(20, |pair| open_acked(pair, &entity)).unwrap());

    // sub-object creation is reliable: sequence 2, lost on the way
    pair.server_world
        .attach(entity, first_part, hinge())
        .set(first_part, 0, 7);
    assert_eq!(replicate_now(&mut pair), 1);
    pair.to_client.drop_upcoming(&[0]);
    pair.deliver_to_client().unwrap();

    // sequence 3 arrives first and is buffered
    pair.server_world
        .attach(entity, second_part, hinge())
        .set(second_part, 0, 8);
    assert_eq!(replicate_now(&mut pair), 1);
    pair.deliver_to_client().unwrap();

    let channel = pair.client.entity_channel(&entity).unwrap();
    assert_eq!(channel.core().num_in_rec(), 1);
    assert!(!pair.client_world.contains(&first_part));
    assert!(!pair.client_world.contains(&second_part));

    pair.run(10).unwrap();
    assert_eq!(pair.client_world.get(&first_part, 0), Some(7));
    assert_eq!(pair.client_world.get(&second_part, 0), Some(8));
    assert_eq!(pair.client.entity_channel(&entity).unwrap().core().num_in_rec(), 0);
    let constructed = pair.client_world.constructed();
    assert_eq!(constructed, &[entity, first_part, second_part]);
}

// ========== Dormancy ==========

#[test]
fn dormant_entity_survives_and_wakes_with_changes() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    let part = dynamic(2);
    pair.server_world
        .spawn(entity, door())
        .set(entity, 0, 1)
        .set(entity, 1, 2)
        .attach(entity, part, hinge())
        .set(part, 0, 3);
    let channel_index = open(&mut pair, entity);
    assert!(pair.run_until(20, |pair| open_acked(pair, &entity)).unwrap());
    pair.run(2).unwrap();

    let applied_before = pair.client_world.applied().len();
    pair.server.start_dormancy(&entity).unwrap();
    assert!(pair
        .run_until(30, |pair| pair.client_world.dormant_notices().contains(&entity))
        .unwrap());

    // nothing changed, so the close carried no properties
    assert_eq!(pair.client_world.applied().len(), applied_before);
    assert!(pair.client_world.contains(&entity));
    assert!(pair.client_world.contains(&part));
    assert!(pair.client_world.destroyed().is_empty());
    assert!(pair.client_events().contains(&ConnectionEvent::ChannelClosed {
        channel_index,
        kind: ChannelKind::Entity,
        dormant: true
    }));
    assert!(pair
        .run_until(10, |pair| pair.server.entity_channel(&entity).is_none())
        .unwrap());
    assert!(pair.server.replication_table().is_dormant(&entity));

    // changed while dormant
    pair.server_world.set(entity, 1, 9);
    pair.server_world.set(part, 0, 4);
    pair.server.flush_dormancy(entity);
    assert!(pair
        .run_until(20, |pair| pair.client_world.get(&entity, 1) == Some(9))
        .unwrap());
    pair.run(2).unwrap();

    assert_eq!(pair.client_world.wake_notices(), &[entity]);
    assert_eq!(pair.client_world.constructed(), &[entity, part]);
    assert_eq!(pair.client_world.get(&entity, 0), Some(1));
    assert_eq!(pair.client_world.get(&part, 0), Some(4));
    let woken: Vec<(NetGuid, u8, u32)> = pair.client_world.applied()[applied_before..].to_vec();
    assert_eq!(woken.len(), 2);
    assert!(woken.contains(&(entity, 1, 9)));
    assert!(woken.contains(&(part, 0, 4)));
    assert!(!pair.server.replication_table().is_dormant(&entity));
}

#[test]
fn entity_with_keyed_sub_object_goes_dormant() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    let part = dynamic(2);
    pair.server_world
        .spawn(entity, door())
        .attach(entity, part, hinge())
        .set(part, 0, 1);
    pair.server_world.set_rep_key(part, 1);
    open(&mut pair, entity);
    assert!(pair.run_until(20, |pair| open_acked(pair, &entity)).unwrap());
    pair.run(2).unwrap();

    // the key never changes, so the sub-object is skipped on every pass
    pair.server.start_dormancy(&entity).unwrap();
    assert!(pair
        .run_until(30, |pair| pair.client_world.dormant_notices().contains(&entity))
        .unwrap());
    assert!(pair.client_world.contains(&part));
    assert!(pair.client_world.destroyed().is_empty());
}

// ========== Dependencies ==========

#[test]
fn bunches_wait_for_exported_class_to_load() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    pair.server.guid_cache_mut().register_path(door(), "/Game/Door");
    pair.client_world.mark_path_loading("/Game/Door");
    pair.server_world.spawn(entity, door()).set(entity, 0, 5);

    let channel_index = open(&mut pair, entity);
    pair.run(5).unwrap();

    assert!(!pair.client_world.contains(&entity));
    assert_eq!(pair.client.guid_cache().path(&door()), Some("/Game/Door"));
    assert!(pair.client.guid_cache().is_loading(&door()));
    let queued = pair
        .client
        .channel(channel_index)
        .and_then(|channel| channel.as_entity())
        .unwrap();
    assert!(queued.num_queued() >= 1);
    assert!(queued.pending_guid_resolves().contains(&door()));

    // updates made while the open is queued stay behind it
    pair.server_world.set(entity, 0, 6);
    pair.run(3).unwrap();
    assert!(!pair.client_world.contains(&entity));

    pair.client_world.finish_loading("/Game/Door");
    assert!(pair.client.mark_loaded(&door()));
    pair.run(3).unwrap();
    assert_eq!(pair.client_world.get(&entity, 0), Some(6));
    assert_eq!(
        pair.client_world.applied().first(),
        Some(&(entity, 0, 5))
    );
}

#[test]
fn closed_channel_drains_before_the_entity_reopens() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    pair.server.guid_cache_mut().register_path(door(), "/Game/Door");
    pair.client_world.mark_path_loading("/Game/Door");
    pair.server_world.spawn(entity, door()).set(entity, 0, 5);
    open(&mut pair, entity);
    pair.run(5).unwrap();
    assert!(!pair.client_world.contains(&entity));

    // closed while its bunches still wait on the class
    let now = pair.now;
    pair.server
        .close_entity(now, &mut pair.server_world, &entity)
        .unwrap();
    assert!(pair
        .run_until(20, |pair| pair.server.entity_channel(&entity).is_none())
        .unwrap());
    assert_eq!(pair.client.num_draining_channels(), 1);
    assert!(!pair.client_world.contains(&entity));

    // a new channel for the same entity waits behind the draining one
    pair.server_world.set(entity, 0, 8);
    open(&mut pair, entity);
    pair.run(5).unwrap();
    assert_eq!(pair.client.num_draining_channels(), 1);
    assert!(pair.client_world.constructed().is_empty());

    pair.client_world.finish_loading("/Game/Door");
    assert!(pair.client.mark_loaded(&door()));
    pair.run(5).unwrap();

    assert_eq!(pair.client.num_draining_channels(), 0);
    assert_eq!(pair.client_world.constructed(), &[entity, entity]);
    assert_eq!(pair.client_world.destroyed(), &[entity]);
    assert_eq!(pair.client_world.get(&entity, 0), Some(8));
}

#[test]
fn queued_bunches_stop_when_the_time_budget_is_spent() {
    let mut config = ConnectionConfig::default();
    config.entity.queued_bunch_time_budget = Duration::from_nanos(1);
    let mut pair = connected_pair(config);
    let entity = dynamic(1);
    pair.server.guid_cache_mut().register_path(door(), "/Game/Door");
    pair.client_world.mark_path_loading("/Game/Door");
    pair.server_world.spawn(entity, door()).set(entity, 0, 5);
    let channel_index = open(&mut pair, entity);
    pair.run(2).unwrap();
    for value in 6..9 {
        pair.server_world.set(entity, 0, value);
        pair.run(1).unwrap();
    }
    pair.run(2).unwrap();

    let num_queued = |pair: &TestPair| {
        pair.client
            .channel(channel_index)
            .and_then(|channel| channel.as_entity())
            .map_or(0, |channel| channel.num_queued())
    };
    let before = num_queued(&pair);
    assert!(before >= 2);

    // one bunch already takes longer than the budget
    pair.client_world.finish_loading("/Game/Door");
    assert!(pair.client.mark_loaded(&door()));
    pair.client_tick().unwrap();
    assert_eq!(num_queued(&pair), before - 1);
    assert!(pair.client_world.contains(&entity));

    assert!(pair
        .run_until(20, |pair| num_queued(pair) == 0)
        .unwrap());
    assert_eq!(pair.client_world.get(&entity, 0), Some(8));
}

// ========== Failures ==========

#[test]
fn construction_failure_is_reported_to_the_sender() {
    let mut pair = connected_pair(ConnectionConfig::default());
    let entity = dynamic(1);
    pair.server_world.spawn(entity, door());
    pair.client_world.refuse_class(door());

    let channel_index = open(&mut pair, entity);
    pair.run(10).unwrap();

    assert!(pair
        .server_events()
        .contains(&ConnectionEvent::PeerEntityFailure { channel_index }));
    assert!(pair.client_events().iter().any(|event| matches!(
        event,
        ConnectionEvent::EntityChannelBroken {
            channel_index: broken,
            error: EntityChannelError::ConstructionFailed { .. },
            ..
        } if *broken == channel_index
    )));
    assert!(pair.server.replication_table().channel_for(&entity).is_none());
    assert_eq!(pair.server.state(), ConnectionState::Connected);
    assert_eq!(pair.client.state(), ConnectionState::Connected);
}

#[test]
fn deleting_an_unknown_sub_object_is_ignored() {
    init_logging();
    let mut pair = TestPair::new(ConnectionConfig::default());
    let entity = dynamic(1);
    let ghost = dynamic(9);

    let mut writer = BitWriter::new();
    EntityHeader {
        entity,
        stably_named: false,
        class: door(),
        spawn_params: Payload::empty(),
    }
    .ser(&mut writer);
    let deletion =
        ContentBlock::sub_object(ghost, Some(SubObjectType::deletion()), Payload::empty());
    EntityChannel::write_content_block(&mut writer, &deletion);
    EntityChannel::write_content_block(&mut writer, &deletion);

    let mut header = BunchHeader::new(3);
    header.flags.open = true;
    header.flags.reliable = true;
    header.sequence = Some(1);
    header.channel_kind = Some(ChannelKind::Entity);
    let bunch = Bunch::new(header, Payload::from_writer(writer));

    let mut packet = BitWriter::new();
    StandardHeader {
        packet_id: 0,
        has_ack: false,
        ack_index: 0,
        ack_bitfield: 0,
    }
    .ser(&mut packet);
    true.ser(&mut packet);
    bunch.ser(&mut packet);
    false.ser(&mut packet);

    let now = pair.now;
    pair.client
        .receive_packet(now, &mut pair.client_world, &packet.to_bytes())
        .unwrap();

    assert!(pair.client_world.contains(&entity));
    assert!(pair.client_world.destroyed().is_empty());
    assert!(!pair
        .client_events()
        .iter()
        .any(|event| matches!(event, ConnectionEvent::EntityChannelBroken { .. })));
    assert!(!pair.client.entity_channel(&entity).unwrap().core().is_broken());
}

// ========== Replay ==========

fn replay_pair(server_replays: bool, client_replays: bool) -> TestPair {
    init_logging();
    let mut server_config = ConnectionConfig::default();
    server_config.is_replay = server_replays;
    server_config.channel.partial_reliable_threshold = 2;
    let mut client_config = ConnectionConfig::default();
    client_config.is_replay = client_replays;
    let mut pair = TestPair::with_configs(
        server_config,
        client_config,
        LossyLink::perfect(),
        LossyLink::perfect(),
    );
    assert!(pair.connect(20).unwrap());
    pair
}

/// Enough properties for an update to split into two partials
fn spawn_wide_entity(pair: &mut TestPair, entity: NetGuid) {
    pair.server_world.spawn(entity, door());
    for key in 0..=255u8 {
        pair.server_world.set(entity, key, 1);
    }
}

fn widen_update(pair: &mut TestPair, entity: NetGuid) {
    for key in 0..=255u8 {
        pair.server_world.set(entity, key, 2);
    }
}

#[test]
fn replay_sender_acks_on_flush_and_never_forces_reliable() {
    let mut pair = replay_pair(true, false);
    let entity = dynamic(1);
    spawn_wide_entity(&mut pair, entity);
    let channel_index = open(&mut pair, entity);

    // acked as soon as the packets are written, nothing delivered yet
    assert_eq!(replicate_now(&mut pair), 1);
    assert!(open_acked(&pair, &entity));
    assert_eq!(pair.server.channel(channel_index).unwrap().core().num_out_rec(), 0);

    widen_update(&mut pair, entity);
    assert_eq!(replicate_now(&mut pair), 1);
    let core = pair.server.channel(channel_index).unwrap().core();
    assert!(!core.last_send_reliable());
    assert_eq!(core.num_out_rec(), 0);

    pair.run(5).unwrap();
    assert_eq!(pair.client_world.get(&entity, 255), Some(2));
}

#[test]
fn live_sender_forces_large_updates_reliable() {
    let mut pair = replay_pair(false, false);
    let entity = dynamic(1);
    spawn_wide_entity(&mut pair, entity);
    let channel_index = open(&mut pair, entity);
    assert!(pair.run_until(20, |pair| open_acked(pair, &entity)).unwrap());

    widen_update(&mut pair, entity);
    assert_eq!(replicate_now(&mut pair), 1);
    let core = pair.server.channel(channel_index).unwrap().core();
    assert!(core.last_send_reliable());
    assert!(core.num_out_rec() >= 2);

    pair.run(5).unwrap();
    assert_eq!(pair.client_world.get(&entity, 255), Some(2));
}

#[test]
fn replay_receiver_does_not_report_entity_failures() {
    let mut pair = replay_pair(false, true);
    let entity = dynamic(1);
    pair.server_world.spawn(entity, door());
    pair.client_world.refuse_class(door());

    let channel_index = open(&mut pair, entity);
    pair.run(10).unwrap();

    assert!(pair.client_events().iter().any(|event| matches!(
        event,
        ConnectionEvent::EntityChannelBroken { channel_index: broken, .. }
            if *broken == channel_index
    )));
    assert!(!pair
        .server_events()
        .contains(&ConnectionEvent::PeerEntityFailure { channel_index }));
    assert!(pair.server.replication_table().channel_for(&entity).is_some());
    assert_eq!(pair.client.state(), ConnectionState::Connected);
}
