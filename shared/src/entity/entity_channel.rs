use std::{
    collections::{HashMap, HashSet, VecDeque},
    mem,
    time::Instant,
};

use log::{debug, info, warn};
use weave_serde::{BitReader, BitWriter, Serde};

use crate::{
    channel::{channel_core::ChannelCore, sender::OutgoingBunch},
    connection::{
        context::ChannelContext, error::ConnectionError, event::ConnectionEvent,
    },
    control::control_message::ControlMessage,
    entity::{
        content_block::{BlockTarget, ContentBlock, SubObjectType},
        entity_config::EntityConfig,
        entity_header::EntityHeader,
        error::EntityChannelError,
        rep_keys::RepKeyTracker,
    },
    replication::replicator::Replicator,
    BunchError, GuidExport, InBunch, NetGuid, PacketIndex, Payload,
};

struct QueuedBunch {
    queued_at: Instant,
    bunch: InBunch,
}

/// Replicates one entity and its sub-objects. The side that opened the
/// channel sends; the other side applies.
pub struct EntityChannel {
    core: ChannelCore,
    config: EntityConfig,
    entity: Option<NetGuid>,
    /// Entity named by a received open bunch that is still queued
    expected_entity: Option<NetGuid>,
    class: NetGuid,
    replicators: HashMap<NetGuid, Replicator>,
    rep_keys: RepKeyTracker,
    pending_dormancy: bool,
    replication_paused: bool,
    last_update_time: Option<Instant>,
    sent_initial: bool,
    draining: bool,
    queued: VecDeque<QueuedBunch>,
    pending_guid_resolves: HashSet<NetGuid>,
    warned_stale_queue: bool,
}

impl EntityChannel {
    pub fn new(core: ChannelCore, config: &EntityConfig) -> Self {
        Self {
            core,
            rep_keys: RepKeyTracker::new(config.rep_key_ring_size),
            config: config.clone(),
            entity: None,
            expected_entity: None,
            class: NetGuid::INVALID,
            replicators: HashMap::new(),
            pending_dormancy: false,
            replication_paused: false,
            last_update_time: None,
            sent_initial: false,
            draining: false,
            queued: VecDeque::new(),
            pending_guid_resolves: HashSet::new(),
            warned_stale_queue: false,
        }
    }

    pub fn core(&self) -> &ChannelCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    pub fn entity(&self) -> Option<NetGuid> {
        self.entity
    }

    pub fn last_update_time(&self) -> Option<Instant> {
        self.last_update_time
    }

    pub fn is_pending_dormancy(&self) -> bool {
        self.pending_dormancy
    }

    pub fn is_replication_paused(&self) -> bool {
        self.replication_paused
    }

    pub fn num_queued(&self) -> usize {
        self.queued.len()
    }

    pub fn pending_guid_resolves(&self) -> &HashSet<NetGuid> {
        &self.pending_guid_resolves
    }

    pub fn replicator(&self, object: &NetGuid) -> Option<&Replicator> {
        self.replicators.get(object)
    }

    /// Binds a locally opened channel to `entity`, reclaiming replicators
    /// kept while it was dormant
    pub(crate) fn bind_for_send(&mut self, ctx: &mut ChannelContext, entity: NetGuid) {
        self.entity = Some(entity);
        self.replicators = ctx.table.take_dormant_replicators(&entity);
        if ctx.table.wake(&entity) {
            debug!(
                "Entity {} woke from dormancy on channel {}",
                entity,
                self.core.index()
            );
        }
        ctx.table.set_active(entity, self.core.index());
    }

    fn bound_entity(&self) -> Option<NetGuid> {
        self.entity.or(self.expected_entity)
    }

    // Content blocks

    pub fn write_content_block(writer: &mut BitWriter, block: &ContentBlock) {
        block.ser(writer);
    }

    pub fn read_content_block(&self, reader: &mut BitReader) -> Result<ContentBlock, BunchError> {
        ContentBlock::de(reader).map_err(|_| BunchError::MalformedPayload {
            channel_index: self.core.index(),
            reason: "truncated content block",
        })
    }

    // Sending

    fn reference_guid(
        ctx: &mut ChannelContext,
        guid: NetGuid,
        exports: &mut Vec<GuidExport>,
        must_be_mapped: &mut Vec<NetGuid>,
    ) {
        if let Some(export) = ctx.guid_cache.take_export(&guid) {
            exports.push(export);
        }
        if ctx.guid_cache.is_registered(&guid) && !must_be_mapped.contains(&guid) {
            must_be_mapped.push(guid);
        }
    }

    /// Sends whatever changed since the last pass. Returns whether a bunch
    /// went out.
    pub(crate) fn replicate(&mut self, ctx: &mut ChannelContext) -> Result<bool, ConnectionError> {
        let Some(entity) = self.entity else {
            return Ok(false);
        };
        if !self.core.opened_locally() || self.core.is_closing() || self.core.is_broken() {
            return Ok(false);
        }
        if self.core.is_throttled() {
            return Ok(false);
        }
        if let Some(last) = self.last_update_time {
            if ctx.now.saturating_duration_since(last) < self.config.min_update_interval {
                return Ok(false);
            }
        }

        let Some(descriptor) = ctx.host.entity_descriptor(entity) else {
            info!("Entity {} is gone, closing channel {}", entity, self.core.index());
            self.close(ctx, false)?;
            return Ok(false);
        };
        self.last_update_time = Some(ctx.now);

        let paused = ctx.host.is_replication_paused(entity);
        if paused != self.replication_paused {
            self.replication_paused = paused;
            if self.sent_initial {
                debug!("Entity {} replication paused: {}", entity, paused);
                let mut outgoing = OutgoingBunch::new(Payload::empty(), true);
                outgoing.replication_paused = paused;
                self.core
                    .send_bunch(ctx.sink, ctx.now, outgoing, !ctx.config.is_replay)?;
                return Ok(true);
            }
        }
        if paused && self.sent_initial {
            return Ok(false);
        }

        let initial = !self.sent_initial;
        let mut reliable = !self.core.open_acked();
        let mut writer = BitWriter::new();
        let mut exports = Vec::new();
        let mut must_be_mapped = Vec::new();
        let mut blocks = 0usize;

        if initial {
            let header = EntityHeader {
                entity,
                stably_named: descriptor.stably_named,
                class: descriptor.class,
                spawn_params: descriptor.spawn_params.clone(),
            };
            header.ser(&mut writer);
            if descriptor.stably_named {
                Self::reference_guid(ctx, entity, &mut exports, &mut must_be_mapped);
            } else {
                Self::reference_guid(ctx, descriptor.class, &mut exports, &mut must_be_mapped);
            }
            self.class = descriptor.class;
        }

        // root
        let root = self
            .replicators
            .entry(entity)
            .or_insert_with(|| Replicator::new(entity, descriptor.class));
        let mut root_writer = BitWriter::new();
        if root.replicate(&mut *ctx.host, &mut root_writer) || initial {
            Self::write_content_block(
                &mut writer,
                &ContentBlock::root(Payload::from_writer(root_writer)),
            );
            blocks += 1;
        }

        // sub-objects
        let live = ctx.host.sub_objects(entity);
        let mut live_set = HashSet::new();
        let mut created = Vec::new();
        for info in live {
            live_set.insert(info.guid);
            let is_new = !self.replicators.contains_key(&info.guid);
            if let Some(rep_key) = info.rep_key {
                if !self.rep_keys.key_needs_to_replicate(info.guid, rep_key) && !is_new {
                    if let Some(replicator) = self.replicators.get_mut(&info.guid) {
                        replicator.skipped_by_rep_key();
                    }
                    continue;
                }
            }
            let replicator = self
                .replicators
                .entry(info.guid)
                .or_insert_with(|| Replicator::new(info.guid, info.class));
            let mut block_writer = BitWriter::new();
            let wrote = replicator.replicate(&mut *ctx.host, &mut block_writer);

            if is_new {
                let type_info = SubObjectType {
                    stably_named: info.stably_named,
                    class: info.class,
                };
                if info.stably_named {
                    Self::reference_guid(ctx, info.guid, &mut exports, &mut must_be_mapped);
                } else {
                    Self::reference_guid(ctx, info.class, &mut exports, &mut must_be_mapped);
                }
                Self::write_content_block(
                    &mut writer,
                    &ContentBlock::sub_object(
                        info.guid,
                        Some(type_info),
                        Payload::from_writer(block_writer),
                    ),
                );
                blocks += 1;
                reliable = true;
                created.push(info.guid);
            } else if wrote {
                Self::write_content_block(
                    &mut writer,
                    &ContentBlock::sub_object(info.guid, None, Payload::from_writer(block_writer)),
                );
                blocks += 1;
                if let Some(sequence) = replicator.creation_sequence() {
                    if self.core.out_rec_contains(sequence) {
                        reliable = true;
                    }
                }
            }
        }

        // deletions
        let gone: Vec<NetGuid> = self
            .replicators
            .keys()
            .filter(|guid| **guid != entity && !live_set.contains(guid))
            .copied()
            .collect();
        for object in gone {
            debug!("Entity {}: sub-object {} deleted", entity, object);
            Self::write_content_block(
                &mut writer,
                &ContentBlock::sub_object(
                    object,
                    Some(SubObjectType::deletion()),
                    Payload::empty(),
                ),
            );
            blocks += 1;
            reliable = true;
            self.replicators.remove(&object);
            self.rep_keys.forget(&object);
        }

        if blocks == 0 && !initial {
            self.rep_keys.discard_pending();
            for replicator in self.replicators.values_mut() {
                replicator.discard_pending();
            }
            return Ok(false);
        }

        let mut outgoing = OutgoingBunch::new(Payload::from_writer(writer), reliable).mergeable();
        outgoing.exports = exports;
        outgoing.must_be_mapped = must_be_mapped;
        outgoing.replication_paused = self.replication_paused;
        let packets = self
            .core
            .send_bunch(ctx.sink, ctx.now, outgoing, !ctx.config.is_replay)?;
        let sent_reliable = self.core.last_send_reliable();
        let (sequence, _) = self.core.sequences();

        for replicator in self.replicators.values_mut() {
            replicator.post_send(packets, sent_reliable);
        }
        for object in created {
            if let Some(replicator) = self.replicators.get_mut(&object) {
                replicator.set_creation_sequence(sequence);
            }
        }
        self.rep_keys.record_sent(packets);
        self.sent_initial = true;
        Ok(true)
    }

    // Receiving

    pub(crate) fn received_bunch(
        &mut self,
        ctx: &mut ChannelContext,
        bunch: InBunch,
    ) -> Result<(), ConnectionError> {
        if self.core.is_broken() {
            debug!("Channel {}: broken, dropping bunch", self.core.index());
            return Ok(());
        }

        for guid in &bunch.bunch.header.must_be_mapped {
            if ctx.guid_cache.is_loading(guid) {
                self.pending_guid_resolves.insert(*guid);
            }
        }
        if self.entity.is_none() && self.expected_entity.is_none() && bunch.bunch.open() {
            self.expected_entity = EntityHeader::peek_entity(&bunch.bunch.payload);
        }
        let other_channel_draining = !self.draining
            && self
                .bound_entity()
                .map_or(false, |entity| ctx.table.is_draining(&entity));

        if !self.pending_guid_resolves.is_empty()
            || !self.queued.is_empty()
            || other_channel_draining
        {
            debug!(
                "Channel {}: queueing bunch ({} unresolved guids, {} queued)",
                self.core.index(),
                self.pending_guid_resolves.len(),
                self.queued.len()
            );
            self.queued.push_back(QueuedBunch {
                queued_at: ctx.now,
                bunch,
            });
            return Ok(());
        }

        self.process_bunch(ctx, bunch)
    }

    /// Applies queued bunches in order until one is still blocked or the
    /// time budget runs out
    pub(crate) fn process_queued_bunches(
        &mut self,
        ctx: &mut ChannelContext,
    ) -> Result<(), ConnectionError> {
        if self.queued.is_empty() {
            return Ok(());
        }
        self.pending_guid_resolves
            .retain(|guid| ctx.guid_cache.is_loading(guid));

        if let Some(front) = self.queued.front() {
            let waited = ctx.now.saturating_duration_since(front.queued_at);
            if !self.warned_stale_queue && waited > self.config.queued_bunch_warn_after {
                warn!(
                    "Channel {}: bunch queued for {:?} waiting on {} guids",
                    self.core.index(),
                    waited,
                    self.pending_guid_resolves.len()
                );
                self.warned_stale_queue = true;
            }
        }

        if !self.pending_guid_resolves.is_empty() {
            return Ok(());
        }
        if !self.draining
            && self
                .bound_entity()
                .map_or(false, |entity| ctx.table.is_draining(&entity))
        {
            return Ok(());
        }

        let budget = if ctx.config.is_replay {
            self.config.replay_queued_bunch_time_budget
        } else {
            self.config.queued_bunch_time_budget
        };
        let started = Instant::now();

        while let Some(queued) = self.queued.pop_front() {
            for guid in &queued.bunch.bunch.header.must_be_mapped {
                if ctx.guid_cache.is_loading(guid) {
                    self.pending_guid_resolves.insert(*guid);
                }
            }
            if !self.pending_guid_resolves.is_empty() {
                self.queued.push_front(queued);
                break;
            }
            self.process_bunch(ctx, queued.bunch)?;
            if !budget.is_zero() && started.elapsed() > budget {
                debug!(
                    "Channel {}: queue time budget spent, {} bunches left",
                    self.core.index(),
                    self.queued.len()
                );
                break;
            }
        }

        if self.queued.is_empty() {
            self.warned_stale_queue = false;
        }
        Ok(())
    }

    fn process_bunch(
        &mut self,
        ctx: &mut ChannelContext,
        bunch: InBunch,
    ) -> Result<(), ConnectionError> {
        if self.core.is_broken() {
            return Ok(());
        }
        let channel_index = self.core.index();
        let payload = bunch.bunch.payload;
        let mut reader = payload.reader();

        if self.entity.is_none() {
            if !bunch.bunch.header.flags.open {
                return Err(BunchError::MalformedPayload {
                    channel_index,
                    reason: "entity channel received content before its open",
                }
                .into());
            }
            let header = EntityHeader::de(&mut reader).map_err(|_| BunchError::MalformedPayload {
                channel_index,
                reason: "truncated entity header",
            })?;
            if let Err(error) = self.bind_received(ctx, &header) {
                self.break_channel(ctx, error);
                return Ok(());
            }
        }
        let Some(entity) = self.entity else {
            return Ok(());
        };

        let paused = bunch.bunch.header.flags.replication_paused;
        if paused != self.replication_paused {
            self.replication_paused = paused;
            ctx.host.replication_paused_changed(entity, paused);
        }

        while !reader.is_at_end() {
            let block = self.read_content_block(&mut reader)?;
            let object = match block.target {
                BlockTarget::Root => entity,
                BlockTarget::SubObject {
                    object,
                    type_info: Some(type_info),
                } if type_info.is_deletion() => {
                    if self.replicators.remove(&object).is_some() {
                        debug!("Entity {}: destroying sub-object {}", entity, object);
                        ctx.host.destroy_replicated_object(object);
                    } else {
                        debug!(
                            "Entity {}: delete of unknown sub-object {} ignored",
                            entity, object
                        );
                    }
                    continue;
                }
                BlockTarget::SubObject { object, type_info } => {
                    if let Err(error) =
                        self.find_or_create_replicator(ctx, entity, object, type_info)
                    {
                        self.break_channel(ctx, error);
                        return Ok(());
                    }
                    object
                }
            };

            if block.payload.is_empty() {
                continue;
            }
            let mut payload_reader = block.payload.reader();
            if let Err(error) = ctx.host.decode(object, &mut payload_reader) {
                self.break_channel(
                    ctx,
                    EntityChannelError::CodecFailed {
                        object,
                        reason: error.to_string(),
                    },
                );
                return Ok(());
            }
        }
        Ok(())
    }

    fn bind_received(
        &mut self,
        ctx: &mut ChannelContext,
        header: &EntityHeader,
    ) -> Result<(), EntityChannelError> {
        let entity = header.entity;
        if ctx.table.wake(&entity) {
            debug!("Entity {} reopened from dormancy", entity);
            self.replicators = ctx.table.take_dormant_replicators(&entity);
            ctx.host.entity_woke(entity);
        } else if header.stably_named {
            if !ctx.host.resolve_stable(entity) {
                return Err(EntityChannelError::StableEntityNotFound { entity });
            }
        } else if !ctx.host.construct_from_network(header.class, entity, &header.spawn_params) {
            return Err(EntityChannelError::ConstructionFailed {
                entity,
                class: header.class,
            });
        }

        self.entity = Some(entity);
        self.class = header.class;
        self.replicators
            .entry(entity)
            .or_insert_with(|| Replicator::new(entity, header.class));
        ctx.table.set_active(entity, self.core.index());
        ctx.outbox.events.push(ConnectionEvent::EntityBound {
            channel_index: self.core.index(),
            entity,
        });
        Ok(())
    }

    /// Makes sure a replicator exists for `object`, constructing the object
    /// from `type_info` when it is new
    pub(crate) fn find_or_create_replicator(
        &mut self,
        ctx: &mut ChannelContext,
        entity: NetGuid,
        object: NetGuid,
        type_info: Option<SubObjectType>,
    ) -> Result<(), EntityChannelError> {
        if let Some(existing) = self.replicators.get_mut(&object) {
            if let Some(type_info) = type_info {
                if !type_info.stably_named && type_info.class != existing.class() {
                    warn!(
                        "Entity {}: sub-object {} claimed again by class {} (was {}), replacing",
                        entity,
                        object,
                        type_info.class,
                        existing.class()
                    );
                    if !ctx.host.construct_sub_object(entity, type_info.class, object) {
                        return Err(EntityChannelError::SubObjectConstructionFailed {
                            object,
                            class: type_info.class,
                        });
                    }
                    existing.set_class(type_info.class);
                }
            }
            return Ok(());
        }

        if let Some(replicator) = ctx.table.take_dormant_replicator(&entity, &object) {
            self.replicators.insert(object, replicator);
            return Ok(());
        }

        let Some(type_info) = type_info else {
            return Err(EntityChannelError::UnknownSubObject { object });
        };
        let created = if type_info.stably_named {
            ctx.host.resolve_stable(object)
        } else {
            ctx.host.construct_sub_object(entity, type_info.class, object)
        };
        if !created {
            return Err(EntityChannelError::SubObjectConstructionFailed {
                object,
                class: type_info.class,
            });
        }
        self.replicators
            .insert(object, Replicator::new(object, type_info.class));
        Ok(())
    }

    fn break_channel(&mut self, ctx: &mut ChannelContext, error: EntityChannelError) {
        let channel_index = self.core.index();
        warn!("Channel {}: {}", channel_index, error);
        self.core.set_broken();
        self.queued.clear();
        if !ctx.config.is_replay {
            ctx.outbox
                .control
                .push_back(ControlMessage::EntityChannelFailure { channel_index });
        }
        ctx.outbox.events.push(ConnectionEvent::EntityChannelBroken {
            channel_index,
            entity: self.bound_entity(),
            error,
        });
    }

    // Acks

    pub(crate) fn received_ack(&mut self, packet_id: PacketIndex) {
        for replicator in self.replicators.values_mut() {
            replicator.received_ack(packet_id);
        }
    }

    pub(crate) fn received_nak(&mut self, packet_id: PacketIndex) {
        for replicator in self.replicators.values_mut() {
            replicator.received_nak(packet_id);
        }
        self.rep_keys.received_nak(packet_id);
    }

    // Dormancy

    pub(crate) fn start_becoming_dormant(&mut self) {
        if self.pending_dormancy || self.core.is_dormant() || self.core.is_closing() {
            return;
        }
        debug!("Channel {}: becoming dormant", self.core.index());
        self.pending_dormancy = true;
        for replicator in self.replicators.values_mut() {
            replicator.start_becoming_dormant();
        }
    }

    pub(crate) fn cancel_dormancy(&mut self) {
        self.pending_dormancy = false;
    }

    pub fn ready_for_dormancy(&self) -> bool {
        self.replicators.values().all(Replicator::ready_for_dormancy)
    }

    pub(crate) fn tick(&mut self, ctx: &mut ChannelContext) -> Result<(), ConnectionError> {
        if !self.core.opened_locally() {
            return self.process_queued_bunches(ctx);
        }
        if self.pending_dormancy && !self.core.is_closing() && self.ready_for_dormancy() {
            info!("Channel {}: entity is dormant, closing", self.core.index());
            return self.close(ctx, true);
        }
        Ok(())
    }

    // Closing

    /// Sends the close bunch. A channel the peer never heard of settles
    /// right away.
    pub(crate) fn close(
        &mut self,
        ctx: &mut ChannelContext,
        dormant: bool,
    ) -> Result<(), ConnectionError> {
        if self.core.is_closing() || self.core.is_settled() {
            return Ok(());
        }
        self.pending_dormancy = false;
        self.core.set_dormant(dormant);
        if !self.core.has_sent() {
            self.core.mark_settled();
            return Ok(());
        }
        let mut outgoing = OutgoingBunch::new(Payload::empty(), true);
        outgoing.close = true;
        outgoing.dormant = dormant;
        self.core
            .send_bunch(ctx.sink, ctx.now, outgoing, !ctx.config.is_replay)?;
        Ok(())
    }

    /// Runs once the close is settled. A receiver with queued bunches is
    /// handed back to keep draining off-table.
    pub(crate) fn finalize(mut self, ctx: &mut ChannelContext) -> Option<EntityChannel> {
        let Some(entity) = self.bound_entity() else {
            return None;
        };
        ctx.table.remove_active(&entity, self.core.index());
        if !self.core.opened_locally() && !self.queued.is_empty() && !self.core.is_broken() {
            debug!(
                "Channel {}: closed with {} queued bunches, draining",
                self.core.index(),
                self.queued.len()
            );
            self.draining = true;
            ctx.table.set_draining(entity, true);
            return Some(self);
        }
        self.finish(ctx);
        None
    }

    /// Drains queued bunches of a closed channel. Returns true once the queue
    /// is empty and the channel finished.
    pub(crate) fn tick_draining(
        &mut self,
        ctx: &mut ChannelContext,
    ) -> Result<bool, ConnectionError> {
        self.process_queued_bunches(ctx)?;
        if !self.queued.is_empty() && !self.core.is_broken() {
            return Ok(false);
        }
        if let Some(entity) = self.bound_entity() {
            ctx.table.set_draining(entity, false);
        }
        self.queued.clear();
        self.finish(ctx);
        Ok(true)
    }

    fn finish(&mut self, ctx: &mut ChannelContext) {
        let Some(entity) = self.entity else {
            return;
        };
        let replicators = mem::take(&mut self.replicators);
        if self.core.is_dormant() {
            ctx.table.mark_dormant(entity, replicators);
            ctx.host.entity_dormant(entity);
        } else if !self.core.opened_locally() {
            self.destroy_objects(ctx, entity, replicators);
        } else {
            debug!("Entity {}: replication stopped", entity);
        }
    }

    fn destroy_objects(
        &mut self,
        ctx: &mut ChannelContext,
        entity: NetGuid,
        replicators: HashMap<NetGuid, Replicator>,
    ) {
        for object in replicators.keys().filter(|object| **object != entity) {
            ctx.host.destroy_replicated_object(*object);
        }
        ctx.host.destroy_replicated_object(entity);
        ctx.table.forget(&entity);
    }

    /// Connection teardown: nothing is preserved and queued bunches are
    /// dropped
    pub(crate) fn teardown(mut self, ctx: &mut ChannelContext) {
        self.queued.clear();
        let Some(entity) = self.entity else {
            return;
        };
        if !self.core.opened_locally() {
            let replicators = mem::take(&mut self.replicators);
            self.destroy_objects(ctx, entity, replicators);
        }
    }
}
