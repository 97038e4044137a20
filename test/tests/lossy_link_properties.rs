use proptest::prelude::*;

use weave_shared::{ConnectionConfig, ConnectionEvent, ControlMessage, NetGuid, Payload};
use weave_test::{init_logging, LossyLink, TestPair};

const DATA_TAG: u8 = 30;
const MAX_STEPS: usize = 4000;

fn lossy_pair(seed: u64, loss: f32) -> TestPair {
    init_logging();
    let mut config = ConnectionConfig::default();
    config.control.registry.register(DATA_TAG).unwrap();
    let mut pair = TestPair::with_links(
        config,
        LossyLink::lossy(seed, loss),
        LossyLink::lossy(seed.wrapping_add(1), loss),
    );
    assert!(pair.connect(MAX_STEPS).unwrap());
    pair
}

fn received_payloads(pair: &mut TestPair) -> Vec<Payload> {
    pair.server_events()
        .iter()
        .filter_map(|event| match event {
            ConnectionEvent::ControlMessage { tag, payload } if *tag == DATA_TAG => {
                Some(payload.clone())
            }
            _ => None,
        })
        .collect()
}

fn send_all(pair: &mut TestPair, payloads: &[Payload]) {
    let now = pair.now;
    for payload in payloads {
        pair.client
            .send_control(
                now,
                &mut pair.client_world,
                ControlMessage::Custom {
                    tag: DATA_TAG,
                    payload: payload.clone(),
                },
            )
            .unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn reliable_messages_arrive_once_in_order(
        seed in any::<u64>(),
        loss in 0.0f32..0.3,
        count in 1usize..40,
    ) {
        let mut pair = lossy_pair(seed, loss);
        let payloads: Vec<Payload> = (0..count)
            .map(|index| Payload::from_bytes(&(index as u32).to_le_bytes()))
            .collect();
        send_all(&mut pair, &payloads);

        let mut done = false;
        for _ in 0..MAX_STEPS {
            pair.step().unwrap();
            if received_payloads(&mut pair).len() >= count {
                done = true;
                break;
            }
        }
        prop_assert!(done);
        pair.run(20).unwrap();
        prop_assert_eq!(received_payloads(&mut pair), payloads);
    }

    #[test]
    fn large_messages_reassemble_under_loss(
        seed in any::<u64>(),
        loss in 0.0f32..0.25,
        sizes in prop::collection::vec(0usize..5000, 1..5),
    ) {
        let mut pair = lossy_pair(seed, loss);
        let payloads: Vec<Payload> = sizes
            .iter()
            .enumerate()
            .map(|(message, size)| {
                let bytes: Vec<u8> = (0..*size).map(|index| (index + message) as u8).collect();
                Payload::from_bytes(&bytes)
            })
            .collect();
        send_all(&mut pair, &payloads);
        let voice = pair.client.open_voice_channel().unwrap();

        // voice frames on another channel share the packets
        let mut done = false;
        for step in 0..MAX_STEPS {
            if step < 50 {
                let now = pair.now;
                let frame = Payload::from_bytes(&[step as u8; 300]);
                pair.client
                    .send_voice(now, &mut pair.client_world, voice, frame)
                    .unwrap();
            }
            pair.step().unwrap();
            if received_payloads(&mut pair).len() >= payloads.len() {
                done = true;
                break;
            }
        }
        prop_assert!(done);
        prop_assert_eq!(received_payloads(&mut pair), payloads);
    }

    #[test]
    fn replicated_properties_converge(
        seed in any::<u64>(),
        loss in 0.0f32..0.3,
        writes in prop::collection::vec((0u8..4, any::<u32>()), 1..30),
    ) {
        let mut pair = lossy_pair(seed, loss);
        let entity = NetGuid::new_dynamic(1);
        pair.server_world.spawn(entity, NetGuid::new_static(1));
        let now = pair.now;
        pair.server
            .open_entity_channel(now, &mut pair.server_world, entity)
            .unwrap();

        for (key, value) in &writes {
            pair.server_world.set(entity, *key, *value);
            pair.step().unwrap();
        }

        let converged = pair
            .run_until(MAX_STEPS, |pair| {
                let sent = pair.server_world.object(&entity).map(|object| &object.properties);
                let received = pair.client_world.object(&entity).map(|object| &object.properties);
                sent.is_some() && sent == received
            })
            .unwrap();
        prop_assert!(converged);
    }
}
