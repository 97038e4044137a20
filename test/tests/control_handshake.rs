use weave_shared::{
    ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionState, ControlError,
    ControlMessage, Payload,
};
use weave_test::{init_logging, LossyLink, TestPair};

const CHAT_TAG: u8 = 20;

fn chat_config() -> ConnectionConfig {
    let mut config = ConnectionConfig::default();
    config.control.registry.register(CHAT_TAG).unwrap();
    config
}

fn chat(bytes: &[u8]) -> ControlMessage {
    ControlMessage::Custom {
        tag: CHAT_TAG,
        payload: Payload::from_bytes(bytes),
    }
}

#[test]
fn handshake_connects_both_sides() {
    init_logging();
    let mut pair = TestPair::new(ConnectionConfig::default());
    assert!(pair.connect(20).unwrap());

    assert!(pair.server_events().contains(&ConnectionEvent::Connected));
    assert!(pair.client_events().contains(&ConnectionEvent::Connected));
    assert_eq!(pair.client.control_channel().unwrap().peer_little_endian(), None);
    assert!(pair.server.control_channel().unwrap().peer_little_endian().is_some());
    assert!(!pair.server.control_channel().unwrap().needs_byte_swap());
}

#[test]
fn handshake_survives_a_lost_hello() {
    init_logging();
    let mut to_server = LossyLink::perfect();
    to_server.drop_upcoming(&[0]);
    let mut pair =
        TestPair::with_links(ConnectionConfig::default(), LossyLink::perfect(), to_server);

    // the hello is resent once its resend interval passes
    assert!(pair.connect(200).unwrap());
    assert_eq!(pair.to_server.dropped(), 1);
}

#[test]
fn version_mismatch_closes_both_sides() {
    init_logging();
    let mut client_config = ConnectionConfig::default();
    client_config.protocol_version = ConnectionConfig::default().protocol_version + 1;
    let mut pair = TestPair::with_configs(
        ConnectionConfig::default(),
        client_config,
        LossyLink::perfect(),
        LossyLink::perfect(),
    );

    pair.client.connect(pair.now).unwrap();
    pair.client_tick().unwrap();
    pair.deliver_to_server().unwrap();
    assert_eq!(pair.server.state(), ConnectionState::Closed);

    pair.deliver_to_client().unwrap();
    assert_eq!(pair.client.state(), ConnectionState::Closed);

    let closed = pair
        .client_events()
        .iter()
        .find_map(|event| match event {
            ConnectionEvent::Closed { reason } => Some(reason.clone()),
            _ => None,
        })
        .unwrap();
    assert!(closed.contains("protocol version"));
    assert!(!pair.client_events().contains(&ConnectionEvent::Connected));
}

#[test]
fn custom_messages_arrive_in_order() {
    init_logging();
    let mut pair = TestPair::new(chat_config());
    assert!(pair.connect(20).unwrap());

    for index in 0..10u8 {
        let now = pair.now;
        pair.client
            .send_control(now, &mut pair.client_world, chat(&[index]))
            .unwrap();
    }
    pair.run(5).unwrap();

    let received: Vec<u8> = pair
        .server_events()
        .iter()
        .filter_map(|event| match event {
            ConnectionEvent::ControlMessage { tag, payload } if *tag == CHAT_TAG => {
                Some(payload.bytes()[0])
            }
            _ => None,
        })
        .collect();
    assert_eq!(received, (0..10).collect::<Vec<u8>>());
}

#[test]
fn control_send_before_handshake_is_rejected() {
    init_logging();
    let mut pair = TestPair::new(chat_config());
    let now = pair.now;
    assert_eq!(
        pair.client.send_control(now, &mut pair.client_world, chat(&[1])),
        Err(ConnectionError::NotConnected)
    );
}

#[test]
fn netspeed_is_recorded() {
    init_logging();
    let mut pair = TestPair::new(ConnectionConfig::default());
    assert!(pair.connect(20).unwrap());
    let now = pair.now;
    pair.client
        .send_control(
            now,
            &mut pair.client_world,
            ControlMessage::Netspeed {
                bytes_per_second: 15_000,
            },
        )
        .unwrap();
    pair.run(3).unwrap();
    assert_eq!(pair.server.peer_netspeed(), Some(15_000));
}

#[test]
fn queue_overflow_closes_the_connection() {
    init_logging();
    let mut client_config = chat_config();
    client_config.channel.reliable_buffer = 4;
    client_config.control.max_queued_messages = 2;
    let mut pair = TestPair::with_configs(
        chat_config(),
        client_config,
        LossyLink::perfect(),
        LossyLink::perfect(),
    );
    assert!(pair.connect(20).unwrap());
    pair.run(2).unwrap();
    assert_eq!(pair.client.control_channel().unwrap().core().num_out_rec(), 0);

    // large enough that no two messages share a bunch
    let body = vec![9u8; 600];
    let now = pair.now;
    for _ in 0..5 {
        pair.client
            .send_control(now, &mut pair.client_world, chat(&body))
            .unwrap();
    }
    assert_eq!(pair.client.control_channel().unwrap().num_queued(), 2);

    let result = pair.client.send_control(now, &mut pair.client_world, chat(&body));
    assert_eq!(
        result,
        Err(ConnectionError::Control(ControlError::QueueOverflow {
            queued: 2,
            limit: 2
        }))
    );
    assert_eq!(pair.client.state(), ConnectionState::Closed);
}
