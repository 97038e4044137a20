use weave_shared::{ConnectionConfig, ConnectionEvent, ChannelKind, Payload};
use weave_test::{init_logging, TestPair};

fn connected_pair() -> TestPair {
    init_logging();
    let mut pair = TestPair::new(ConnectionConfig::default());
    assert!(pair.connect(20).unwrap());
    pair.run(2).unwrap();
    pair
}

fn voice_frame(len: usize, seed: u8) -> Payload {
    let bytes: Vec<u8> = (0..len).map(|index| (index as u8).wrapping_mul(31) ^ seed).collect();
    Payload::from_bytes(&bytes)
}

#[test]
fn lost_partial_is_the_only_one_resent() {
    let mut pair = connected_pair();
    let channel_index = pair.server.open_voice_channel().unwrap();
    let frame = voice_frame(9000, 1);

    // the opening send is reliable: nine 1000 byte partials, one per packet
    let now = pair.now;
    pair.server
        .send_voice(now, &mut pair.server_world, channel_index, frame.clone())
        .unwrap();
    pair.server_tick().unwrap();
    assert_eq!(pair.server.channel(channel_index).unwrap().core().num_out_rec(), 9);

    pair.to_client.drop_upcoming(&[4]);
    assert_eq!(pair.deliver_to_client().unwrap(), 8);
    assert!(pair.client.take_voice_packets(channel_index).unwrap().is_empty());

    pair.run(10).unwrap();
    let received = pair.client.take_voice_packets(channel_index).unwrap();
    assert_eq!(received, vec![frame]);

    let full_packets = pair
        .to_client
        .delivered_sizes()
        .iter()
        .filter(|size| **size > 1000)
        .count();
    assert_eq!(full_packets, 9);
    assert_eq!(pair.to_client.dropped(), 1);
    assert_eq!(pair.server.channel(channel_index).unwrap().core().num_out_rec(), 0);
    assert!(pair.client_events().contains(&ConnectionEvent::ChannelOpened {
        channel_index,
        kind: ChannelKind::Voice
    }));
}

#[test]
fn unreliable_message_with_a_lost_partial_is_discarded_whole() {
    let mut pair = connected_pair();
    let channel_index = pair.server.open_voice_channel().unwrap();
    let now = pair.now;
    pair.server
        .send_voice(now, &mut pair.server_world, channel_index, voice_frame(10, 0))
        .unwrap();
    pair.run(5).unwrap();
    assert_eq!(pair.client.take_voice_packets(channel_index).unwrap().len(), 1);

    // three partials, the middle one lost
    let now = pair.now;
    pair.server
        .send_voice(now, &mut pair.server_world, channel_index, voice_frame(3000, 2))
        .unwrap();
    pair.server_tick().unwrap();
    pair.to_client.drop_upcoming(&[1]);
    pair.deliver_to_client().unwrap();
    pair.run(5).unwrap();
    assert!(pair.client.take_voice_packets(channel_index).unwrap().is_empty());

    let next = voice_frame(3000, 3);
    let now = pair.now;
    pair.server
        .send_voice(now, &mut pair.server_world, channel_index, next.clone())
        .unwrap();
    pair.run(5).unwrap();
    assert_eq!(pair.client.take_voice_packets(channel_index).unwrap(), vec![next]);
}

#[test]
fn voice_frames_share_packets() {
    let mut pair = connected_pair();
    let channel_index = pair.server.open_voice_channel().unwrap();
    let frames: Vec<Payload> = (0..4u8).map(|seed| voice_frame(40, seed)).collect();

    let now = pair.now;
    for frame in &frames {
        pair.server
            .send_voice(now, &mut pair.server_world, channel_index, frame.clone())
            .unwrap();
    }
    pair.run(5).unwrap();

    let received = pair.client.take_voice_packets(channel_index).unwrap();
    let total: usize = received.iter().map(Payload::byte_len).sum();
    assert_eq!(total, 160);
}
