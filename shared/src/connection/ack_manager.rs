use std::collections::VecDeque;

use crate::{
    connection::standard_header::StandardHeader, sequence_greater_than, PacketIndex,
};

/// Fate of a packet we sent, as learned from the peer's ack header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketNotice {
    Delivered(PacketIndex),
    /// Lost, discarded, or deliberately not acked by the peer
    Dropped(PacketIndex),
}

/// Keeps track of sent & received packets, and forms ack headers
pub struct AckManager {
    next_packet_id: PacketIndex,
    sent_packets: VecDeque<PacketIndex>,
    last_received: Option<PacketIndex>,
    received_bitfield: u32,
    should_send_ack: bool,
}

impl Default for AckManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AckManager {
    pub fn new() -> Self {
        Self {
            next_packet_id: 0,
            sent_packets: VecDeque::new(),
            last_received: None,
            received_bitfield: 0,
            should_send_ack: false,
        }
    }

    /// Id the packet being assembled will carry
    pub fn next_packet_id(&self) -> PacketIndex {
        self.next_packet_id
    }

    pub fn should_send_ack(&self) -> bool {
        self.should_send_ack
    }

    /// Packets must be newer than everything already received
    pub fn should_accept(&self, packet_id: PacketIndex) -> bool {
        match self.last_received {
            None => true,
            Some(last) => sequence_greater_than(packet_id, last),
        }
    }

    /// Records a received packet. `acked` false leaves its bit clear so the
    /// peer treats it as dropped.
    pub fn record_received(&mut self, packet_id: PacketIndex, acked: bool, needs_ack: bool) {
        self.received_bitfield = match self.last_received {
            None => 0,
            Some(last) => {
                let shift = packet_id.wrapping_sub(last) as u32;
                if shift >= 32 {
                    0
                } else {
                    self.received_bitfield << shift
                }
            }
        };
        if acked {
            self.received_bitfield |= 1;
        }
        self.last_received = Some(packet_id);
        if needs_ack {
            self.should_send_ack = true;
        }
    }

    /// Header for the next outgoing packet. Untracked packets never produce
    /// notices.
    pub fn next_outgoing_header(&mut self, track: bool) -> StandardHeader {
        let packet_id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        if track {
            self.sent_packets.push_back(packet_id);
        }
        self.should_send_ack = false;
        StandardHeader {
            packet_id,
            has_ack: self.last_received.is_some(),
            ack_index: self.last_received.unwrap_or(0),
            ack_bitfield: self.received_bitfield,
        }
    }

    /// Resolves every sent packet the header covers, oldest first. Packets
    /// too old for the bitfield count as dropped.
    pub fn process_incoming_header(&mut self, header: &StandardHeader) -> Vec<PacketNotice> {
        let mut notices = Vec::new();
        if !header.has_ack {
            return notices;
        }
        while let Some(&packet_id) = self.sent_packets.front() {
            if sequence_greater_than(packet_id, header.ack_index) {
                break;
            }
            self.sent_packets.pop_front();
            let distance = header.ack_index.wrapping_sub(packet_id) as u32;
            let delivered = distance < 32 && header.ack_bitfield & (1 << distance) != 0;
            notices.push(if delivered {
                PacketNotice::Delivered(packet_id)
            } else {
                PacketNotice::Dropped(packet_id)
            });
        }
        notices
    }
}
