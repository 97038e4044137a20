use std::collections::VecDeque;

use log::{debug, warn};
use weave_serde::{BitWriter, Serde};

use crate::{
    channel::sender::RawFragmentSender,
    connection::{ack_manager::AckManager, standard_header::StandardHeader},
    Bunch, ChannelIndex, PacketIndex,
};

struct PlacedBunch {
    bunch: Bunch,
    bits: u32,
    allow_merge: bool,
}

/// Assembles bunches into packets no larger than the configured size
pub struct PacketWriter {
    ack_manager: AckManager,
    current: Vec<PlacedBunch>,
    current_bits: u32,
    max_packet_bits: u32,
    outgoing: VecDeque<Vec<u8>>,
    internal_ack: bool,
    internally_acked: Vec<PacketIndex>,
    packets_written: u64,
}

impl PacketWriter {
    pub fn new(max_packet_bytes: usize, internal_ack: bool) -> Self {
        Self {
            ack_manager: AckManager::new(),
            current: Vec::new(),
            current_bits: Self::fixed_bits(),
            max_packet_bits: (max_packet_bytes as u32) * 8,
            outgoing: VecDeque::new(),
            internal_ack,
            internally_acked: Vec::new(),
            packets_written: 0,
        }
    }

    /// Header plus the end-of-bunches bit
    fn fixed_bits() -> u32 {
        StandardHeader::MAX_BITS + 1
    }

    pub fn ack_manager(&self) -> &AckManager {
        &self.ack_manager
    }

    pub fn ack_manager_mut(&mut self) -> &mut AckManager {
        &mut self.ack_manager
    }

    pub fn has_unflushed(&self) -> bool {
        !self.current.is_empty()
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Packets written since creation, keepalives included
    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    /// Writes the packet being assembled. An empty packet is only written
    /// when an ack is owed. Returns its id.
    pub fn flush(&mut self) -> Option<PacketIndex> {
        if self.current.is_empty() && !self.ack_manager.should_send_ack() {
            return None;
        }
        Some(self.write_packet())
    }

    /// Writes a packet even if it carries nothing, so the peer's acks keep
    /// flowing
    pub fn flush_keepalive(&mut self) -> PacketIndex {
        self.write_packet()
    }

    fn write_packet(&mut self) -> PacketIndex {
        let carries_bunches = !self.current.is_empty();
        let track = carries_bunches && !self.internal_ack;
        let header = self.ack_manager.next_outgoing_header(track);

        let mut writer = BitWriter::new();
        header.ser(&mut writer);
        for placed in self.current.drain(..) {
            true.ser(&mut writer);
            placed.bunch.ser(&mut writer);
        }
        false.ser(&mut writer);
        self.current_bits = Self::fixed_bits();

        let bytes = writer.to_bytes();
        debug!(
            "Packet {}: {} bytes{}",
            header.packet_id,
            bytes.len(),
            if carries_bunches { "" } else { " (ack only)" }
        );
        self.outgoing.push_back(bytes);
        self.packets_written += 1;
        if self.internal_ack && carries_bunches {
            self.internally_acked.push(header.packet_id);
        }
        header.packet_id
    }

    pub fn pop_packet(&mut self) -> Option<Vec<u8>> {
        self.outgoing.pop_front()
    }

    /// Packets acked at flush time because the connection is replaying
    pub(crate) fn take_internal_acks(&mut self) -> Vec<PacketIndex> {
        std::mem::take(&mut self.internally_acked)
    }

    pub(crate) fn clear(&mut self) {
        self.current.clear();
        self.current_bits = Self::fixed_bits();
    }
}

impl RawFragmentSender for PacketWriter {
    fn send_raw_fragment(&mut self, bunch: &Bunch, allow_merge: bool) -> PacketIndex {
        let bits = bunch.wire_bits() + 1;
        if !self.current.is_empty() && self.current_bits + bits > self.max_packet_bits {
            self.flush();
        }
        if self.current_bits + bits > self.max_packet_bits {
            warn!(
                "Bunch of {} bits on channel {} exceeds the packet size",
                bits,
                bunch.channel_index()
            );
        }
        self.current_bits += bits;
        self.current.push(PlacedBunch {
            bunch: bunch.clone(),
            bits,
            allow_merge,
        });
        self.ack_manager.next_packet_id()
    }

    fn take_mergeable(
        &mut self,
        channel_index: ChannelIndex,
        reliable: bool,
        max_payload_bits: u32,
        extra_bits: u32,
    ) -> Option<Bunch> {
        let last = self.current.last()?;
        let flags = &last.bunch.header.flags;
        if !last.allow_merge
            || last.bunch.channel_index() != channel_index
            || flags.reliable != reliable
            || flags.open
            || flags.close
            || flags.partial
        {
            return None;
        }
        if last.bunch.payload.bit_len() + extra_bits > max_payload_bits {
            return None;
        }
        // room for the extra bits and a longer length prefix
        if self.current_bits + extra_bits + 8 > self.max_packet_bits {
            return None;
        }
        let placed = self.current.pop()?;
        self.current_bits -= placed.bits;
        Some(placed.bunch)
    }
}
