use std::collections::HashMap;

use crate::{NetGuid, PacketIdRange, PacketIndex};

#[derive(Default)]
struct RepKeySlot {
    packet_id: Option<PacketIndex>,
    objects: Vec<NetGuid>,
}

/// Tracks which rep key of each keyed sub-object the peer has been sent, and
/// forgets a key when the packet carrying it is lost
pub struct RepKeyTracker {
    sent_keys: HashMap<NetGuid, i32>,
    pending: Vec<NetGuid>,
    ring: Vec<RepKeySlot>,
}

impl RepKeyTracker {
    pub fn new(ring_size: usize) -> Self {
        let mut ring = Vec::new();
        ring.resize_with(ring_size.max(1), RepKeySlot::default);
        Self {
            sent_keys: HashMap::new(),
            pending: Vec::new(),
            ring,
        }
    }

    /// True when `rep_key` differs from the key last sent for `object`. The
    /// key is then assumed sent with the next bunch.
    pub fn key_needs_to_replicate(&mut self, object: NetGuid, rep_key: i32) -> bool {
        if self.sent_keys.get(&object) == Some(&rep_key) {
            return false;
        }
        self.sent_keys.insert(object, rep_key);
        self.pending.push(object);
        true
    }

    fn slot_index(&self, packet_id: PacketIndex) -> usize {
        packet_id as usize % self.ring.len()
    }

    /// Files the keys written since the last call under every packet the
    /// bunch went out in
    pub fn record_sent(&mut self, packets: PacketIdRange) {
        for packet_id in packets.iter() {
            let index = self.slot_index(packet_id);
            let slot = &mut self.ring[index];
            if slot.packet_id != Some(packet_id) {
                slot.packet_id = Some(packet_id);
                slot.objects.clear();
            }
            slot.objects.extend(self.pending.iter().copied());
        }
        self.pending.clear();
    }

    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    pub fn received_nak(&mut self, packet_id: PacketIndex) {
        let index = self.slot_index(packet_id);
        let slot = &mut self.ring[index];
        if slot.packet_id != Some(packet_id) {
            return;
        }
        for object in slot.objects.drain(..) {
            self.sent_keys.remove(&object);
        }
        slot.packet_id = None;
    }

    pub fn forget(&mut self, object: &NetGuid) {
        self.sent_keys.remove(object);
    }
}
