use log::debug;
use weave_serde::BitWriter;

use crate::{
    replication::host::{PropertyDeltaCodec, RepSnapshot},
    ChannelSequence, NetGuid, PacketIdRange, PacketIndex,
};

struct InFlightUpdate {
    packets: PacketIdRange,
    unacked_packets: u32,
    snapshot: RepSnapshot,
}

impl InFlightUpdate {
    fn delivered(&self) -> bool {
        self.unacked_packets == 0
    }
}

/// Per-object replication state: what was last sent, what the peer is known
/// to have, and which updates are still travelling
pub struct Replicator {
    object: NetGuid,
    class: NetGuid,
    sent: Option<RepSnapshot>,
    acked: Option<RepSnapshot>,
    pending: Option<RepSnapshot>,
    in_flight: Vec<InFlightUpdate>,
    last_update_empty: bool,
    creation_sequence: Option<ChannelSequence>,
}

impl Replicator {
    pub fn new(object: NetGuid, class: NetGuid) -> Self {
        Self {
            object,
            class,
            sent: None,
            acked: None,
            pending: None,
            in_flight: Vec::new(),
            last_update_empty: false,
            creation_sequence: None,
        }
    }

    pub fn object(&self) -> NetGuid {
        self.object
    }

    pub fn class(&self) -> NetGuid {
        self.class
    }

    pub(crate) fn set_class(&mut self, class: NetGuid) {
        self.class = class;
    }

    /// Whether anything has ever been sent for this object
    pub fn has_sent(&self) -> bool {
        self.sent.is_some()
    }

    pub fn acked_snapshot(&self) -> Option<&RepSnapshot> {
        self.acked.as_ref()
    }

    /// Reliable sequence of the bunch that created this object on the peer
    pub fn creation_sequence(&self) -> Option<ChannelSequence> {
        self.creation_sequence
    }

    pub(crate) fn set_creation_sequence(&mut self, sequence: ChannelSequence) {
        self.creation_sequence = Some(sequence);
    }

    /// Encodes every property that changed since the last send. Returns
    /// whether anything was written.
    pub fn replicate<C: PropertyDeltaCodec + ?Sized>(
        &mut self,
        codec: &mut C,
        writer: &mut BitWriter,
    ) -> bool {
        match codec.encode(self.object, self.sent.as_ref(), writer) {
            Some(snapshot) => {
                self.pending = Some(snapshot);
                self.last_update_empty = false;
                true
            }
            None => {
                self.pending = None;
                self.last_update_empty = true;
                false
            }
        }
    }

    /// A pass where the replication key held the object back counts as
    /// an empty update
    pub(crate) fn skipped_by_rep_key(&mut self) {
        self.pending = None;
        self.last_update_empty = true;
    }

    /// Drops an encoded update that never made it into a bunch
    pub(crate) fn discard_pending(&mut self) {
        self.pending = None;
    }

    /// Records that the update from the last `replicate` went out in
    /// `packets`. Reliable updates cannot be lost, so only unreliable ones
    /// wait for acks.
    pub fn post_send(&mut self, packets: PacketIdRange, reliable: bool) {
        let Some(snapshot) = self.pending.take() else {
            return;
        };
        self.sent = Some(snapshot.clone());
        let unacked_packets = if reliable {
            0
        } else {
            packets.iter().count() as u32
        };
        self.in_flight.push(InFlightUpdate {
            packets,
            unacked_packets,
            snapshot,
        });
        self.promote_delivered();
    }

    pub fn received_ack(&mut self, packet_id: PacketIndex) {
        for update in self.in_flight.iter_mut() {
            if update.unacked_packets > 0 && update.packets.contains(packet_id) {
                update.unacked_packets -= 1;
            }
        }
        self.promote_delivered();
    }

    /// A lost unreliable update rewinds the send baseline to the last state
    /// the peer is known to have, so the next encode carries everything
    /// since then
    pub fn received_nak(&mut self, packet_id: PacketIndex) {
        let lost = self
            .in_flight
            .iter()
            .any(|update| !update.delivered() && update.packets.contains(packet_id));
        if !lost {
            return;
        }
        debug!(
            "Replicator {}: update lost in packet {}, rewinding to acked state",
            self.object, packet_id
        );
        self.sent = self.acked.clone();
        self.in_flight.clear();
    }

    fn promote_delivered(&mut self) {
        while self
            .in_flight
            .first()
            .map_or(false, InFlightUpdate::delivered)
        {
            let update = self.in_flight.remove(0);
            self.acked = Some(update.snapshot);
        }
    }

    /// The last encode produced nothing and no update is unconfirmed
    pub fn ready_for_dormancy(&self) -> bool {
        self.last_update_empty && self.in_flight.is_empty()
    }

    /// Requires one more empty update before dormancy
    pub fn start_becoming_dormant(&mut self) {
        self.last_update_empty = false;
    }
}
