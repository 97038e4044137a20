use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{
    bunch::{bunch::OutBunch, header::BunchHeader},
    channel::{
        channel_config::ChannelConfig,
        error::ChannelError,
        partial::{receive_partial, PartialAssembly, PartialOutcome},
        sender::{OutgoingBunch, RawFragmentSender},
    },
    sequence_greater_than, Bunch, ChannelIndex, ChannelKind, ChannelSequence, InBunch,
    PacketIdRange, PacketIndex, SequenceList,
};

/// What the core decided about a bunch that is next in order
pub(crate) enum NextBunch {
    /// A complete bunch for the channel kind to handle
    Dispatch(InBunch),
    /// Part of an unfinished partial chain
    Hold,
    /// Dropped, and the carrying packet must not be acked
    SkipAck,
}

/// State and bookkeeping shared by every channel kind: sequencing,
/// partial reassembly, the unacked outgoing list and the open/close
/// handshake
pub struct ChannelCore {
    index: ChannelIndex,
    kind: ChannelKind,
    config: ChannelConfig,
    opened_locally: bool,
    open_sent: bool,
    open_acked: bool,
    open_last_sequence: Option<ChannelSequence>,
    closing: bool,
    settled: bool,
    dormant: bool,
    broken: bool,
    paused_until_reliable_ack: bool,
    last_send_reliable: bool,
    out_reliable: ChannelSequence,
    in_reliable: ChannelSequence,
    out_rec: VecDeque<OutBunch>,
    in_rec: SequenceList<InBunch>,
    in_partial: Option<PartialAssembly>,
}

impl ChannelCore {
    pub fn new(
        index: ChannelIndex,
        kind: ChannelKind,
        opened_locally: bool,
        sequences: (ChannelSequence, ChannelSequence),
        config: &ChannelConfig,
    ) -> Self {
        let (out_reliable, in_reliable) = sequences;
        Self {
            index,
            kind,
            config: config.clone(),
            opened_locally,
            open_sent: false,
            open_acked: false,
            open_last_sequence: None,
            closing: false,
            settled: false,
            dormant: false,
            broken: false,
            paused_until_reliable_ack: false,
            last_send_reliable: false,
            out_reliable,
            in_reliable,
            out_rec: VecDeque::new(),
            in_rec: SequenceList::new(),
            in_partial: None,
        }
    }

    pub fn index(&self) -> ChannelIndex {
        self.index
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn opened_locally(&self) -> bool {
        self.opened_locally
    }

    pub fn open_acked(&self) -> bool {
        self.open_acked
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Closed on both ends and ready to leave the channel table
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub(crate) fn mark_settled(&mut self) {
        self.settled = true;
    }

    pub fn is_dormant(&self) -> bool {
        self.dormant
    }

    pub(crate) fn set_dormant(&mut self, dormant: bool) {
        self.dormant = dormant;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub(crate) fn set_broken(&mut self) {
        self.broken = true;
    }

    /// Whether an unreliable send was forced reliable and the channel waits
    /// for the unacked list to drain
    pub fn is_throttled(&self) -> bool {
        self.paused_until_reliable_ack && !self.out_rec.is_empty()
    }

    /// Unacked outgoing reliable bunches
    pub fn num_out_rec(&self) -> usize {
        self.out_rec.len()
    }

    /// Out-of-order reliable bunches waiting for a gap to fill
    pub fn num_in_rec(&self) -> usize {
        self.in_rec.len()
    }

    /// Whether the peer knows this channel exists
    pub fn has_sent(&self) -> bool {
        self.open_sent || !self.opened_locally
    }

    /// Whether the last send went out reliably, including forced sends
    pub fn last_send_reliable(&self) -> bool {
        self.last_send_reliable
    }

    /// Whether reliable bunch `sequence` is still waiting for its ack
    pub fn out_rec_contains(&self, sequence: ChannelSequence) -> bool {
        self.out_rec
            .iter()
            .any(|out| out.bunch.sequence() == Some(sequence))
    }

    /// Last reliable sequence sent and last one received, for persistence
    /// across channel instances on the same index
    pub fn sequences(&self) -> (ChannelSequence, ChannelSequence) {
        (self.out_reliable, self.in_reliable)
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    // Sending

    /// Splits, sequences and hands `outgoing` to `sink`. Returns the range of
    /// packet ids the bunches landed in.
    pub fn send_bunch(
        &mut self,
        sink: &mut dyn RawFragmentSender,
        now: Instant,
        outgoing: OutgoingBunch,
        allow_forced_reliable: bool,
    ) -> Result<PacketIdRange, ChannelError> {
        let opening = self.opened_locally && !self.open_sent;
        let mut reliable = outgoing.reliable || opening || !outgoing.exports.is_empty();
        let max_bytes = self.config.max_bunch_payload_bytes;
        let max_bits = (max_bytes as u32) * 8;

        if outgoing.merge
            && !opening
            && !outgoing.close
            && outgoing.payload.bit_len() <= max_bits
        {
            if let Some(previous) = sink.take_mergeable(
                self.index,
                reliable,
                max_bits,
                outgoing.payload.bit_len(),
            ) {
                return Ok(self.send_merged(sink, now, previous, outgoing));
            }
        }

        let pieces = outgoing.payload.split(max_bytes);
        let count = pieces.len();
        let threshold = self.config.partial_reliable_threshold;
        if !reliable && allow_forced_reliable && threshold > 0 && count >= threshold {
            if self.out_rec.len() + count < self.config.reliable_buffer {
                info!(
                    "Channel {}: unreliable send of {} partials forced reliable",
                    self.index, count
                );
                reliable = true;
                self.paused_until_reliable_ack = true;
            } else {
                warn!(
                    "Channel {}: {} partials would exceed the reliable buffer, sending unreliably",
                    self.index, count
                );
            }
        }

        if reliable {
            let limit = self.config.reliable_buffer + outgoing.close as usize;
            if self.out_rec.len() + count >= limit {
                return Err(ChannelError::ReliableBufferOverflow {
                    channel_index: self.index,
                    outstanding: self.out_rec.len() + count,
                    limit,
                });
            }
        }

        let partial = count > 1;
        let mut range: Option<PacketIdRange> = None;
        for (position, piece) in pieces.into_iter().enumerate() {
            let first = position == 0;
            let last = position + 1 == count;

            let mut header = BunchHeader::new(self.index);
            header.flags.reliable = reliable;
            header.flags.open = opening && first;
            header.flags.close = outgoing.close && last;
            header.flags.dormant = outgoing.dormant && last;
            header.flags.replication_paused = outgoing.replication_paused;
            header.flags.partial = partial;
            header.flags.partial_initial = partial && first;
            header.flags.partial_final = partial && last;
            if header.flags.open {
                header.channel_kind = Some(self.kind);
            }
            if first {
                header.exports = outgoing.exports.clone();
                header.must_be_mapped = outgoing.must_be_mapped.clone();
            }
            if reliable {
                self.out_reliable = self.out_reliable.wrapping_add(1);
                header.sequence = Some(self.out_reliable);
            }

            let bunch = Bunch::new(header, piece);
            let allow_merge = outgoing.merge && !partial && !opening && !outgoing.close;
            let packet_id = sink.send_raw_fragment(&bunch, allow_merge);
            if reliable {
                self.out_rec.push_back(OutBunch {
                    bunch,
                    packet_id,
                    acked: false,
                    sent_at: now,
                });
            }
            range = Some(match range {
                Some(range) => PacketIdRange {
                    first: range.first,
                    last: packet_id,
                },
                None => PacketIdRange::single(packet_id),
            });
        }

        if opening {
            self.open_sent = true;
            self.open_last_sequence = Some(self.out_reliable);
        }
        if outgoing.close {
            self.closing = true;
        }
        self.last_send_reliable = reliable;

        // split() always yields at least one piece
        Ok(range.unwrap_or_default())
    }

    fn send_merged(
        &mut self,
        sink: &mut dyn RawFragmentSender,
        now: Instant,
        mut bunch: Bunch,
        outgoing: OutgoingBunch,
    ) -> PacketIdRange {
        bunch.payload.append(&outgoing.payload);
        bunch.header.exports.extend(outgoing.exports);
        for guid in outgoing.must_be_mapped {
            if !bunch.header.must_be_mapped.contains(&guid) {
                bunch.header.must_be_mapped.push(guid);
            }
        }
        bunch.header.flags.replication_paused = outgoing.replication_paused;
        bunch.header.flags.dormant |= outgoing.dormant;

        let packet_id = sink.send_raw_fragment(&bunch, true);
        self.last_send_reliable = bunch.reliable();
        if bunch.reliable() {
            if let Some(back) = self.out_rec.back_mut() {
                if back.bunch.sequence() == bunch.sequence() {
                    back.bunch = bunch;
                    back.packet_id = packet_id;
                    back.sent_at = now;
                }
            }
        }
        PacketIdRange::single(packet_id)
    }

    // Receiving

    /// Sequencing for a freshly received bunch. Returns it when it is next in
    /// order; duplicates are dropped and early reliable bunches buffered.
    pub(crate) fn accept_sequenced(
        &mut self,
        bunch: InBunch,
    ) -> Result<Option<InBunch>, ChannelError> {
        let Some(sequence) = bunch.bunch.sequence() else {
            return Ok(Some(bunch));
        };
        if !sequence_greater_than(sequence, self.in_reliable) {
            debug!(
                "Channel {}: duplicate reliable bunch {} (last {})",
                self.index, sequence, self.in_reliable
            );
            return Ok(None);
        }
        if sequence == self.in_reliable.wrapping_add(1) {
            return Ok(Some(bunch));
        }
        if self.in_rec.contains_scan_from_back(&sequence) {
            debug!(
                "Channel {}: reliable bunch {} already buffered",
                self.index, sequence
            );
            return Ok(None);
        }
        if self.in_rec.len() >= self.config.reliable_buffer {
            return Err(ChannelError::IncomingBufferOverflow {
                channel_index: self.index,
                buffered: self.in_rec.len(),
                limit: self.config.reliable_buffer,
            });
        }
        debug!(
            "Channel {}: buffering reliable bunch {} while waiting for {}",
            self.index,
            sequence,
            self.in_reliable.wrapping_add(1)
        );
        if self.in_rec.try_insert_scan_from_back(sequence, bunch).is_err() {
            debug!("Channel {}: reliable bunch {} already buffered", self.index, sequence);
        }
        Ok(None)
    }

    /// Buffered reliable bunch that has become next in order, if any
    pub(crate) fn pop_ready_buffered(&mut self) -> Option<InBunch> {
        self.in_rec.pop_front_if(self.in_reliable.wrapping_add(1))
    }

    /// Takes a next-in-order bunch through reassembly and the open gate
    pub(crate) fn receive_next(&mut self, bunch: InBunch) -> Result<NextBunch, ChannelError> {
        if let Some(sequence) = bunch.bunch.sequence() {
            self.in_reliable = sequence;
        }

        let complete = if bunch.bunch.partial() {
            match receive_partial(
                &mut self.in_partial,
                bunch,
                self.index,
                self.config.max_partial_bytes,
            )? {
                PartialOutcome::Complete(complete) => complete,
                PartialOutcome::Pending => return Ok(NextBunch::Hold),
                PartialOutcome::SkipAck => return Ok(NextBunch::SkipAck),
            }
        } else {
            bunch
        };

        if complete.bunch.open() && !self.opened_locally {
            if !self.open_acked {
                debug!("Channel {}: open received", self.index);
            }
            self.open_acked = true;
        }

        if !self.opened_locally && !self.open_acked {
            if let Some(sequence) = complete.bunch.sequence() {
                return Err(ChannelError::ReliableBeforeOpen {
                    channel_index: self.index,
                    sequence,
                });
            }
            debug!(
                "Channel {}: unreliable bunch before open, withholding ack",
                self.index
            );
            return Ok(NextBunch::SkipAck);
        }

        Ok(NextBunch::Dispatch(complete))
    }

    // Acks

    /// Marks bunches carried by `packet_id` as delivered and retires the
    /// acked front of the list. Returns true when the close bunch retired.
    pub(crate) fn received_ack(&mut self, packet_id: PacketIndex) -> bool {
        for out in self.out_rec.iter_mut() {
            if out.packet_id == packet_id {
                out.acked = true;
            }
        }
        self.retire_acked()
    }

    fn retire_acked(&mut self) -> bool {
        let mut close_acked = false;
        loop {
            let Some(front) = self.out_rec.front() else {
                break;
            };
            if !front.acked {
                break;
            }
            if front.bunch.open() && front.bunch.partial() {
                let chain_len = self
                    .out_rec
                    .iter()
                    .position(|out| out.bunch.header.flags.partial_final)
                    .map(|position| position + 1);
                let chain_acked = match chain_len {
                    Some(len) => self.out_rec.iter().take(len).all(|out| out.acked),
                    None => false,
                };
                if !chain_acked {
                    break;
                }
            }
            let Some(retired) = self.out_rec.pop_front() else {
                break;
            };
            if retired.bunch.sequence().is_some()
                && retired.bunch.sequence() == self.open_last_sequence
            {
                if !self.open_acked {
                    debug!("Channel {}: open acked", self.index);
                }
                self.open_acked = true;
            }
            if retired.bunch.close() {
                debug!("Channel {}: close acked", self.index);
                close_acked = true;
                self.settled = true;
            }
        }
        if self.out_rec.is_empty() && self.paused_until_reliable_ack {
            debug!("Channel {}: reliable backlog drained", self.index);
            self.paused_until_reliable_ack = false;
        }
        close_acked
    }

    /// Resends every unacked bunch that was carried by `packet_id`
    pub(crate) fn received_nak(
        &mut self,
        sink: &mut dyn RawFragmentSender,
        now: Instant,
        packet_id: PacketIndex,
    ) {
        for out in self.out_rec.iter_mut() {
            if !out.acked && out.packet_id == packet_id {
                debug!(
                    "Channel {}: resending bunch {:?} lost in packet {}",
                    self.index,
                    out.bunch.sequence(),
                    packet_id
                );
                out.packet_id = sink.send_raw_fragment(&out.bunch, false);
                out.sent_at = now;
            }
        }
    }

    /// Resends unacked bunches older than `interval`, unless more than
    /// `max_pending` are outstanding
    pub(crate) fn resend_stale(
        &mut self,
        sink: &mut dyn RawFragmentSender,
        now: Instant,
        interval: Duration,
        max_pending: usize,
    ) {
        if self.out_rec.len() > max_pending {
            return;
        }
        for out in self.out_rec.iter_mut() {
            if !out.acked && now.saturating_duration_since(out.sent_at) > interval {
                out.packet_id = sink.send_raw_fragment(&out.bunch, false);
                out.sent_at = now;
            }
        }
    }

    /// Drops all in-flight and buffered state
    pub(crate) fn clear(&mut self) {
        self.out_rec.clear();
        self.in_rec.clear();
        self.in_partial = None;
    }
}
