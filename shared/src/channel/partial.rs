use log::debug;

use crate::{channel::error::ChannelError, Bunch, ChannelIndex, InBunch, Payload};

/// A partial chain being reassembled
#[derive(Debug)]
pub(crate) struct PartialAssembly {
    first: Bunch,
    payload: Payload,
    reliable: bool,
    last_id: u16,
}

pub(crate) enum PartialOutcome {
    Complete(InBunch),
    Pending,
    SkipAck,
}

impl PartialAssembly {
    fn start(bunch: InBunch) -> Self {
        let last_id = bunch.ordering_id();
        let reliable = bunch.bunch.reliable();
        let Bunch { header, payload } = bunch.bunch;
        Self {
            first: Bunch::new(header, Payload::empty()),
            payload,
            reliable,
            last_id,
        }
    }

    fn continues_with(&self, bunch: &InBunch) -> bool {
        if bunch.bunch.reliable() != self.reliable {
            return false;
        }
        let id = bunch.ordering_id();
        let next = self.last_id.wrapping_add(1);
        if self.reliable {
            id == next
        } else {
            id == self.last_id || id == next
        }
    }

    fn finish(self, last: InBunch) -> InBunch {
        let mut header = self.first.header;
        let last_flags = last.bunch.header.flags;
        header.flags.partial = false;
        header.flags.partial_initial = false;
        header.flags.partial_final = false;
        header.flags.close = last_flags.close;
        header.flags.dormant = last_flags.dormant;
        header.flags.replication_paused = last_flags.replication_paused;
        header.sequence = last.bunch.header.sequence;
        header.exports.extend(last.bunch.header.exports);
        header.must_be_mapped.extend(last.bunch.header.must_be_mapped);
        InBunch::new(Bunch::new(header, self.payload), last.packet_id)
    }
}

/// Feeds one partial bunch into `slot`
pub(crate) fn receive_partial(
    slot: &mut Option<PartialAssembly>,
    bunch: InBunch,
    channel_index: ChannelIndex,
    max_partial_bytes: usize,
) -> Result<PartialOutcome, ChannelError> {
    let flags = bunch.bunch.header.flags;

    if !flags.partial_final && !bunch.bunch.payload.is_byte_aligned() {
        return Err(ChannelError::PartialNotByteAligned {
            channel_index,
            bits: bunch.bunch.payload.bit_len(),
        });
    }

    if flags.partial_initial {
        if let Some(existing) = slot.as_ref() {
            if existing.reliable {
                if !flags.reliable {
                    debug!(
                        "Channel {}: unreliable partial initial would discard a reliable chain, withholding ack",
                        channel_index
                    );
                    return Ok(PartialOutcome::SkipAck);
                }
                return Err(ChannelError::ReliablePartialReplaced { channel_index });
            }
            debug!(
                "Channel {}: discarding incomplete unreliable partial chain",
                channel_index
            );
        }
        if flags.partial_final {
            *slot = None;
            let assembly = PartialAssembly::start(bunch.clone());
            return Ok(PartialOutcome::Complete(assembly.finish(strip_payload(bunch))));
        }
        let assembly = PartialAssembly::start(bunch);
        check_size(&assembly, channel_index, max_partial_bytes)?;
        *slot = Some(assembly);
        return Ok(PartialOutcome::Pending);
    }

    let continues = slot
        .as_ref()
        .map_or(false, |assembly| assembly.continues_with(&bunch));
    if !continues {
        if flags.reliable {
            let expected = slot
                .as_ref()
                .map_or(0, |assembly| assembly.last_id.wrapping_add(1));
            return Err(ChannelError::PartialSequenceMismatch {
                channel_index,
                expected,
                received: bunch.ordering_id(),
            });
        }
        if slot.as_ref().map_or(false, |assembly| assembly.reliable) {
            debug!(
                "Channel {}: ignoring unreliable partial while a reliable chain is assembling",
                channel_index
            );
            return Ok(PartialOutcome::Pending);
        }
        debug!(
            "Channel {}: unreliable partial chain broken at packet {}, discarding",
            channel_index, bunch.packet_id
        );
        *slot = None;
        return Ok(PartialOutcome::Pending);
    }

    let Some(assembly) = slot.as_mut() else {
        return Ok(PartialOutcome::Pending);
    };
    assembly.payload.append(&bunch.bunch.payload);
    assembly.last_id = bunch.ordering_id();
    assembly
        .first
        .header
        .exports
        .extend(bunch.bunch.header.exports.iter().cloned());
    assembly
        .first
        .header
        .must_be_mapped
        .extend(bunch.bunch.header.must_be_mapped.iter().copied());
    check_size(assembly, channel_index, max_partial_bytes)?;

    if !flags.partial_final {
        return Ok(PartialOutcome::Pending);
    }
    match slot.take() {
        Some(assembly) => Ok(PartialOutcome::Complete(assembly.finish(strip_payload(bunch)))),
        None => Ok(PartialOutcome::Pending),
    }
}

fn strip_payload(mut bunch: InBunch) -> InBunch {
    bunch.bunch.payload = Payload::empty();
    bunch.bunch.header.exports.clear();
    bunch.bunch.header.must_be_mapped.clear();
    bunch
}

fn check_size(
    assembly: &PartialAssembly,
    channel_index: ChannelIndex,
    max_partial_bytes: usize,
) -> Result<(), ChannelError> {
    let bytes = assembly.payload.byte_len();
    if bytes > max_partial_bytes {
        return Err(ChannelError::PartialTooLarge {
            channel_index,
            bytes,
            limit: max_partial_bytes,
        });
    }
    Ok(())
}
