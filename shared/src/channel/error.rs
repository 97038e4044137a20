use thiserror::Error;

use crate::{ChannelIndex, ChannelKind, ChannelSequence};

/// Protocol violations detected by a channel. All of them are fatal to the
/// owning connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Too many reliable bunches are waiting for an ack
    #[error("Channel {channel_index} would hold {outstanding} unacked reliable bunches (limit {limit}). The peer has stopped acknowledging")]
    ReliableBufferOverflow {
        channel_index: ChannelIndex,
        outstanding: usize,
        limit: usize,
    },

    /// Too many out-of-order reliable bunches are buffered
    #[error("Channel {channel_index} buffered {buffered} out-of-order reliable bunches (limit {limit}). Sequence gap is beyond recovery")]
    IncomingBufferOverflow {
        channel_index: ChannelIndex,
        buffered: usize,
        limit: usize,
    },

    /// Reassembled partial message exceeds the size ceiling
    #[error("Partial message on channel {channel_index} reached {bytes} bytes (limit {limit})")]
    PartialTooLarge {
        channel_index: ChannelIndex,
        bytes: usize,
        limit: usize,
    },

    /// A partial bunch other than the final one ended mid-byte
    #[error("Non-final partial bunch on channel {channel_index} carries {bits} bits, which is not byte aligned")]
    PartialNotByteAligned {
        channel_index: ChannelIndex,
        bits: u32,
    },

    /// A reliable partial bunch did not continue the chain in progress
    #[error("Reliable partial bunch on channel {channel_index} has sequence {received}, expected {expected}")]
    PartialSequenceMismatch {
        channel_index: ChannelIndex,
        expected: ChannelSequence,
        received: ChannelSequence,
    },

    /// A reliable initial partial arrived while a reliable chain was incomplete
    #[error("Reliable initial partial on channel {channel_index} would discard an incomplete reliable partial chain")]
    ReliablePartialReplaced { channel_index: ChannelIndex },

    /// Reliable traffic arrived before the channel's open
    #[error("Reliable bunch {sequence} on channel {channel_index} arrived before the channel was opened")]
    ReliableBeforeOpen {
        channel_index: ChannelIndex,
        sequence: ChannelSequence,
    },

    /// A bunch opened a channel with a different kind than the slot holds
    #[error("Channel {channel_index} is a {expected:?} channel but a bunch opened it as {received:?}")]
    KindMismatch {
        channel_index: ChannelIndex,
        expected: ChannelKind,
        received: ChannelKind,
    },
}
