use thiserror::Error;

use crate::ChannelIndex;

/// Errors raised while decoding bunches off the wire
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BunchError {
    /// Header bits could not be decoded
    #[error("Failed to read bunch header: {reason}. Packet may be malformed or malicious")]
    HeaderRead { reason: &'static str },

    /// Header decoded but its fields contradict each other
    #[error("Inconsistent bunch header on channel {channel_index}: {reason}")]
    InconsistentHeader {
        channel_index: ChannelIndex,
        reason: &'static str,
    },

    /// Channel index outside the connection's channel table
    #[error("Bunch names channel {channel_index} but the connection only has {max_channels} channels")]
    ChannelIndexOutOfRange {
        channel_index: ChannelIndex,
        max_channels: u16,
    },

    /// Payload of an entity or control bunch could not be parsed
    #[error("Malformed payload on channel {channel_index}: {reason}")]
    MalformedPayload {
        channel_index: ChannelIndex,
        reason: &'static str,
    },
}
