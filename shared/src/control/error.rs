use thiserror::Error;

/// Control channel protocol violations. All are fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// The first control payload did not start with a valid Hello header
    #[error("Byte order negotiation failed: {reason}")]
    ByteOrderNegotiation { reason: &'static str },

    /// A message tag that is neither built in nor registered
    #[error("Unknown control message tag {tag}")]
    UnknownMessageTag { tag: u8 },

    /// Too many messages waiting for room in the reliable window
    #[error("Control queue overflow: {queued} messages queued (limit {limit})")]
    QueueOverflow { queued: usize, limit: usize },

    /// A message body could not be read
    #[error("Malformed control message (tag {tag:?})")]
    MalformedMessage { tag: Option<u8> },

    /// Custom tags may not shadow built-in messages
    #[error("Control tag {tag} is reserved for built-in messages")]
    ReservedTag { tag: u8 },
}
