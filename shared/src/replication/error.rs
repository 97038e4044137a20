use thiserror::Error;

use crate::NetGuid;

/// Failures reported by a property delta codec while applying a payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The payload could not be decoded for this object
    #[error("Property payload for {object} is malformed: {reason}")]
    Malformed { object: NetGuid, reason: String },

    /// The codec has no object with this guid
    #[error("No replicated object {object} is known to the codec")]
    UnknownObject { object: NetGuid },
}
