use thiserror::Error;

use crate::NetGuid;

/// Failures that break a single entity channel without closing the
/// connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityChannelError {
    /// The host could not spawn a dynamic entity
    #[error("Failed to construct entity {entity} of class {class}")]
    ConstructionFailed { entity: NetGuid, class: NetGuid },

    /// A stably named entity is unknown to the host
    #[error("Stably named entity {entity} could not be resolved")]
    StableEntityNotFound { entity: NetGuid },

    /// A content block named a sub-object that was never created
    #[error("Content block for unknown sub-object {object} carries no type information")]
    UnknownSubObject { object: NetGuid },

    /// The host could not create or resolve a sub-object
    #[error("Failed to create sub-object {object} of class {class}")]
    SubObjectConstructionFailed { object: NetGuid, class: NetGuid },

    /// The property codec rejected a payload
    #[error("Failed to apply properties of {object}: {reason}")]
    CodecFailed { object: NetGuid, reason: String },
}
