use thiserror::Error;
use weave_serde::SerdeErr;

use crate::{
    channel::error::ChannelError, control::error::ControlError, BunchError, ChannelIndex,
    ChannelKind, NetGuid,
};

/// Errors surfaced by a connection. Protocol violations (`Channel`,
/// `Control`, `Bunch`, `Serde`) have already closed the connection when
/// they are returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Bunch error: {0}")]
    Bunch(#[from] BunchError),

    #[error("Failed to read packet: {0}")]
    Serde(#[from] SerdeErr),

    /// The operation needs an open connection
    #[error("Connection is not connected")]
    NotConnected,

    /// No free slot in the channel table
    #[error("No free {kind:?} channel among {max_channels} slots")]
    ChannelTableFull {
        kind: ChannelKind,
        max_channels: u16,
    },

    #[error("Channel {channel_index} does not exist")]
    ChannelNotFound { channel_index: ChannelIndex },

    /// The entity is not being replicated on this connection
    #[error("Entity {entity} has no open channel")]
    EntityNotReplicated { entity: NetGuid },

    /// The entity already has a channel
    #[error("Entity {entity} is already replicated on channel {channel_index}")]
    EntityAlreadyReplicated {
        entity: NetGuid,
        channel_index: ChannelIndex,
    },

    #[error("Operation requires the {expected:?} side of the connection")]
    WrongHostType { expected: crate::HostType },
}

impl ConnectionError {
    /// Protocol violations end the connection; the rest are API misuse
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Channel(_) | Self::Control(_) | Self::Bunch(_) | Self::Serde(_)
        )
    }
}
