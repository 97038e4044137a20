use crate::{
    entity::error::EntityChannelError, ChannelIndex, ChannelKind, NetGuid, Payload,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the handshake to finish
    Pending,
    Connected,
    Closed,
}

/// Something the application may want to react to, drained with
/// `Connection::take_events`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    ChannelOpened {
        channel_index: ChannelIndex,
        kind: ChannelKind,
    },
    ChannelClosed {
        channel_index: ChannelIndex,
        kind: ChannelKind,
        dormant: bool,
    },
    /// A receiving entity channel found or constructed its entity
    EntityBound {
        channel_index: ChannelIndex,
        entity: NetGuid,
    },
    /// A receiving entity channel stopped processing
    EntityChannelBroken {
        channel_index: ChannelIndex,
        entity: Option<NetGuid>,
        error: EntityChannelError,
    },
    /// The peer could not bind an entity we replicate; its channel was closed
    PeerEntityFailure { channel_index: ChannelIndex },
    ControlMessage { tag: u8, payload: Payload },
    Netspeed { bytes_per_second: u32 },
    Closed { reason: String },
}
