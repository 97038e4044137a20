//! # Weave Shared
//! Reliable channel multiplexing and entity replication over an unreliable,
//! ordered packet transport.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use weave_serde::{
    BitCounter, BitReader, BitWrite, BitWriter, ConstBitLength, Serde, SerdeErr, SerdeInteger,
    UnsignedInteger, UnsignedVariableInteger,
};

mod bunch;
mod channel;
mod connection;
mod constants;
mod control;
mod entity;
mod guid;
mod replication;
mod sequence_list;
mod types;
mod wrapping_number;

pub use bunch::{
    bunch::{Bunch, InBunch},
    error::BunchError,
    flags::BunchFlags,
    header::BunchHeader,
    payload::Payload,
};
pub use channel::{
    channel::Channel,
    channel_config::ChannelConfig,
    channel_core::ChannelCore,
    error::ChannelError,
    sender::{OutgoingBunch, RawFragmentSender},
    voice_channel::VoiceChannel,
};
pub use connection::{
    ack_manager::{AckManager, PacketNotice},
    connection::Connection,
    connection_config::ConnectionConfig,
    error::ConnectionError,
    event::{ConnectionEvent, ConnectionState},
    packet_writer::PacketWriter,
    standard_header::StandardHeader,
};
pub use constants::{
    CONTROL_CHANNEL_INDEX, DEFAULT_MAX_CHANNELS, MAX_BUNCH_PAYLOAD_BYTES, MAX_PACKET_BYTES,
    MAX_PARTIAL_BYTES, PROTOCOL_VERSION, RELIABLE_BUFFER,
};
pub use control::{
    control_channel::ControlChannel,
    control_config::{ControlConfig, ControlRegistry},
    control_message::{ControlMessage, FIRST_CUSTOM_TAG},
    error::ControlError,
};
pub use entity::{
    content_block::{BlockTarget, ContentBlock, SubObjectType},
    entity_channel::EntityChannel,
    entity_config::EntityConfig,
    entity_header::EntityHeader,
    error::EntityChannelError,
    rep_keys::RepKeyTracker,
};
pub use guid::{
    guid_cache::{GuidCache, GuidExport, LoadState},
    net_guid::NetGuid,
};
pub use replication::{
    error::CodecError,
    host::{
        EntityDescriptor, EntityLifecycle, PropertyDeltaCodec, RepSnapshot, ReplicationHost,
        ReplicationSource, SubObjectInfo,
    },
    replication_table::ReplicationTable,
    replicator::Replicator,
};
pub use sequence_list::{SequenceError, SequenceList};
pub use types::{ChannelIndex, ChannelKind, ChannelSequence, HostType, PacketIdRange, PacketIndex};
pub use wrapping_number::{sequence_distance, sequence_greater_than, sequence_less_than};
