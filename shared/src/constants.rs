use crate::types::ChannelIndex;

/// Channel 0 always carries control traffic
pub const CONTROL_CHANNEL_INDEX: ChannelIndex = 0;

pub const DEFAULT_MAX_CHANNELS: u16 = 1024;

/// Upper bound on unacknowledged outgoing (and buffered incoming) reliable
/// bunches per channel
pub const RELIABLE_BUFFER: usize = 256;

/// Ceiling on the size of a message reassembled from partial bunches
pub const MAX_PARTIAL_BYTES: usize = 64 * 1024;

/// Payloads larger than this are split into partial bunches
pub const MAX_BUNCH_PAYLOAD_BYTES: usize = 1000;

pub const MAX_PACKET_BYTES: usize = 1200;

pub const MAX_QUEUED_CONTROL_MESSAGES: usize = 32768;

/// Slots in an entity channel's packet id -> sub-object rep key ring
pub const REP_KEY_RING_SIZE: usize = 64;

pub const PROTOCOL_VERSION: u32 = 1;
