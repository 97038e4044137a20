use std::time::Duration;

use crate::{
    channel::channel_config::ChannelConfig,
    constants::{DEFAULT_MAX_CHANNELS, MAX_PACKET_BYTES, PROTOCOL_VERSION},
    control::control_config::ControlConfig,
    entity::entity_config::EntityConfig,
};

/// Contains Config properties which will be used by a Server or Client
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub channel: ChannelConfig,
    pub control: ControlConfig,
    pub entity: EntityConfig,
    /// Size of the channel table; index 0 is the control channel
    pub max_channels: u16,
    pub max_packet_bytes: usize,
    /// An empty packet goes out when nothing was sent for this long
    pub keepalive_interval: Duration,
    /// Replaying a recording: packets are acked on flush, failures are not
    /// reported to the peer and unreliable sends are never forced reliable
    pub is_replay: bool,
    pub protocol_version: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            control: ControlConfig::default(),
            entity: EntityConfig::default(),
            max_channels: DEFAULT_MAX_CHANNELS,
            max_packet_bytes: MAX_PACKET_BYTES,
            keepalive_interval: Duration::from_millis(200),
            is_replay: false,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}
