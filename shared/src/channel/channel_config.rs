use std::time::Duration;

use crate::constants::{MAX_BUNCH_PAYLOAD_BYTES, MAX_PARTIAL_BYTES, RELIABLE_BUFFER};

/// Limits shared by every channel on a connection
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Max unacked outgoing reliable bunches, and max buffered out-of-order
    /// incoming ones. Exceeding either is fatal to the connection.
    pub reliable_buffer: usize,
    /// Payloads above this are split into partial bunches
    pub max_bunch_payload_bytes: usize,
    /// Ceiling on a reassembled partial message
    pub max_partial_bytes: usize,
    /// Unreliable sends that need at least this many partials are sent
    /// reliably instead. 0 disables.
    pub partial_reliable_threshold: usize,
    /// Unacked reliable bunches older than this are sent again even without
    /// a nak
    pub resend_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reliable_buffer: RELIABLE_BUFFER,
            max_bunch_payload_bytes: MAX_BUNCH_PAYLOAD_BYTES,
            max_partial_bytes: MAX_PARTIAL_BYTES,
            partial_reliable_threshold: 0,
            resend_interval: Duration::from_secs(1),
        }
    }
}
