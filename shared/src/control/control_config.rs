use std::{collections::HashSet, time::Duration};

use crate::{
    constants::MAX_QUEUED_CONTROL_MESSAGES,
    control::{control_message::FIRST_CUSTOM_TAG, error::ControlError},
};

/// Application defined control message tags accepted from the peer
#[derive(Clone, Debug, Default)]
pub struct ControlRegistry {
    custom_tags: HashSet<u8>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: u8) -> Result<(), ControlError> {
        if tag < FIRST_CUSTOM_TAG {
            return Err(ControlError::ReservedTag { tag });
        }
        self.custom_tags.insert(tag);
        Ok(())
    }

    pub fn is_registered(&self, tag: u8) -> bool {
        self.custom_tags.contains(&tag)
    }
}

#[derive(Clone, Debug)]
pub struct ControlConfig {
    /// Before the open is acked, unacked bunches older than this are resent
    pub resend_interval: Duration,
    /// Stale resends are skipped while more than this many bunches are unacked
    pub resend_max_pending: usize,
    /// Messages waiting for room in the reliable window. Overflow is fatal.
    pub max_queued_messages: usize,
    pub registry: ControlRegistry,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_secs(1),
            resend_max_pending: 8,
            max_queued_messages: MAX_QUEUED_CONTROL_MESSAGES,
            registry: ControlRegistry::new(),
        }
    }
}
