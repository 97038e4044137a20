use std::time::Duration;

use crate::constants::REP_KEY_RING_SIZE;

#[derive(Clone, Debug)]
pub struct EntityConfig {
    /// Time allowed per tick for applying queued bunches. Zero is unlimited.
    pub queued_bunch_time_budget: Duration,
    /// Same, while replaying
    pub replay_queued_bunch_time_budget: Duration,
    /// A bunch queued longer than this logs a warning
    pub queued_bunch_warn_after: Duration,
    /// Slots in the ring mapping packet ids to the rep keys they carried
    pub rep_key_ring_size: usize,
    /// Entities replicated per pass, stalest first. Zero is unlimited.
    pub max_entities_per_tick: usize,
    /// An entity is not replicated again until this much time has passed
    pub min_update_interval: Duration,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            queued_bunch_time_budget: Duration::from_millis(30),
            replay_queued_bunch_time_budget: Duration::from_millis(8),
            queued_bunch_warn_after: Duration::from_secs(30),
            rep_key_ring_size: REP_KEY_RING_SIZE,
            max_entities_per_tick: 0,
            min_update_interval: Duration::ZERO,
        }
    }
}
