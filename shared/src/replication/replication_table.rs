use std::collections::{HashMap, HashSet};

use log::debug;

use crate::{replication::replicator::Replicator, ChannelIndex, NetGuid};

/// Connection-wide replication bookkeeping that outlives individual entity
/// channels
#[derive(Default)]
pub struct ReplicationTable {
    active: HashMap<NetGuid, ChannelIndex>,
    dormant_entities: HashSet<NetGuid>,
    dormant_replicators: HashMap<NetGuid, HashMap<NetGuid, Replicator>>,
    pending_forced_updates: HashSet<NetGuid>,
    keep_processing: HashSet<NetGuid>,
}

impl ReplicationTable {
    pub fn new() -> Self {
        Self::default()
    }

    // Active channels

    pub fn channel_for(&self, entity: &NetGuid) -> Option<ChannelIndex> {
        self.active.get(entity).copied()
    }

    pub fn active_entities(&self) -> impl Iterator<Item = (&NetGuid, &ChannelIndex)> {
        self.active.iter()
    }

    pub(crate) fn set_active(&mut self, entity: NetGuid, channel_index: ChannelIndex) {
        self.active.insert(entity, channel_index);
    }

    pub(crate) fn remove_active(&mut self, entity: &NetGuid, channel_index: ChannelIndex) {
        if self.active.get(entity) == Some(&channel_index) {
            self.active.remove(entity);
        }
    }

    // Dormancy

    pub fn is_dormant(&self, entity: &NetGuid) -> bool {
        self.dormant_entities.contains(entity)
    }

    pub fn dormant_entities(&self) -> impl Iterator<Item = &NetGuid> {
        self.dormant_entities.iter()
    }

    pub(crate) fn mark_dormant(
        &mut self,
        entity: NetGuid,
        replicators: HashMap<NetGuid, Replicator>,
    ) {
        debug!(
            "Entity {} dormant with {} preserved replicators",
            entity,
            replicators.len()
        );
        self.dormant_entities.insert(entity);
        self.dormant_replicators.insert(entity, replicators);
    }

    /// Clears the dormant mark. Preserved replicators stay until a channel
    /// claims them.
    pub(crate) fn wake(&mut self, entity: &NetGuid) -> bool {
        self.dormant_entities.remove(entity)
    }

    /// Removes one preserved replicator of `entity`
    pub(crate) fn take_dormant_replicator(
        &mut self,
        entity: &NetGuid,
        object: &NetGuid,
    ) -> Option<Replicator> {
        let replicators = self.dormant_replicators.get_mut(entity)?;
        let replicator = replicators.remove(object);
        if replicators.is_empty() {
            self.dormant_replicators.remove(entity);
        }
        replicator
    }

    pub(crate) fn take_dormant_replicators(
        &mut self,
        entity: &NetGuid,
    ) -> HashMap<NetGuid, Replicator> {
        self.dormant_replicators.remove(entity).unwrap_or_default()
    }

    pub fn has_dormant_replicators(&self, entity: &NetGuid) -> bool {
        self.dormant_replicators.contains_key(entity)
    }

    // Forced updates

    /// Asks for a dormant entity to be replicated on the next pass
    pub fn request_forced_update(&mut self, entity: NetGuid) {
        self.pending_forced_updates.insert(entity);
    }

    pub fn has_forced_update(&self, entity: &NetGuid) -> bool {
        self.pending_forced_updates.contains(entity)
    }

    pub(crate) fn take_forced_updates(&mut self) -> Vec<NetGuid> {
        self.pending_forced_updates.drain().collect()
    }

    // Draining

    pub fn is_draining(&self, entity: &NetGuid) -> bool {
        self.keep_processing.contains(entity)
    }

    pub(crate) fn set_draining(&mut self, entity: NetGuid, draining: bool) {
        if draining {
            self.keep_processing.insert(entity);
        } else {
            self.keep_processing.remove(&entity);
        }
    }

    /// Drops everything known about a destroyed entity
    pub(crate) fn forget(&mut self, entity: &NetGuid) {
        self.active.remove(entity);
        self.dormant_entities.remove(entity);
        self.dormant_replicators.remove(entity);
        self.pending_forced_updates.remove(entity);
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}
