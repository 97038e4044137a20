use crate::{
    channel::channel::Channel, constants::CONTROL_CHANNEL_INDEX,
    entity::entity_channel::EntityChannel, ChannelIndex, ChannelKind, ChannelSequence, HostType,
};

/// Fixed-size table of open channels. Sequence numbers outlive the channels
/// that used them so a reopened index continues where the last one stopped.
pub(crate) struct ChannelTable {
    slots: Vec<Option<Channel>>,
    sequences: Vec<(ChannelSequence, ChannelSequence)>,
    /// Closed entity receivers still applying queued bunches
    draining: Vec<EntityChannel>,
}

impl ChannelTable {
    pub fn new(max_channels: u16) -> Self {
        let size = max_channels as usize;
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || None);
        Self {
            slots,
            sequences: vec![(0, 0); size],
            draining: Vec::new(),
        }
    }

    pub fn max_channels(&self) -> u16 {
        self.slots.len() as u16
    }

    pub fn get(&self, index: ChannelIndex) -> Option<&Channel> {
        self.slots.get(index as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, index: ChannelIndex) -> Option<&mut Channel> {
        self.slots.get_mut(index as usize)?.as_mut()
    }

    pub fn contains(&self, index: ChannelIndex) -> bool {
        self.get(index).is_some()
    }

    pub fn insert(&mut self, channel: Channel) {
        let index = channel.index() as usize;
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(channel);
        }
    }

    /// Removes a channel, keeping its sequence numbers for the next one
    pub fn remove(&mut self, index: ChannelIndex) -> Option<Channel> {
        let channel = self.slots.get_mut(index as usize)?.take()?;
        self.sequences[index as usize] = channel.core().sequences();
        Some(channel)
    }

    pub fn sequences(&self, index: ChannelIndex) -> (ChannelSequence, ChannelSequence) {
        self.sequences
            .get(index as usize)
            .copied()
            .unwrap_or((0, 0))
    }

    /// Free index for a channel opened by this side. Servers count up from 1
    /// and clients down from the top so both can open at once.
    pub fn allocate(&self, kind: ChannelKind, host_type: HostType) -> Option<ChannelIndex> {
        if kind == ChannelKind::Control {
            return (!self.contains(CONTROL_CHANNEL_INDEX)).then_some(CONTROL_CHANNEL_INDEX);
        }
        let max = self.max_channels();
        let is_free = |index: &ChannelIndex| !self.contains(*index);
        match host_type {
            HostType::Server => (1..max).find(is_free),
            HostType::Client => (1..max).rev().find(is_free),
        }
    }

    pub fn settled_indices(&self) -> Vec<ChannelIndex> {
        self.slots
            .iter()
            .flatten()
            .filter(|channel| channel.core().is_settled())
            .map(Channel::index)
            .collect()
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.slots.iter().flatten()
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.slots.iter_mut().flatten()
    }

    pub fn push_draining(&mut self, channel: EntityChannel) {
        self.draining.push(channel);
    }

    pub fn take_draining(&mut self) -> Vec<EntityChannel> {
        std::mem::take(&mut self.draining)
    }

    pub fn num_draining(&self) -> usize {
        self.draining.len()
    }

    /// Empties the table. Returns the channels so they can be torn down.
    pub fn clear(&mut self) -> (Vec<Channel>, Vec<EntityChannel>) {
        let channels = self.slots.iter_mut().filter_map(Option::take).collect();
        for sequence in self.sequences.iter_mut() {
            *sequence = (0, 0);
        }
        (channels, self.take_draining())
    }
}
