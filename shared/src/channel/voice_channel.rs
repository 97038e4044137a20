use std::{collections::VecDeque, time::Instant};

use crate::{
    channel::{
        channel_core::ChannelCore,
        error::ChannelError,
        sender::{OutgoingBunch, RawFragmentSender},
    },
    InBunch, PacketIdRange, Payload,
};

/// Unreliable pass-through for opaque voice frames
pub struct VoiceChannel {
    core: ChannelCore,
    received: VecDeque<Payload>,
}

impl VoiceChannel {
    pub fn new(core: ChannelCore) -> Self {
        Self {
            core,
            received: VecDeque::new(),
        }
    }

    pub fn core(&self) -> &ChannelCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    pub(crate) fn send(
        &mut self,
        sink: &mut dyn RawFragmentSender,
        now: Instant,
        payload: Payload,
    ) -> Result<PacketIdRange, ChannelError> {
        let outgoing = OutgoingBunch::new(payload, false).mergeable();
        self.core.send_bunch(sink, now, outgoing, false)
    }

    pub(crate) fn received_bunch(&mut self, bunch: InBunch) {
        if !bunch.bunch.payload.is_empty() {
            self.received.push_back(bunch.bunch.payload);
        }
    }

    pub fn take_received(&mut self) -> Vec<Payload> {
        self.received.drain(..).collect()
    }
}
