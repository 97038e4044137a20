use log::debug;

use crate::{
    channel::{
        channel_core::{ChannelCore, NextBunch},
        error::ChannelError,
        sender::OutgoingBunch,
        voice_channel::VoiceChannel,
    },
    connection::{
        connection_config::ConnectionConfig, context::ChannelContext, error::ConnectionError,
    },
    control::control_channel::ControlChannel,
    entity::entity_channel::EntityChannel,
    ChannelIndex, ChannelKind, ChannelSequence, InBunch, PacketIndex, Payload,
};

/// Result of feeding one received bunch to a channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ReceiveOutcome {
    /// The packet carrying the bunch must not be acked
    pub skip_ack: bool,
}

/// Every kind of channel a connection multiplexes
pub enum Channel {
    Control(ControlChannel),
    Entity(EntityChannel),
    Voice(VoiceChannel),
}

impl Channel {
    pub(crate) fn new(
        index: ChannelIndex,
        kind: ChannelKind,
        opened_locally: bool,
        sequences: (ChannelSequence, ChannelSequence),
        config: &ConnectionConfig,
    ) -> Self {
        let core = ChannelCore::new(index, kind, opened_locally, sequences, &config.channel);
        match kind {
            ChannelKind::Control => Self::Control(ControlChannel::new(core, &config.control)),
            ChannelKind::Entity => Self::Entity(EntityChannel::new(core, &config.entity)),
            ChannelKind::Voice => Self::Voice(VoiceChannel::new(core)),
        }
    }

    pub fn core(&self) -> &ChannelCore {
        match self {
            Self::Control(channel) => channel.core(),
            Self::Entity(channel) => channel.core(),
            Self::Voice(channel) => channel.core(),
        }
    }

    pub fn core_mut(&mut self) -> &mut ChannelCore {
        match self {
            Self::Control(channel) => channel.core_mut(),
            Self::Entity(channel) => channel.core_mut(),
            Self::Voice(channel) => channel.core_mut(),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.core().kind()
    }

    pub fn index(&self) -> ChannelIndex {
        self.core().index()
    }

    pub fn as_entity(&self) -> Option<&EntityChannel> {
        match self {
            Self::Entity(channel) => Some(channel),
            _ => None,
        }
    }

    pub fn as_control(&self) -> Option<&ControlChannel> {
        match self {
            Self::Control(channel) => Some(channel),
            _ => None,
        }
    }

    /// Sequencing, reassembly and dispatch of one received bunch, followed
    /// by any buffered bunches it unblocked
    pub(crate) fn received_raw_bunch(
        &mut self,
        ctx: &mut ChannelContext,
        bunch: InBunch,
    ) -> Result<ReceiveOutcome, ConnectionError> {
        let mut outcome = ReceiveOutcome::default();
        if bunch.bunch.open() {
            if let Some(kind) = bunch.bunch.header.channel_kind {
                if kind != self.kind() {
                    return Err(ChannelError::KindMismatch {
                        channel_index: self.index(),
                        expected: self.kind(),
                        received: kind,
                    }
                    .into());
                }
            }
        }

        let mut next = self.core_mut().accept_sequenced(bunch)?;
        while let Some(bunch) = next {
            match self.core_mut().receive_next(bunch)? {
                NextBunch::Dispatch(bunch) => {
                    let close = bunch.bunch.close();
                    let dormant = bunch.bunch.dormant();
                    self.received_bunch(ctx, bunch)?;
                    if close {
                        debug!(
                            "Channel {}: closed by peer (dormant: {})",
                            self.index(),
                            dormant
                        );
                        self.core_mut().set_dormant(dormant);
                        self.core_mut().mark_settled();
                        return Ok(outcome);
                    }
                }
                NextBunch::Hold => {}
                NextBunch::SkipAck => outcome.skip_ack = true,
            }
            next = self.core_mut().pop_ready_buffered();
        }
        Ok(outcome)
    }

    fn received_bunch(
        &mut self,
        ctx: &mut ChannelContext,
        bunch: InBunch,
    ) -> Result<(), ConnectionError> {
        match self {
            Self::Control(channel) => channel.received_bunch(ctx, bunch),
            Self::Entity(channel) => channel.received_bunch(ctx, bunch),
            Self::Voice(channel) => {
                channel.received_bunch(bunch);
                Ok(())
            }
        }
    }

    pub(crate) fn received_ack(&mut self, packet_id: PacketIndex) {
        if let Self::Entity(channel) = self {
            channel.received_ack(packet_id);
        }
        self.core_mut().received_ack(packet_id);
    }

    pub(crate) fn received_nak(&mut self, ctx: &mut ChannelContext, packet_id: PacketIndex) {
        if let Self::Entity(channel) = self {
            channel.received_nak(packet_id);
        }
        self.core_mut().received_nak(ctx.sink, ctx.now, packet_id);
    }

    pub(crate) fn tick(&mut self, ctx: &mut ChannelContext) -> Result<(), ConnectionError> {
        match self {
            Self::Control(channel) => channel.tick(ctx),
            Self::Entity(channel) => channel.tick(ctx),
            Self::Voice(_) => Ok(()),
        }
    }

    /// Starts closing from this side. Settles at once when the peer never
    /// learned of the channel.
    pub(crate) fn close(&mut self, ctx: &mut ChannelContext) -> Result<(), ConnectionError> {
        if let Self::Entity(channel) = self {
            return channel.close(ctx, false);
        }
        let core = self.core_mut();
        if core.is_closing() || core.is_settled() {
            return Ok(());
        }
        if !core.has_sent() {
            core.mark_settled();
            return Ok(());
        }
        let mut outgoing = OutgoingBunch::new(Payload::empty(), true);
        outgoing.close = true;
        core.send_bunch(ctx.sink, ctx.now, outgoing, false)?;
        Ok(())
    }

    /// Final actions of a settled channel. An entity receiver still holding
    /// queued bunches comes back to drain them.
    pub(crate) fn finalize(self, ctx: &mut ChannelContext) -> Option<EntityChannel> {
        match self {
            Self::Entity(channel) => channel.finalize(ctx),
            Self::Control(mut channel) => {
                channel.clear();
                None
            }
            Self::Voice(_) => None,
        }
    }

    /// Connection teardown without waiting for acks
    pub(crate) fn teardown(self, ctx: &mut ChannelContext) {
        if let Self::Entity(channel) = self {
            channel.teardown(ctx);
        }
    }
}
