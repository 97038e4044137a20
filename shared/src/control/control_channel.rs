use std::{collections::VecDeque, time::Instant};

use log::{debug, warn};
use weave_serde::BitWriter;

use crate::{
    channel::{
        channel_core::ChannelCore,
        sender::{OutgoingBunch, RawFragmentSender},
    },
    connection::{context::ChannelContext, error::ConnectionError},
    control::{
        control_config::ControlConfig,
        control_message::{ControlMessage, HELLO_TAG},
        error::ControlError,
    },
    InBunch, Payload,
};

/// Channel 0. Carries the handshake and connection-level messages.
pub struct ControlChannel {
    core: ChannelCore,
    config: ControlConfig,
    queued: VecDeque<ControlMessage>,
    negotiated: bool,
    peer_little_endian: Option<bool>,
}

impl ControlChannel {
    pub fn new(core: ChannelCore, config: &ControlConfig) -> Self {
        Self {
            core,
            config: config.clone(),
            queued: VecDeque::new(),
            negotiated: false,
            peer_little_endian: None,
        }
    }

    pub fn core(&self) -> &ChannelCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    /// Byte order the peer announced in its Hello
    pub fn peer_little_endian(&self) -> Option<bool> {
        self.peer_little_endian
    }

    pub fn needs_byte_swap(&self) -> bool {
        matches!(self.peer_little_endian, Some(little) if little != cfg!(target_endian = "little"))
    }

    pub fn num_queued(&self) -> usize {
        self.queued.len()
    }

    fn window_full(&self) -> bool {
        self.core.num_out_rec() + 1 >= self.core.config().reliable_buffer
    }

    /// Sends `message` reliably, or queues it behind earlier messages while
    /// the reliable window is full
    pub(crate) fn send(
        &mut self,
        sink: &mut dyn RawFragmentSender,
        now: Instant,
        message: ControlMessage,
    ) -> Result<(), ConnectionError> {
        if !self.queued.is_empty() || self.window_full() {
            if self.queued.len() >= self.config.max_queued_messages {
                return Err(ControlError::QueueOverflow {
                    queued: self.queued.len(),
                    limit: self.config.max_queued_messages,
                }
                .into());
            }
            debug!(
                "Control: window full, queueing message tag {} ({} queued)",
                message.tag(),
                self.queued.len() + 1
            );
            self.queued.push_back(message);
            return Ok(());
        }
        self.send_now(sink, now, &message)
    }

    fn send_now(
        &mut self,
        sink: &mut dyn RawFragmentSender,
        now: Instant,
        message: &ControlMessage,
    ) -> Result<(), ConnectionError> {
        let mut writer = BitWriter::new();
        message.write(&mut writer);
        let outgoing = OutgoingBunch::new(Payload::from_writer(writer), true).mergeable();
        self.core.send_bunch(sink, now, outgoing, false)?;
        Ok(())
    }

    pub(crate) fn tick(&mut self, ctx: &mut ChannelContext) -> Result<(), ConnectionError> {
        if !self.core.open_acked() {
            self.core.resend_stale(
                ctx.sink,
                ctx.now,
                self.config.resend_interval,
                self.config.resend_max_pending,
            );
            return Ok(());
        }
        while !self.queued.is_empty() && !self.window_full() {
            let Some(message) = self.queued.pop_front() else {
                break;
            };
            self.send_now(ctx.sink, ctx.now, &message)?;
        }
        Ok(())
    }

    pub(crate) fn received_bunch(
        &mut self,
        ctx: &mut ChannelContext,
        bunch: InBunch,
    ) -> Result<(), ConnectionError> {
        let payload = bunch.bunch.payload;
        let mut reader = payload.reader();

        if !self.core.opened_locally() && !self.negotiated {
            let header = reader
                .peek_bytes(2)
                .map_err(|_| ControlError::ByteOrderNegotiation {
                    reason: "first control payload is shorter than the byte order header",
                })?;
            let little_endian = match header.as_slice() {
                [HELLO_TAG, 0] => false,
                [HELLO_TAG, 1] => true,
                [HELLO_TAG, _] => {
                    return Err(ControlError::ByteOrderNegotiation {
                        reason: "byte order flag is neither 0 nor 1",
                    }
                    .into())
                }
                _ => {
                    return Err(ControlError::ByteOrderNegotiation {
                        reason: "first control message is not Hello",
                    }
                    .into())
                }
            };
            self.negotiated = true;
            self.peer_little_endian = Some(little_endian);
            if self.needs_byte_swap() {
                warn!("Control: peer byte order differs from ours");
            }
        }

        while !reader.is_at_end() {
            let message = ControlMessage::read(&mut reader, &self.config.registry)?;
            debug!("Control: received message tag {}", message.tag());
            ctx.outbox.inbound_control.push_back(message);
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.queued.clear();
        self.core.clear();
    }
}
