use std::time::Instant;

use log::{debug, info, warn};
use weave_serde::{BitReader, Serde};

use crate::{
    channel::channel::{Channel, ReceiveOutcome},
    connection::{
        ack_manager::PacketNotice,
        channel_table::ChannelTable,
        connection_config::ConnectionConfig,
        context::{ChannelContext, Outbox},
        error::ConnectionError,
        event::{ConnectionEvent, ConnectionState},
        packet_writer::PacketWriter,
        standard_header::StandardHeader,
    },
    constants::CONTROL_CHANNEL_INDEX,
    control::{control_channel::ControlChannel, control_message::ControlMessage},
    entity::entity_channel::EntityChannel,
    replication::{host::ReplicationHost, replication_table::ReplicationTable},
    sequence_greater_than, Bunch, BunchError, ChannelIndex, ChannelKind, GuidCache, HostType,
    InBunch, NetGuid, Payload,
};

/// One side of a peer-to-peer link. Owns every channel multiplexed over the
/// link and the bookkeeping they share. The transport moves the bytes:
/// feed it received packets with `receive_packet` and drain what to send
/// with `pop_outgoing_packet`.
pub struct Connection {
    config: ConnectionConfig,
    host_type: HostType,
    state: ConnectionState,
    channels: ChannelTable,
    packet_writer: PacketWriter,
    replication: ReplicationTable,
    guid_cache: GuidCache,
    outbox: Outbox,
    peer_netspeed: Option<u32>,
    last_send_time: Option<Instant>,
    packets_at_last_send: u64,
}

impl Connection {
    pub fn new(config: ConnectionConfig, host_type: HostType) -> Self {
        Self {
            channels: ChannelTable::new(config.max_channels),
            packet_writer: PacketWriter::new(config.max_packet_bytes, config.is_replay),
            config,
            host_type,
            state: ConnectionState::Pending,
            replication: ReplicationTable::new(),
            guid_cache: GuidCache::new(),
            outbox: Outbox::default(),
            peer_netspeed: None,
            last_send_time: None,
            packets_at_last_send: 0,
        }
    }

    pub fn host_type(&self) -> HostType {
        self.host_type
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn replication_table(&self) -> &ReplicationTable {
        &self.replication
    }

    pub fn guid_cache(&self) -> &GuidCache {
        &self.guid_cache
    }

    pub fn guid_cache_mut(&mut self) -> &mut GuidCache {
        &mut self.guid_cache
    }

    pub fn peer_netspeed(&self) -> Option<u32> {
        self.peer_netspeed
    }

    pub fn channel(&self, channel_index: ChannelIndex) -> Option<&Channel> {
        self.channels.get(channel_index)
    }

    pub fn control_channel(&self) -> Option<&ControlChannel> {
        self.channels.get(CONTROL_CHANNEL_INDEX)?.as_control()
    }

    pub fn entity_channel(&self, entity: &NetGuid) -> Option<&EntityChannel> {
        let channel_index = self.replication.channel_for(entity)?;
        self.channels.get(channel_index)?.as_entity()
    }

    /// Closed entity channels still applying queued bunches
    pub fn num_draining_channels(&self) -> usize {
        self.channels.num_draining()
    }

    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.outbox.events)
    }

    pub fn pop_outgoing_packet(&mut self) -> Option<Vec<u8>> {
        self.packet_writer.pop_packet()
    }

    fn split<'a>(
        &'a mut self,
        host: &'a mut dyn ReplicationHost,
        now: Instant,
    ) -> (&'a mut ChannelTable, ChannelContext<'a>) {
        let Self {
            config,
            channels,
            packet_writer,
            replication,
            guid_cache,
            outbox,
            ..
        } = self;
        let ctx = ChannelContext {
            sink: packet_writer,
            table: replication,
            guid_cache,
            host,
            config: &*config,
            outbox,
            now,
        };
        (channels, ctx)
    }

    fn require_connected(&self) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected)
        }
    }

    /// Fatal errors close the connection before they reach the caller
    fn check<T>(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
        result: Result<T, ConnectionError>,
    ) -> Result<T, ConnectionError> {
        match result {
            Err(error) if error.is_fatal() => Err(self.fail(now, host, error)),
            other => other,
        }
    }

    fn fail(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
        error: ConnectionError,
    ) -> ConnectionError {
        warn!("Connection failed: {}", error);
        let reason = error.to_string();
        if !self.config.is_replay && self.state != ConnectionState::Closed {
            let notice = ControlMessage::Failure {
                reason: reason.clone(),
            };
            if self.send_control_now(now, notice).is_ok() {
                self.packet_writer.flush();
            }
        }
        self.close(now, host, &reason);
        error
    }

    // Handshake

    /// Opens the control channel and sends `Hello`. Client only.
    pub fn connect(&mut self, now: Instant) -> Result<(), ConnectionError> {
        if self.host_type != HostType::Client {
            return Err(ConnectionError::WrongHostType {
                expected: HostType::Client,
            });
        }
        if self.state == ConnectionState::Closed {
            return Err(ConnectionError::NotConnected);
        }
        if self.channels.contains(CONTROL_CHANNEL_INDEX) {
            return Ok(());
        }
        let sequences = self.channels.sequences(CONTROL_CHANNEL_INDEX);
        self.channels.insert(Channel::new(
            CONTROL_CHANNEL_INDEX,
            ChannelKind::Control,
            true,
            sequences,
            &self.config,
        ));
        info!(
            "Connection: sending Hello (protocol {})",
            self.config.protocol_version
        );
        let hello = ControlMessage::hello(self.config.protocol_version);
        self.send_control_now(now, hello)
    }

    fn set_connected(&mut self) {
        info!("Connection: connected as {:?}", self.host_type);
        self.state = ConnectionState::Connected;
        self.outbox.events.push(ConnectionEvent::Connected);
    }

    fn send_control_now(
        &mut self,
        now: Instant,
        message: ControlMessage,
    ) -> Result<(), ConnectionError> {
        match self.channels.get_mut(CONTROL_CHANNEL_INDEX) {
            Some(Channel::Control(control)) => control.send(&mut self.packet_writer, now, message),
            _ => Err(ConnectionError::ChannelNotFound {
                channel_index: CONTROL_CHANNEL_INDEX,
            }),
        }
    }

    /// Sends a control message once connected. Messages beyond the reliable
    /// window are queued.
    pub fn send_control(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
        message: ControlMessage,
    ) -> Result<(), ConnectionError> {
        self.require_connected()?;
        let result = self.send_control_now(now, message);
        self.check(now, host, result)
    }

    fn handle_control(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
        message: ControlMessage,
    ) -> Result<(), ConnectionError> {
        match message {
            ControlMessage::Hello {
                protocol_version, ..
            } => {
                if self.host_type != HostType::Server {
                    warn!("Connection: client received Hello, ignoring");
                    return Ok(());
                }
                if protocol_version != self.config.protocol_version {
                    let reason = format!(
                        "protocol version {} does not match {}",
                        protocol_version, self.config.protocol_version
                    );
                    warn!("Connection: rejecting peer, {}", reason);
                    self.send_control_now(
                        now,
                        ControlMessage::Failure {
                            reason: reason.clone(),
                        },
                    )?;
                    self.packet_writer.flush();
                    self.close(now, host, &reason);
                    return Ok(());
                }
                if self.state == ConnectionState::Pending {
                    self.send_control_now(now, ControlMessage::Welcome)?;
                    self.set_connected();
                }
            }
            ControlMessage::Welcome => {
                if self.host_type == HostType::Client && self.state == ConnectionState::Pending {
                    self.set_connected();
                }
            }
            ControlMessage::Failure { reason } => {
                info!("Connection: peer reported failure: {}", reason);
                self.close(now, host, &reason);
            }
            ControlMessage::EntityChannelFailure { channel_index } => {
                warn!("Connection: peer failed to bind entity channel {}", channel_index);
                let (channels, mut ctx) = self.split(host, now);
                if let Some(channel) = channels.get_mut(channel_index) {
                    if channel.kind() == ChannelKind::Entity && channel.core().opened_locally() {
                        channel.close(&mut ctx)?;
                    }
                }
                ctx.outbox
                    .events
                    .push(ConnectionEvent::PeerEntityFailure { channel_index });
            }
            ControlMessage::Netspeed { bytes_per_second } => {
                self.peer_netspeed = Some(bytes_per_second);
                self.outbox
                    .events
                    .push(ConnectionEvent::Netspeed { bytes_per_second });
            }
            ControlMessage::Custom { tag, payload } => {
                self.outbox
                    .events
                    .push(ConnectionEvent::ControlMessage { tag, payload });
            }
        }
        Ok(())
    }

    /// Acts on control messages received and sends the ones channels queued
    fn process_outbox(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
    ) -> Result<(), ConnectionError> {
        while let Some(message) = self.outbox.inbound_control.pop_front() {
            self.handle_control(now, &mut *host, message)?;
            if self.state == ConnectionState::Closed {
                self.outbox.inbound_control.clear();
                self.outbox.control.clear();
                return Ok(());
            }
        }
        while let Some(message) = self.outbox.control.pop_front() {
            if !self.channels.contains(CONTROL_CHANNEL_INDEX) {
                warn!(
                    "Connection: no control channel, dropping message tag {}",
                    message.tag()
                );
                continue;
            }
            self.send_control_now(now, message)?;
        }
        Ok(())
    }

    // Incoming data

    /// Reads one packet from the transport. Protocol violations close the
    /// connection and are returned.
    pub fn receive_packet(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
        packet: &[u8],
    ) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Err(ConnectionError::NotConnected);
        }
        let result = self.read_packet(now, &mut *host, packet);
        self.check(now, host, result)
    }

    fn read_packet(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
        packet: &[u8],
    ) -> Result<(), ConnectionError> {
        let mut reader = BitReader::new(packet);
        let header = StandardHeader::de(&mut reader)?;
        if !self.packet_writer.ack_manager().should_accept(header.packet_id) {
            debug!("Connection: discarding stale packet {}", header.packet_id);
            return Ok(());
        }

        let notices = self
            .packet_writer
            .ack_manager_mut()
            .process_incoming_header(&header);
        self.process_notices(now, &mut *host, notices);

        let mut skip_ack = false;
        let mut has_bunches = false;
        while bool::de(&mut reader)? {
            has_bunches = true;
            let bunch = Bunch::de(&mut reader).map_err(|_| BunchError::HeaderRead {
                reason: "truncated bunch",
            })?;
            let bunch = InBunch::new(bunch, header.packet_id);
            let outcome = self.receive_bunch(now, &mut *host, bunch)?;
            skip_ack |= outcome.skip_ack;
            if self.state == ConnectionState::Closed {
                return Ok(());
            }
        }

        self.finalize_settled(now, &mut *host);
        self.process_outbox(now, host)?;
        if skip_ack {
            debug!("Connection: withholding ack for packet {}", header.packet_id);
        }
        self.packet_writer
            .ack_manager_mut()
            .record_received(header.packet_id, !skip_ack, has_bunches);
        Ok(())
    }

    fn receive_bunch(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
        bunch: InBunch,
    ) -> Result<ReceiveOutcome, ConnectionError> {
        let channel_index = bunch.bunch.channel_index();
        let max_channels = self.channels.max_channels();
        if channel_index >= max_channels {
            return Err(BunchError::ChannelIndexOutOfRange {
                channel_index,
                max_channels,
            }
            .into());
        }

        if !self.channels.contains(channel_index) {
            if let Some(sequence) = bunch.bunch.sequence() {
                let (_, in_reliable) = self.channels.sequences(channel_index);
                if !sequence_greater_than(sequence, in_reliable) {
                    debug!(
                        "Channel {}: bunch {} for a closed channel was already processed",
                        channel_index, sequence
                    );
                    return Ok(ReceiveOutcome::default());
                }
            }
            if !bunch.bunch.open() {
                debug!(
                    "Channel {}: bunch for a channel that is not open, skipping",
                    channel_index
                );
                return Ok(ReceiveOutcome {
                    skip_ack: bunch.bunch.reliable(),
                });
            }
            self.open_remote_channel(&bunch)?;
        }

        self.register_exports(&mut *host, &bunch);
        let (channels, mut ctx) = self.split(host, now);
        match channels.get_mut(channel_index) {
            Some(channel) => channel.received_raw_bunch(&mut ctx, bunch),
            None => Ok(ReceiveOutcome::default()),
        }
    }

    fn open_remote_channel(&mut self, bunch: &InBunch) -> Result<(), ConnectionError> {
        let channel_index = bunch.bunch.channel_index();
        let Some(kind) = bunch.bunch.header.channel_kind else {
            return Err(BunchError::InconsistentHeader {
                channel_index,
                reason: "open bunch without a channel kind",
            }
            .into());
        };
        if (kind == ChannelKind::Control) != (channel_index == CONTROL_CHANNEL_INDEX) {
            return Err(BunchError::InconsistentHeader {
                channel_index,
                reason: "control traffic is only allowed on channel 0",
            }
            .into());
        }
        let sequences = self.channels.sequences(channel_index);
        self.channels
            .insert(Channel::new(channel_index, kind, false, sequences, &self.config));
        debug!("Channel {}: opened by peer as {:?}", channel_index, kind);
        self.outbox.events.push(ConnectionEvent::ChannelOpened {
            channel_index,
            kind,
        });
        Ok(())
    }

    fn register_exports(&mut self, host: &mut dyn ReplicationHost, bunch: &InBunch) {
        for export in &bunch.bunch.header.exports {
            if self.guid_cache.path(&export.guid) == Some(export.path.as_str()) {
                continue;
            }
            let state = host.load_path(export.guid, &export.path);
            debug!("Connection: export {} -> {} ({:?})", export.guid, export.path, state);
            self.guid_cache.receive_export(export, state);
        }
    }

    /// A guid the peer exported finished loading; bunches waiting on it
    /// proceed on the next tick
    pub fn mark_loaded(&mut self, guid: &NetGuid) -> bool {
        self.guid_cache.mark_loaded(guid)
    }

    fn process_notices(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
        notices: Vec<PacketNotice>,
    ) {
        if notices.is_empty() {
            return;
        }
        let (channels, mut ctx) = self.split(host, now);
        for notice in notices {
            match notice {
                PacketNotice::Delivered(packet_id) => {
                    for channel in channels.channels_mut() {
                        channel.received_ack(packet_id);
                    }
                }
                PacketNotice::Dropped(packet_id) => {
                    debug!("Connection: packet {} dropped", packet_id);
                    for channel in channels.channels_mut() {
                        channel.received_nak(&mut ctx, packet_id);
                    }
                }
            }
        }
    }

    /// Removes channels whose close completed. Entity receivers that still
    /// hold queued bunches keep draining.
    fn finalize_settled(&mut self, now: Instant, host: &mut dyn ReplicationHost) {
        let settled = self.channels.settled_indices();
        if settled.is_empty() {
            return;
        }
        let (channels, mut ctx) = self.split(host, now);
        for channel_index in settled {
            let Some(channel) = channels.remove(channel_index) else {
                continue;
            };
            let kind = channel.kind();
            let dormant = channel.core().is_dormant();
            debug!("Channel {}: closed (dormant: {})", channel_index, dormant);
            if let Some(draining) = channel.finalize(&mut ctx) {
                channels.push_draining(draining);
            }
            ctx.outbox.events.push(ConnectionEvent::ChannelClosed {
                channel_index,
                kind,
                dormant,
            });
        }
    }

    // Outgoing data

    /// Finds a free channel index this side may open
    pub fn allocate_channel(&self, kind: ChannelKind) -> Result<ChannelIndex, ConnectionError> {
        self.channels
            .allocate(kind, self.host_type)
            .ok_or(ConnectionError::ChannelTableFull {
                kind,
                max_channels: self.channels.max_channels(),
            })
    }

    /// Starts replicating `entity` on a new channel. A dormant entity gets its
    /// preserved replicators back.
    pub fn open_entity_channel(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
        entity: NetGuid,
    ) -> Result<ChannelIndex, ConnectionError> {
        self.require_connected()?;
        if let Some(channel_index) = self.replication.channel_for(&entity) {
            return Err(ConnectionError::EntityAlreadyReplicated {
                entity,
                channel_index,
            });
        }
        let channel_index = self.allocate_channel(ChannelKind::Entity)?;
        let sequences = self.channels.sequences(channel_index);
        let mut channel = Channel::new(
            channel_index,
            ChannelKind::Entity,
            true,
            sequences,
            &self.config,
        );
        {
            let (_, mut ctx) = self.split(host, now);
            if let Channel::Entity(entity_channel) = &mut channel {
                entity_channel.bind_for_send(&mut ctx, entity);
            }
        }
        debug!("Channel {}: replicating entity {}", channel_index, entity);
        self.channels.insert(channel);
        Ok(channel_index)
    }

    /// Stops replicating `entity`. The peer destroys it once the close lands.
    pub fn close_entity(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
        entity: &NetGuid,
    ) -> Result<(), ConnectionError> {
        let Some(channel_index) = self.replication.channel_for(entity) else {
            return Err(ConnectionError::EntityNotReplicated { entity: *entity });
        };
        let result = {
            let (channels, mut ctx) = self.split(&mut *host, now);
            match channels.get_mut(channel_index) {
                Some(channel) => channel.close(&mut ctx),
                None => Err(ConnectionError::ChannelNotFound { channel_index }),
            }
        };
        let result = self.check(now, &mut *host, result);
        self.finalize_settled(now, host);
        result
    }

    /// Lets `entity` go dormant once its last changes are acknowledged
    pub fn start_dormancy(&mut self, entity: &NetGuid) -> Result<(), ConnectionError> {
        let Some(channel_index) = self.replication.channel_for(entity) else {
            return Err(ConnectionError::EntityNotReplicated { entity: *entity });
        };
        match self.channels.get_mut(channel_index) {
            Some(Channel::Entity(channel)) => {
                channel.start_becoming_dormant();
                Ok(())
            }
            _ => Err(ConnectionError::ChannelNotFound { channel_index }),
        }
    }

    /// Wakes `entity` on the next replication pass, reopening its channel if
    /// it already went dormant
    pub fn flush_dormancy(&mut self, entity: NetGuid) {
        self.replication.request_forced_update(entity);
    }

    /// Replicates the stalest entities first. Returns how many sent a bunch.
    pub fn replicate_entities(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
    ) -> Result<usize, ConnectionError> {
        self.require_connected()?;
        let result = self.replicate_all(now, &mut *host);
        self.check(now, host, result)
    }

    fn replicate_all(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
    ) -> Result<usize, ConnectionError> {
        for entity in self.replication.take_forced_updates() {
            match self.replication.channel_for(&entity) {
                Some(channel_index) => {
                    if let Some(Channel::Entity(channel)) = self.channels.get_mut(channel_index) {
                        if channel.core().is_closing() {
                            // reopen once the dormant close settles
                            self.replication.request_forced_update(entity);
                        } else {
                            channel.cancel_dormancy();
                        }
                    }
                }
                None if self.replication.is_dormant(&entity) => {
                    debug!("Entity {}: forced update, leaving dormancy", entity);
                    self.open_entity_channel(now, &mut *host, entity)?;
                }
                None => {}
            }
        }

        let mut candidates: Vec<(Option<Instant>, ChannelIndex)> = self
            .channels
            .channels()
            .filter_map(Channel::as_entity)
            .filter(|channel| {
                let core = channel.core();
                core.opened_locally() && !core.is_closing() && !core.is_broken()
            })
            .map(|channel| (channel.last_update_time(), channel.core().index()))
            .collect();
        candidates.sort();
        let limit = self.config.entity.max_entities_per_tick;
        if limit > 0 {
            candidates.truncate(limit);
        }

        let mut sent = 0;
        let (channels, mut ctx) = self.split(host, now);
        for (_, channel_index) in candidates {
            if let Some(Channel::Entity(channel)) = channels.get_mut(channel_index) {
                if channel.replicate(&mut ctx)? {
                    sent += 1;
                }
            }
        }
        Ok(sent)
    }

    /// Opens an unreliable voice channel
    pub fn open_voice_channel(&mut self) -> Result<ChannelIndex, ConnectionError> {
        self.require_connected()?;
        let channel_index = self.allocate_channel(ChannelKind::Voice)?;
        let sequences = self.channels.sequences(channel_index);
        self.channels.insert(Channel::new(
            channel_index,
            ChannelKind::Voice,
            true,
            sequences,
            &self.config,
        ));
        Ok(channel_index)
    }

    pub fn send_voice(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
        channel_index: ChannelIndex,
        payload: Payload,
    ) -> Result<(), ConnectionError> {
        self.require_connected()?;
        let result = match self.channels.get_mut(channel_index) {
            Some(Channel::Voice(voice)) => voice
                .send(&mut self.packet_writer, now, payload)
                .map(|_| ())
                .map_err(ConnectionError::from),
            _ => Err(ConnectionError::ChannelNotFound { channel_index }),
        };
        self.check(now, host, result)
    }

    pub fn take_voice_packets(
        &mut self,
        channel_index: ChannelIndex,
    ) -> Result<Vec<Payload>, ConnectionError> {
        match self.channels.get_mut(channel_index) {
            Some(Channel::Voice(voice)) => Ok(voice.take_received()),
            _ => Err(ConnectionError::ChannelNotFound { channel_index }),
        }
    }

    // Tick

    /// Runs timers and queues on every channel, then writes out the pending
    /// packet
    pub fn tick(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
    ) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        let result = self.tick_channels(now, &mut *host);
        self.check(now, host, result)
    }

    fn tick_channels(
        &mut self,
        now: Instant,
        host: &mut dyn ReplicationHost,
    ) -> Result<(), ConnectionError> {
        {
            let (channels, mut ctx) = self.split(&mut *host, now);
            let resend_interval = ctx.config.channel.resend_interval;
            for channel in channels.channels_mut() {
                channel.tick(&mut ctx)?;
                if channel.kind() != ChannelKind::Control || channel.core().open_acked() {
                    channel
                        .core_mut()
                        .resend_stale(ctx.sink, now, resend_interval, usize::MAX);
                }
            }

            let mut still_draining = Vec::new();
            for mut channel in channels.take_draining() {
                if !channel.tick_draining(&mut ctx)? {
                    still_draining.push(channel);
                }
            }
            for channel in still_draining {
                channels.push_draining(channel);
            }
        }

        self.finalize_settled(now, &mut *host);
        self.process_outbox(now, &mut *host)?;
        if self.state == ConnectionState::Closed {
            return Ok(());
        }

        self.packet_writer.flush();
        self.keep_alive(now);
        let acked = self.packet_writer.take_internal_acks();
        if !acked.is_empty() {
            let notices = acked.into_iter().map(PacketNotice::Delivered).collect();
            self.process_notices(now, &mut *host, notices);
            self.finalize_settled(now, host);
        }
        Ok(())
    }

    fn keep_alive(&mut self, now: Instant) {
        let written = self.packet_writer.packets_written();
        let last = match self.last_send_time {
            Some(last) if written == self.packets_at_last_send => last,
            _ => {
                self.last_send_time = Some(now);
                self.packets_at_last_send = written;
                return;
            }
        };
        if self.config.is_replay
            || !self.channels.contains(CONTROL_CHANNEL_INDEX)
            || now.saturating_duration_since(last) < self.config.keepalive_interval
        {
            return;
        }
        debug!("Connection: idle, sending keepalive");
        self.packet_writer.flush_keepalive();
        self.last_send_time = Some(now);
        self.packets_at_last_send = self.packet_writer.packets_written();
    }

    // Teardown

    /// Tears every channel down without waiting for acks. Receiving sides
    /// destroy their entities and queued bunches are dropped.
    pub fn close(&mut self, now: Instant, host: &mut dyn ReplicationHost, reason: &str) {
        if self.state == ConnectionState::Closed {
            return;
        }
        info!("Connection closed: {}", reason);
        self.packet_writer.clear();
        {
            let (channels, mut ctx) = self.split(host, now);
            let (open, draining) = channels.clear();
            for channel in open {
                channel.teardown(&mut ctx);
            }
            for channel in draining {
                channel.teardown(&mut ctx);
            }
        }
        self.replication.clear();
        self.outbox.control.clear();
        self.outbox.inbound_control.clear();
        self.state = ConnectionState::Closed;
        self.outbox.events.push(ConnectionEvent::Closed {
            reason: reason.to_string(),
        });
    }
}
