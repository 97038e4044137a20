use std::{collections::VecDeque, time::Instant};

use crate::{
    connection::{
        connection_config::ConnectionConfig, event::ConnectionEvent, packet_writer::PacketWriter,
    },
    control::control_message::ControlMessage,
    replication::{host::ReplicationHost, replication_table::ReplicationTable},
    GuidCache,
};

/// Work a channel hands back to its connection
#[derive(Default)]
pub(crate) struct Outbox {
    /// Messages to send on the control channel
    pub control: VecDeque<ControlMessage>,
    /// Messages received on the control channel, for the connection to act on
    pub inbound_control: VecDeque<ControlMessage>,
    pub events: Vec<ConnectionEvent>,
}

/// Connection state lent to a channel for the duration of one call
pub(crate) struct ChannelContext<'a> {
    pub sink: &'a mut PacketWriter,
    pub table: &'a mut ReplicationTable,
    pub guid_cache: &'a mut GuidCache,
    pub host: &'a mut dyn ReplicationHost,
    pub config: &'a ConnectionConfig,
    pub outbox: &'a mut Outbox,
    pub now: Instant,
}
