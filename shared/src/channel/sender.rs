use crate::{Bunch, ChannelIndex, GuidExport, NetGuid, PacketIndex, Payload};

/// The connection side of a channel's send path
pub trait RawFragmentSender {
    /// Places `bunch` into the packet being assembled and returns that
    /// packet's id. `allow_merge` lets the next send on the same channel
    /// append to this bunch while the packet is unflushed.
    fn send_raw_fragment(&mut self, bunch: &Bunch, allow_merge: bool) -> PacketIndex;

    /// Takes back the most recently placed bunch if `channel_index` may
    /// append `extra_bits` to it
    fn take_mergeable(
        &mut self,
        channel_index: ChannelIndex,
        reliable: bool,
        max_payload_bits: u32,
        extra_bits: u32,
    ) -> Option<Bunch>;
}

/// One logical send, before splitting
#[derive(Clone, Debug, Default)]
pub struct OutgoingBunch {
    pub payload: Payload,
    pub reliable: bool,
    pub merge: bool,
    pub close: bool,
    pub dormant: bool,
    pub replication_paused: bool,
    pub exports: Vec<GuidExport>,
    pub must_be_mapped: Vec<NetGuid>,
}

impl OutgoingBunch {
    pub fn new(payload: Payload, reliable: bool) -> Self {
        Self {
            payload,
            reliable,
            ..Default::default()
        }
    }

    pub fn mergeable(mut self) -> Self {
        self.merge = true;
        self
    }
}
