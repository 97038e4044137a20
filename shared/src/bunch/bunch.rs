use std::time::Instant;

use weave_serde::{BitCounter, BitReader, BitWrite, Serde, SerdeErr};

use crate::{
    bunch::{header::BunchHeader, payload::Payload},
    ChannelIndex, ChannelSequence, PacketIndex,
};

/// The unit a channel puts on the wire: header plus bit-packed payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bunch {
    pub header: BunchHeader,
    pub payload: Payload,
}

impl Bunch {
    pub fn new(header: BunchHeader, payload: Payload) -> Self {
        Self { header, payload }
    }

    pub fn channel_index(&self) -> ChannelIndex {
        self.header.channel_index
    }

    pub fn reliable(&self) -> bool {
        self.header.flags.reliable
    }

    pub fn open(&self) -> bool {
        self.header.flags.open
    }

    pub fn close(&self) -> bool {
        self.header.flags.close
    }

    pub fn partial(&self) -> bool {
        self.header.flags.partial
    }

    pub fn dormant(&self) -> bool {
        self.header.flags.dormant
    }

    pub fn replication_paused(&self) -> bool {
        self.header.flags.replication_paused
    }

    pub fn sequence(&self) -> Option<ChannelSequence> {
        self.header.sequence
    }

    /// Bits this bunch occupies in a packet
    pub fn wire_bits(&self) -> u32 {
        let mut counter = BitCounter::new();
        self.ser(&mut counter);
        counter.bits_needed()
    }
}

impl Serde for Bunch {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.header.ser(writer);
        self.payload.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let header = BunchHeader::de(reader)?;
        let payload = Payload::de(reader)?;
        Ok(Self { header, payload })
    }

    fn bit_length(&self) -> u32 {
        self.header.bit_length() + self.payload.bit_length()
    }
}

/// A bunch read out of a received packet
#[derive(Clone, Debug)]
pub struct InBunch {
    pub bunch: Bunch,
    pub packet_id: PacketIndex,
}

impl InBunch {
    pub fn new(bunch: Bunch, packet_id: PacketIndex) -> Self {
        Self { bunch, packet_id }
    }

    /// Reliable bunches are ordered by channel sequence; unreliable ones by
    /// the packet that carried them
    pub fn ordering_id(&self) -> u16 {
        self.bunch.sequence().unwrap_or(self.packet_id)
    }
}

/// A sent reliable bunch kept until the peer acknowledges it
#[derive(Clone, Debug)]
pub(crate) struct OutBunch {
    pub bunch: Bunch,
    pub packet_id: PacketIndex,
    pub acked: bool,
    pub sent_at: Instant,
}
