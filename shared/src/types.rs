use weave_serde::{BitReader, BitWrite, ConstBitLength, Serde, SerdeErr, UnsignedInteger};

use crate::wrapping_number::sequence_greater_than;

pub type PacketIndex = u16;
pub type ChannelIndex = u16;
pub type ChannelSequence = u16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    Server,
    Client,
}

impl HostType {
    pub fn invert(self) -> Self {
        match self {
            HostType::Server => HostType::Client,
            HostType::Client => HostType::Server,
        }
    }
}

/// The closed set of channel kinds multiplexed over a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Control,
    Entity,
    Voice,
}

impl Serde for ChannelKind {
    fn ser(&self, writer: &mut dyn BitWrite) {
        let index: u8 = match self {
            ChannelKind::Control => 0,
            ChannelKind::Entity => 1,
            ChannelKind::Voice => 2,
        };
        UnsignedInteger::<2>::new(index).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match UnsignedInteger::<2>::de(reader)?.get() {
            0 => Ok(ChannelKind::Control),
            1 => Ok(ChannelKind::Entity),
            2 => Ok(ChannelKind::Voice),
            // SECURITY: index 3 is unassigned, reject rather than guess
            _ => Err(SerdeErr),
        }
    }

    fn bit_length(&self) -> u32 {
        <Self as ConstBitLength>::const_bit_length()
    }
}

impl ConstBitLength for ChannelKind {
    fn const_bit_length() -> u32 {
        2
    }
}

/// Inclusive range of packet ids that one logical send was placed into
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketIdRange {
    pub first: PacketIndex,
    pub last: PacketIndex,
}

impl PacketIdRange {
    pub fn single(packet_id: PacketIndex) -> Self {
        Self {
            first: packet_id,
            last: packet_id,
        }
    }

    pub fn contains(&self, packet_id: PacketIndex) -> bool {
        packet_id == self.first
            || packet_id == self.last
            || (sequence_greater_than(packet_id, self.first)
                && sequence_greater_than(self.last, packet_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = PacketIndex> {
        let count = self.last.wrapping_sub(self.first) as u32 + 1;
        let first = self.first;
        (0..count).map(move |offset| first.wrapping_add(offset as u16))
    }
}
