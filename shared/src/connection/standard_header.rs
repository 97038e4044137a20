use weave_serde::{BitReader, BitWrite, ConstBitLength, Serde, SerdeErr};

use crate::PacketIndex;

/// Leads every packet: its id, and which of the peer's recent packets were
/// received and accepted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardHeader {
    pub packet_id: PacketIndex,
    /// False until the first packet from the peer arrives
    pub has_ack: bool,
    /// Newest packet id received from the peer
    pub ack_index: PacketIndex,
    /// Bit `i` set: packet `ack_index - i` was received and acked
    pub ack_bitfield: u32,
}

impl StandardHeader {
    /// Bits a header with an ack occupies
    pub const MAX_BITS: u32 = 16 + 1 + 16 + 32;
}

impl Serde for StandardHeader {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.packet_id.ser(writer);
        self.has_ack.ser(writer);
        if self.has_ack {
            self.ack_index.ser(writer);
            self.ack_bitfield.ser(writer);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let packet_id = u16::de(reader)?;
        let has_ack = bool::de(reader)?;
        let (ack_index, ack_bitfield) = if has_ack {
            (u16::de(reader)?, u32::de(reader)?)
        } else {
            (0, 0)
        };
        Ok(Self {
            packet_id,
            has_ack,
            ack_index,
            ack_bitfield,
        })
    }

    fn bit_length(&self) -> u32 {
        let mut output = u16::const_bit_length() + 1;
        if self.has_ack {
            output += u16::const_bit_length() + u32::const_bit_length();
        }
        output
    }
}
