use weave_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedVariableInteger};

use crate::{
    bunch::flags::BunchFlags, ChannelIndex, ChannelKind, ChannelSequence, GuidExport, NetGuid,
};

/// Everything written ahead of a bunch's payload. Flags come first so each
/// field they govern can be decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BunchHeader {
    pub flags: BunchFlags,
    pub channel_index: ChannelIndex,
    /// Present on open bunches
    pub channel_kind: Option<ChannelKind>,
    /// Present on reliable bunches
    pub sequence: Option<ChannelSequence>,
    pub exports: Vec<GuidExport>,
    pub must_be_mapped: Vec<NetGuid>,
}

impl BunchHeader {
    pub fn new(channel_index: ChannelIndex) -> Self {
        Self {
            flags: BunchFlags::default(),
            channel_index,
            channel_kind: None,
            sequence: None,
            exports: Vec::new(),
            must_be_mapped: Vec::new(),
        }
    }

    fn wire_flags(&self) -> BunchFlags {
        let mut flags = self.flags;
        flags.has_package_exports = !self.exports.is_empty();
        flags.has_must_be_mapped_ids = !self.must_be_mapped.is_empty();
        flags
    }
}

impl Serde for BunchHeader {
    fn ser(&self, writer: &mut dyn BitWrite) {
        let flags = self.wire_flags();
        flags.ser(writer);
        UnsignedVariableInteger::<5>::new(self.channel_index).ser(writer);
        if flags.open {
            self.channel_kind.unwrap_or(ChannelKind::Entity).ser(writer);
        }
        if flags.reliable {
            self.sequence.unwrap_or(0).ser(writer);
        }
        if flags.has_package_exports {
            self.exports.ser(writer);
        }
        if flags.has_must_be_mapped_ids {
            self.must_be_mapped.ser(writer);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let flags = BunchFlags::de(reader)?;
        let channel_index = UnsignedVariableInteger::<5>::de(reader)?.get();
        let channel_index = ChannelIndex::try_from(channel_index).map_err(|_| SerdeErr)?;
        let channel_kind = if flags.open {
            Some(ChannelKind::de(reader)?)
        } else {
            None
        };
        let sequence = if flags.reliable {
            Some(ChannelSequence::de(reader)?)
        } else {
            None
        };
        let exports = if flags.has_package_exports {
            Vec::<GuidExport>::de(reader)?
        } else {
            Vec::new()
        };
        let must_be_mapped = if flags.has_must_be_mapped_ids {
            Vec::<NetGuid>::de(reader)?
        } else {
            Vec::new()
        };
        Ok(Self {
            flags,
            channel_index,
            channel_kind,
            sequence,
            exports,
            must_be_mapped,
        })
    }

    fn bit_length(&self) -> u32 {
        let flags = self.wire_flags();
        let mut output = flags.bit_length();
        output += UnsignedVariableInteger::<5>::new(self.channel_index).bit_length();
        if flags.open {
            output += self.channel_kind.unwrap_or(ChannelKind::Entity).bit_length();
        }
        if flags.reliable {
            output += 16;
        }
        if flags.has_package_exports {
            output += self.exports.bit_length();
        }
        if flags.has_must_be_mapped_ids {
            output += self.must_be_mapped.bit_length();
        }
        output
    }
}
