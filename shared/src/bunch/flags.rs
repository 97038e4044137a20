use weave_serde::{BitReader, BitWrite, Serde, SerdeErr};

/// Per-bunch flag bits. `has_package_exports` and `has_must_be_mapped_ids`
/// are derived from the header's lists when written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BunchFlags {
    pub reliable: bool,
    pub open: bool,
    pub close: bool,
    pub partial: bool,
    pub partial_initial: bool,
    pub partial_final: bool,
    pub dormant: bool,
    pub replication_paused: bool,
    pub has_package_exports: bool,
    pub has_must_be_mapped_ids: bool,
}

impl Serde for BunchFlags {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.reliable.ser(writer);
        self.open.ser(writer);
        self.close.ser(writer);
        self.partial.ser(writer);
        self.dormant.ser(writer);
        self.replication_paused.ser(writer);
        self.has_package_exports.ser(writer);
        self.has_must_be_mapped_ids.ser(writer);
        if self.partial {
            self.partial_initial.ser(writer);
            self.partial_final.ser(writer);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let mut flags = BunchFlags {
            reliable: bool::de(reader)?,
            open: bool::de(reader)?,
            close: bool::de(reader)?,
            partial: bool::de(reader)?,
            dormant: bool::de(reader)?,
            replication_paused: bool::de(reader)?,
            has_package_exports: bool::de(reader)?,
            has_must_be_mapped_ids: bool::de(reader)?,
            ..Default::default()
        };
        if flags.partial {
            flags.partial_initial = bool::de(reader)?;
            flags.partial_final = bool::de(reader)?;
        }
        Ok(flags)
    }

    fn bit_length(&self) -> u32 {
        if self.partial {
            10
        } else {
            8
        }
    }
}
