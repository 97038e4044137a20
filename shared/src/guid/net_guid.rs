use std::fmt;

use weave_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedVariableInteger};

/// Network-wide identity of an entity, sub-object or class.
///
/// `0` is invalid. Odd values are static: both peers can resolve them from a
/// registered path without any construction info. Even values are dynamic and
/// must be constructed from a class and spawn parameters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NetGuid(u32);

impl NetGuid {
    pub const INVALID: NetGuid = NetGuid(0);

    pub fn from_u32(value: u32) -> Self {
        Self(value)
    }

    /// The `index`th static guid
    pub fn new_static(index: u32) -> Self {
        Self(index * 2 + 1)
    }

    /// The `index`th dynamic guid
    pub fn new_dynamic(index: u32) -> Self {
        Self(index * 2 + 2)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    pub fn is_static(&self) -> bool {
        self.0 & 1 == 1
    }

    pub fn is_dynamic(&self) -> bool {
        self.is_valid() && !self.is_static()
    }
}

impl fmt::Debug for NetGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "NetGuid(invalid)");
        }
        let kind = if self.is_static() { "static" } else { "dynamic" };
        write!(f, "NetGuid({}, {})", self.0, kind)
    }
}

impl fmt::Display for NetGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serde for NetGuid {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(reader)?.get();
        u32::try_from(value).map(NetGuid).map_err(|_| SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.0).bit_length()
    }
}
