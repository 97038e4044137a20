use weave_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::{NetGuid, Payload};

/// Type information sent the first time a sub-object is referenced
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubObjectType {
    pub stably_named: bool,
    /// Invalid for a dynamic sub-object means "delete it"
    pub class: NetGuid,
}

impl SubObjectType {
    pub fn deletion() -> Self {
        Self {
            stably_named: false,
            class: NetGuid::INVALID,
        }
    }

    pub fn is_deletion(&self) -> bool {
        !self.stably_named && !self.class.is_valid()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockTarget {
    Root,
    SubObject {
        object: NetGuid,
        type_info: Option<SubObjectType>,
    },
}

/// One object's share of an entity bunch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentBlock {
    pub target: BlockTarget,
    pub payload: Payload,
}

impl ContentBlock {
    pub fn root(payload: Payload) -> Self {
        Self {
            target: BlockTarget::Root,
            payload,
        }
    }

    pub fn sub_object(object: NetGuid, type_info: Option<SubObjectType>, payload: Payload) -> Self {
        Self {
            target: BlockTarget::SubObject { object, type_info },
            payload,
        }
    }
}

impl Serde for ContentBlock {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match &self.target {
            BlockTarget::Root => true.ser(writer),
            BlockTarget::SubObject { object, type_info } => {
                false.ser(writer);
                object.ser(writer);
                type_info.is_some().ser(writer);
                if let Some(type_info) = type_info {
                    type_info.stably_named.ser(writer);
                    if !type_info.stably_named {
                        type_info.class.ser(writer);
                    }
                }
            }
        }
        self.payload.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let target = if bool::de(reader)? {
            BlockTarget::Root
        } else {
            let object = NetGuid::de(reader)?;
            let type_info = if bool::de(reader)? {
                let stably_named = bool::de(reader)?;
                let class = if stably_named {
                    NetGuid::INVALID
                } else {
                    NetGuid::de(reader)?
                };
                Some(SubObjectType {
                    stably_named,
                    class,
                })
            } else {
                None
            };
            BlockTarget::SubObject { object, type_info }
        };
        let payload = Payload::de(reader)?;
        Ok(Self { target, payload })
    }

    fn bit_length(&self) -> u32 {
        let header = match &self.target {
            BlockTarget::Root => 1,
            BlockTarget::SubObject { object, type_info } => {
                let mut bits = 1 + object.bit_length() + 1;
                if let Some(type_info) = type_info {
                    bits += 1;
                    if !type_info.stably_named {
                        bits += type_info.class.bit_length();
                    }
                }
                bits
            }
        };
        header + self.payload.bit_length()
    }
}
