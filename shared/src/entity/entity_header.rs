use weave_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::{NetGuid, Payload};

/// Leads the open bunch of an entity channel and names the entity it
/// replicates
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityHeader {
    pub entity: NetGuid,
    pub stably_named: bool,
    /// Only sent for dynamic entities
    pub class: NetGuid,
    pub spawn_params: Payload,
}

impl EntityHeader {
    /// Reads the entity guid at the front of `payload` without consuming it
    pub fn peek_entity(payload: &Payload) -> Option<NetGuid> {
        let mut reader = payload.reader();
        NetGuid::de(&mut reader).ok()
    }
}

impl Serde for EntityHeader {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.entity.ser(writer);
        self.stably_named.ser(writer);
        if !self.stably_named {
            self.class.ser(writer);
            self.spawn_params.ser(writer);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let entity = NetGuid::de(reader)?;
        let stably_named = bool::de(reader)?;
        if stably_named {
            return Ok(Self {
                entity,
                stably_named,
                class: NetGuid::INVALID,
                spawn_params: Payload::empty(),
            });
        }
        let class = NetGuid::de(reader)?;
        let spawn_params = Payload::de(reader)?;
        Ok(Self {
            entity,
            stably_named,
            class,
            spawn_params,
        })
    }

    fn bit_length(&self) -> u32 {
        let mut output = self.entity.bit_length() + 1;
        if !self.stably_named {
            output += self.class.bit_length() + self.spawn_params.bit_length();
        }
        output
    }
}
