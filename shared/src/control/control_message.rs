use weave_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::{
    control::{control_config::ControlRegistry, error::ControlError},
    ChannelIndex, Payload,
};

pub const HELLO_TAG: u8 = 0;
pub const WELCOME_TAG: u8 = 1;
pub const FAILURE_TAG: u8 = 2;
pub const ENTITY_CHANNEL_FAILURE_TAG: u8 = 3;
pub const NETSPEED_TAG: u8 = 4;
/// Tags below this are reserved for built-in messages
pub const FIRST_CUSTOM_TAG: u8 = 16;

/// A message carried on the control channel, prefixed on the wire by an
/// 8-bit tag
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    /// First message from the connecting side. The flag byte directly after
    /// the tag announces the sender's byte order.
    Hello {
        little_endian: bool,
        protocol_version: u32,
    },
    Welcome,
    Failure { reason: String },
    /// The receiver could not bind the entity on this channel
    EntityChannelFailure { channel_index: ChannelIndex },
    Netspeed { bytes_per_second: u32 },
    Custom { tag: u8, payload: Payload },
}

impl ControlMessage {
    pub fn hello(protocol_version: u32) -> Self {
        Self::Hello {
            little_endian: cfg!(target_endian = "little"),
            protocol_version,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Self::Hello { .. } => HELLO_TAG,
            Self::Welcome => WELCOME_TAG,
            Self::Failure { .. } => FAILURE_TAG,
            Self::EntityChannelFailure { .. } => ENTITY_CHANNEL_FAILURE_TAG,
            Self::Netspeed { .. } => NETSPEED_TAG,
            Self::Custom { tag, .. } => *tag,
        }
    }

    pub fn write(&self, writer: &mut dyn BitWrite) {
        writer.write_byte(self.tag());
        match self {
            Self::Hello {
                little_endian,
                protocol_version,
            } => {
                writer.write_byte(*little_endian as u8);
                protocol_version.ser(writer);
            }
            Self::Welcome => {}
            Self::Failure { reason } => reason.ser(writer),
            Self::EntityChannelFailure { channel_index } => channel_index.ser(writer),
            Self::Netspeed { bytes_per_second } => bytes_per_second.ser(writer),
            Self::Custom { payload, .. } => payload.ser(writer),
        }
    }

    pub fn read(reader: &mut BitReader, registry: &ControlRegistry) -> Result<Self, ControlError> {
        let tag = reader
            .read_byte()
            .map_err(|_| ControlError::MalformedMessage { tag: None })?;
        let malformed = |_: SerdeErr| ControlError::MalformedMessage { tag: Some(tag) };
        let message = match tag {
            HELLO_TAG => {
                let little_endian = match reader.read_byte().map_err(malformed)? {
                    0 => false,
                    1 => true,
                    _ => return Err(ControlError::MalformedMessage { tag: Some(tag) }),
                };
                let protocol_version = u32::de(reader).map_err(malformed)?;
                Self::Hello {
                    little_endian,
                    protocol_version,
                }
            }
            WELCOME_TAG => Self::Welcome,
            FAILURE_TAG => Self::Failure {
                reason: String::de(reader).map_err(malformed)?,
            },
            ENTITY_CHANNEL_FAILURE_TAG => Self::EntityChannelFailure {
                channel_index: u16::de(reader).map_err(malformed)?,
            },
            NETSPEED_TAG => Self::Netspeed {
                bytes_per_second: u32::de(reader).map_err(malformed)?,
            },
            tag if registry.is_registered(tag) => Self::Custom {
                tag,
                payload: Payload::de(reader).map_err(malformed)?,
            },
            tag => return Err(ControlError::UnknownMessageTag { tag }),
        };
        Ok(message)
    }
}
