use crate::{
    BitReader, BitWrite, ConstBitLength, Serde, SerdeErr, UnsignedVariableInteger,
};

// Booleans

impl Serde for bool {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_bit(*self);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        reader.read_bit()
    }

    fn bit_length(&self) -> u32 {
        1
    }
}

impl ConstBitLength for bool {
    fn const_bit_length() -> u32 {
        1
    }
}

// Fixed width unsigned integers

macro_rules! impl_serde_for_unsigned {
    ($impl_type:ty, $bytes:expr) => {
        impl Serde for $impl_type {
            fn ser(&self, writer: &mut dyn BitWrite) {
                for byte in self.to_le_bytes() {
                    writer.write_byte(byte);
                }
            }

            fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
                let mut bytes = [0u8; $bytes];
                for byte in bytes.iter_mut() {
                    *byte = reader.read_byte()?;
                }
                Ok(<$impl_type>::from_le_bytes(bytes))
            }

            fn bit_length(&self) -> u32 {
                $bytes * 8
            }
        }

        impl ConstBitLength for $impl_type {
            fn const_bit_length() -> u32 {
                $bytes * 8
            }
        }
    };
}

impl_serde_for_unsigned!(u8, 1);
impl_serde_for_unsigned!(u16, 2);
impl_serde_for_unsigned!(u32, 4);
impl_serde_for_unsigned!(u64, 8);

// Strings

impl Serde for String {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.len() as u64).ser(writer);
        for byte in self.as_bytes() {
            writer.write_byte(*byte);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let length = UnsignedVariableInteger::<7>::de(reader)?.get() as usize;
        if (length as u64) * 8 > reader.bits_remaining() as u64 {
            return Err(SerdeErr);
        }
        let mut bytes = Vec::with_capacity(length);
        for _ in 0..length {
            bytes.push(reader.read_byte()?);
        }
        String::from_utf8(bytes).map_err(|_| SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.len() as u64).bit_length() + (self.len() as u32) * 8
    }
}

// Lists

impl<T: Serde> Serde for Vec<T> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<5>::new(self.len() as u64).ser(writer);
        for item in self {
            item.ser(writer);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let length = UnsignedVariableInteger::<5>::de(reader)?.get() as usize;
        // every item takes at least one bit
        if length as u64 > reader.bits_remaining() as u64 {
            return Err(SerdeErr);
        }
        let mut output = Vec::with_capacity(length);
        for _ in 0..length {
            output.push(T::de(reader)?);
        }
        Ok(output)
    }

    fn bit_length(&self) -> u32 {
        let header = UnsignedVariableInteger::<5>::new(self.len() as u64).bit_length();
        self.iter().fold(header, |total, item| total + item.bit_length())
    }
}
