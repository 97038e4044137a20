use crate::SerdeErr;

/// Reads bits in the order a `BitWriter` wrote them
#[derive(Clone)]
pub struct BitReader<'b> {
    buffer: &'b [u8],
    bit_len: u32,
    position: u32,
}

impl<'b> BitReader<'b> {
    pub fn new(buffer: &'b [u8]) -> Self {
        Self {
            buffer,
            bit_len: (buffer.len() as u32) * 8,
            position: 0,
        }
    }

    /// A reader limited to the first `bit_len` bits of `buffer`, for payloads
    /// whose final byte is padding
    pub fn with_bit_len(buffer: &'b [u8], bit_len: u32) -> Self {
        let bit_len = bit_len.min((buffer.len() as u32) * 8);
        Self {
            buffer,
            bit_len,
            position: 0,
        }
    }

    pub fn read_bit(&mut self) -> Result<bool, SerdeErr> {
        if self.position >= self.bit_len {
            return Err(SerdeErr);
        }
        let byte = self.buffer[(self.position / 8) as usize];
        let bit = (byte >> (self.position % 8)) & 1 != 0;
        self.position += 1;
        Ok(bit)
    }

    pub fn read_byte(&mut self) -> Result<u8, SerdeErr> {
        let mut output = 0;
        for index in 0..8 {
            if self.read_bit()? {
                output |= 1 << index;
            }
        }
        Ok(output)
    }

    /// Peeks the next `count` whole bytes without consuming them
    pub fn peek_bytes(&self, count: usize) -> Result<Vec<u8>, SerdeErr> {
        let mut copy = self.clone();
        let mut output = Vec::with_capacity(count);
        for _ in 0..count {
            output.push(copy.read_byte()?);
        }
        Ok(output)
    }

    pub fn bits_remaining(&self) -> u32 {
        self.bit_len - self.position
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.bit_len
    }

    pub fn position(&self) -> u32 {
        self.position
    }
}
