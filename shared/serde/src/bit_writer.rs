use crate::BitReader;

pub trait BitWrite {
    fn write_bit(&mut self, bit: bool);
    fn write_byte(&mut self, byte: u8);
    fn is_counter(&self) -> bool;
    fn count_bits(&mut self, bits: u32);
}

/// Growable bit stream. Bits are packed LSB first inside each byte.
///
/// Bunch payloads can be many times larger than a packet before they are
/// split into partials, so unlike a packet buffer this writer has no fixed
/// capacity.
#[derive(Clone, Debug, Default)]
pub struct BitWriter {
    scratch: u8,
    scratch_index: u8,
    buffer: Vec<u8>,
    bits_written: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            scratch: 0,
            scratch_index: 0,
            buffer: Vec::with_capacity(64),
            bits_written: 0,
        }
    }

    fn flushed_scratch(&self) -> Option<u8> {
        if self.scratch_index > 0 {
            Some((self.scratch << (8 - self.scratch_index)).reverse_bits())
        } else {
            None
        }
    }

    /// Consumes the writer, padding the final byte with zeroes
    pub fn to_bytes(mut self) -> Vec<u8> {
        if let Some(byte) = self.flushed_scratch() {
            self.buffer.push(byte);
        }
        self.buffer
    }

    /// Copy of the bytes written so far, padded like `to_bytes`
    pub fn bytes(&self) -> Vec<u8> {
        let mut output = self.buffer.clone();
        if let Some(byte) = self.flushed_scratch() {
            output.push(byte);
        }
        output
    }

    pub fn bits_written(&self) -> u32 {
        self.bits_written
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.scratch_index == 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits_written == 0
    }

    /// Copies `bits` bits out of `reader` into this writer
    pub fn write_bits_from(
        &mut self,
        reader: &mut BitReader,
        bits: u32,
    ) -> Result<(), crate::SerdeErr> {
        for _ in 0..bits {
            self.write_bit(reader.read_bit()?);
        }
        Ok(())
    }

    /// Appends the first `bits` bits of `bytes`
    pub fn append(&mut self, bytes: &[u8], bits: u32) {
        let whole_bytes = (bits / 8) as usize;
        if self.is_byte_aligned() {
            self.buffer.extend_from_slice(&bytes[..whole_bytes]);
            self.bits_written += (whole_bytes as u32) * 8;
        } else {
            for byte in &bytes[..whole_bytes] {
                self.write_byte(*byte);
            }
        }
        let tail = bits % 8;
        if tail > 0 {
            let last = bytes[whole_bytes];
            for index in 0..tail {
                self.write_bit((last >> index) & 1 != 0);
            }
        }
    }
}

impl BitWrite for BitWriter {
    fn write_bit(&mut self, bit: bool) {
        self.scratch <<= 1;

        if bit {
            self.scratch |= 1;
        }

        self.scratch_index += 1;
        self.bits_written += 1;

        if self.scratch_index >= 8 {
            self.buffer.push(self.scratch.reverse_bits());
            self.scratch_index = 0;
            self.scratch = 0;
        }
    }

    fn write_byte(&mut self, byte: u8) {
        let mut temp = byte;
        for _ in 0..8 {
            self.write_bit(temp & 1 != 0);
            temp >>= 1;
        }
    }

    fn is_counter(&self) -> bool {
        false
    }

    fn count_bits(&mut self, _bits: u32) {}
}

/// A BitWrite that only measures how many bits would be written
pub struct BitCounter {
    count: u32,
}

impl BitCounter {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    pub fn bits_needed(&self) -> u32 {
        self.count
    }
}

impl BitWrite for BitCounter {
    fn write_bit(&mut self, _: bool) {
        self.count += 1;
    }

    fn write_byte(&mut self, _: u8) {
        self.count += 8;
    }

    fn is_counter(&self) -> bool {
        true
    }

    fn count_bits(&mut self, bits: u32) {
        self.count += bits;
    }
}
