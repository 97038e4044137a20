use weave_serde::{BitReader, BitWrite, BitWriter, Serde, SerdeErr, UnsignedVariableInteger};

/// An owned, bit-exact blob. The final byte may be partially used.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
    bit_len: u32,
}

impl Payload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_writer(writer: BitWriter) -> Self {
        let bit_len = writer.bits_written();
        Self {
            bytes: writer.to_bytes(),
            bit_len,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            bit_len: (bytes.len() as u32) * 8,
        }
    }

    pub fn bit_len(&self) -> u32 {
        self.bit_len
    }

    /// Bytes needed to hold the payload, counting a partial final byte
    pub fn byte_len(&self) -> usize {
        ((self.bit_len + 7) / 8) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_len % 8 == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.byte_len()]
    }

    pub fn reader(&self) -> BitReader<'_> {
        BitReader::with_bit_len(&self.bytes, self.bit_len)
    }

    pub fn append(&mut self, other: &Payload) {
        if other.is_empty() {
            return;
        }
        if self.is_byte_aligned() {
            self.bytes.truncate(self.byte_len());
            self.bytes.extend_from_slice(other.bytes());
            self.bit_len += other.bit_len;
            return;
        }
        let mut writer = BitWriter::new();
        writer.append(&self.bytes, self.bit_len);
        writer.append(&other.bytes, other.bit_len);
        *self = Payload::from_writer(writer);
    }

    /// Splits into byte aligned pieces of at most `max_bytes`; only the last
    /// piece may end mid-byte. An empty payload yields a single empty piece.
    pub fn split(&self, max_bytes: usize) -> Vec<Payload> {
        let max_bits = (max_bytes as u32) * 8;
        if self.bit_len <= max_bits || max_bytes == 0 {
            return vec![self.clone()];
        }
        let mut pieces = Vec::new();
        let mut start_bit = 0;
        while start_bit < self.bit_len {
            let piece_bits = (self.bit_len - start_bit).min(max_bits);
            let start = (start_bit / 8) as usize;
            let end = start + ((piece_bits + 7) / 8) as usize;
            pieces.push(Payload {
                bytes: self.bytes[start..end].to_vec(),
                bit_len: piece_bits,
            });
            start_bit += piece_bits;
        }
        pieces
    }
}

impl Serde for Payload {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.bit_len).ser(writer);
        if writer.is_counter() {
            writer.count_bits(self.bit_len);
            return;
        }
        let whole = (self.bit_len / 8) as usize;
        for byte in &self.bytes[..whole] {
            writer.write_byte(*byte);
        }
        let tail = self.bit_len % 8;
        if tail > 0 {
            let last = self.bytes[whole];
            for index in 0..tail {
                writer.write_bit((last >> index) & 1 != 0);
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let bit_len = UnsignedVariableInteger::<7>::de(reader)?.get();
        if bit_len > reader.bits_remaining() as u64 {
            return Err(SerdeErr);
        }
        let bit_len = bit_len as u32;
        let mut writer = BitWriter::new();
        writer.write_bits_from(reader, bit_len)?;
        Ok(Payload::from_writer(writer))
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.bit_len).bit_length() + self.bit_len
    }
}
