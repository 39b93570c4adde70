//! Bit writer / reader.
//!
//! Bits are packed most-significant first: the first bit written becomes
//! the top bit of the first byte.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::VgsError;

#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: BytesMut,
    acc: u64,
    fill: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: BytesMut::with_capacity(bytes),
            acc: 0,
            fill: 0,
        }
    }

    /// Append the low `nbits` bits of `value`.
    pub fn put(&mut self, value: u32, nbits: u32) {
        debug_assert!(nbits <= 32);
        if nbits == 0 {
            return;
        }
        let masked = u64::from(value) & ((1u64 << nbits) - 1);
        self.acc = (self.acc << nbits) | masked;
        self.fill += nbits;
        while self.fill >= 8 {
            self.fill -= 8;
            self.bytes.put_u8((self.acc >> self.fill) as u8);
        }
        self.acc &= (1u64 << self.fill) - 1;
    }

    pub fn put_bool(&mut self, bit: bool) {
        self.put(u32::from(bit), 1);
    }

    pub fn put_bytes(&mut self, data: &[u8]) {
        if self.fill == 0 {
            self.bytes.put_slice(data);
        } else {
            for &b in data {
                self.put(u32::from(b), 8);
            }
        }
    }

    /// Append everything another writer holds, bit for bit.
    pub fn append(&mut self, other: &BitWriter) {
        self.put_bytes(&other.bytes);
        self.put(other.acc as u32, other.fill);
    }

    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.fill as usize
    }

    /// Bytes occupied, counting a partial trailing byte.
    pub fn byte_len(&self) -> usize {
        self.bytes.len() + usize::from(self.fill > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len() == 0
    }

    /// Zero bits needed to reach the next byte boundary.
    pub fn pad_bits(&self) -> u32 {
        (8 - self.fill) % 8
    }

    pub fn is_aligned(&self) -> bool {
        self.fill == 0
    }

    /// Pad with zero bits up to the next byte boundary.
    pub fn align(&mut self) {
        let pad = self.pad_bits();
        self.put(0, pad);
    }

    /// Align and hand out the written bytes, leaving the writer empty.
    pub fn take(&mut self) -> Bytes {
        self.align();
        self.bytes.split().freeze()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.acc = 0;
        self.fill = 0;
    }
}

/// Reads bits in the order [`BitWriter`] wrote them.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    pub fn bit_pos(&self) -> usize {
        self.pos
    }

    pub fn get(&mut self, nbits: u32) -> Result<u32, VgsError> {
        debug_assert!(nbits <= 32);
        if (nbits as usize) > self.remaining() {
            return Err(VgsError::BitsExhausted {
                wanted: nbits,
                remaining: self.remaining(),
            });
        }
        let mut value: u64 = 0;
        for _ in 0..nbits {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - (self.pos % 8))) & 1;
            value = (value << 1) | u64::from(bit);
            self.pos += 1;
        }
        Ok(value as u32)
    }

    pub fn get_bool(&mut self) -> Result<bool, VgsError> {
        Ok(self.get(1)? == 1)
    }

    pub fn skip_bytes(&mut self, n: usize) -> Result<(), VgsError> {
        if n * 8 > self.remaining() {
            return Err(VgsError::BitsExhausted {
                wanted: (n * 8) as u32,
                remaining: self.remaining(),
            });
        }
        self.pos += n * 8;
        Ok(())
    }
}
