//! Little-endian bit packing over 64-bit words
//!
//! Bit `n` of the stream is bit `n % 64` of word `n / 64`. Every `put`
//! masks its value to the requested width, so a field can never spill
//! into its neighbours.

use crate::{Error, Result};

/// Mask of the low `bits` bits
pub const fn mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Sign-extend the low `bits` bits of `value`
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Minimal two's-complement width of `value`, at least one bit
pub fn signed_width(value: i64) -> u32 {
    64 - (value ^ (value >> 63)).leading_zeros() + 1
}

/// Minimal unsigned width of `value`, at least one bit
pub fn unsigned_width(value: u64) -> u32 {
    (64 - value.leading_zeros()).max(1)
}

#[derive(Debug, Default)]
pub struct BitWriter {
    words: Vec<u64>,
    position: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `bits` bits of `value`
    pub fn put(&mut self, value: u64, bits: u32) -> &mut Self {
        if bits == 0 {
            return self;
        }
        let value = value & mask(bits);
        let word = self.position / 64;
        let offset = (self.position % 64) as u32;
        let needed = (self.position + bits as usize).div_ceil(64);
        if self.words.len() < needed {
            self.words.resize(needed, 0);
        }
        self.words[word] |= value << offset;
        if offset + bits > 64 {
            self.words[word + 1] |= value >> (64 - offset);
        }
        self.position += bits as usize;
        self
    }

    /// Skip to the next word boundary
    pub fn align(&mut self) -> &mut Self {
        self.position = self.position.div_ceil(64) * 64;
        if self.words.len() < self.position / 64 {
            self.words.resize(self.position / 64, 0);
        }
        self
    }

    /// Bits written so far
    pub fn position(&self) -> usize {
        self.position
    }

    /// The packed words
    pub fn into_words(mut self) -> Vec<u64> {
        self.words.resize(self.position.div_ceil(64), 0);
        self.words
    }

    /// The packed stream as little-endian bytes, trimmed to whole bytes
    pub fn into_bytes(self) -> Vec<u8> {
        let len = self.position.div_ceil(8);
        let mut bytes: Vec<u8> = self
            .into_words()
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect();
        bytes.truncate(len);
        bytes
    }
}

#[derive(Debug)]
pub struct BitReader<'a> {
    words: &'a [u64],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(words: &'a [u64]) -> Self {
        Self { words, position: 0 }
    }

    /// Start reading at bit `position`
    pub fn at(words: &'a [u64], position: usize) -> Self {
        Self { words, position }
    }

    /// Read the next `bits` bits
    pub fn get(&mut self, bits: u32) -> Result<u64> {
        if bits == 0 {
            return Ok(0);
        }
        if self.position + bits as usize > self.words.len() * 64 {
            return Err(Error::corruption(format!(
                "bit stream of {} bits read past its end at {}+{}",
                self.words.len() * 64,
                self.position,
                bits
            )));
        }
        let word = self.position / 64;
        let offset = (self.position % 64) as u32;
        let mut value = self.words[word] >> offset;
        if offset + bits > 64 {
            value |= self.words[word + 1] << (64 - offset);
        }
        self.position += bits as usize;
        Ok(value & mask(bits))
    }

    /// Read the next `bits` bits as a two's-complement number
    pub fn get_signed(&mut self, bits: u32) -> Result<i64> {
        Ok(sign_extend(self.get(bits)?, bits))
    }

    /// Skip to the next word boundary
    pub fn align(&mut self) -> &mut Self {
        self.position = self.position.div_ceil(64) * 64;
        self
    }
}

/// Pack little-endian bytes into words, zero padding the last one
pub fn words_from_bytes(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            u64::from_le_bytes(buf)
        })
        .collect()
}
