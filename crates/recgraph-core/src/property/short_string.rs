//! Inline short strings
//!
//! A short string block carries, after the key and type:
//!
//! ```text
//! bits 28..33   encoding id
//! bits 33..39   length (characters, or bytes for utf-8)
//! bits 39..     packed characters, continuing into up to three more words
//! ```
//!
//! Encodings are tried in order of fewest bits per character; the first
//! whose alphabet covers every character and whose packed form fits the
//! four-word block wins.

use super::bits::{BitReader, BitWriter};
use super::block::{header, PropertyBlock, PropertyType};
use crate::{Error, Result};

pub const ENCODING_BITS: u32 = 5;
pub const LENGTH_BITS: u32 = 6;
/// Key, type, encoding and length
pub const HEADER_BITS: usize = 39;

const MAX_BITS: usize = 4 * 64;
const MAX_LENGTH: usize = (1 << LENGTH_BITS) - 1;

const UTF8: u8 = 0;
const EUROPEAN: u8 = 9;
const LATIN1: u8 = 10;

/// Fixed alphabets, indexed by code
const TABLES: [(u8, u32, &str); 8] = [
    (1, 4, "0123456789 .-+,'"),
    (2, 4, "0123456789 -:/+,"),
    (3, 5, " ABCDEFGHIJKLMNOPQRSTUVWXYZ_.-:/"),
    (4, 5, " abcdefghijklmnopqrstuvwxyz_.-:/"),
    (5, 5, ",abcdefghijklmnopqrstuvwxyz_.-+@"),
    (6, 6, " abcdefghijklmnopqrstuvwxyz_.-:/+,?&=#%@0123456789!$'()*;~[]<>{}"),
    (7, 6, " ABCDEFGHIJKLMNOPQRSTUVWXYZ01234_abcdefghijklmnopqrstuvwxyz56789"),
    (8, 6, " ABCDEFGHIJKLMNOPQRSTUVWXYZ_.-:/+,'@|;abcdefghijklmnopqrstuvwxyz"),
];

/// Bits per character (per byte for utf-8) of an encoding
fn char_bits(encoding: u8) -> Result<u32> {
    match encoding {
        UTF8 | LATIN1 => Ok(8),
        EUROPEAN => Ok(7),
        _ => TABLES
            .iter()
            .find(|(id, _, _)| *id == encoding)
            .map(|(_, bits, _)| *bits)
            .ok_or_else(|| {
                Error::corruption(format!("unknown short string encoding {}", encoding))
            }),
    }
}

/// Payload bits of `length` characters in `encoding`
pub fn payload_bits(encoding: u8, length: usize) -> Result<usize> {
    Ok(char_bits(encoding)? as usize * length)
}

fn european_code(c: char) -> Option<u64> {
    match c as u32 {
        cp @ 0x20..=0x7F => Some(u64::from(cp - 0x20)),
        cp @ 0xE0..=0xFF => Some(u64::from(cp - 0xE0 + 96)),
        _ => None,
    }
}

fn european_char(code: u64) -> Option<char> {
    match code {
        0..=95 => char::from_u32(code as u32 + 0x20),
        96..=127 => char::from_u32(code as u32 - 96 + 0xE0),
        _ => None,
    }
}

/// Character codes of `s` in `encoding`, if its alphabet covers every character
fn codes(encoding: u8, s: &str) -> Option<Vec<u64>> {
    match encoding {
        EUROPEAN => s.chars().map(european_code).collect(),
        LATIN1 => s
            .chars()
            .map(|c| (u32::from(c) <= 0xFF).then_some(u64::from(c as u32)))
            .collect(),
        _ => {
            let (_, _, table) = TABLES.iter().find(|(id, _, _)| *id == encoding)?;
            s.chars()
                .map(|c| table.chars().position(|t| t == c).map(|p| p as u64))
                .collect()
        }
    }
}

fn fits(bits_per_char: u32, length: usize) -> bool {
    length <= MAX_LENGTH && HEADER_BITS + bits_per_char as usize * length <= MAX_BITS
}

fn pack(key: u32, encoding: u8, length: usize, bits: u32, codes: &[u64]) -> Result<PropertyBlock> {
    let mut writer = BitWriter::new();
    writer.put(header(key, PropertyType::ShortString), 28);
    writer.put(u64::from(encoding), ENCODING_BITS);
    writer.put(length as u64, LENGTH_BITS);
    for &code in codes {
        writer.put(code, bits);
    }
    PropertyBlock::from_words(writer.into_words())
}

/// Encode `s` inline, or `None` when no encoding fits the block
pub fn encode(key: u32, s: &str) -> Result<Option<PropertyBlock>> {
    let length = s.chars().count();
    let encodings = TABLES
        .iter()
        .map(|(id, bits, _)| (*id, *bits))
        .chain([(EUROPEAN, 7), (LATIN1, 8)]);
    for (encoding, bits) in encodings {
        if !fits(bits, length) {
            continue;
        }
        if let Some(codes) = codes(encoding, s) {
            return pack(key, encoding, length, bits, &codes).map(Some);
        }
    }

    let bytes = s.as_bytes();
    if fits(8, bytes.len()) {
        let codes: Vec<u64> = bytes.iter().map(|&b| u64::from(b)).collect();
        return pack(key, UTF8, bytes.len(), 8, &codes).map(Some);
    }
    Ok(None)
}

/// Decode a short string block
pub fn decode(block: &PropertyBlock) -> Result<String> {
    let mut reader: BitReader<'_> = block.payload();
    let encoding = reader.get(ENCODING_BITS)? as u8;
    let length = reader.get(LENGTH_BITS)? as usize;
    let bits = char_bits(encoding)?;

    let mut codes = Vec::with_capacity(length);
    for _ in 0..length {
        codes.push(reader.get(bits)?);
    }
    let invalid = || {
        Error::corruption(format!("invalid short string code in encoding {}", encoding))
    };

    match encoding {
        UTF8 => {
            let bytes: Vec<u8> = codes.into_iter().map(|c| c as u8).collect();
            String::from_utf8(bytes).map_err(|_| invalid())
        }
        LATIN1 => codes
            .into_iter()
            .map(|c| char::from_u32(c as u32).ok_or_else(invalid))
            .collect(),
        EUROPEAN => codes
            .into_iter()
            .map(|c| european_char(c).ok_or_else(invalid))
            .collect(),
        _ => {
            let table: Vec<char> = TABLES
                .iter()
                .find(|(id, _, _)| *id == encoding)
                .map(|(_, _, table)| table.chars().collect())
                .ok_or_else(invalid)?;
            codes
                .into_iter()
                .map(|c| table.get(c as usize).copied().ok_or_else(invalid))
                .collect()
        }
    }
}
