//! Property blocks: the unit a property record holds
//!
//! A block is one or more 64-bit words. The first word is the header:
//!
//! ```text
//! bits  0..24   property key token id
//! bits 24..28   property type
//! bits 28..64   type-specific payload
//! ```
//!
//! The number of words a block spans is derived from its header alone, which
//! is how a property record splits its four payload words back into blocks.

use super::bits::BitReader;
use super::{short_array, short_string, temporal};
use crate::{Error, Result};

/// Width of the key field
pub const KEY_BITS: u32 = 24;
/// Width of the type field
pub const TYPE_BITS: u32 = 4;
/// Bit where type-specific payload starts
pub const PAYLOAD_SHIFT: usize = (KEY_BITS + TYPE_BITS) as usize;
/// Largest key token id a block can carry
pub const MAX_KEY_ID: u32 = (1 << KEY_BITS) - 1;

/// Storage type of a property block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PropertyType {
    Bool = 1,
    Byte = 2,
    Short = 3,
    Char = 4,
    Int = 5,
    Long = 6,
    Float = 7,
    Double = 8,
    /// UTF-8 string in the string store
    String = 9,
    /// Array in the array store
    Array = 10,
    ShortString = 11,
    ShortArray = 12,
    Geometry = 13,
    Temporal = 14,
}

impl PropertyType {
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            1 => Self::Bool,
            2 => Self::Byte,
            3 => Self::Short,
            4 => Self::Char,
            5 => Self::Int,
            6 => Self::Long,
            7 => Self::Float,
            8 => Self::Double,
            9 => Self::String,
            10 => Self::Array,
            11 => Self::ShortString,
            12 => Self::ShortArray,
            13 => Self::Geometry,
            14 => Self::Temporal,
            other => {
                return Err(Error::corruption(format!(
                    "unknown property type {}",
                    other
                )));
            }
        })
    }

    /// Whether blocks of this type own a dynamic record chain
    pub fn is_dynamic(self) -> bool {
        matches!(self, Self::String | Self::Array)
    }
}

/// One encoded property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyBlock {
    words: Vec<u64>,
}

impl PropertyBlock {
    /// Wrap encoded words; the header must describe exactly this many words
    pub fn from_words(words: Vec<u64>) -> Result<Self> {
        let Some(&header) = words.first() else {
            return Err(Error::corruption("empty property block"));
        };
        let expected = block_length(header)?;
        if expected != words.len() {
            return Err(Error::corruption(format!(
                "property block header describes {} words but {} were given",
                expected,
                words.len()
            )));
        }
        Ok(Self { words })
    }

    /// Property key token id
    pub fn key(&self) -> u32 {
        (self.words[0] & ((1 << KEY_BITS) - 1)) as u32
    }

    /// Storage type
    pub fn property_type(&self) -> Result<PropertyType> {
        PropertyType::from_code(((self.words[0] >> KEY_BITS) & 0x0F) as u8)
    }

    /// Encoded words, header first
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Number of words this block occupies in a record
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Reader positioned at the start of the type-specific payload
    pub fn payload(&self) -> BitReader<'_> {
        BitReader::at(&self.words, PAYLOAD_SHIFT)
    }

    /// Head of the dynamic chain for string and array blocks
    pub fn dynamic_head(&self) -> Option<u64> {
        match self.property_type() {
            Ok(t) if t.is_dynamic() => Some((self.words[0] >> PAYLOAD_SHIFT) & 0xF_FFFF_FFFF),
            _ => None,
        }
    }
}

/// Words spanned by the block whose first word is `header`
pub fn block_length(header: u64) -> Result<usize> {
    let property_type = PropertyType::from_code(((header >> KEY_BITS) & 0x0F) as u8)?;
    let words = [header];
    let mut payload = BitReader::at(&words, PAYLOAD_SHIFT);
    Ok(match property_type {
        PropertyType::Bool
        | PropertyType::Byte
        | PropertyType::Short
        | PropertyType::Char
        | PropertyType::Int
        | PropertyType::Float
        | PropertyType::String
        | PropertyType::Array => 1,
        PropertyType::Long => {
            if payload.get(1)? == 1 {
                1
            } else {
                2
            }
        }
        PropertyType::Double => 2,
        PropertyType::ShortString => {
            let encoding = payload.get(short_string::ENCODING_BITS)? as u8;
            let length = payload.get(short_string::LENGTH_BITS)? as usize;
            let bits = short_string::HEADER_BITS + short_string::payload_bits(encoding, length)?;
            bits.div_ceil(64)
        }
        PropertyType::ShortArray => {
            let _element = payload.get(short_array::TYPE_BITS)?;
            let length = payload.get(short_array::LENGTH_BITS)? as usize;
            let bits_per_item = payload.get(short_array::ITEM_BITS_BITS)? as usize;
            (short_array::HEADER_BITS + length * bits_per_item).div_ceil(64)
        }
        PropertyType::Geometry => {
            let _geometry = payload.get(4)?;
            let dimension = payload.get(4)? as usize;
            1 + dimension
        }
        PropertyType::Temporal => {
            let kind = payload.get(temporal::KIND_BITS)? as u8;
            1 + temporal::TemporalKind::from_code(kind)?.extra_words()
        }
    })
}

/// Header word carrying only the key and type
pub fn header(key: u32, property_type: PropertyType) -> u64 {
    u64::from(key & MAX_KEY_ID) | ((property_type as u64) << KEY_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_fields() {
        let block = PropertyBlock::from_words(vec![header(0xABCDE, PropertyType::Int) | (42 << 28)])
            .unwrap();
        assert_eq!(block.key(), 0xABCDE);
        assert_eq!(block.property_type().unwrap(), PropertyType::Int);
        assert_eq!(block.len(), 1);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let double = header(1, PropertyType::Double);
        assert!(PropertyBlock::from_words(vec![double]).is_err());
        assert!(PropertyBlock::from_words(vec![double, 0]).is_ok());
    }

    #[test]
    fn test_unknown_type_is_corruption() {
        assert!(matches!(block_length(15 << 24), Err(Error::Corruption(_))));
        assert!(matches!(block_length(0), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_dynamic_head() {
        let head = (1u64 << 35) + 7;
        let block = PropertyBlock::from_words(vec![header(3, PropertyType::String) | (head << 28)])
            .unwrap();
        assert_eq!(block.dynamic_head(), Some(head));
    }
}
