//! Bit-packed primitive arrays
//!
//! Inline layout after the key and type:
//!
//! ```text
//! bits 28..32   element type
//! bits 32..38   length
//! bits 38..45   bits per element
//! bits 45..     packed elements
//! ```
//!
//! Arrays that do not fit inline are stored in the dynamic array store as
//! `[element type][bits per element][bits used in last byte][packed data]`.
//! Integral elements are packed at the minimal two's-complement width that
//! covers every element, recomputed on every encode. String arrays are
//! never inline; their dynamic form is `[type][count u32][(len u32, utf-8)*]`.

use super::bits::{
    mask, sign_extend, signed_width, unsigned_width, words_from_bytes, BitReader, BitWriter,
};
use super::block::{header, PropertyBlock, PropertyType};
use super::value::Value;
use crate::{Error, Result};

pub const TYPE_BITS: u32 = 4;
pub const LENGTH_BITS: u32 = 6;
pub const ITEM_BITS_BITS: u32 = 7;
/// Key, type, element type, length and width
pub const HEADER_BITS: usize = 45;

const MAX_BITS: usize = 4 * 64;
const MAX_LENGTH: usize = (1 << LENGTH_BITS) - 1;
const DYNAMIC_HEADER_BYTES: usize = 3;
const STRING_ELEMENT: u8 = PropertyType::String as u8;

/// Element type of a primitive array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Bool,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl Element {
    fn code(self) -> u8 {
        let property_type = match self {
            Element::Bool => PropertyType::Bool,
            Element::Byte => PropertyType::Byte,
            Element::Short => PropertyType::Short,
            Element::Char => PropertyType::Char,
            Element::Int => PropertyType::Int,
            Element::Long => PropertyType::Long,
            Element::Float => PropertyType::Float,
            Element::Double => PropertyType::Double,
        };
        property_type as u8
    }

    fn from_code(code: u8) -> Result<Self> {
        Ok(match PropertyType::from_code(code)? {
            PropertyType::Bool => Element::Bool,
            PropertyType::Byte => Element::Byte,
            PropertyType::Short => Element::Short,
            PropertyType::Char => Element::Char,
            PropertyType::Int => Element::Int,
            PropertyType::Long => Element::Long,
            PropertyType::Float => Element::Float,
            PropertyType::Double => Element::Double,
            other => {
                return Err(Error::corruption(format!(
                    "{:?} is not an array element type",
                    other
                )));
            }
        })
    }
}

/// An array flattened to raw element bits
struct Packed {
    element: Element,
    bits: u32,
    raw: Vec<u64>,
}

fn signed(element: Element, values: impl Iterator<Item = i64>) -> Packed {
    let values: Vec<i64> = values.collect();
    let bits = values.iter().map(|&v| signed_width(v)).max().unwrap_or(1);
    Packed {
        element,
        bits,
        raw: values.into_iter().map(|v| v as u64 & mask(bits)).collect(),
    }
}

fn fixed(element: Element, bits: u32, raw: Vec<u64>) -> Packed {
    Packed { element, bits, raw }
}

/// Flatten a primitive array; `None` for values that are not primitive arrays
fn flatten(value: &Value) -> Option<Packed> {
    Some(match value {
        Value::BoolArray(v) => fixed(Element::Bool, 1, v.iter().map(|&b| b as u64).collect()),
        Value::ByteArray(v) => signed(Element::Byte, v.iter().map(|&x| i64::from(x))),
        Value::ShortArray(v) => signed(Element::Short, v.iter().map(|&x| i64::from(x))),
        Value::IntArray(v) => signed(Element::Int, v.iter().map(|&x| i64::from(x))),
        Value::LongArray(v) => signed(Element::Long, v.iter().copied()),
        Value::CharArray(v) => {
            let raw: Vec<u64> = v.iter().map(|&c| u64::from(c as u32)).collect();
            let bits = raw.iter().map(|&c| unsigned_width(c)).max().unwrap_or(1);
            fixed(Element::Char, bits, raw)
        }
        Value::FloatArray(v) => fixed(
            Element::Float,
            32,
            v.iter().map(|f| u64::from(f.to_bits())).collect(),
        ),
        Value::DoubleArray(v) => {
            fixed(Element::Double, 64, v.iter().map(|d| d.to_bits()).collect())
        }
        _ => return None,
    })
}

fn rebuild(element: Element, bits: u32, raw: Vec<u64>) -> Result<Value> {
    let ext = |r: u64| sign_extend(r, bits);
    Ok(match element {
        Element::Bool => Value::BoolArray(raw.into_iter().map(|r| r != 0).collect()),
        Element::Byte => Value::ByteArray(raw.into_iter().map(|r| ext(r) as i8).collect()),
        Element::Short => Value::ShortArray(raw.into_iter().map(|r| ext(r) as i16).collect()),
        Element::Int => Value::IntArray(raw.into_iter().map(|r| ext(r) as i32).collect()),
        Element::Long => Value::LongArray(raw.into_iter().map(ext).collect()),
        Element::Char => Value::CharArray(
            raw.into_iter()
                .map(|r| {
                    char::from_u32(r as u32)
                        .ok_or_else(|| Error::corruption(format!("invalid char {:#x} in array", r)))
                })
                .collect::<Result<_>>()?,
        ),
        Element::Float => {
            Value::FloatArray(raw.into_iter().map(|r| f32::from_bits(r as u32)).collect())
        }
        Element::Double => Value::DoubleArray(raw.into_iter().map(f64::from_bits).collect()),
    })
}

fn check_width(element: Element, bits: u32) -> Result<()> {
    let valid = match element {
        Element::Bool => bits == 1,
        Element::Float => bits == 32,
        Element::Double => bits == 64,
        Element::Char => (1..=32).contains(&bits),
        Element::Byte | Element::Short | Element::Int | Element::Long => (1..=64).contains(&bits),
    };
    if !valid {
        return Err(Error::corruption(format!(
            "{:?} array with {} bits per element",
            element, bits
        )));
    }
    Ok(())
}

/// Encode a primitive array inline, or `None` when it does not fit
pub fn encode_inline(key: u32, value: &Value) -> Result<Option<PropertyBlock>> {
    let Some(packed) = flatten(value) else {
        return Ok(None);
    };
    let length = packed.raw.len();
    if length > MAX_LENGTH || HEADER_BITS + length * packed.bits as usize > MAX_BITS {
        return Ok(None);
    }
    let mut writer = BitWriter::new();
    writer.put(header(key, PropertyType::ShortArray), 28);
    writer.put(u64::from(packed.element.code()), TYPE_BITS);
    writer.put(length as u64, LENGTH_BITS);
    writer.put(u64::from(packed.bits), ITEM_BITS_BITS);
    for &raw in &packed.raw {
        writer.put(raw, packed.bits);
    }
    PropertyBlock::from_words(writer.into_words()).map(Some)
}

/// Decode an inline array block
pub fn decode_inline(block: &PropertyBlock) -> Result<Value> {
    let mut reader = block.payload();
    let element = Element::from_code(reader.get(TYPE_BITS)? as u8)?;
    let length = reader.get(LENGTH_BITS)? as usize;
    let bits = reader.get(ITEM_BITS_BITS)? as u32;
    check_width(element, bits)?;
    let mut raw = Vec::with_capacity(length);
    for _ in 0..length {
        raw.push(reader.get(bits)?);
    }
    rebuild(element, bits, raw)
}

/// Serialize any array value for the dynamic array store
pub fn to_dynamic_bytes(value: &Value) -> Result<Vec<u8>> {
    if let Value::StringArray(strings) = value {
        let mut bytes = vec![STRING_ELEMENT];
        bytes.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        for s in strings {
            bytes.extend_from_slice(&(s.len() as u32).to_le_bytes());
            bytes.extend_from_slice(s.as_bytes());
        }
        return Ok(bytes);
    }
    let packed = flatten(value).ok_or_else(|| {
        Error::invalid_argument(format!("{} is not an array type", value.type_name()))
    })?;

    let mut writer = BitWriter::new();
    for &raw in &packed.raw {
        writer.put(raw, packed.bits);
    }
    let total_bits = writer.position();
    let used_in_last = match total_bits % 8 {
        0 if total_bits > 0 => 8,
        rest => rest,
    };
    let mut bytes = vec![packed.element.code(), packed.bits as u8, used_in_last as u8];
    bytes.extend(writer.into_bytes());
    Ok(bytes)
}

/// Rebuild an array read back from the dynamic array store
pub fn from_dynamic_bytes(bytes: &[u8]) -> Result<Value> {
    let Some(&code) = bytes.first() else {
        return Err(Error::corruption("empty dynamic array"));
    };
    if code == STRING_ELEMENT {
        return decode_string_array(&bytes[1..]);
    }
    if bytes.len() < DYNAMIC_HEADER_BYTES {
        return Err(Error::corruption("truncated dynamic array header"));
    }
    let element = Element::from_code(code)?;
    let bits = u32::from(bytes[1]);
    let used_in_last = usize::from(bytes[2]);
    check_width(element, bits)?;

    let data = &bytes[DYNAMIC_HEADER_BYTES..];
    let total_bits = match data.len() {
        0 => 0,
        n => (n - 1) * 8 + used_in_last,
    };
    let count = total_bits / bits as usize;
    let words = words_from_bytes(data);
    let mut reader = BitReader::new(&words);
    let mut raw = Vec::with_capacity(count);
    for _ in 0..count {
        raw.push(reader.get(bits)?);
    }
    rebuild(element, bits, raw)
}

fn take<'a>(bytes: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if bytes.len() < n {
        return Err(Error::corruption("truncated string array"));
    }
    let (head, rest) = bytes.split_at(n);
    *bytes = rest;
    Ok(head)
}

fn take_u32(bytes: &mut &[u8]) -> Result<usize> {
    let b = take(bytes, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
}

fn decode_string_array(mut bytes: &[u8]) -> Result<Value> {
    let count = take_u32(&mut bytes)?;
    let mut strings = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let len = take_u32(&mut bytes)?;
        let s = std::str::from_utf8(take(&mut bytes, len)?)
            .map_err(|_| Error::corruption("string array element is not utf-8"))?;
        strings.push(s.to_string());
    }
    Ok(Value::StringArray(strings))
}
