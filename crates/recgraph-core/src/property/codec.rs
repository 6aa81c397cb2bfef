//! Value codec: property values to and from property blocks
//!
//! Scalars are packed into the header word when they fit; doubles and wide
//! longs take one extra word. Strings and arrays are inline when their
//! packed form fits the record, otherwise their bytes go to a dynamic chain
//! and the block keeps the 36-bit chain head.

use super::bits::{mask, BitWriter};
use super::block::{header, PropertyBlock, PropertyType, MAX_KEY_ID, PAYLOAD_SHIFT};
use super::value::Value;
use super::{short_array, short_string, spatial, temporal};
use crate::storage::dynamic::{allocate_chain, read_chain, reclaim_chain};
use crate::storage::format::DynamicFormat;
use crate::storage::record::{RecordId, DYNAMIC_ID_BITS};
use crate::storage::RecordAccess;
use crate::{Error, Result};

/// Longs whose two's complement fits 35 bits stay in the header word
const INLINE_LONG_BITS: u32 = 35;

/// The dynamic stores a value may spill into
pub struct DynamicStores<'a> {
    pub strings: &'a mut RecordAccess<DynamicFormat>,
    pub arrays: &'a mut RecordAccess<DynamicFormat>,
}

fn scalar(key: u32, property_type: PropertyType, value: u64, bits: u32) -> Result<PropertyBlock> {
    let mut writer = BitWriter::new();
    writer.put(header(key, property_type), PAYLOAD_SHIFT as u32);
    writer.put(value, bits);
    PropertyBlock::from_words(writer.into_words())
}

fn dynamic(key: u32, property_type: PropertyType, head: RecordId) -> Result<PropertyBlock> {
    scalar(key, property_type, head.raw(), DYNAMIC_ID_BITS)
}

fn long(key: u32, value: i64) -> Result<PropertyBlock> {
    let mut writer = BitWriter::new();
    writer.put(header(key, PropertyType::Long), PAYLOAD_SHIFT as u32);
    let limit = 1i64 << (INLINE_LONG_BITS - 1);
    if (-limit..limit).contains(&value) {
        writer.put(1, 1).put(value as u64, INLINE_LONG_BITS);
    } else {
        writer.put(0, 1).align().put(value as u64, 64);
    }
    PropertyBlock::from_words(writer.into_words())
}

fn double(key: u32, value: f64) -> Result<PropertyBlock> {
    let mut writer = BitWriter::new();
    writer.put(header(key, PropertyType::Double), PAYLOAD_SHIFT as u32);
    writer.align().put(value.to_bits(), 64);
    PropertyBlock::from_words(writer.into_words())
}

/// Encode `value` under property key `key`
///
/// Values too large for the record are written to a new dynamic chain in
/// `dynamic_stores`; the chain is owned by the returned block from then on.
pub fn encode_value(
    key: u32,
    value: &Value,
    dynamic_stores: DynamicStores<'_>,
) -> Result<PropertyBlock> {
    if key > MAX_KEY_ID {
        return Err(Error::invalid_argument(format!(
            "property key {} exceeds {}",
            key, MAX_KEY_ID
        )));
    }
    match value {
        Value::Null => Err(Error::invalid_argument(format!(
            "null value for property key {}",
            key
        ))),
        Value::Bool(v) => scalar(key, PropertyType::Bool, u64::from(*v), 1),
        Value::Byte(v) => scalar(key, PropertyType::Byte, *v as u8 as u64, 8),
        Value::Short(v) => scalar(key, PropertyType::Short, *v as u16 as u64, 16),
        Value::Char(v) => scalar(key, PropertyType::Char, u64::from(*v as u32), 32),
        Value::Int(v) => scalar(key, PropertyType::Int, *v as u32 as u64, 32),
        Value::Long(v) => long(key, *v),
        Value::Float(v) => scalar(key, PropertyType::Float, u64::from(v.to_bits()), 32),
        Value::Double(v) => double(key, *v),
        Value::String(s) => match short_string::encode(key, s)? {
            Some(block) => Ok(block),
            None => {
                let head = allocate_chain(dynamic_stores.strings, s.as_bytes())?;
                dynamic(key, PropertyType::String, head)
            }
        },
        Value::BoolArray(_)
        | Value::ByteArray(_)
        | Value::ShortArray(_)
        | Value::CharArray(_)
        | Value::IntArray(_)
        | Value::LongArray(_)
        | Value::FloatArray(_)
        | Value::DoubleArray(_)
        | Value::StringArray(_) => match short_array::encode_inline(key, value)? {
            Some(block) => Ok(block),
            None => {
                let bytes = short_array::to_dynamic_bytes(value)?;
                let head = allocate_chain(dynamic_stores.arrays, &bytes)?;
                dynamic(key, PropertyType::Array, head)
            }
        },
        Value::Point(point) => spatial::encode(key, point),
        Value::Date(_)
        | Value::LocalTime(_)
        | Value::Time(_)
        | Value::LocalDateTime(_)
        | Value::DateTime(_)
        | Value::Duration(_) => temporal::encode(key, value)?.ok_or_else(|| {
            Error::invalid_argument(format!("cannot encode {} as temporal", value.type_name()))
        }),
    }
}

/// Decode a block, reading its dynamic chain if it has one
pub fn decode_value(block: &PropertyBlock, dynamic_stores: DynamicStores<'_>) -> Result<Value> {
    let mut payload = block.payload();
    Ok(match block.property_type()? {
        PropertyType::Bool => Value::Bool(payload.get(1)? == 1),
        PropertyType::Byte => Value::Byte(payload.get(8)? as u8 as i8),
        PropertyType::Short => Value::Short(payload.get(16)? as u16 as i16),
        PropertyType::Char => {
            let code = payload.get(32)? as u32;
            Value::Char(char::from_u32(code).ok_or_else(|| {
                Error::corruption(format!("invalid char code point {:#x}", code))
            })?)
        }
        PropertyType::Int => Value::Int(payload.get(32)? as u32 as i32),
        PropertyType::Long => {
            if payload.get(1)? == 1 {
                Value::Long(payload.get_signed(INLINE_LONG_BITS)?)
            } else {
                Value::Long(payload.align().get(64)? as i64)
            }
        }
        PropertyType::Float => Value::Float(f32::from_bits(payload.get(32)? as u32)),
        PropertyType::Double => Value::Double(f64::from_bits(payload.align().get(64)?)),
        PropertyType::String => {
            let bytes = read_chain(dynamic_stores.strings, chain_head(block))?;
            Value::String(
                String::from_utf8(bytes)
                    .map_err(|_| Error::corruption("dynamic string is not utf-8"))?,
            )
        }
        PropertyType::Array => {
            let bytes = read_chain(dynamic_stores.arrays, chain_head(block))?;
            short_array::from_dynamic_bytes(&bytes)?
        }
        PropertyType::ShortString => Value::String(short_string::decode(block)?),
        PropertyType::ShortArray => short_array::decode_inline(block)?,
        PropertyType::Geometry => Value::Point(spatial::decode(block)?),
        PropertyType::Temporal => temporal::decode(block)?,
    })
}

/// Release the dynamic chain a block owns; returns the records freed
pub fn reclaim_value(block: &PropertyBlock, dynamic_stores: DynamicStores<'_>) -> Result<usize> {
    match block.property_type()? {
        PropertyType::String => reclaim_chain(dynamic_stores.strings, chain_head(block)),
        PropertyType::Array => reclaim_chain(dynamic_stores.arrays, chain_head(block)),
        _ => Ok(0),
    }
}

fn chain_head(block: &PropertyBlock) -> RecordId {
    match block.dynamic_head() {
        Some(head) if head == mask(DYNAMIC_ID_BITS) => RecordId::NULL,
        Some(head) => RecordId::new(head),
        None => RecordId::NULL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::value::{Crs, Duration, Point};
    use crate::storage::RecordStore;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        strings: RecordAccess<DynamicFormat>,
        arrays: RecordAccess<DynamicFormat>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let open = |file: &str, name: &'static str| {
                let format = DynamicFormat::new(name, 128).unwrap();
                let store = RecordStore::open(dir.path().join(file), format, 4096, 8).unwrap();
                RecordAccess::new(Arc::new(store))
            };
            let strings = open("property_strings.store", "string");
            let arrays = open("property_arrays.store", "array");
            Self {
                _dir: dir,
                strings,
                arrays,
            }
        }

        fn stores(&mut self) -> DynamicStores<'_> {
            DynamicStores {
                strings: &mut self.strings,
                arrays: &mut self.arrays,
            }
        }

        fn round_trip(&mut self, value: &Value) -> PropertyBlock {
            let block = encode_value(5, value, self.stores()).unwrap();
            assert_eq!(block.key(), 5);
            assert_eq!(&decode_value(&block, self.stores()).unwrap(), value);
            block
        }
    }

    #[test]
    fn test_scalars() {
        let mut fx = Fixture::new();
        for value in [
            Value::Bool(true),
            Value::Bool(false),
            Value::Byte(i8::MIN),
            Value::Short(-2),
            Value::Char('\u{10FFFF}'),
            Value::Int(i32::MIN),
            Value::Float(-0.5),
        ] {
            assert_eq!(fx.round_trip(&value).len(), 1);
        }
        assert_eq!(fx.round_trip(&Value::Double(1e300)).len(), 2);

        let block = encode_value(5, &Value::Float(f32::NAN), fx.stores()).unwrap();
        let Value::Float(back) = decode_value(&block, fx.stores()).unwrap() else {
            panic!("expected a float");
        };
        assert_eq!(back.to_bits(), f32::NAN.to_bits());
    }

    #[test]
    fn test_long_inline_boundary() {
        let mut fx = Fixture::new();
        assert_eq!(fx.round_trip(&Value::Long((1 << 34) - 1)).len(), 1);
        assert_eq!(fx.round_trip(&Value::Long(-(1 << 34))).len(), 1);
        assert_eq!(fx.round_trip(&Value::Long(1 << 34)).len(), 2);
        assert_eq!(fx.round_trip(&Value::Long(i64::MIN)).len(), 2);
    }

    #[test]
    fn test_long_strings_spill_into_chain() {
        let mut fx = Fixture::new();
        // 27 utf-8 bytes still fit inline
        fx.round_trip(&Value::String("€".repeat(9)));
        assert!(fx.strings.is_empty());

        let block = fx.round_trip(&Value::String("€".repeat(10)));
        assert_eq!(block.property_type().unwrap(), PropertyType::String);
        assert_eq!(fx.strings.len(), 1);

        let long = "x".repeat(1000);
        let block = fx.round_trip(&Value::String(long));
        // 1000 bytes over 120-byte records
        assert_eq!(reclaim_value(&block, fx.stores()).unwrap(), 9);
    }

    #[test]
    fn test_arrays_and_composites() {
        let mut fx = Fixture::new();
        fx.round_trip(&Value::IntArray(vec![1, 2, 3]));
        fx.round_trip(&Value::ByteArray((0..45).map(|i| i as i8 * -2).collect()));
        fx.round_trip(&Value::StringArray(vec!["a".into(), "bc".into()]));
        fx.round_trip(&Value::StringArray(vec![]));
        fx.round_trip(&Value::Point(Point::new(Crs::Cartesian, vec![1.0, 2.0]).unwrap()));
        fx.round_trip(&Value::Date(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()));
        fx.round_trip(&Value::Duration(Duration::new(1, 2, 3, 4).unwrap()));
    }

    #[test]
    fn test_invalid_input() {
        let mut fx = Fixture::new();
        assert!(matches!(
            encode_value(1, &Value::Null, fx.stores()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            encode_value(MAX_KEY_ID + 1, &Value::Int(1), fx.stores()),
            Err(Error::InvalidArgument(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_strings_round_trip(s in ".{0,200}") {
            let mut fx = Fixture::new();
            let value = Value::String(s);
            let block = encode_value(2, &value, fx.stores()).unwrap();
            prop_assert_eq!(decode_value(&block, fx.stores()).unwrap(), value);
        }

        #[test]
        fn prop_long_arrays_round_trip(values in prop::collection::vec(any::<i64>(), 0..80)) {
            let mut fx = Fixture::new();
            let value = Value::LongArray(values);
            let block = encode_value(2, &value, fx.stores()).unwrap();
            prop_assert_eq!(decode_value(&block, fx.stores()).unwrap(), value);
        }

        #[test]
        fn prop_scalars_round_trip(i in any::<i32>(), l in any::<i64>(), c in any::<char>()) {
            let mut fx = Fixture::new();
            for value in [Value::Int(i), Value::Long(l), Value::Char(c)] {
                let block = encode_value(2, &value, fx.stores()).unwrap();
                prop_assert_eq!(decode_value(&block, fx.stores()).unwrap(), value);
            }
        }
    }
}
