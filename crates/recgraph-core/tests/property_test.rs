//! Property values through the writer: dynamic record counts at the inline
//! boundary, and packed blocks that share a property record

use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};
use rand::{Rng, SeedableRng};
use recgraph_core::property::{Crs, Duration, OffsetTime, Point, PropertyOwner, Value};
use recgraph_core::{GraphStore, GraphWriter, StoreConfig};
use tempfile::TempDir;

fn setup() -> (TempDir, GraphStore) {
    let dir = TempDir::new().unwrap();
    let store = GraphStore::open(dir.path(), StoreConfig::default()).unwrap();
    (dir, store)
}

/// Set one property on a fresh node and return the dynamic records it took
fn records_used(store: &GraphStore, writer: &mut GraphWriter, value: Value) -> (u64, u64) {
    let stores = store.stores();
    let (strings, arrays) = (stores.strings.high_id(), stores.arrays.high_id());
    let node = writer.create_node().unwrap();
    writer.set_property(PropertyOwner::Node(node), 0, &value).unwrap();
    writer.commit().unwrap();
    assert_eq!(writer.property(PropertyOwner::Node(node), 0).unwrap(), Some(value));
    (stores.strings.high_id() - strings, stores.arrays.high_id() - arrays)
}

#[test]
fn test_string_record_counts_at_block_capacity() {
    let (_dir, store) = setup();
    let mut writer = store.writer();
    let capacity = store.config().string_block_capacity();
    assert_eq!(capacity, 120);

    // Three-byte characters defeat every short string encoding
    let exact = "€".repeat(capacity / 3);
    assert_eq!(records_used(&store, &mut writer, Value::String(exact.clone())), (1, 0));
    let over = format!("{}a", exact);
    assert_eq!(records_used(&store, &mut writer, Value::String(over)), (2, 0));
    let long = "€".repeat(1000);
    assert_eq!(
        records_used(&store, &mut writer, Value::String(long)),
        (3000u64.div_ceil(capacity as u64), 0)
    );
    assert_eq!(records_used(&store, &mut writer, Value::String("short".to_string())), (0, 0));
}

#[test]
fn test_packed_int_array_takes_one_record() {
    let (_dir, store) = setup();
    let mut writer = store.writer();
    // 41 ints are 164 bytes unpacked but fit 21 bits each once packed
    let ints: Vec<i32> = (0..41).map(|i| i * 25_000).collect();
    assert!(ints.len() * 4 >= 161);
    assert_eq!(records_used(&store, &mut writer, Value::IntArray(ints)), (0, 1));

    let small: Vec<i32> = (0..8).collect();
    assert_eq!(records_used(&store, &mut writer, Value::IntArray(small)), (0, 0));
}

#[test]
fn test_short_string_inline_limit() {
    let (_dir, store) = setup();
    let mut writer = store.writer();
    // 27 utf-8 bytes fill 255 of the block's 256 bits, 30 do not fit
    let below = "€".repeat(9);
    assert_eq!(records_used(&store, &mut writer, Value::String(below)), (0, 0));
    let above = "€".repeat(10);
    assert_eq!(records_used(&store, &mut writer, Value::String(above)), (1, 0));

    // Outside the 7-bit european alphabet, latin-1 packs one byte per character
    let latin = "ß".repeat(27);
    assert_eq!(records_used(&store, &mut writer, Value::String(latin)), (0, 0));
    let latin = "ß".repeat(28);
    assert_eq!(records_used(&store, &mut writer, Value::String(latin)), (1, 0));
}

#[test]
fn test_byte_array_inline_limit() {
    let (_dir, store) = setup();
    let mut writer = store.writer();
    // -128 needs all 8 bits: 45 header bits + 26 × 8 = 253
    let below: Vec<i8> = (0..26).map(|i| if i == 0 { -128 } else { i as i8 }).collect();
    assert_eq!(records_used(&store, &mut writer, Value::ByteArray(below)), (0, 0));
    let above: Vec<i8> = (0..27).map(|i| if i == 0 { -128 } else { i as i8 }).collect();
    assert_eq!(records_used(&store, &mut writer, Value::ByteArray(above)), (0, 1));
}

#[test]
fn test_random_byte_arrays_keep_their_contents() {
    let (_dir, store) = setup();
    let mut writer = store.writer();
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    for len in [0usize, 1, 20, 27, 28, 117, 118, 500] {
        let bytes: Vec<i8> = (0..len).map(|_| rng.r#gen::<i8>()).collect();
        records_used(&store, &mut writer, Value::ByteArray(bytes));
    }
}

#[test]
fn test_neighbouring_blocks_do_not_bleed() {
    let (_dir, store) = setup();
    let mut writer = store.writer();
    let node = writer.create_node().unwrap();
    let owner = PropertyOwner::Node(node);

    let west = FixedOffset::west_opt(5 * 3600 + 1800).unwrap();
    let east = FixedOffset::east_opt(14 * 3600).unwrap();
    let values = vec![
        Value::Long(-1),
        Value::Date(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()),
        Value::Short(-2),
        Value::Time(OffsetTime {
            time: NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap(),
            offset: west,
        }),
        Value::Bool(true),
        Value::DateTime(east.with_ymd_and_hms(1900, 1, 1, 0, 0, 1).single().unwrap()),
        Value::Byte(-128),
        Value::Duration(Duration::new(-13, -40, -1, 999_999_999).unwrap()),
        Value::Int(i32::MIN),
        Value::Point(Point::new(Crs::Wgs84Height, vec![-180.0, -90.0, -0.5]).unwrap()),
        Value::Long(i64::MIN),
        Value::Char('\u{ffff}'),
    ];
    for (key, value) in values.iter().enumerate() {
        writer.set_property(owner, key as u32, value).unwrap();
    }
    writer.commit().unwrap();

    let mut reader = store.writer();
    let stored: Vec<Value> = reader
        .properties(owner)
        .unwrap()
        .into_iter()
        .map(|(_, value)| value)
        .collect();
    assert_eq!(stored, values);
    store.check_consistency_strict().unwrap();
}
