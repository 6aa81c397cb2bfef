//! Temporal values
//!
//! After the key and type a temporal block carries a 4-bit kind and a small
//! kind-specific field; the rest of the value follows in whole words.
//!
//! | kind | header field (from bit 32) | words |
//! |---|---|---|
//! | date | - | epoch day |
//! | local time | - | nanos of day |
//! | time | offset seconds (32 bits) | nanos of day |
//! | local datetime | nanos (31 bits) | epoch second |
//! | datetime | nanos (31 bits) | epoch second, offset seconds |
//! | duration | nanos (31 bits) | months, days, seconds |

use super::bits::BitWriter;
use super::block::{header, PropertyBlock, PropertyType};
use super::value::{Duration, OffsetTime, Value};
use crate::{Error, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike};

pub const KIND_BITS: u32 = 4;

const NANOS_BITS: u32 = 31;
const OFFSET_BITS: u32 = 32;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
/// Days from 0001-01-01 to 1970-01-01
const UNIX_EPOCH_DAY_FROM_CE: i64 = 719_163;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    Date = 1,
    LocalTime = 2,
    Time = 3,
    LocalDateTime = 4,
    DateTime = 5,
    Duration = 6,
}

impl TemporalKind {
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            1 => Self::Date,
            2 => Self::LocalTime,
            3 => Self::Time,
            4 => Self::LocalDateTime,
            5 => Self::DateTime,
            6 => Self::Duration,
            other => {
                return Err(Error::corruption(format!("unknown temporal kind {}", other)));
            }
        })
    }

    /// Whole words following the header word
    pub fn extra_words(self) -> usize {
        match self {
            Self::Date | Self::LocalTime | Self::Time | Self::LocalDateTime => 1,
            Self::DateTime => 2,
            Self::Duration => 3,
        }
    }
}

fn nanos_of_day(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight()) * NANOS_PER_SECOND + i64::from(time.nanosecond())
}

fn time_from_nanos_of_day(nanos: i64) -> Result<NaiveTime> {
    // A leap second keeps its excess nanos on second 86399
    let seconds = nanos.div_euclid(NANOS_PER_SECOND).clamp(0, 86_399);
    let rest = nanos - seconds * NANOS_PER_SECOND;
    u32::try_from(rest)
        .ok()
        .and_then(|rest| NaiveTime::from_num_seconds_from_midnight_opt(seconds as u32, rest))
        .ok_or_else(|| Error::corruption(format!("invalid nanos of day {}", nanos)))
}

fn block(
    key: u32,
    kind: TemporalKind,
    field: u64,
    field_bits: u32,
    words: &[i64],
) -> Result<PropertyBlock> {
    let mut writer = BitWriter::new();
    writer.put(header(key, PropertyType::Temporal), 28);
    writer.put(kind as u64, KIND_BITS);
    writer.put(field, field_bits);
    writer.align();
    for &word in words {
        writer.put(word as u64, 64);
    }
    PropertyBlock::from_words(writer.into_words())
}

/// Encode a temporal value, or `None` when `value` is not temporal
pub fn encode(key: u32, value: &Value) -> Result<Option<PropertyBlock>> {
    let encoded = match value {
        Value::Date(date) => {
            let epoch_day = i64::from(date.num_days_from_ce()) - UNIX_EPOCH_DAY_FROM_CE;
            block(key, TemporalKind::Date, 0, 0, &[epoch_day])?
        }
        Value::LocalTime(time) => {
            block(key, TemporalKind::LocalTime, 0, 0, &[nanos_of_day(*time)])?
        }
        Value::Time(OffsetTime { time, offset }) => block(
            key,
            TemporalKind::Time,
            offset.local_minus_utc() as u32 as u64,
            OFFSET_BITS,
            &[nanos_of_day(*time)],
        )?,
        Value::LocalDateTime(dt) => {
            let utc = dt.and_utc();
            block(
                key,
                TemporalKind::LocalDateTime,
                u64::from(utc.timestamp_subsec_nanos()),
                NANOS_BITS,
                &[utc.timestamp()],
            )?
        }
        Value::DateTime(dt) => block(
            key,
            TemporalKind::DateTime,
            u64::from(dt.timestamp_subsec_nanos()),
            NANOS_BITS,
            &[dt.timestamp(), i64::from(dt.offset().local_minus_utc())],
        )?,
        Value::Duration(d) => {
            if !(0..1_000_000_000).contains(&d.nanos) {
                return Err(Error::invalid_argument(format!(
                    "duration nanos {} out of range",
                    d.nanos
                )));
            }
            block(
                key,
                TemporalKind::Duration,
                d.nanos as u64,
                NANOS_BITS,
                &[d.months, d.days, d.seconds],
            )?
        }
        _ => return Ok(None),
    };
    Ok(Some(encoded))
}

/// Decode a temporal block
pub fn decode(block: &PropertyBlock) -> Result<Value> {
    let mut reader = block.payload();
    let kind = TemporalKind::from_code(reader.get(KIND_BITS)? as u8)?;
    let words = block.words();
    let word = |i: usize| words[i] as i64;
    let corrupt = |what: &str| Error::corruption(format!("invalid {} in temporal block", what));

    Ok(match kind {
        TemporalKind::Date => {
            let days = word(1) + UNIX_EPOCH_DAY_FROM_CE;
            let date = i32::try_from(days)
                .ok()
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .ok_or_else(|| corrupt("epoch day"))?;
            Value::Date(date)
        }
        TemporalKind::LocalTime => Value::LocalTime(time_from_nanos_of_day(word(1))?),
        TemporalKind::Time => {
            let offset = reader.get_signed(OFFSET_BITS)? as i32;
            Value::Time(OffsetTime {
                time: time_from_nanos_of_day(word(1))?,
                offset: FixedOffset::east_opt(offset).ok_or_else(|| corrupt("offset"))?,
            })
        }
        TemporalKind::LocalDateTime => {
            let nanos = reader.get(NANOS_BITS)? as u32;
            let dt = DateTime::from_timestamp(word(1), nanos).ok_or_else(|| corrupt("timestamp"))?;
            Value::LocalDateTime(dt.naive_utc())
        }
        TemporalKind::DateTime => {
            let nanos = reader.get(NANOS_BITS)? as u32;
            let offset = i32::try_from(word(2))
                .ok()
                .and_then(FixedOffset::east_opt)
                .ok_or_else(|| corrupt("offset"))?;
            let dt = DateTime::from_timestamp(word(1), nanos).ok_or_else(|| corrupt("timestamp"))?;
            Value::DateTime(dt.with_timezone(&offset))
        }
        TemporalKind::Duration => {
            let nanos = reader.get(NANOS_BITS)? as i32;
            Value::Duration(Duration::new(word(1), word(2), word(3), nanos)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn round_trip(value: Value) -> PropertyBlock {
        let block = encode(9, &value).unwrap().unwrap();
        assert_eq!(block.key(), 9);
        assert_eq!(decode(&block).unwrap(), value);
        block
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_dates() {
        let block = round_trip(Value::Date(date(1970, 1, 1)));
        assert_eq!(block.words()[1], 0);
        round_trip(Value::Date(date(1, 1, 1)));
        round_trip(Value::Date(date(-4000, 12, 31)));
        round_trip(Value::Date(date(2262, 4, 11)));
    }

    #[test]
    fn test_times() {
        let time = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap();
        round_trip(Value::LocalTime(time));
        round_trip(Value::LocalTime(NaiveTime::MIN));
        let leap = NaiveTime::from_hms_nano_opt(23, 59, 59, 1_500_000_000).unwrap();
        round_trip(Value::LocalTime(leap));

        for offset in [-18 * 3600, -1, 0, 5 * 3600 + 1800, 18 * 3600] {
            round_trip(Value::Time(OffsetTime {
                time,
                offset: FixedOffset::east_opt(offset).unwrap(),
            }));
        }
    }

    #[test]
    fn test_datetimes() {
        let local: NaiveDateTime = date(2018, 3, 7).and_hms_nano_opt(12, 30, 1, 42).unwrap();
        round_trip(Value::LocalDateTime(local));
        round_trip(Value::LocalDateTime(date(1900, 1, 1).and_hms_opt(0, 0, 0).unwrap()));

        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let zoned = local.and_local_timezone(offset).single().unwrap();
        let block = round_trip(Value::DateTime(zoned));
        assert_eq!(block.len(), 3);
    }

    #[test]
    fn test_durations() {
        let block = round_trip(Value::Duration(Duration::new(-14, 3, -86_400, 999).unwrap()));
        assert_eq!(block.len(), 4);
        round_trip(Value::Duration(Duration::new(i64::MAX, i64::MIN, 0, 0).unwrap()));
    }

    #[test]
    fn test_non_temporal_is_skipped() {
        assert!(encode(1, &Value::Int(3)).unwrap().is_none());
    }
}
