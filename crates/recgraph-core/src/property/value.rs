//! Property values

use crate::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

/// Coordinate reference system of a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// WGS-84 longitude/latitude (EPSG 4326)
    Wgs84,
    /// WGS-84 longitude/latitude/height (EPSG 4979)
    Wgs84Height,
    /// Cartesian x/y (SR-ORG 7203)
    Cartesian,
    /// Cartesian x/y/z (SR-ORG 9157)
    Cartesian3D,
}

impl Crs {
    pub fn code(self) -> u16 {
        match self {
            Self::Wgs84 => 4326,
            Self::Wgs84Height => 4979,
            Self::Cartesian => 7203,
            Self::Cartesian3D => 9157,
        }
    }

    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            4326 => Ok(Self::Wgs84),
            4979 => Ok(Self::Wgs84Height),
            7203 => Ok(Self::Cartesian),
            9157 => Ok(Self::Cartesian3D),
            other => Err(Error::corruption(format!("unknown crs code {}", other))),
        }
    }

    /// Number of coordinates a point in this system carries
    pub fn dimension(self) -> usize {
        match self {
            Self::Wgs84 | Self::Cartesian => 2,
            Self::Wgs84Height | Self::Cartesian3D => 3,
        }
    }
}

/// A point in a coordinate reference system
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    crs: Crs,
    coordinates: Vec<f64>,
}

impl Point {
    /// Build a point; the coordinate count must match the system's dimension
    pub fn new(crs: Crs, coordinates: Vec<f64>) -> Result<Self> {
        if coordinates.len() != crs.dimension() {
            return Err(Error::invalid_argument(format!(
                "{:?} points need {} coordinates, got {}",
                crs,
                crs.dimension(),
                coordinates.len()
            )));
        }
        Ok(Self { crs, coordinates })
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }
}

/// Time of day with a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetTime {
    pub time: NaiveTime,
    pub offset: FixedOffset,
}

/// Calendar-aware amount of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    /// Always in `0..1_000_000_000`
    pub nanos: i32,
}

impl Duration {
    pub fn new(months: i64, days: i64, seconds: i64, nanos: i32) -> Result<Self> {
        if !(0..1_000_000_000).contains(&nanos) {
            return Err(Error::invalid_argument(format!(
                "duration nanos {} out of range",
                nanos
            )));
        }
        Ok(Self {
            months,
            days,
            seconds,
            nanos,
        })
    }
}

/// A property value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value; never storable
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    BoolArray(Vec<bool>),
    ByteArray(Vec<i8>),
    ShortArray(Vec<i16>),
    CharArray(Vec<char>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    StringArray(Vec<String>),
    Point(Point),
    Date(NaiveDate),
    LocalTime(NaiveTime),
    Time(OffsetTime),
    LocalDateTime(NaiveDateTime),
    DateTime(DateTime<FixedOffset>),
    Duration(Duration),
}

impl Value {
    /// Short name of the value's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Char(_) => "char",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::BoolArray(_) => "bool[]",
            Value::ByteArray(_) => "byte[]",
            Value::ShortArray(_) => "short[]",
            Value::CharArray(_) => "char[]",
            Value::IntArray(_) => "int[]",
            Value::LongArray(_) => "long[]",
            Value::FloatArray(_) => "float[]",
            Value::DoubleArray(_) => "double[]",
            Value::StringArray(_) => "string[]",
            Value::Point(_) => "point",
            Value::Date(_) => "date",
            Value::LocalTime(_) => "local time",
            Value::Time(_) => "time",
            Value::LocalDateTime(_) => "local datetime",
            Value::DateTime(_) => "datetime",
            Value::Duration(_) => "duration",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert into JSON for display
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => json!(v),
            Value::Byte(v) => json!(v),
            Value::Short(v) => json!(v),
            Value::Char(v) => json!(v.to_string()),
            Value::Int(v) => json!(v),
            Value::Long(v) => json!(v),
            Value::Float(v) => json!(v),
            Value::Double(v) => json!(v),
            Value::String(v) => json!(v),
            Value::BoolArray(v) => json!(v),
            Value::ByteArray(v) => json!(v),
            Value::ShortArray(v) => json!(v),
            Value::CharArray(v) => json!(v.iter().map(char::to_string).collect::<Vec<_>>()),
            Value::IntArray(v) => json!(v),
            Value::LongArray(v) => json!(v),
            Value::FloatArray(v) => json!(v),
            Value::DoubleArray(v) => json!(v),
            Value::StringArray(v) => json!(v),
            Value::Point(p) => json!({ "crs": p.crs().code(), "coordinates": p.coordinates() }),
            other => json!(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Date(d) => write!(f, "{}", d),
            Value::LocalTime(t) => write!(f, "{}", t),
            Value::Time(t) => write!(f, "{}{}", t.time, t.offset),
            Value::LocalDateTime(dt) => write!(f, "{}", dt),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Duration(d) => write!(
                f,
                "P{}M{}DT{}.{:09}S",
                d.months, d.days, d.seconds, d.nanos
            ),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(impl From<$source> for Value {
            fn from(value: $source) -> Self {
                Value::$variant(value)
            }
        })*
    };
}

impl_from! {
    bool => Bool,
    i8 => Byte,
    i16 => Short,
    char => Char,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<bool> => BoolArray,
    Vec<i8> => ByteArray,
    Vec<i16> => ShortArray,
    Vec<char> => CharArray,
    Vec<i32> => IntArray,
    Vec<i64> => LongArray,
    Vec<f32> => FloatArray,
    Vec<f64> => DoubleArray,
    Vec<String> => StringArray,
    Point => Point,
    NaiveDate => Date,
    NaiveTime => LocalTime,
    OffsetTime => Time,
    NaiveDateTime => LocalDateTime,
    DateTime<FixedOffset> => DateTime,
    Duration => Duration,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_dimension_is_checked() {
        assert!(Point::new(Crs::Cartesian, vec![1.0, 2.0]).is_ok());
        assert!(matches!(
            Point::new(Crs::Wgs84Height, vec![1.0, 2.0]),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(Crs::from_code(9157).unwrap(), Crs::Cartesian3D);
    }

    #[test]
    fn test_duration_nanos_range() {
        assert!(Duration::new(1, 2, 3, 999_999_999).is_ok());
        assert!(Duration::new(1, 2, 3, -1).is_err());
    }

    #[test]
    fn test_conversions_and_display() {
        assert_eq!(Value::from(11i32), Value::Int(11));
        assert_eq!(Value::from("test"), Value::String("test".into()));
        assert_eq!(Value::Int(11).to_string(), "11");
        assert_eq!(Value::from(vec![1i8, 2]).type_name(), "byte[]");
    }
}
