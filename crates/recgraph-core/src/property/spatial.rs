//! Point values
//!
//! ```text
//! bits 28..32   geometry type (1 = point)
//! bits 32..36   dimension
//! bits 36..52   crs code
//! words 1..     one f64 per coordinate
//! ```

use super::bits::BitWriter;
use super::block::{header, PropertyBlock, PropertyType};
use super::value::{Crs, Point};
use crate::{Error, Result};

const POINT: u64 = 1;

pub fn encode(key: u32, point: &Point) -> Result<PropertyBlock> {
    let mut writer = BitWriter::new();
    writer.put(header(key, PropertyType::Geometry), 28);
    writer.put(POINT, 4);
    writer.put(point.coordinates().len() as u64, 4);
    writer.put(u64::from(point.crs().code()), 16);
    writer.align();
    for coordinate in point.coordinates() {
        writer.put(coordinate.to_bits(), 64);
    }
    PropertyBlock::from_words(writer.into_words())
}

pub fn decode(block: &PropertyBlock) -> Result<Point> {
    let mut reader = block.payload();
    let geometry = reader.get(4)?;
    if geometry != POINT {
        return Err(Error::corruption(format!("unknown geometry type {}", geometry)));
    }
    let dimension = reader.get(4)? as usize;
    let crs = Crs::from_code(reader.get(16)? as u16)?;
    let coordinates = block.words()[1..=dimension]
        .iter()
        .map(|&bits| f64::from_bits(bits))
        .collect();
    Point::new(crs, coordinates).map_err(|_| {
        Error::corruption(format!("{:?} point stored with {} coordinates", crs, dimension))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_round_trip() {
        for point in [
            Point::new(Crs::Wgs84, vec![12.994823, 55.612191]).unwrap(),
            Point::new(Crs::Cartesian3D, vec![-1.0, 0.0, f64::MAX]).unwrap(),
        ] {
            let block = encode(4, &point).unwrap();
            assert_eq!(block.len(), 1 + point.coordinates().len());
            assert_eq!(decode(&block).unwrap(), point);
        }
    }
}
