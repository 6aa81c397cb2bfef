//! Property values and their encoding
//!
//! - [`value`]: the [`Value`] model
//! - [`block`]: property block header and length rules
//! - [`codec`]: value ↔ block, spilling large values into dynamic chains
//! - [`chain`]: per-entity property chains over property records

pub mod bits;
pub mod block;
pub mod chain;
pub mod codec;
pub mod short_array;
pub mod short_string;
pub mod spatial;
pub mod temporal;
pub mod value;

pub use block::{PropertyBlock, PropertyType, MAX_KEY_ID};
pub use chain::PropertyOwner;
pub use codec::{decode_value, encode_value, reclaim_value, DynamicStores};
pub use value::{Crs, Duration, OffsetTime, Point, Value};
