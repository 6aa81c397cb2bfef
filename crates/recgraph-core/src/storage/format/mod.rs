//! Binary record layouts, one module per store
//!
//! All multi-byte fields are little-endian.

pub mod dynamic;
pub mod group;
pub mod node;
pub mod property;
pub mod relationship;
pub mod token;

pub use dynamic::{DynamicFormat, DynamicRecord, DYNAMIC_RECORD_HEADER_SIZE};
pub use group::{GroupFormat, GroupRecord};
pub use node::{LabelField, NodeFormat, NodeRecord};
pub use property::{PropertyFormat, PropertyRecord, PAYLOAD_WORDS};
pub use relationship::{RelationshipFormat, RelationshipRecord, MAX_RELATIONSHIP_TYPE};
pub use token::{TokenFormat, TokenRecord};
