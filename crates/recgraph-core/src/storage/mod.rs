//! Storage layer - fixed-size record stores
//!
//! Record stores, one file each:
//! - `nodes.store`: node records (15 bytes)
//! - `relationships.store`: relationship records (34 bytes)
//! - `relationship_groups.store`: per-type groups of dense nodes (37 bytes)
//! - `properties.store`: property records, four payload words each (42 bytes)
//! - `property_strings.store`, `property_arrays.store`, `node_labels.store`:
//!   dynamic records for long strings, arrays and label overflow
//! - `labels.store`, `property_keys.store`, `relationship_types.store`: token
//!   records, with their names in `label_names.store` and friends
//!
//! Every store file has an `.id` sidecar holding its id space. Files are
//! read and written through a per-store page cache with positioned I/O, so
//! records at very high ids leave sparse holes rather than large mappings.

pub mod access;
pub mod dynamic;
pub mod format;
pub mod id_space;
pub mod page_cache;
pub mod record;
pub mod store;

pub use access::{RecordAccess, RecordAccessSet};
pub use id_space::{Claim, IdSnapshot, IdSpace};
pub use page_cache::{PageCacheStats, PagedFile};
pub use record::{Record, RecordFormat, RecordId};
pub use store::{RecordStore, StoreStats};
