//! recgraph core - record storage engine for a property graph
//!
//! This crate stores nodes, relationships and their properties in fixed-size
//! record files, the way native graph databases lay out their data on disk:
//! - Record stores with per-store id spaces and free-id reuse
//! - Dynamic record chains for long strings, arrays and label overflow
//! - A compact property block codec (short strings, packed arrays, points,
//!   temporal values)
//! - Doubly-linked relationship chains, with per-type groups for dense nodes
//! - Buffered record access, batch insertion and JSON bulk loading
//! - A consistency checker
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │     BulkLoader / BatchInserter / GraphWriter │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │  Property chains · Relationship chains ·     │
//! │  Labels · Tokens                             │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │           RecordAccessSet                    │
//! │   (per-operation change buffers)             │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │           Storage Layer                      │
//! │  (Record Stores, Id Spaces, Page Cache)      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use recgraph_core::{GraphStore, StoreConfig};
//! use recgraph_core::property::{PropertyOwner, Value};
//!
//! # fn main() -> recgraph_core::Result<()> {
//! let store = GraphStore::open("/tmp/graph", StoreConfig::default())?;
//! let mut writer = store.writer();
//! let alice = writer.create_node()?;
//! let name = writer.property_key_id("name")?;
//! writer.set_property(PropertyOwner::Node(alice), name, &Value::from("Alice".to_string()))?;
//! writer.commit()?;
//! store.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod consistency;
pub mod engine;
pub mod error;
pub mod labels;
pub mod loader;
pub mod property;
pub mod relationship;
pub mod storage;
pub mod token;
pub mod writer;

pub use batch::BatchInserter;
pub use config::StoreConfig;
pub use consistency::ConsistencyReport;
pub use engine::{GraphStats, GraphStore, Stores};
pub use error::{Error, Result};
pub use relationship::Direction;
pub use writer::GraphWriter;
