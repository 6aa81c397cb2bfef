//! Relationship chains of sparse and dense nodes
//!
//! A sparse node keeps every relationship in one doubly-linked chain rooted
//! at its anchor. Once its degree would exceed the dense threshold the node
//! is converted: its anchor then points at one group per relationship type,
//! and each group keeps outgoing, incoming and loop sub-chains together with
//! their counts. Conversion is one-way.
//!
//! Query results are snapshots taken when the query runs, so changes made
//! while iterating do not show up in an iterator that is already open.

mod chain;
mod group;
mod model;

pub use chain::ChainKind;
pub use model::{
    convert_to_dense, create_relationship, degree, delete_relationship, get_relationships,
    has_relationship, relationship_types,
};

use crate::storage::format::RelationshipRecord;
use serde::{Deserialize, Serialize};

/// Direction of a relationship relative to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Node is the start
    Outgoing,
    /// Node is the end
    Incoming,
    /// Either
    Both,
}

impl Direction {
    /// Whether `record` runs in this direction from `node`; loops match all
    pub fn matches(self, record: &RelationshipRecord, node: u64) -> bool {
        match self {
            Direction::Outgoing => record.start_node == node,
            Direction::Incoming => record.end_node == node,
            Direction::Both => record.start_node == node || record.end_node == node,
        }
    }
}

/// A relationship as seen by queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Relationship {
    pub id: u64,
    pub start_node: u64,
    pub end_node: u64,
    pub rel_type: u32,
}

impl Relationship {
    /// The endpoint that is not `node`
    pub fn other_node(&self, node: u64) -> u64 {
        if self.start_node == node {
            self.end_node
        } else {
            self.start_node
        }
    }
}

impl From<&RelationshipRecord> for Relationship {
    fn from(record: &RelationshipRecord) -> Self {
        Self {
            id: record.id,
            start_node: record.start_node,
            end_node: record.end_node,
            rel_type: record.rel_type,
        }
    }
}

/// Finite, single-pass sequence of relationships
#[derive(Debug)]
pub struct Relationships {
    inner: std::vec::IntoIter<Relationship>,
}

impl Relationships {
    pub(crate) fn new(found: Vec<Relationship>) -> Self {
        Self {
            inner: found.into_iter(),
        }
    }
}

impl Iterator for Relationships {
    type Item = Relationship;

    fn next(&mut self) -> Option<Relationship> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Relationships {}
