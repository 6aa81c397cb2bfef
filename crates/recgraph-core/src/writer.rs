//! Entity-level writes over a record access set
//!
//! A [`GraphWriter`] buffers every change in its own [`RecordAccessSet`];
//! nothing reaches the stores before [`GraphWriter::commit`]. Reads through
//! the writer see its own buffered changes.

use crate::engine::Stores;
use crate::labels;
use crate::property::chain::{self, PropertyOwner};
use crate::property::Value;
use crate::relationship::{self, Direction, Relationship, Relationships};
use crate::storage::format::NodeRecord;
use crate::storage::RecordAccessSet;
use crate::{Error, Result};
use std::sync::Arc;

/// Buffered writer over every store of a directory
pub struct GraphWriter {
    stores: Arc<Stores>,
    access: RecordAccessSet,
}

impl GraphWriter {
    pub(crate) fn new(stores: Arc<Stores>) -> Self {
        let access = RecordAccessSet::new(&stores);
        Self { stores, access }
    }

    /// Writer whose buffer is written out once it holds more than `capacity` records
    pub(crate) fn bounded(stores: Arc<Stores>, capacity: usize) -> Self {
        let access = RecordAccessSet::bounded(&stores, capacity);
        Self { stores, access }
    }

    pub fn stores(&self) -> &Arc<Stores> {
        &self.stores
    }

    /// The change buffer, for record-level work
    pub fn access(&mut self) -> &mut RecordAccessSet {
        &mut self.access
    }

    /// Records currently buffered
    pub fn buffered(&self) -> usize {
        self.access.len()
    }

    /// End of a logical operation: a bounded buffer may be written out here
    fn done<T>(&mut self, value: T) -> Result<T> {
        self.access.evict_if_full()?;
        Ok(value)
    }

    // Nodes

    pub fn create_node(&mut self) -> Result<u64> {
        let id = self.access.nodes.create_new()?.id;
        self.done(id)
    }

    /// Create a node at a caller-chosen id
    ///
    /// Ids at or past the high-water mark move the mark to `id + 1`; the ids
    /// skipped over are not reused. A lower id must not be in use.
    pub fn create_node_with_id(&mut self, id: u64) -> Result<()> {
        let store = self.access.nodes.store().clone();
        if id > store.max_id() {
            return Err(Error::capacity(format!(
                "node id {} exceeds maximum {}",
                id,
                store.max_id()
            )));
        }
        if id >= store.high_id() {
            store.set_high_id(id + 1)?;
        } else if self.access.nodes.is_in_use(id)? {
            return Err(Error::constraint(format!("node {} already exists", id)));
        }
        store.claim_id(id)?;
        self.access.nodes.create(id);
        self.done(())
    }

    pub fn node_exists(&mut self, id: u64) -> Result<bool> {
        self.access.nodes.is_in_use(id)
    }

    /// Raw node record, buffered changes included
    pub fn node_record(&mut self, id: u64) -> Result<NodeRecord> {
        self.access.nodes.get(id)
    }

    /// Delete a node together with its properties and labels
    ///
    /// Fails with [`Error::ConstraintViolation`] while the node still has
    /// relationships.
    pub fn delete_node(&mut self, id: u64) -> Result<()> {
        let record = self.access.nodes.get(id)?;
        if !record.relationship_anchor.is_null() {
            return Err(Error::constraint(format!(
                "node {} still has relationships",
                id
            )));
        }
        chain::delete_all(&mut self.access, PropertyOwner::Node(id))?;
        labels::clear_labels(&mut self.access, id)?;
        self.access.nodes.delete(id)?;
        self.done(())
    }

    // Relationships

    pub fn create_relationship(&mut self, start: u64, end: u64, rel_type: u32) -> Result<u64> {
        let threshold = self.stores.config.dense_node_threshold;
        let id =
            relationship::create_relationship(&mut self.access, start, end, rel_type, threshold)?;
        self.done(id)
    }

    pub fn delete_relationship(&mut self, id: u64) -> Result<()> {
        relationship::delete_relationship(&mut self.access, id)?;
        self.done(())
    }

    pub fn relationship(&mut self, id: u64) -> Result<Relationship> {
        Ok(Relationship::from(&self.access.relationships.get(id)?))
    }

    pub fn is_dense(&mut self, node: u64) -> Result<bool> {
        Ok(self.access.nodes.get(node)?.is_dense)
    }

    /// Relationships of `node` with one of `types` (any when empty)
    pub fn relationships(
        &mut self,
        node: u64,
        types: &[u32],
        direction: Direction,
    ) -> Result<Relationships> {
        relationship::get_relationships(&mut self.access, node, types, direction)
    }

    pub fn degree(&mut self, node: u64, types: &[u32], direction: Direction) -> Result<u64> {
        relationship::degree(&mut self.access, node, types, direction)
    }

    pub fn has_relationship(
        &mut self,
        node: u64,
        types: &[u32],
        direction: Direction,
    ) -> Result<bool> {
        relationship::has_relationship(&mut self.access, node, types, direction)
    }

    pub fn relationship_types(&mut self, node: u64) -> Result<Vec<u32>> {
        relationship::relationship_types(&mut self.access, node)
    }

    // Properties

    pub fn set_property(&mut self, owner: PropertyOwner, key: u32, value: &Value) -> Result<()> {
        chain::set_property(&mut self.access, owner, key, value)?;
        self.done(())
    }

    pub fn property(&mut self, owner: PropertyOwner, key: u32) -> Result<Option<Value>> {
        chain::get_property(&mut self.access, owner, key)
    }

    pub fn has_property(&mut self, owner: PropertyOwner, key: u32) -> Result<bool> {
        chain::has_property(&mut self.access, owner, key)
    }

    pub fn remove_property(&mut self, owner: PropertyOwner, key: u32) -> Result<Option<Value>> {
        let removed = chain::remove_property(&mut self.access, owner, key)?;
        self.done(removed)
    }

    /// Every property of `owner`, sorted by key id
    pub fn properties(&mut self, owner: PropertyOwner) -> Result<Vec<(u32, Value)>> {
        chain::properties(&mut self.access, owner)
    }

    // Labels

    pub fn set_labels(&mut self, node: u64, node_labels: &[u32]) -> Result<()> {
        labels::set_labels(&mut self.access, node, node_labels)?;
        self.done(())
    }

    pub fn add_label(&mut self, node: u64, label: u32) -> Result<bool> {
        let added = labels::add_label(&mut self.access, node, label)?;
        self.done(added)
    }

    pub fn remove_label(&mut self, node: u64, label: u32) -> Result<bool> {
        let removed = labels::remove_label(&mut self.access, node, label)?;
        self.done(removed)
    }

    pub fn labels(&mut self, node: u64) -> Result<Vec<u32>> {
        labels::labels(&mut self.access, node)
    }

    pub fn has_label(&mut self, node: u64, label: u32) -> Result<bool> {
        labels::has_label(&mut self.access, node, label)
    }

    /// Snapshot of the nodes carrying `label`
    pub fn nodes_with_label(&mut self, label: u32) -> Result<std::vec::IntoIter<u64>> {
        labels::nodes_with_label(&mut self.access, label)
    }

    // Tokens

    pub fn label_id(&self, name: &str) -> Result<u32> {
        self.stores.labels.get_or_create(name)
    }

    pub fn property_key_id(&self, name: &str) -> Result<u32> {
        self.stores.property_keys.get_or_create(name)
    }

    pub fn relationship_type_id(&self, name: &str) -> Result<u32> {
        self.stores.relationship_types.get_or_create(name)
    }

    /// Write every buffered change to the stores
    pub fn commit(&mut self) -> Result<usize> {
        self.access.commit()
    }

    /// Drop every buffered change
    pub fn rollback(&mut self) {
        self.access.rollback()
    }
}
