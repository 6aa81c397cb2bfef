//! Buffered record access
//!
//! A [`RecordAccess`] sits in front of one store and buffers every record an
//! operation reads or changes. Changes become visible in the store only when
//! the access is committed; commit writes changed records in ascending id
//! order and releases the ids of records deleted through the access.
//!
//! A [`RecordAccessSet`] groups one access per store and commits them in an
//! order that never publishes a pointer to an unwritten record. With a
//! capacity set, the owner calls [`RecordAccessSet::evict_if_full`] between
//! logical operations and the buffered changes are written out as soon as
//! the buffer grows past the bound.

use super::format::{
    DynamicFormat, GroupFormat, NodeFormat, PropertyFormat, RelationshipFormat,
};
use super::record::{Record, RecordFormat};
use super::store::RecordStore;
use crate::engine::Stores;
use crate::{Error, Result};
use std::collections::btree_map::Entry as Slot;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
struct Entry<R> {
    record: R,
    changed: bool,
    /// Id must go back to the free list at commit
    freed: bool,
}

/// Change buffer in front of one store
pub struct RecordAccess<F: RecordFormat> {
    store: Arc<RecordStore<F>>,
    entries: BTreeMap<u64, Entry<F::Record>>,
}

impl<F: RecordFormat> RecordAccess<F> {
    pub fn new(store: Arc<RecordStore<F>>) -> Self {
        Self {
            store,
            entries: BTreeMap::new(),
        }
    }

    /// The store behind this buffer
    pub fn store(&self) -> &Arc<RecordStore<F>> {
        &self.store
    }

    /// Copy of an in-use record, buffered or from the store
    pub fn get(&mut self, id: u64) -> Result<F::Record> {
        Ok(self.entry(id)?.record.clone())
    }

    /// An in-use record for modification; it is written at commit
    pub fn get_or_load(&mut self, id: u64) -> Result<&mut F::Record> {
        let entry = self.entry(id)?;
        entry.changed = true;
        Ok(&mut entry.record)
    }

    /// A fresh in-use record at an already allocated `id`
    pub fn create(&mut self, id: u64) -> &mut F::Record {
        let fresh = Entry {
            record: self.store.format().new_record(id),
            changed: true,
            freed: false,
        };
        match self.entries.entry(id) {
            Slot::Occupied(mut slot) => {
                slot.insert(fresh);
                &mut slot.into_mut().record
            }
            Slot::Vacant(slot) => &mut slot.insert(fresh).record,
        }
    }

    /// Allocate an id and create a fresh record there
    pub fn create_new(&mut self) -> Result<&mut F::Record> {
        let id = self.store.next_id()?;
        Ok(self.create(id))
    }

    /// Mark a record not in use; its id is released at commit
    pub fn delete(&mut self, id: u64) -> Result<()> {
        let entry = self.entry(id)?;
        entry.record.set_in_use(false);
        entry.changed = true;
        entry.freed = true;
        Ok(())
    }

    /// Whether `id` is in use, taking buffered changes into account
    pub fn is_in_use(&mut self, id: u64) -> Result<bool> {
        match self.entries.get(&id) {
            Some(entry) => Ok(entry.record.in_use()),
            None => self.store.is_in_use(id),
        }
    }

    /// Copy of the record slot whether or not it is in use; `None` past the high id
    pub fn peek(&mut self, id: u64) -> Result<Option<F::Record>> {
        if let Some(entry) = self.entries.get(&id) {
            return Ok(Some(entry.record.clone()));
        }
        if id >= self.store.high_id() {
            return Ok(None);
        }
        self.store.load(id).map(Some)
    }

    /// Buffered records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write changed records in ascending id order, then release freed ids
    pub fn commit(&mut self) -> Result<usize> {
        let entries = std::mem::take(&mut self.entries);
        let mut written = 0;
        let mut freed = Vec::new();
        for (id, entry) in entries {
            if entry.changed {
                self.store.update(&entry.record)?;
                written += 1;
            }
            if entry.freed {
                freed.push(id);
            }
        }
        for id in freed {
            self.store.free_id(id);
        }
        Ok(written)
    }

    /// Drop every buffered change
    pub fn rollback(&mut self) {
        self.entries.clear();
    }

    fn entry(&mut self, id: u64) -> Result<&mut Entry<F::Record>> {
        if !self.entries.contains_key(&id) {
            let record = self.store.get(id)?;
            self.entries.insert(
                id,
                Entry {
                    record,
                    changed: false,
                    freed: false,
                },
            );
        }
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| Error::storage(format!("record {} vanished from buffer", id)))?;
        if !entry.record.in_use() {
            return Err(Error::not_found(format!(
                "{} record {} is not in use",
                self.store.format().name(),
                id
            )));
        }
        Ok(entry)
    }
}

/// One [`RecordAccess`] per store, committed together
pub struct RecordAccessSet {
    pub nodes: RecordAccess<NodeFormat>,
    pub relationships: RecordAccess<RelationshipFormat>,
    pub groups: RecordAccess<GroupFormat>,
    pub properties: RecordAccess<PropertyFormat>,
    pub strings: RecordAccess<DynamicFormat>,
    pub arrays: RecordAccess<DynamicFormat>,
    pub labels: RecordAccess<DynamicFormat>,
    capacity: Option<usize>,
    evictions: u64,
}

impl RecordAccessSet {
    /// Unbounded set; changes stay buffered until [`commit`](Self::commit)
    pub fn new(stores: &Stores) -> Self {
        Self {
            nodes: RecordAccess::new(stores.nodes.clone()),
            relationships: RecordAccess::new(stores.relationships.clone()),
            groups: RecordAccess::new(stores.groups.clone()),
            properties: RecordAccess::new(stores.properties.clone()),
            strings: RecordAccess::new(stores.strings.clone()),
            arrays: RecordAccess::new(stores.arrays.clone()),
            labels: RecordAccess::new(stores.node_labels.clone()),
            capacity: None,
            evictions: 0,
        }
    }

    /// Set that writes its buffer out once it holds more than `capacity` records
    pub fn bounded(stores: &Stores, capacity: usize) -> Self {
        let mut set = Self::new(stores);
        set.capacity = Some(capacity.max(1));
        set
    }

    /// Buffered records across all stores
    pub fn len(&self) -> usize {
        self.nodes.len()
            + self.relationships.len()
            + self.groups.len()
            + self.properties.len()
            + self.strings.len()
            + self.arrays.len()
            + self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Times the bounded buffer was written out early
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Write the buffer out if it has outgrown the capacity
    ///
    /// Only call this between logical operations.
    pub fn evict_if_full(&mut self) -> Result<()> {
        let Some(capacity) = self.capacity else {
            return Ok(());
        };
        let buffered = self.len();
        if buffered > capacity {
            let written = self.commit()?;
            self.evictions += 1;
            tracing::debug!(buffered, written, capacity, "evicted record buffer");
        }
        Ok(())
    }

    /// Commit every store: dynamic records, then properties, then
    /// relationships and groups, then nodes
    pub fn commit(&mut self) -> Result<usize> {
        let mut written = 0;
        written += self.strings.commit()?;
        written += self.arrays.commit()?;
        written += self.labels.commit()?;
        written += self.properties.commit()?;
        written += self.relationships.commit()?;
        written += self.groups.commit()?;
        written += self.nodes.commit()?;
        Ok(written)
    }

    /// Drop every buffered change
    pub fn rollback(&mut self) {
        self.nodes.rollback();
        self.relationships.rollback();
        self.groups.rollback();
        self.properties.rollback();
        self.strings.rollback();
        self.arrays.rollback();
        self.labels.rollback();
    }
}
