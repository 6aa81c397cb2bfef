//! Property chains
//!
//! Every node and relationship owns a doubly-linked chain of property
//! records. A key appears at most once in the chain. New blocks go into the
//! first record with room; when none has room a new record becomes the
//! chain head. Records left without blocks are unlinked and deleted.

use super::codec::{decode_value, encode_value, reclaim_value, DynamicStores};
use super::value::Value;
use crate::storage::format::PropertyRecord;
use crate::storage::record::RecordId;
use crate::storage::RecordAccessSet;
use crate::{Error, Result};
use std::collections::HashSet;

/// Entity that owns a property chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyOwner {
    Node(u64),
    Relationship(u64),
}

impl std::fmt::Display for PropertyOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyOwner::Node(id) => write!(f, "node {}", id),
            PropertyOwner::Relationship(id) => write!(f, "relationship {}", id),
        }
    }
}

fn dynamic(access: &mut RecordAccessSet) -> DynamicStores<'_> {
    DynamicStores {
        strings: &mut access.strings,
        arrays: &mut access.arrays,
    }
}

fn first_property(access: &mut RecordAccessSet, owner: PropertyOwner) -> Result<RecordId> {
    Ok(match owner {
        PropertyOwner::Node(id) => access.nodes.get(id)?.first_property,
        PropertyOwner::Relationship(id) => access.relationships.get(id)?.first_property,
    })
}

fn set_first_property(
    access: &mut RecordAccessSet,
    owner: PropertyOwner,
    head: RecordId,
) -> Result<()> {
    match owner {
        PropertyOwner::Node(id) => access.nodes.get_or_load(id)?.first_property = head,
        PropertyOwner::Relationship(id) => {
            access.relationships.get_or_load(id)?.first_property = head
        }
    }
    Ok(())
}

/// Property records of `owner`'s chain, head first
pub fn chain_records(
    access: &mut RecordAccessSet,
    owner: PropertyOwner,
) -> Result<Vec<PropertyRecord>> {
    let mut records = Vec::new();
    let mut seen = HashSet::new();
    let mut current = first_property(access, owner)?;
    while let Some(id) = current.get() {
        if !seen.insert(id) {
            return Err(Error::corruption(format!(
                "property chain of {} loops back to record {}",
                owner, id
            )));
        }
        let record = access.properties.get(id).map_err(|e| match e {
            Error::NotFound(_) => Error::corruption(format!(
                "property chain of {} points to missing record {}",
                owner, id
            )),
            other => other,
        })?;
        current = record.next;
        records.push(record);
    }
    Ok(records)
}

/// Unlink and delete an empty property record
fn unlink(
    access: &mut RecordAccessSet,
    owner: PropertyOwner,
    record: &PropertyRecord,
) -> Result<()> {
    match record.prev.get() {
        Some(prev) => access.properties.get_or_load(prev)?.next = record.next,
        None => set_first_property(access, owner, record.next)?,
    }
    if let Some(next) = record.next.get() {
        access.properties.get_or_load(next)?.prev = record.prev;
    }
    access.properties.delete(record.id)
}

/// Remove `key` from `owner`, releasing its dynamic records
///
/// Returns the removed value, or `None` when the key was not set.
pub fn remove_property(
    access: &mut RecordAccessSet,
    owner: PropertyOwner,
    key: u32,
) -> Result<Option<Value>> {
    for record in chain_records(access, owner)? {
        let Some(block) = record.block(key).cloned() else {
            continue;
        };
        let value = decode_value(&block, dynamic(access))?;
        reclaim_value(&block, dynamic(access))?;

        let stored = access.properties.get_or_load(record.id)?;
        stored.remove_block(key);
        if stored.blocks.is_empty() {
            let emptied = stored.clone();
            unlink(access, owner, &emptied)?;
        }
        return Ok(Some(value));
    }
    Ok(None)
}

/// Set `key` on `owner`, replacing any previous value
pub fn set_property(
    access: &mut RecordAccessSet,
    owner: PropertyOwner,
    key: u32,
    value: &Value,
) -> Result<()> {
    // A missing owner or an unencodable value fails before the old block goes
    first_property(access, owner)?;
    let block = encode_value(key, value, dynamic(access))?;
    remove_property(access, owner, key)?;

    for record in chain_records(access, owner)? {
        if record.has_room_for(block.len()) {
            access.properties.get_or_load(record.id)?.blocks.push(block);
            return Ok(());
        }
    }

    let head = first_property(access, owner)?;
    let created = access.properties.create_new()?;
    created.next = head;
    created.blocks.push(block);
    let created_id = created.id;
    if let Some(old_head) = head.get() {
        access.properties.get_or_load(old_head)?.prev = RecordId::new(created_id);
    }
    set_first_property(access, owner, RecordId::new(created_id))
}

/// Value of `key` on `owner`
pub fn get_property(
    access: &mut RecordAccessSet,
    owner: PropertyOwner,
    key: u32,
) -> Result<Option<Value>> {
    for record in chain_records(access, owner)? {
        if let Some(block) = record.block(key) {
            return decode_value(block, dynamic(access)).map(Some);
        }
    }
    Ok(None)
}

pub fn has_property(access: &mut RecordAccessSet, owner: PropertyOwner, key: u32) -> Result<bool> {
    Ok(chain_records(access, owner)?
        .iter()
        .any(|record| record.block(key).is_some()))
}

/// Every `(key, value)` of `owner`, sorted by key
pub fn properties(
    access: &mut RecordAccessSet,
    owner: PropertyOwner,
) -> Result<Vec<(u32, Value)>> {
    let mut all = Vec::new();
    for record in chain_records(access, owner)? {
        for block in &record.blocks {
            all.push((block.key(), decode_value(block, dynamic(access))?));
        }
    }
    all.sort_by_key(|(key, _)| *key);
    Ok(all)
}

/// Delete `owner`'s whole chain and its dynamic records
pub fn delete_all(access: &mut RecordAccessSet, owner: PropertyOwner) -> Result<usize> {
    let records = chain_records(access, owner)?;
    for record in &records {
        for block in &record.blocks {
            reclaim_value(block, dynamic(access))?;
        }
        access.properties.delete(record.id)?;
    }
    if !records.is_empty() {
        set_first_property(access, owner, RecordId::NULL)?;
    }
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GraphStore;
    use crate::StoreConfig;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GraphStore) {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::open(dir.path(), StoreConfig::default()).unwrap();
        (dir, store)
    }

    fn new_node(access: &mut RecordAccessSet) -> PropertyOwner {
        let id = access.nodes.create_new().unwrap().id;
        PropertyOwner::Node(id)
    }

    #[test]
    fn test_set_get_replace() {
        let (_dir, store) = setup();
        let mut access = store.record_access();
        let node = new_node(&mut access);

        set_property(&mut access, node, 1, &Value::Int(11)).unwrap();
        set_property(&mut access, node, 2, &Value::from("test")).unwrap();
        assert_eq!(get_property(&mut access, node, 1).unwrap(), Some(Value::Int(11)));

        set_property(&mut access, node, 1, &Value::Long(1 << 50)).unwrap();
        assert_eq!(get_property(&mut access, node, 1).unwrap(), Some(Value::Long(1 << 50)));
        assert_eq!(properties(&mut access, node).unwrap().len(), 2);
        assert!(has_property(&mut access, node, 2).unwrap());
        assert!(!has_property(&mut access, node, 3).unwrap());
    }

    #[test]
    fn test_chain_grows_and_shrinks() {
        let (_dir, store) = setup();
        let mut access = store.record_access();
        let node = new_node(&mut access);

        // Doubles take two words, so two fit per record
        for key in 0..5 {
            set_property(&mut access, node, key, &Value::Double(key as f64)).unwrap();
        }
        assert_eq!(chain_records(&mut access, node).unwrap().len(), 3);

        for key in 0..4 {
            assert_eq!(
                remove_property(&mut access, node, key).unwrap(),
                Some(Value::Double(key as f64))
            );
        }
        let records = chain_records(&mut access, node).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].prev.is_null());
        assert!(records[0].next.is_null());
        assert_eq!(remove_property(&mut access, node, 0).unwrap(), None);
    }

    #[test]
    fn test_replacing_releases_dynamic_records() {
        let (_dir, store) = setup();
        let mut access = store.record_access();
        let node = new_node(&mut access);

        set_property(&mut access, node, 1, &Value::String("x".repeat(500))).unwrap();
        access.commit().unwrap();
        let high = store.stores().strings.high_id();
        assert_eq!(high, 5);

        set_property(&mut access, node, 1, &Value::Int(0)).unwrap();
        access.commit().unwrap();
        assert_eq!(store.stores().strings.free_count(), 5);
    }

    #[test]
    fn test_null_value_leaves_chain_untouched() {
        let (_dir, store) = setup();
        let mut access = store.record_access();
        let node = new_node(&mut access);
        set_property(&mut access, node, 1, &Value::Int(1)).unwrap();

        let err = set_property(&mut access, node, 1, &Value::Null).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(get_property(&mut access, node, 1).unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn test_delete_all() {
        let (_dir, store) = setup();
        let mut access = store.record_access();
        let node = new_node(&mut access);
        for key in 0..6 {
            set_property(&mut access, node, key, &Value::Int(key as i32)).unwrap();
        }
        assert_eq!(delete_all(&mut access, node).unwrap(), 2);
        assert!(properties(&mut access, node).unwrap().is_empty());
    }

    #[test]
    fn test_missing_owner() {
        let (_dir, store) = setup();
        let mut access = store.record_access();
        assert!(matches!(
            set_property(&mut access, PropertyOwner::Node(42), 1, &Value::Int(1)),
            Err(Error::NotFound(_))
        ));
    }
}
