//! Dynamic record chains
//!
//! Payloads larger than a fixed-size field (long strings, arrays, label
//! overflow, token names) are split across a singly-linked chain of dynamic
//! records. A payload of `n` bytes occupies exactly `ceil(n / capacity)`
//! records, each full except possibly the last.

use super::access::RecordAccess;
use super::format::DynamicFormat;
use super::record::{RecordFormat, RecordId};
use crate::{Error, Result};
use std::collections::HashSet;

/// Records needed for `len` payload bytes
pub fn records_needed(len: usize, capacity: usize) -> usize {
    len.div_ceil(capacity)
}

/// Write `bytes` as a new chain and return its head; empty payloads are null
pub fn allocate_chain(access: &mut RecordAccess<DynamicFormat>, bytes: &[u8]) -> Result<RecordId> {
    if bytes.is_empty() {
        return Ok(RecordId::NULL);
    }
    let capacity = access.store().format().data_capacity();
    let mut ids = Vec::with_capacity(records_needed(bytes.len(), capacity));
    for _ in 0..records_needed(bytes.len(), capacity) {
        ids.push(access.store().next_id()?);
    }

    for (index, chunk) in bytes.chunks(capacity).enumerate() {
        let record = access.create(ids[index]);
        record.start_of_chain = index == 0;
        record.data = chunk.to_vec();
        record.next = ids
            .get(index + 1)
            .map_or(RecordId::NULL, |&next| RecordId::new(next));
    }
    Ok(RecordId::new(ids[0]))
}

/// Ids of the chain starting at `head`, validating its shape
///
/// A chain must start at a start-of-chain record, visit only in-use records,
/// and terminate without revisiting a record.
pub fn chain_ids(access: &mut RecordAccess<DynamicFormat>, head: RecordId) -> Result<Vec<u64>> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut current = head;
    while let Some(id) = current.get() {
        if !seen.insert(id) {
            return Err(Error::corruption(format!(
                "{} chain at {} loops back to record {}",
                access.store().format().name(),
                head,
                id
            )));
        }
        let record = access.get(id).map_err(|e| match e {
            Error::NotFound(_) => Error::corruption(format!(
                "{} chain at {} points to missing record {}",
                access.store().format().name(),
                head,
                id
            )),
            other => other,
        })?;
        if ids.is_empty() && !record.start_of_chain {
            return Err(Error::corruption(format!(
                "{} record {} is not the start of a chain",
                access.store().format().name(),
                id
            )));
        }
        ids.push(id);
        current = record.next;
    }
    Ok(ids)
}

/// Concatenated payload of the chain starting at `head`
pub fn read_chain(access: &mut RecordAccess<DynamicFormat>, head: RecordId) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for id in chain_ids(access, head)? {
        bytes.extend_from_slice(&access.get(id)?.data);
    }
    Ok(bytes)
}

/// Delete every record of the chain starting at `head`; returns how many
pub fn reclaim_chain(access: &mut RecordAccess<DynamicFormat>, head: RecordId) -> Result<usize> {
    let ids = chain_ids(access, head)?;
    for &id in &ids {
        access.delete(id)?;
    }
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::RecordStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn access(dir: &TempDir, block_size: usize) -> RecordAccess<DynamicFormat> {
        let format = DynamicFormat::new("string", block_size).unwrap();
        let store = RecordStore::open(dir.path().join("strings.store"), format, 512, 8).unwrap();
        RecordAccess::new(Arc::new(store))
    }

    #[test]
    fn test_record_count_is_exact() {
        let dir = TempDir::new().unwrap();
        let mut access = access(&dir, 128);
        for (len, expected) in [(1usize, 1usize), (120, 1), (121, 2), (240, 2), (241, 3)] {
            let head = allocate_chain(&mut access, &vec![b'x'; len]).unwrap();
            assert_eq!(chain_ids(&mut access, head).unwrap().len(), expected, "len {}", len);
        }
    }

    #[test]
    fn test_round_trip_across_commit() {
        let dir = TempDir::new().unwrap();
        let mut access = access(&dir, 16);
        let payload: Vec<u8> = (0..50u8).collect();
        let head = allocate_chain(&mut access, &payload).unwrap();
        access.commit().unwrap();
        assert_eq!(read_chain(&mut access, head).unwrap(), payload);
    }

    #[test]
    fn test_empty_payload_is_null() {
        let dir = TempDir::new().unwrap();
        let mut access = access(&dir, 16);
        let head = allocate_chain(&mut access, &[]).unwrap();
        assert!(head.is_null());
        assert!(read_chain(&mut access, head).unwrap().is_empty());
    }

    #[test]
    fn test_reclaim_frees_every_record() {
        let dir = TempDir::new().unwrap();
        let mut access = access(&dir, 16);
        let head = allocate_chain(&mut access, &[1u8; 30]).unwrap();
        access.commit().unwrap();
        assert_eq!(reclaim_chain(&mut access, head).unwrap(), 4);
        access.commit().unwrap();
        assert_eq!(access.store().free_ids(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_cycle_is_corruption() {
        let dir = TempDir::new().unwrap();
        let mut access = access(&dir, 16);
        let head = allocate_chain(&mut access, &[1u8; 20]).unwrap();
        access.get_or_load(1).unwrap().next = head;
        assert!(matches!(
            read_chain(&mut access, head),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_dangling_next_is_corruption() {
        let dir = TempDir::new().unwrap();
        let mut access = access(&dir, 16);
        let head = allocate_chain(&mut access, &[1u8; 4]).unwrap();
        access.get_or_load(0).unwrap().next = RecordId::new(40);
        assert!(matches!(
            read_chain(&mut access, head),
            Err(Error::Corruption(_))
        ));
    }
}
