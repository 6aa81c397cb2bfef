//! Node labels
//!
//! A node's labels are kept sorted and free of duplicates in its 40-bit
//! label field:
//!
//! ```text
//! bit  39       dynamic flag
//! dynamic:      bits 0..36 = head of a chain in node_labels.store holding
//!               the ids as little-endian u32s
//! inline:       bits 36..39 = count n (at most 7), bits 0..36 = the ids
//!               packed at 36 / n bits each
//! ```
//!
//! Label sets that do not pack inline move to a dynamic chain, and the chain
//! is reclaimed as soon as the set shrinks back inline or the node goes.

use crate::property::bits::mask;
use crate::storage::dynamic::{allocate_chain, read_chain, reclaim_chain};
use crate::storage::format::LabelField;
use crate::storage::record::DYNAMIC_ID_BITS;
use crate::storage::{RecordAccessSet, RecordId};
use crate::token::LABEL_ID_BITS;
use crate::{Error, Result};

const DYNAMIC_FLAG: u64 = 1 << 39;
const COUNT_SHIFT: u32 = 36;
const INLINE_BITS: u32 = 36;
const MAX_INLINE: usize = 7;

/// Largest label token id
pub const MAX_LABEL_ID: u32 = (1 << LABEL_ID_BITS) - 1;

fn is_dynamic(field: LabelField) -> bool {
    field.0 & DYNAMIC_FLAG != 0
}

fn dynamic_head(field: LabelField) -> RecordId {
    let head = field.0 & mask(DYNAMIC_ID_BITS);
    if head == mask(DYNAMIC_ID_BITS) {
        RecordId::NULL
    } else {
        RecordId::new(head)
    }
}

/// Pack sorted `labels` into an inline field, if they fit
fn pack_inline(labels: &[u32]) -> Option<LabelField> {
    let count = labels.len();
    if count == 0 {
        return Some(LabelField::EMPTY);
    }
    if count > MAX_INLINE {
        return None;
    }
    let width = INLINE_BITS / count as u32;
    let mut field = (count as u64) << COUNT_SHIFT;
    for (index, &label) in labels.iter().enumerate() {
        if u64::from(label) > mask(width) {
            return None;
        }
        field |= u64::from(label) << (index as u32 * width);
    }
    Some(LabelField(field))
}

fn unpack_inline(field: LabelField) -> Vec<u32> {
    let count = ((field.0 >> COUNT_SHIFT) & 0x07) as u32;
    if count == 0 {
        return Vec::new();
    }
    let width = INLINE_BITS / count;
    (0..count)
        .map(|index| ((field.0 >> (index * width)) & mask(width)) as u32)
        .collect()
}

fn to_bytes(labels: &[u32]) -> Vec<u8> {
    labels.iter().flat_map(|label| label.to_le_bytes()).collect()
}

fn from_bytes(node: u64, bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::corruption(format!(
            "label chain of node {} holds {} bytes",
            node,
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Sorted label ids of `node`
pub fn labels(access: &mut RecordAccessSet, node: u64) -> Result<Vec<u32>> {
    let field = access.nodes.get(node)?.label_field;
    if is_dynamic(field) {
        let bytes = read_chain(&mut access.labels, dynamic_head(field))?;
        from_bytes(node, &bytes)
    } else {
        Ok(unpack_inline(field))
    }
}

pub fn has_label(access: &mut RecordAccessSet, node: u64, label: u32) -> Result<bool> {
    Ok(labels(access, node)?.binary_search(&label).is_ok())
}

/// Replace the labels of `node`
pub fn set_labels(access: &mut RecordAccessSet, node: u64, new_labels: &[u32]) -> Result<()> {
    if let Some(&bad) = new_labels.iter().find(|&&label| label > MAX_LABEL_ID) {
        return Err(Error::invalid_argument(format!(
            "label id {} exceeds {}",
            bad, MAX_LABEL_ID
        )));
    }
    let mut sorted = new_labels.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    clear_labels(access, node)?;
    let field = match pack_inline(&sorted) {
        Some(field) => field,
        None => {
            let head = allocate_chain(&mut access.labels, &to_bytes(&sorted))?;
            LabelField(DYNAMIC_FLAG | (head.raw() & mask(DYNAMIC_ID_BITS)))
        }
    };
    access.nodes.get_or_load(node)?.label_field = field;
    Ok(())
}

/// Add one label; returns false when the node already had it
pub fn add_label(access: &mut RecordAccessSet, node: u64, label: u32) -> Result<bool> {
    let mut current = labels(access, node)?;
    if current.binary_search(&label).is_ok() {
        return Ok(false);
    }
    current.push(label);
    set_labels(access, node, &current)?;
    Ok(true)
}

/// Remove one label; returns false when the node did not have it
pub fn remove_label(access: &mut RecordAccessSet, node: u64, label: u32) -> Result<bool> {
    let mut current = labels(access, node)?;
    let Ok(index) = current.binary_search(&label) else {
        return Ok(false);
    };
    current.remove(index);
    set_labels(access, node, &current)?;
    Ok(true)
}

/// Drop every label of `node`, reclaiming a dynamic chain
pub fn clear_labels(access: &mut RecordAccessSet, node: u64) -> Result<()> {
    let field = access.nodes.get(node)?.label_field;
    if is_dynamic(field) {
        reclaim_chain(&mut access.labels, dynamic_head(field))?;
    }
    if field != LabelField::EMPTY {
        access.nodes.get_or_load(node)?.label_field = LabelField::EMPTY;
    }
    Ok(())
}

/// Snapshot of the in-use nodes carrying `label`, ascending by id
///
/// Buffered changes of `access` are taken into account; nodes created or
/// relabelled after the call do not appear.
pub fn nodes_with_label(
    access: &mut RecordAccessSet,
    label: u32,
) -> Result<std::vec::IntoIter<u64>> {
    let live: Vec<u64> = access.nodes.store().live_ids().collect();
    let mut found = Vec::new();
    for id in live {
        match access.nodes.peek(id)? {
            Some(record) if record.in_use => {
                if has_label(access, id, label)? {
                    found.push(id);
                }
            }
            _ => {}
        }
    }
    Ok(found.into_iter())
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

    #[test]
    fn test_inline_packing_widths() {
        assert_eq!(pack_inline(&[MAX_LABEL_ID]).map(unpack_inline), Some(vec![MAX_LABEL_ID]));
        assert!(pack_inline(&[1, 1 << 18]).is_none());
        let seven = [0, 3, 7, 11, 19, 23, 31];
        assert_eq!(pack_inline(&seven).map(unpack_inline), Some(seven.to_vec()));
        assert!(pack_inline(&[0, 1, 2, 3, 4, 5, 6, 7]).is_none());
    }

    #[test]
    fn test_labels_sorted_and_deduplicated() {
        let (_dir, store) = setup();
        let mut access = store.record_access();
        let node = access.nodes.create_new().unwrap().id;

        set_labels(&mut access, node, &[5, 1, 5, 3]).unwrap();
        assert_eq!(labels(&mut access, node).unwrap(), vec![1, 3, 5]);
        assert!(has_label(&mut access, node, 3).unwrap());
        assert!(!add_label(&mut access, node, 1).unwrap());
        assert!(remove_label(&mut access, node, 1).unwrap());
        assert_eq!(labels(&mut access, node).unwrap(), vec![3, 5]);
    }

    #[test]
    fn test_dynamic_labels_are_reclaimed() {
        let (_dir, store) = setup();
        let mut access = store.record_access();
        let node = access.nodes.create_new().unwrap().id;

        let many: Vec<u32> = (0..20).map(|i| i * 1000).collect();
        set_labels(&mut access, node, &many).unwrap();
        assert!(is_dynamic(access.nodes.get(node).unwrap().label_field));
        assert_eq!(labels(&mut access, node).unwrap(), many);
        access.commit().unwrap();
        let used = store.stores().node_labels.high_id();
        assert!(used > 0);

        set_labels(&mut access, node, &[2]).unwrap();
        access.commit().unwrap();
        assert_eq!(store.stores().node_labels.free_count() as u64, used);
        assert_eq!(labels(&mut access, node).unwrap(), vec![2]);
    }

    #[test]
    fn test_nodes_with_label_is_a_snapshot() {
        let (_dir, store) = setup();
        let mut access = store.record_access();
        let mut ids = Vec::new();
        for i in 0..5u32 {
            let id = access.nodes.create_new().unwrap().id;
            set_labels(&mut access, id, &[i % 2]).unwrap();
            ids.push(id);
        }

        let open = nodes_with_label(&mut access, 0).unwrap();
        let extra = access.nodes.create_new().unwrap().id;
        set_labels(&mut access, extra, &[0]).unwrap();
        remove_label(&mut access, ids[0], 0).unwrap();

        assert_eq!(open.collect::<Vec<_>>(), vec![ids[0], ids[2], ids[4]]);
        assert_eq!(
            nodes_with_label(&mut access, 0).unwrap().collect::<Vec<_>>(),
            vec![ids[2], ids[4], extra]
        );
    }

    #[test]
    fn test_nodes_with_label_skips_unallocated_ranges() {
        let (_dir, store) = setup();
        let mut access = store.record_access();
        let low = access.nodes.create_new().unwrap().id;
        set_labels(&mut access, low, &[4]).unwrap();
        access.commit().unwrap();

        store.stores().nodes.set_high_id(1 << 33).unwrap();
        let far = access.nodes.create_new().unwrap().id;
        assert_eq!(far, 1 << 33);
        set_labels(&mut access, far, &[4]).unwrap();

        let start = std::time::Instant::now();
        let found: Vec<u64> = nodes_with_label(&mut access, 4).unwrap().collect();
        assert_eq!(found, vec![low, far]);
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_oversized_label_ids() {
        let (_dir, store) = setup();
        let mut access = store.record_access();
        let node = access.nodes.create_new().unwrap().id;
        assert!(matches!(
            set_labels(&mut access, node, &[u32::MAX]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
