//! Relationship groups of dense nodes
//!
//! A dense node's anchor points at a singly-linked list of groups, one per
//! relationship type, in ascending type order.

use super::chain::ChainKind;
use crate::storage::format::GroupRecord;
use crate::storage::record::RecordId;
use crate::storage::RecordAccessSet;
use crate::{Error, Result};
use std::collections::HashSet;

/// Groups of dense `node`, in type order
pub(crate) fn groups(access: &mut RecordAccessSet, node: u64) -> Result<Vec<GroupRecord>> {
    let mut current = access.nodes.get(node)?.relationship_anchor;
    let mut seen = HashSet::new();
    let mut groups = Vec::new();
    while let Some(id) = current.get() {
        if !seen.insert(id) {
            return Err(Error::corruption(format!(
                "group chain of node {} loops back to group {}",
                node, id
            )));
        }
        let group = access.groups.get(id).map_err(|e| match e {
            Error::NotFound(_) => Error::corruption(format!(
                "group chain of node {} points to missing group {}",
                node, id
            )),
            other => other,
        })?;
        if group.owning_node != node {
            return Err(Error::corruption(format!(
                "group {} in the chain of node {} is owned by node {}",
                id, node, group.owning_node
            )));
        }
        current = group.next_group;
        groups.push(group);
    }
    Ok(groups)
}

/// Group of `rel_type` on dense `node`
pub(crate) fn find(
    access: &mut RecordAccessSet,
    node: u64,
    rel_type: u32,
) -> Result<Option<GroupRecord>> {
    Ok(groups(access, node)?
        .into_iter()
        .find(|group| group.rel_type == rel_type))
}

/// Id of the group of `rel_type` on dense `node`, creating it in type order
pub(crate) fn find_or_create(
    access: &mut RecordAccessSet,
    node: u64,
    rel_type: u32,
) -> Result<u64> {
    let mut prev: Option<GroupRecord> = None;
    for group in groups(access, node)? {
        if group.rel_type == rel_type {
            return Ok(group.id);
        }
        if group.rel_type > rel_type {
            break;
        }
        prev = Some(group);
    }

    let next = match &prev {
        Some(prev) => prev.next_group,
        None => access.nodes.get(node)?.relationship_anchor,
    };
    let created = access.groups.create_new()?;
    created.rel_type = rel_type;
    created.owning_node = node;
    created.next_group = next;
    let id = created.id;

    match prev {
        Some(prev) => access.groups.get_or_load(prev.id)?.next_group = RecordId::new(id),
        None => access.nodes.get_or_load(node)?.relationship_anchor = RecordId::new(id),
    }
    Ok(id)
}

/// Unlink group `id` from `node`'s group list and delete it
pub(crate) fn remove(access: &mut RecordAccessSet, node: u64, id: u64) -> Result<()> {
    let all = groups(access, node)?;
    let index = all
        .iter()
        .position(|group| group.id == id)
        .ok_or_else(|| Error::corruption(format!("group {} not linked from node {}", id, node)))?;
    let next = all[index].next_group;
    match index.checked_sub(1) {
        Some(prev) => access.groups.get_or_load(all[prev].id)?.next_group = next,
        None => access.nodes.get_or_load(node)?.relationship_anchor = next,
    }
    access.groups.delete(id)
}

/// Cached counter for one sub-chain
pub(crate) fn count(group: &GroupRecord, kind: ChainKind) -> u32 {
    match kind {
        ChainKind::Outgoing => group.out_count,
        ChainKind::Incoming => group.in_count,
        ChainKind::Loop => group.loop_count,
    }
}

/// Head of one sub-chain
pub(crate) fn first(group: &GroupRecord, kind: ChainKind) -> RecordId {
    match kind {
        ChainKind::Outgoing => group.first_out,
        ChainKind::Incoming => group.first_in,
        ChainKind::Loop => group.first_loop,
    }
}

/// Add `delta` to one sub-chain counter
pub(crate) fn adjust_count(group: &mut GroupRecord, kind: ChainKind, delta: i64) -> Result<()> {
    let id = group.id;
    let counter = match kind {
        ChainKind::Outgoing => &mut group.out_count,
        ChainKind::Incoming => &mut group.in_count,
        ChainKind::Loop => &mut group.loop_count,
    };
    let updated = i64::from(*counter) + delta;
    *counter = u32::try_from(updated).map_err(|_| {
        Error::corruption(format!(
            "{:?} count of group {} would become {}",
            kind, id, updated
        ))
    })?;
    Ok(())
}
