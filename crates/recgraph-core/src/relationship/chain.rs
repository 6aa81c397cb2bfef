//! Doubly-linked relationship chains
//!
//! A chain is threaded through relationship records using the link set of
//! one node: `start_*` links when the node is the start, `end_*` links when
//! it is the end. The head pointer lives either in a sparse node's anchor or
//! in one of a group's three sub-chain fields.

use crate::storage::format::RelationshipRecord;
use crate::storage::record::RecordId;
use crate::storage::RecordAccessSet;
use crate::{Error, Result};
use std::collections::HashSet;

/// Sub-chain of a relationship group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Outgoing,
    Incoming,
    Loop,
}

impl ChainKind {
    /// Sub-chain `record` belongs to in `node`'s groups
    pub fn of(record: &RelationshipRecord, node: u64) -> Self {
        if record.is_loop() {
            ChainKind::Loop
        } else if record.start_node == node {
            ChainKind::Outgoing
        } else {
            ChainKind::Incoming
        }
    }
}

/// Where a chain's head pointer is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChainHead {
    /// Anchor of a sparse node
    Node(u64),
    /// Sub-chain of a group
    Group(u64, ChainKind),
}

pub(crate) fn head(access: &mut RecordAccessSet, at: ChainHead) -> Result<RecordId> {
    Ok(match at {
        ChainHead::Node(node) => access.nodes.get(node)?.relationship_anchor,
        ChainHead::Group(group, kind) => {
            let group = access.groups.get(group)?;
            match kind {
                ChainKind::Outgoing => group.first_out,
                ChainKind::Incoming => group.first_in,
                ChainKind::Loop => group.first_loop,
            }
        }
    })
}

fn set_head(access: &mut RecordAccessSet, at: ChainHead, first: RecordId) -> Result<()> {
    match at {
        ChainHead::Node(node) => access.nodes.get_or_load(node)?.relationship_anchor = first,
        ChainHead::Group(group, kind) => {
            let group = access.groups.get_or_load(group)?;
            match kind {
                ChainKind::Outgoing => group.first_out = first,
                ChainKind::Incoming => group.first_in = first,
                ChainKind::Loop => group.first_loop = first,
            }
        }
    }
    Ok(())
}

/// Insert `relationship` at the head of `node`'s chain at `at`
pub(crate) fn link_at_head(
    access: &mut RecordAccessSet,
    node: u64,
    at: ChainHead,
    relationship: u64,
) -> Result<()> {
    let old_head = head(access, at)?;
    let record = access.relationships.get_or_load(relationship)?;
    record.set_prev_for(node, RecordId::NULL);
    record.set_next_for(node, old_head);
    record.set_first_for(node, true);

    if let Some(old) = old_head.get() {
        let old = access.relationships.get_or_load(old)?;
        old.set_prev_for(node, RecordId::new(relationship));
        old.set_first_for(node, false);
    }
    set_head(access, at, RecordId::new(relationship))
}

/// Take `relationship` out of `node`'s chain at `at`
pub(crate) fn unlink(
    access: &mut RecordAccessSet,
    node: u64,
    at: ChainHead,
    relationship: u64,
) -> Result<()> {
    let (prev, next) = access.relationships.get(relationship)?.links_for(node);
    match prev.get() {
        Some(prev) => access.relationships.get_or_load(prev)?.set_next_for(node, next),
        None => set_head(access, at, next)?,
    }
    if let Some(next) = next.get() {
        let next = access.relationships.get_or_load(next)?;
        next.set_prev_for(node, prev);
        if prev.is_null() {
            next.set_first_for(node, true);
        }
    }

    let record = access.relationships.get_or_load(relationship)?;
    record.set_prev_for(node, RecordId::NULL);
    record.set_next_for(node, RecordId::NULL);
    record.set_first_for(node, false);
    Ok(())
}

/// Lazy walk over one chain of `node`
///
/// Every step validates that the record exists, touches `node`, and has not
/// been visited before.
pub(crate) struct ChainCursor {
    node: u64,
    next: RecordId,
    seen: HashSet<u64>,
}

impl ChainCursor {
    pub(crate) fn new(node: u64, head: RecordId) -> Self {
        Self {
            node,
            next: head,
            seen: HashSet::new(),
        }
    }

    pub(crate) fn advance(
        &mut self,
        access: &mut RecordAccessSet,
    ) -> Result<Option<RelationshipRecord>> {
        let Some(id) = self.next.get() else {
            return Ok(None);
        };
        if !self.seen.insert(id) {
            return Err(Error::corruption(format!(
                "relationship chain of node {} loops back to {}",
                self.node, id
            )));
        }
        let record = access.relationships.get(id).map_err(|e| match e {
            Error::NotFound(_) => Error::corruption(format!(
                "relationship chain of node {} points to missing relationship {}",
                self.node, id
            )),
            other => other,
        })?;
        if record.start_node != self.node && record.end_node != self.node {
            return Err(Error::corruption(format!(
                "relationship {} in the chain of node {} connects {} and {}",
                id, self.node, record.start_node, record.end_node
            )));
        }
        self.next = record.next_for(self.node);
        Ok(Some(record))
    }
}

/// Every record of `node`'s chain starting at `head`
pub(crate) fn walk(
    access: &mut RecordAccessSet,
    node: u64,
    head: RecordId,
) -> Result<Vec<RelationshipRecord>> {
    let mut cursor = ChainCursor::new(node, head);
    let mut records = Vec::new();
    while let Some(record) = cursor.advance(access)? {
        records.push(record);
    }
    Ok(records)
}
