//! Relationship creation, deletion and queries over sparse and dense nodes

use super::chain::{self, ChainCursor, ChainHead, ChainKind};
use super::group;
use super::{Direction, Relationship, Relationships};
use crate::property::chain::{delete_all, PropertyOwner};
use crate::storage::format::{RelationshipRecord, MAX_RELATIONSHIP_TYPE};
use crate::storage::{RecordAccessSet, RecordId};
use crate::{Error, Result};

/// Distinct endpoints of a relationship; a loop has one
fn endpoints(record: &RelationshipRecord) -> impl Iterator<Item = u64> {
    let end = (!record.is_loop()).then_some(record.end_node);
    std::iter::once(record.start_node).chain(end)
}

fn type_matches(types: &[u32], rel_type: u32) -> bool {
    types.is_empty() || types.contains(&rel_type)
}

/// Relationships in a sparse node's single chain
fn sparse_degree(access: &mut RecordAccessSet, node: u64) -> Result<u64> {
    let head = chain::head(access, ChainHead::Node(node))?;
    let mut cursor = ChainCursor::new(node, head);
    let mut degree = 0;
    while cursor.advance(access)?.is_some() {
        degree += 1;
    }
    Ok(degree)
}

/// Create a relationship and link it into both endpoints
///
/// An endpoint whose degree would exceed `dense_threshold` is converted to
/// the grouped representation first.
pub fn create_relationship(
    access: &mut RecordAccessSet,
    start_node: u64,
    end_node: u64,
    rel_type: u32,
    dense_threshold: u32,
) -> Result<u64> {
    if rel_type > MAX_RELATIONSHIP_TYPE {
        return Err(Error::invalid_argument(format!(
            "relationship type {} exceeds {}",
            rel_type, MAX_RELATIONSHIP_TYPE
        )));
    }
    access.nodes.get(start_node)?;
    access.nodes.get(end_node)?;

    let record = access.relationships.create_new()?;
    record.start_node = start_node;
    record.end_node = end_node;
    record.rel_type = rel_type;
    let id = record.id;
    let record = record.clone();

    for node in endpoints(&record) {
        connect(access, node, &record, dense_threshold)?;
    }
    Ok(id)
}

fn connect(
    access: &mut RecordAccessSet,
    node: u64,
    record: &RelationshipRecord,
    dense_threshold: u32,
) -> Result<()> {
    let mut is_dense = access.nodes.get(node)?.is_dense;
    if !is_dense && sparse_degree(access, node)? + 1 > u64::from(dense_threshold) {
        convert_to_dense(access, node)?;
        is_dense = true;
    }

    if is_dense {
        link_into_group(access, node, record)
    } else {
        chain::link_at_head(access, node, ChainHead::Node(node), record.id)
    }
}

fn link_into_group(
    access: &mut RecordAccessSet,
    node: u64,
    record: &RelationshipRecord,
) -> Result<()> {
    let group_id = group::find_or_create(access, node, record.rel_type)?;
    let kind = ChainKind::of(record, node);
    chain::link_at_head(access, node, ChainHead::Group(group_id, kind), record.id)?;
    group::adjust_count(access.groups.get_or_load(group_id)?, kind, 1)
}

/// Switch a sparse node to per-type groups
///
/// Each relationship keeps its relative order within its new sub-chain.
/// Dense nodes never go back to sparse.
pub fn convert_to_dense(access: &mut RecordAccessSet, node: u64) -> Result<()> {
    let record = access.nodes.get(node)?;
    if record.is_dense {
        return Ok(());
    }
    let relationships = chain::walk(access, node, record.relationship_anchor)?;

    let stored = access.nodes.get_or_load(node)?;
    stored.is_dense = true;
    stored.relationship_anchor = RecordId::NULL;

    for relationship in relationships.iter().rev() {
        link_into_group(access, node, relationship)?;
    }
    tracing::debug!(node, relationships = relationships.len(), "converted node to dense");
    Ok(())
}

fn disconnect(access: &mut RecordAccessSet, node: u64, record: &RelationshipRecord) -> Result<()> {
    if !access.nodes.get(node)?.is_dense {
        return chain::unlink(access, node, ChainHead::Node(node), record.id);
    }

    let group = group::find(access, node, record.rel_type)?.ok_or_else(|| {
        Error::corruption(format!(
            "dense node {} has no group for type {} of relationship {}",
            node, record.rel_type, record.id
        ))
    })?;
    let kind = ChainKind::of(record, node);
    chain::unlink(access, node, ChainHead::Group(group.id, kind), record.id)?;
    let stored = access.groups.get_or_load(group.id)?;
    group::adjust_count(stored, kind, -1)?;
    if stored.total_count() == 0 {
        group::remove(access, node, group.id)?;
    }
    Ok(())
}

/// Unlink a relationship from both endpoints and delete it with its properties
pub fn delete_relationship(access: &mut RecordAccessSet, id: u64) -> Result<()> {
    let record = access.relationships.get(id)?;
    for node in endpoints(&record) {
        disconnect(access, node, &record)?;
    }
    delete_all(access, PropertyOwner::Relationship(id))?;
    access.relationships.delete(id)
}

/// Sub-chains that hold relationships in `direction`
fn kinds(direction: Direction) -> &'static [ChainKind] {
    match direction {
        Direction::Outgoing => &[ChainKind::Outgoing, ChainKind::Loop],
        Direction::Incoming => &[ChainKind::Incoming, ChainKind::Loop],
        Direction::Both => &[ChainKind::Outgoing, ChainKind::Incoming, ChainKind::Loop],
    }
}

/// Number of relationships of `node` with one of `types` (any when empty)
/// in `direction`
///
/// Loops count once in every direction. Dense nodes answer from their group
/// counters without walking any chain.
pub fn degree(
    access: &mut RecordAccessSet,
    node: u64,
    types: &[u32],
    direction: Direction,
) -> Result<u64> {
    if access.nodes.get(node)?.is_dense {
        let mut total = 0;
        for group in group::groups(access, node)? {
            if type_matches(types, group.rel_type) {
                for &kind in kinds(direction) {
                    total += u64::from(group::count(&group, kind));
                }
            }
        }
        return Ok(total);
    }

    let head = chain::head(access, ChainHead::Node(node))?;
    let mut cursor = ChainCursor::new(node, head);
    let mut total = 0;
    while let Some(record) = cursor.advance(access)? {
        if type_matches(types, record.rel_type) && direction.matches(&record, node) {
            total += 1;
        }
    }
    Ok(total)
}

/// Snapshot of `node`'s relationships with one of `types` (any when empty)
/// in `direction`
///
/// Dense nodes yield groups in type order, and within a group the outgoing,
/// incoming and loop sub-chains that `direction` selects.
pub fn get_relationships(
    access: &mut RecordAccessSet,
    node: u64,
    types: &[u32],
    direction: Direction,
) -> Result<Relationships> {
    let mut found = Vec::new();
    if access.nodes.get(node)?.is_dense {
        for group in group::groups(access, node)? {
            if !type_matches(types, group.rel_type) {
                continue;
            }
            for &kind in kinds(direction) {
                for record in chain::walk(access, node, group::first(&group, kind))? {
                    found.push(Relationship::from(&record));
                }
            }
        }
    } else {
        let head = chain::head(access, ChainHead::Node(node))?;
        for record in chain::walk(access, node, head)? {
            if type_matches(types, record.rel_type) && direction.matches(&record, node) {
                found.push(Relationship::from(&record));
            }
        }
    }
    Ok(Relationships::new(found))
}

/// Whether `node` has any relationship `get_relationships` would return
pub fn has_relationship(
    access: &mut RecordAccessSet,
    node: u64,
    types: &[u32],
    direction: Direction,
) -> Result<bool> {
    if access.nodes.get(node)?.is_dense {
        return Ok(group::groups(access, node)?.iter().any(|group| {
            type_matches(types, group.rel_type)
                && kinds(direction)
                    .iter()
                    .any(|&kind| group::count(group, kind) > 0)
        }));
    }
    let head = chain::head(access, ChainHead::Node(node))?;
    let mut cursor = ChainCursor::new(node, head);
    while let Some(record) = cursor.advance(access)? {
        if type_matches(types, record.rel_type) && direction.matches(&record, node) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Relationship types present on `node`, ascending
pub fn relationship_types(access: &mut RecordAccessSet, node: u64) -> Result<Vec<u32>> {
    let mut types: Vec<u32> = if access.nodes.get(node)?.is_dense {
        group::groups(access, node)?
            .iter()
            .map(|group| group.rel_type)
            .collect()
    } else {
        let head = chain::head(access, ChainHead::Node(node))?;
        chain::walk(access, node, head)?
            .iter()
            .map(|record| record.rel_type)
            .collect()
    };
    types.sort_unstable();
    types.dedup();
    Ok(types)
}
