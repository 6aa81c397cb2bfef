//! Consistency checking
//!
//! Walks every in-use record and reports what a reader would trip over:
//! dangling pointers, chains that loop or never terminate, relationships
//! linked into the wrong chain, groups with the wrong owner and degree
//! counters that disagree with their chains. The checker reads straight from
//! the stores and keeps only the report in memory.

use crate::engine::Stores;
use crate::property::codec::{decode_value, DynamicStores};
use crate::relationship::ChainKind;
use crate::storage::dynamic::{chain_ids, read_chain};
use crate::storage::format::{DynamicFormat, NodeRecord};
use crate::storage::record::DYNAMIC_ID_BITS;
use crate::storage::{RecordAccess, RecordFormat, RecordId, RecordStore};
use crate::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Findings past this many are counted but not kept
const MAX_FINDINGS: usize = 1000;

/// One inconsistency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub store: &'static str,
    pub id: u64,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.store, self.id, self.message)
    }
}

/// Result of a consistency check
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsistencyReport {
    /// In-use records visited
    pub records_checked: u64,
    pub findings: Vec<Finding>,
    /// Findings beyond the kept ones
    pub omitted: usize,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    fn report(&mut self, store: &'static str, id: u64, message: impl Into<String>) {
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(Finding {
                store,
                id,
                message: message.into(),
            });
        } else {
            self.omitted += 1;
        }
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "{} records checked, no inconsistencies", self.records_checked);
        }
        writeln!(
            f,
            "{} records checked, {} inconsistencies:",
            self.records_checked,
            self.findings.len() + self.omitted
        )?;
        for finding in &self.findings {
            writeln!(f, "  {}", finding)?;
        }
        if self.omitted > 0 {
            writeln!(f, "  ... and {} more", self.omitted)?;
        }
        Ok(())
    }
}

/// Check every store of a directory
pub fn check(stores: &Stores) -> Result<ConsistencyReport> {
    let mut checker = Checker {
        stores,
        report: ConsistencyReport::default(),
    };
    checker.check_nodes()?;
    checker.check_relationships()?;
    checker.check_groups()?;
    for store in [&stores.strings, &stores.arrays, &stores.node_labels] {
        checker.check_dynamic(store)?;
    }
    for holder in [&stores.labels, &stores.property_keys, &stores.relationship_types] {
        let (_, names) = holder.stores();
        checker.check_dynamic(names)?;
    }

    let report = checker.report;
    if report.is_clean() {
        tracing::info!(records = report.records_checked, "consistency check passed");
    } else {
        tracing::warn!(
            records = report.records_checked,
            findings = report.findings.len() + report.omitted,
            "consistency check found problems"
        );
    }
    Ok(report)
}

struct Checker<'a> {
    stores: &'a Stores,
    report: ConsistencyReport,
}

impl Checker<'_> {
    fn check_nodes(&mut self) -> Result<()> {
        let stores = self.stores;
        for node in stores.nodes.iter_in_use() {
            let node = node?;
            self.report.records_checked += 1;
            if node.is_dense {
                self.check_groups_of(&node)?;
            } else {
                self.walk_chain(node.id, node.relationship_anchor, None)?;
            }
            self.check_properties("node", node.id, node.first_property)?;
            self.check_labels(&node)?;
        }
        Ok(())
    }

    fn check_relationships(&mut self) -> Result<()> {
        let stores = self.stores;
        for relationship in stores.relationships.iter_in_use() {
            let relationship = relationship?;
            self.report.records_checked += 1;
            for node in [relationship.start_node, relationship.end_node] {
                if !stores.nodes.is_in_use(node)? {
                    self.report.report(
                        "relationship",
                        relationship.id,
                        format!("endpoint node {} is not in use", node),
                    );
                }
            }
            self.check_properties("relationship", relationship.id, relationship.first_property)?;
        }
        Ok(())
    }

    fn check_groups(&mut self) -> Result<()> {
        let stores = self.stores;
        for group in stores.groups.iter_in_use() {
            let group = group?;
            self.report.records_checked += 1;
            match stores.nodes.get(group.owning_node) {
                Ok(owner) if owner.is_dense => {}
                Ok(_) => self.report.report(
                    "relationship group",
                    group.id,
                    format!("owning node {} is not dense", group.owning_node),
                ),
                Err(_) => self.report.report(
                    "relationship group",
                    group.id,
                    format!("owning node {} is not in use", group.owning_node),
                ),
            }
        }
        Ok(())
    }

    /// Every chain starting in `store` must terminate
    fn check_dynamic(&mut self, store: &Arc<RecordStore<DynamicFormat>>) -> Result<()> {
        let name = store.format().name();
        for record in store.iter_in_use() {
            let record = record?;
            self.report.records_checked += 1;
            if !record.start_of_chain {
                continue;
            }
            let mut access = RecordAccess::new(store.clone());
            if let Err(e) = chain_ids(&mut access, RecordId::new(record.id)) {
                self.report.report(name, record.id, e.to_string());
            }
        }
        Ok(())
    }

    fn check_groups_of(&mut self, node: &NodeRecord) -> Result<()> {
        let mut seen = HashSet::new();
        let mut last_type = None;
        let mut current = node.relationship_anchor;
        while let Some(id) = current.get() {
            if !seen.insert(id) {
                self.report.report("node", node.id, format!("group chain loops back to {}", id));
                return Ok(());
            }
            let Ok(group) = self.stores.groups.get(id) else {
                self.report.report("node", node.id, format!("group {} is not in use", id));
                return Ok(());
            };
            if group.owning_node != node.id {
                self.report.report(
                    "relationship group",
                    id,
                    format!("linked from node {} but owned by {}", node.id, group.owning_node),
                );
            }
            if last_type.is_some_and(|last| last >= group.rel_type) {
                self.report.report(
                    "node",
                    node.id,
                    format!("group {} of type {} is out of type order", id, group.rel_type),
                );
            }
            last_type = Some(group.rel_type);

            for (kind, head, counter) in [
                (ChainKind::Outgoing, group.first_out, group.out_count),
                (ChainKind::Incoming, group.first_in, group.in_count),
                (ChainKind::Loop, group.first_loop, group.loop_count),
            ] {
                let walked = self.walk_chain(node.id, head, Some((group.rel_type, kind)))?;
                if let Some(walked) = walked {
                    if walked != u64::from(counter) {
                        self.report.report(
                            "relationship group",
                            id,
                            format!(
                                "{:?} count is {} but the chain holds {}",
                                kind, counter, walked
                            ),
                        );
                    }
                }
            }
            current = group.next_group;
        }
        Ok(())
    }

    /// Walk one relationship chain of `node`; `None` when it is broken
    ///
    /// Group sub-chains also check that each member has the group's type and
    /// belongs in that sub-chain.
    fn walk_chain(
        &mut self,
        node: u64,
        head: RecordId,
        group: Option<(u32, ChainKind)>,
    ) -> Result<Option<u64>> {
        let mut seen = HashSet::new();
        let mut prev = RecordId::NULL;
        let mut current = head;
        while let Some(id) = current.get() {
            if !seen.insert(id) {
                let message = format!("relationship chain loops back to {}", id);
                self.report.report("node", node, message);
                return Ok(None);
            }
            let Ok(record) = self.stores.relationships.get(id) else {
                self.report.report(
                    "node",
                    node,
                    format!("relationship chain points to unused relationship {}", id),
                );
                return Ok(None);
            };
            if record.start_node != node && record.end_node != node {
                self.report.report(
                    "relationship",
                    id,
                    format!("linked into the chain of node {} it does not touch", node),
                );
                return Ok(None);
            }
            let (record_prev, next) = record.links_for(node);
            if record_prev != prev {
                self.report.report(
                    "relationship",
                    id,
                    format!(
                        "previous link for node {} is {}, expected {}",
                        node, record_prev, prev
                    ),
                );
            }
            if record.is_first_for(node) != prev.is_null() {
                self.report.report(
                    "relationship",
                    id,
                    format!("chain-head flag for node {} is wrong", node),
                );
            }
            if let Some((rel_type, kind)) = group {
                if record.rel_type != rel_type || ChainKind::of(&record, node) != kind {
                    self.report.report(
                        "relationship",
                        id,
                        format!(
                            "sits in the {:?} chain of type {} of node {}",
                            kind, rel_type, node
                        ),
                    );
                }
            }
            prev = RecordId::new(id);
            current = next;
        }
        Ok(Some(seen.len() as u64))
    }

    fn check_properties(&mut self, owner: &'static str, id: u64, head: RecordId) -> Result<()> {
        let mut seen = HashSet::new();
        let mut prev = RecordId::NULL;
        let mut current = head;
        while let Some(record_id) = current.get() {
            if !seen.insert(record_id) {
                let message = format!("property chain loops back to {}", record_id);
                self.report.report(owner, id, message);
                return Ok(());
            }
            let Ok(record) = self.stores.properties.get(record_id) else {
                self.report.report(
                    owner,
                    id,
                    format!("property chain points to unused record {}", record_id),
                );
                return Ok(());
            };
            if record.prev != prev {
                self.report.report(
                    "property",
                    record_id,
                    format!("previous link is {}, expected {}", record.prev, prev),
                );
            }
            if record.blocks.is_empty() {
                self.report.report("property", record_id, "in use without any block");
            }
            let mut keys = HashSet::new();
            for block in &record.blocks {
                if !keys.insert(block.key()) {
                    self.report.report(
                        "property",
                        record_id,
                        format!("key {} appears twice", block.key()),
                    );
                }
                let mut strings = RecordAccess::new(self.stores.strings.clone());
                let mut arrays = RecordAccess::new(self.stores.arrays.clone());
                let dynamic = DynamicStores {
                    strings: &mut strings,
                    arrays: &mut arrays,
                };
                if let Err(e) = decode_value(block, dynamic) {
                    self.report.report(
                        "property",
                        record_id,
                        format!("key {} does not decode: {}", block.key(), e),
                    );
                }
            }
            prev = RecordId::new(record_id);
            current = record.next;
        }
        Ok(())
    }

    fn check_labels(&mut self, node: &NodeRecord) -> Result<()> {
        const DYNAMIC_FLAG: u64 = 1 << 39;
        let field = node.label_field.0;
        if field & DYNAMIC_FLAG == 0 {
            return Ok(());
        }
        let mask = (1u64 << DYNAMIC_ID_BITS) - 1;
        let head = field & mask;
        if head == mask {
            return Ok(());
        }
        let mut access = RecordAccess::new(self.stores.node_labels.clone());
        match read_chain(&mut access, RecordId::new(head)) {
            Ok(bytes) if bytes.len() % 4 == 0 => {}
            Ok(bytes) => self.report.report(
                "node",
                node.id,
                format!("label chain holds {} bytes", bytes.len()),
            ),
            Err(e) => self.report.report("node", node.id, format!("label chain: {}", e)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GraphStore;
    use crate::property::chain::PropertyOwner;
    use crate::property::Value;
    use crate::{Error, StoreConfig};
    use tempfile::TempDir;

    fn populated() -> (TempDir, GraphStore, Vec<u64>) {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            dense_node_threshold: 3,
            ..StoreConfig::default()
        };
        let store = GraphStore::open(dir.path(), config).unwrap();
        let mut writer = store.writer();
        let nodes: Vec<u64> = (0..6).map(|_| writer.create_node().unwrap()).collect();
        for &other in &nodes[1..] {
            writer.create_relationship(nodes[0], other, 1).unwrap();
        }
        writer.create_relationship(nodes[1], nodes[2], 2).unwrap();
        writer.create_relationship(nodes[0], nodes[0], 1).unwrap();
        writer
            .set_property(PropertyOwner::Node(nodes[1]), 0, &Value::String("y".repeat(300)))
            .unwrap();
        writer.set_labels(nodes[2], &(0..10).map(|i| i * 1000).collect::<Vec<_>>()).unwrap();
        writer.commit().unwrap();
        (dir, store, nodes)
    }

    #[test]
    fn test_healthy_store_is_clean() {
        let (_dir, store, nodes) = populated();
        assert!(store.stores().nodes.get(nodes[0]).unwrap().is_dense);
        let report = store.check_consistency().unwrap();
        assert!(report.is_clean(), "{}", report);
        assert!(report.records_checked > 10);
        store.check_consistency_strict().unwrap();
    }

    #[test]
    fn test_detects_wrong_group_count() {
        let (_dir, store, nodes) = populated();
        let anchor = store.stores().nodes.get(nodes[0]).unwrap().relationship_anchor;
        let mut group = store.stores().groups.get(anchor.get().unwrap()).unwrap();
        group.out_count += 1;
        store.stores().groups.update(&group).unwrap();

        let report = store.check_consistency().unwrap();
        assert!(report
            .findings
            .iter()
            .any(|f| f.store == "relationship group" && f.message.contains("count")));
        assert!(matches!(store.check_consistency_strict(), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_detects_dangling_relationship_link() {
        let (_dir, store, nodes) = populated();
        let anchor = store.stores().nodes.get(nodes[1]).unwrap().relationship_anchor;
        let mut first = store.stores().relationships.get(anchor.get().unwrap()).unwrap();
        first.set_next_for(nodes[1], RecordId::new(500));
        store.stores().relationships.update(&first).unwrap();

        let report = store.check_consistency().unwrap();
        assert!(report
            .findings
            .iter()
            .any(|f| f.message.contains("unused relationship 500")));
    }

    #[test]
    fn test_detects_looping_dynamic_chain() {
        let (_dir, store, _nodes) = populated();
        let strings = &store.stores().strings;
        let mut last = strings.get(strings.high_id() - 1).unwrap();
        last.next = RecordId::new(last.id);
        strings.update(&last).unwrap();

        let report = store.check_consistency().unwrap();
        assert!(report.findings.iter().any(|f| f.message.contains("loops back")));
    }
}
