//! Relationship chains through the public writer API

use recgraph_core::{Direction, GraphStore, StoreConfig};
use tempfile::TempDir;

fn open(dir: &TempDir, dense_node_threshold: u32) -> GraphStore {
    let config = StoreConfig {
        dense_node_threshold,
        ..StoreConfig::default()
    };
    GraphStore::open(dir.path(), config).unwrap()
}

#[test]
fn test_self_loops_count_in_every_direction() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 50);
    let mut writer = store.writer();
    let node = writer.create_node().unwrap();
    let x = writer.relationship_type_id("X").unwrap();
    for _ in 0..51 {
        writer.create_relationship(node, node, x).unwrap();
    }
    writer.commit().unwrap();

    let mut reader = store.writer();
    assert!(reader.is_dense(node).unwrap());
    assert_eq!(reader.degree(node, &[], Direction::Both).unwrap(), 51);
    assert_eq!(reader.degree(node, &[], Direction::Outgoing).unwrap(), 51);
    assert_eq!(reader.degree(node, &[], Direction::Incoming).unwrap(), 51);
    assert_eq!(reader.relationships(node, &[x], Direction::Incoming).unwrap().len(), 51);
    store.check_consistency_strict().unwrap();
}

#[test]
fn test_degrees_match_across_conversion() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 10);
    let mut writer = store.writer();
    let hub = writer.create_node().unwrap();
    let types = [
        writer.relationship_type_id("A").unwrap(),
        writer.relationship_type_id("B").unwrap(),
    ];

    // Incrementally tracked expectations: [out, in] per type
    let mut expected = [[0u64; 2]; 2];
    for i in 0..25usize {
        let other = writer.create_node().unwrap();
        let t = i % 2;
        if i % 3 == 0 {
            writer.create_relationship(other, hub, types[t]).unwrap();
            expected[t][1] += 1;
        } else {
            writer.create_relationship(hub, other, types[t]).unwrap();
            expected[t][0] += 1;
        }
        for (index, &rel_type) in types.iter().enumerate() {
            let [out, inc] = expected[index];
            assert_eq!(writer.degree(hub, &[rel_type], Direction::Outgoing).unwrap(), out);
            assert_eq!(writer.degree(hub, &[rel_type], Direction::Incoming).unwrap(), inc);
        }
        assert_eq!(
            writer.degree(hub, &[], Direction::Both).unwrap(),
            i as u64 + 1
        );
    }
    assert!(writer.is_dense(hub).unwrap());
    writer.commit().unwrap();
    store.check_consistency_strict().unwrap();
}

#[test]
fn test_dense_node_opposite_direction_is_empty() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 5);
    let mut writer = store.writer();
    let hub = writer.create_node().unwrap();
    let likes = writer.relationship_type_id("LIKES").unwrap();
    for _ in 0..12 {
        let target = writer.create_node().unwrap();
        writer.create_relationship(target, hub, likes).unwrap();
    }
    writer.commit().unwrap();

    let mut reader = store.writer();
    assert!(reader.is_dense(hub).unwrap());
    assert_eq!(reader.degree(hub, &[], Direction::Outgoing).unwrap(), 0);
    assert_eq!(reader.relationships(hub, &[], Direction::Outgoing).unwrap().count(), 0);
    assert!(!reader.has_relationship(hub, &[likes], Direction::Outgoing).unwrap());
    let incoming: Vec<_> = reader
        .relationships(hub, &[likes], Direction::Incoming)
        .unwrap()
        .collect();
    assert_eq!(incoming.len(), 12);
    assert!(incoming.iter().all(|r| r.end_node == hub));
}

#[test]
fn test_iterators_are_snapshots() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 3);
    let mut writer = store.writer();
    let person = writer.label_id("Person").unwrap();
    let hub = writer.create_node().unwrap();
    let mut others = Vec::new();
    for _ in 0..6 {
        let other = writer.create_node().unwrap();
        writer.add_label(other, person).unwrap();
        writer.create_relationship(hub, other, 0).unwrap();
        others.push(other);
    }

    let relationships = writer.relationships(hub, &[], Direction::Both).unwrap();
    let people = writer.nodes_with_label(person).unwrap();
    let before: Vec<u64> = writer
        .relationships(hub, &[], Direction::Both)
        .unwrap()
        .map(|r| r.id)
        .collect();

    let newcomer = writer.create_node().unwrap();
    writer.add_label(newcomer, person).unwrap();
    writer.create_relationship(hub, newcomer, 0).unwrap();
    writer.delete_relationship(before[0]).unwrap();
    writer.remove_label(others[0], person).unwrap();

    assert_eq!(relationships.map(|r| r.id).collect::<Vec<_>>(), before);
    assert_eq!(people.collect::<Vec<_>>(), others);
    assert_eq!(writer.degree(hub, &[], Direction::Both).unwrap(), 6);
}
