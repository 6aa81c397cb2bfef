use anyhow::Result;
use recgraph_core::property::PropertyOwner;
use recgraph_core::token::TokenHolder;
use recgraph_core::{Direction, StoreConfig};
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

use super::{OutputContext, open_existing};

pub fn stats(dir: &Path, config: StoreConfig, output: &OutputContext) -> Result<ExitCode> {
    let store = open_existing(dir, config)?;
    let stats = store.stats();
    store.close()?;

    let mut lines = vec![
        format!("Store:               {}", stats.path.display()),
        format!("Created:             {}", stats.created_at.to_rfc3339()),
        format!("Nodes:               {}", stats.nodes),
        format!("Relationships:       {}", stats.relationships),
        format!("Relationship groups: {}", stats.relationship_groups),
        format!("Property records:    {}", stats.property_records),
        format!("Labels:              {}", stats.labels),
        format!("Property keys:       {}", stats.property_keys),
        format!("Relationship types:  {}", stats.relationship_types),
    ];
    if output.verbose {
        lines.push(String::new());
        lines.push(format!(
            "{:<28} {:>8} {:>12} {:>8} {:>12} {:>12}",
            "store", "record", "high id", "free", "skipped", "bytes"
        ));
        for s in &stats.stores {
            lines.push(format!(
                "{:<28} {:>8} {:>12} {:>8} {:>12} {:>12}",
                s.name, s.record_size, s.high_id, s.free_count, s.skipped_count, s.file_len
            ));
        }
    }
    output.print(&stats, &lines)?;
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Serialize)]
struct NodeView {
    id: u64,
    dense: bool,
    labels: Vec<String>,
    properties: serde_json::Map<String, serde_json::Value>,
    relationships: Vec<RelationshipView>,
}

#[derive(Debug, Serialize)]
struct RelationshipView {
    id: u64,
    #[serde(rename = "type")]
    rel_type: String,
    start_node: u64,
    end_node: u64,
}

fn token_name(holder: &TokenHolder, id: u32) -> String {
    holder.name_of(id).unwrap_or_else(|| format!("#{}", id))
}

pub fn node(dir: &Path, id: u64, config: StoreConfig, output: &OutputContext) -> Result<ExitCode> {
    let store = open_existing(dir, config)?;
    let stores = store.stores();
    let mut reader = store.writer();
    if !reader.node_exists(id)? {
        eprintln!("node {} not found", id);
        return Ok(ExitCode::FAILURE);
    }

    let labels = reader
        .labels(id)?
        .into_iter()
        .map(|label| token_name(&stores.labels, label))
        .collect();
    let properties = reader
        .properties(PropertyOwner::Node(id))?
        .into_iter()
        .map(|(key, value)| (token_name(&stores.property_keys, key), value.to_json()))
        .collect();
    let relationships = reader
        .relationships(id, &[], Direction::Both)?
        .map(|r| RelationshipView {
            id: r.id,
            rel_type: token_name(&stores.relationship_types, r.rel_type),
            start_node: r.start_node,
            end_node: r.end_node,
        })
        .collect();
    let view = NodeView {
        id,
        dense: reader.is_dense(id)?,
        labels,
        properties,
        relationships,
    };
    drop(reader);
    store.close()?;

    let head = std::iter::once(view.id.to_string()).chain(view.labels.iter().cloned());
    let mut lines = vec![format!("({})", head.collect::<Vec<_>>().join(":"))];
    for (name, value) in &view.properties {
        lines.push(format!("  {} = {}", name, value));
    }
    for r in &view.relationships {
        let arrow = if r.start_node == id {
            format!("-[:{}]->({})", r.rel_type, r.end_node)
        } else {
            format!("<-[:{}]-({})", r.rel_type, r.start_node)
        };
        lines.push(format!("  {} {}", r.id, arrow));
    }
    output.print(&view, &lines)?;
    Ok(ExitCode::SUCCESS)
}
