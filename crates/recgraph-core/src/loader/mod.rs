//! Bulk data loading module for fast initial data loading
//!
//! The loader reads `{ "nodes": [...], "relationships": [...] }` documents
//! (or the same data in memory) and writes them through a
//! [`BatchInserter`]. Node `id`s in the input are caller keys: relationships
//! refer to nodes by key, and every node gets a fresh store id.
//!
//! Bad items (unknown node keys, property values that cannot be stored) are
//! skipped and reported in [`LoadingStats::errors`]; storage failures abort
//! the load.

use crate::batch::BatchInserter;
use crate::engine::GraphStore;
use crate::property::chain::PropertyOwner;
use crate::property::Value;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Loading statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadingStats {
    /// Total nodes loaded
    pub nodes_loaded: u64,
    /// Total relationships loaded
    pub relationships_loaded: u64,
    /// Properties written to nodes and relationships
    pub properties_loaded: u64,
    /// Loading start time
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// Loading end time
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Loading duration in seconds
    pub duration_seconds: Option<f64>,
    /// Items that were skipped, with the reason
    pub errors: Vec<String>,
    /// Warnings encountered
    pub warnings: Vec<String>,
}

impl LoadingStats {
    fn started() -> Self {
        Self {
            nodes_loaded: 0,
            relationships_loaded: 0,
            properties_loaded: 0,
            start_time: chrono::Utc::now(),
            end_time: None,
            duration_seconds: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Bulk loading configuration
#[derive(Debug, Clone)]
pub struct BulkLoadConfig {
    /// Records buffered before the inserter writes them out
    pub batch_cache_capacity: usize,
    /// Enable progress reporting
    pub enable_progress: bool,
    /// Progress reporting interval (items)
    pub progress_interval: u64,
}

impl BulkLoadConfig {
    /// Defaults with the store's buffer capacity
    pub fn for_store(store: &GraphStore) -> Self {
        Self {
            batch_cache_capacity: store.config().batch_cache_capacity,
            enable_progress: true,
            progress_interval: 10_000,
        }
    }
}

/// Data source for bulk loading
#[derive(Debug, Clone)]
pub enum DataSource {
    /// JSON file containing nodes and relationships
    JsonFile { path: PathBuf },
    /// In-memory data
    InMemory {
        nodes: Vec<NodeData>,
        relationships: Vec<RelationshipData>,
    },
}

/// Node data for bulk loading
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeData {
    /// Caller key that relationships use to refer to this node
    #[serde(default)]
    pub id: Option<u64>,
    /// Node labels
    #[serde(default)]
    pub labels: Vec<String>,
    /// Node properties
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

/// Relationship data for bulk loading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipData {
    /// Caller key of the start node
    pub source_id: u64,
    /// Caller key of the end node
    pub target_id: u64,
    /// Relationship type
    pub rel_type: String,
    /// Relationship properties
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct LoadDocument {
    #[serde(default)]
    nodes: Vec<NodeData>,
    #[serde(default)]
    relationships: Vec<RelationshipData>,
}

/// Loading progress callback
pub type ProgressCallback<'a> = &'a dyn Fn(&LoadingProgress);

/// Loading progress information
#[derive(Debug, Clone)]
pub struct LoadingProgress {
    /// Current progress (0.0 to 1.0)
    pub progress: f64,
    /// Nodes processed
    pub nodes_processed: u64,
    /// Relationships processed
    pub relationships_processed: u64,
    /// Current phase
    pub phase: LoadingPhase,
    /// Estimated time remaining (seconds)
    pub estimated_remaining_seconds: Option<f64>,
}

/// Loading phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingPhase {
    Initializing,
    LoadingNodes,
    LoadingRelationships,
    Finalizing,
    Completed,
}

/// Convert a JSON value into a property value
///
/// Arrays must be homogeneous; integer and floating-point numbers may be
/// mixed and become a double array. An empty array becomes an empty string
/// array. `null`, objects and nested arrays are rejected.
pub fn json_to_value(json: &serde_json::Value) -> Result<Value> {
    use serde_json::Value as Json;
    match json {
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => number(n),
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Array(items) => array(items),
        Json::Null => Err(Error::invalid_argument("null is not a property value")),
        Json::Object(_) => Err(Error::invalid_argument("objects are not property values")),
    }
}

fn number(n: &serde_json::Number) -> Result<Value> {
    if let Some(i) = n.as_i64() {
        Ok(Value::Long(i))
    } else if n.is_u64() {
        Err(Error::invalid_argument(format!("{} does not fit a long", n)))
    } else {
        n.as_f64()
            .map(Value::Double)
            .ok_or_else(|| Error::invalid_argument(format!("unsupported number {}", n)))
    }
}

fn array(items: &[serde_json::Value]) -> Result<Value> {
    use serde_json::Value as Json;
    let Some(first) = items.first() else {
        return Ok(Value::StringArray(Vec::new()));
    };
    let mixed = || Error::invalid_argument("arrays must hold values of a single type");
    match first {
        Json::Bool(_) => items
            .iter()
            .map(|item| item.as_bool().ok_or_else(mixed))
            .collect::<Result<Vec<_>>>()
            .map(Value::BoolArray),
        Json::String(_) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(mixed))
            .collect::<Result<Vec<_>>>()
            .map(Value::StringArray),
        Json::Number(_) => {
            if items.iter().all(|item| item.as_i64().is_some()) {
                Ok(Value::LongArray(items.iter().filter_map(Json::as_i64).collect()))
            } else {
                items
                    .iter()
                    .map(|item| item.as_f64().ok_or_else(mixed))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::DoubleArray)
            }
        }
        _ => Err(Error::invalid_argument(
            "arrays may only hold booleans, numbers or strings",
        )),
    }
}

/// Bulk loader for fast data loading
pub struct BulkLoader<'a> {
    store: &'a GraphStore,
    config: BulkLoadConfig,
    stats: LoadingStats,
    /// Caller key -> store id
    node_ids: HashMap<u64, u64>,
}

impl<'a> BulkLoader<'a> {
    pub fn new(store: &'a GraphStore, config: BulkLoadConfig) -> Self {
        Self {
            store,
            config,
            stats: LoadingStats::started(),
            node_ids: HashMap::new(),
        }
    }

    /// Store id assigned to the node loaded under `key`
    pub fn node_id(&self, key: u64) -> Option<u64> {
        self.node_ids.get(&key).copied()
    }

    /// Get current loading statistics
    pub fn stats(&self) -> &LoadingStats {
        &self.stats
    }

    /// Load data from a data source and flush it to the stores
    pub fn load(
        &mut self,
        source: DataSource,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<LoadingStats> {
        self.stats = LoadingStats::started();
        let progress = progress.filter(|_| self.config.enable_progress);
        self.report(progress, LoadingPhase::Initializing, 0, 0, 0);

        let (nodes, relationships) = match source {
            DataSource::JsonFile { path } => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::invalid_argument(format!("cannot read {}: {}", path.display(), e))
                })?;
                let document: LoadDocument = serde_json::from_str(&content)?;
                (document.nodes, document.relationships)
            }
            DataSource::InMemory {
                nodes,
                relationships,
            } => (nodes, relationships),
        };
        let total = (nodes.len() + relationships.len()) as u64;

        let capacity = self.config.batch_cache_capacity;
        let mut inserter = BatchInserter::with_capacity(self.store, capacity);
        for (index, node) in nodes.iter().enumerate() {
            match self.load_node(&mut inserter, node) {
                Ok(()) => self.stats.nodes_loaded += 1,
                Err(e) => self.skip(format!("node {}", index), e)?,
            }
            if self.due(index) {
                self.report(progress, LoadingPhase::LoadingNodes, index as u64 + 1, 0, total);
            }
        }

        let node_count = nodes.len() as u64;
        for (index, relationship) in relationships.iter().enumerate() {
            match self.load_relationship(&mut inserter, relationship) {
                Ok(()) => self.stats.relationships_loaded += 1,
                Err(e) => self.skip(format!("relationship {}", index), e)?,
            }
            if self.due(index) {
                self.report(
                    progress,
                    LoadingPhase::LoadingRelationships,
                    node_count,
                    index as u64 + 1,
                    total,
                );
            }
        }

        let rel_count = relationships.len() as u64;
        self.report(progress, LoadingPhase::Finalizing, node_count, rel_count, total);
        inserter.flush()?;

        let end_time = chrono::Utc::now();
        self.stats.end_time = Some(end_time);
        self.stats.duration_seconds =
            Some((end_time - self.stats.start_time).num_milliseconds() as f64 / 1000.0);
        self.report(progress, LoadingPhase::Completed, node_count, rel_count, total);

        tracing::info!(
            nodes = self.stats.nodes_loaded,
            relationships = self.stats.relationships_loaded,
            properties = self.stats.properties_loaded,
            skipped = self.stats.errors.len(),
            evictions = inserter.evictions(),
            duration_seconds = self.stats.duration_seconds,
            "bulk load finished"
        );
        Ok(self.stats.clone())
    }

    fn load_node(&mut self, inserter: &mut BatchInserter<'_>, node: &NodeData) -> Result<()> {
        if let Some(key) = node.id {
            if self.node_ids.contains_key(&key) {
                return Err(Error::invalid_argument(format!("duplicate node key {}", key)));
            }
        }
        let properties = self.convert(&node.properties)?;
        let labels = node
            .labels
            .iter()
            .map(|name| inserter.label_id(name))
            .collect::<Result<Vec<_>>>()?;

        let id = inserter.create_node()?;
        if !labels.is_empty() {
            inserter.set_labels(id, &labels)?;
        }
        self.write_properties(inserter, PropertyOwner::Node(id), properties)?;
        if let Some(key) = node.id {
            self.node_ids.insert(key, id);
        }
        Ok(())
    }

    fn load_relationship(
        &mut self,
        inserter: &mut BatchInserter<'_>,
        relationship: &RelationshipData,
    ) -> Result<()> {
        let endpoint = |key: u64| {
            self.node_ids
                .get(&key)
                .copied()
                .ok_or_else(|| Error::not_found(format!("no node was loaded with key {}", key)))
        };
        let start = endpoint(relationship.source_id)?;
        let end = endpoint(relationship.target_id)?;
        let properties = self.convert(&relationship.properties)?;
        let rel_type = inserter.relationship_type_id(&relationship.rel_type)?;

        let id = inserter.create_relationship(start, end, rel_type)?;
        self.write_properties(inserter, PropertyOwner::Relationship(id), properties)
    }

    /// Resolve keys and convert values before anything is written
    fn convert(
        &mut self,
        properties: &HashMap<String, serde_json::Value>,
    ) -> Result<Vec<(String, Value)>> {
        let mut converted = Vec::with_capacity(properties.len());
        for (name, json) in properties {
            if json.is_null() {
                self.stats
                    .warnings
                    .push(format!("ignored null value of property '{}'", name));
                continue;
            }
            let value = json_to_value(json)
                .map_err(|e| Error::invalid_argument(format!("property '{}': {}", name, e)))?;
            converted.push((name.clone(), value));
        }
        Ok(converted)
    }

    fn write_properties(
        &mut self,
        inserter: &mut BatchInserter<'_>,
        owner: PropertyOwner,
        properties: Vec<(String, Value)>,
    ) -> Result<()> {
        for (name, value) in properties {
            let key = inserter.property_key_id(&name)?;
            inserter.set_property(owner, key, &value)?;
            self.stats.properties_loaded += 1;
        }
        Ok(())
    }

    /// Record a skipped item, or give up on errors that are not the input's fault
    fn skip(&mut self, item: String, error: Error) -> Result<()> {
        match error {
            Error::InvalidArgument(_) | Error::NotFound(_) | Error::ConstraintViolation(_) => {
                tracing::warn!(%item, %error, "skipping item");
                self.stats.errors.push(format!("{}: {}", item, error));
                Ok(())
            }
            other => Err(other),
        }
    }

    fn due(&self, index: usize) -> bool {
        let interval = self.config.progress_interval.max(1);
        (index as u64 + 1) % interval == 0
    }

    fn report(
        &self,
        progress: Option<ProgressCallback<'_>>,
        phase: LoadingPhase,
        nodes_processed: u64,
        relationships_processed: u64,
        total: u64,
    ) {
        let Some(callback) = progress else {
            return;
        };
        let processed = nodes_processed + relationships_processed;
        let fraction = match phase {
            LoadingPhase::Completed => 1.0,
            _ if total == 0 => 0.0,
            _ => processed as f64 / total as f64,
        };
        callback(&LoadingProgress {
            progress: fraction,
            nodes_processed,
            relationships_processed,
            phase,
            estimated_remaining_seconds: self.estimate_remaining_time(processed, total),
        });
    }

    /// Estimate remaining time
    fn estimate_remaining_time(&self, processed: u64, total: u64) -> Option<f64> {
        if processed == 0 {
            return None;
        }
        let elapsed_ms = (chrono::Utc::now() - self.stats.start_time).num_milliseconds();
        let elapsed = elapsed_ms as f64 / 1000.0;
        if elapsed <= 0.0 {
            return None;
        }
        let rate = processed as f64 / elapsed;
        Some(total.saturating_sub(processed) as f64 / rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::Direction;
    use crate::StoreConfig;
    use serde_json::json;
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GraphStore) {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::open(dir.path(), StoreConfig::default()).unwrap();
        (dir, store)
    }

    fn props(value: serde_json::Value) -> HashMap<String, serde_json::Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_load_from_memory() {
        let (_dir, store) = setup();
        let mut loader = BulkLoader::new(&store, BulkLoadConfig::for_store(&store));

        let nodes = vec![
            NodeData {
                id: Some(100),
                labels: vec!["Person".to_string()],
                properties: props(json!({ "name": "Alice", "age": 30 })),
            },
            NodeData {
                id: Some(200),
                labels: vec!["Person".to_string(), "Employee".to_string()],
                properties: props(json!({ "name": "Bob", "scores": [1.5, 2] })),
            },
        ];
        let relationships = vec![RelationshipData {
            source_id: 100,
            target_id: 200,
            rel_type: "KNOWS".to_string(),
            properties: props(json!({ "since": 2020 })),
        }];

        let stats = loader
            .load(DataSource::InMemory { nodes, relationships }, None)
            .unwrap();
        assert_eq!(stats.nodes_loaded, 2);
        assert_eq!(stats.relationships_loaded, 1);
        assert_eq!(stats.properties_loaded, 5);
        assert!(stats.errors.is_empty());
        assert!(stats.duration_seconds.is_some());

        let alice = loader.node_id(100).unwrap();
        let bob = loader.node_id(200).unwrap();
        let mut reader = store.writer();
        let scores = store.stores().property_keys.id_of("scores").unwrap();
        assert_eq!(
            reader.property(PropertyOwner::Node(bob), scores).unwrap(),
            Some(Value::DoubleArray(vec![1.5, 2.0]))
        );
        let employee = store.stores().labels.id_of("Employee").unwrap();
        assert!(reader.has_label(bob, employee).unwrap());
        assert_eq!(reader.degree(alice, &[], Direction::Outgoing).unwrap(), 1);
    }

    #[test]
    fn test_load_json_file_reports_progress() {
        let (dir, store) = setup();
        let path = dir.path().join("input.json");
        let document = json!({
            "nodes": (0..10).map(|i| json!({ "id": i, "labels": ["N"] })).collect::<Vec<_>>(),
            "relationships": (1..10)
                .map(|i| json!({ "source_id": 0, "target_id": i, "rel_type": "LINK" }))
                .collect::<Vec<_>>(),
        });
        std::fs::write(&path, document.to_string()).unwrap();

        let config = BulkLoadConfig {
            batch_cache_capacity: 4,
            enable_progress: true,
            progress_interval: 5,
        };
        let phases = RefCell::new(Vec::new());
        let record = |p: &LoadingProgress| phases.borrow_mut().push((p.phase, p.progress));
        let callback: ProgressCallback<'_> = &record;
        let mut loader = BulkLoader::new(&store, config);
        let stats = loader
            .load(DataSource::JsonFile { path }, Some(callback))
            .unwrap();

        assert_eq!(stats.nodes_loaded, 10);
        assert_eq!(stats.relationships_loaded, 9);
        let phases = phases.into_inner();
        assert_eq!(phases.first().map(|p| p.0), Some(LoadingPhase::Initializing));
        assert_eq!(phases.last(), Some(&(LoadingPhase::Completed, 1.0)));
        assert!(phases.iter().any(|p| p.0 == LoadingPhase::LoadingRelationships));
    }

    #[test]
    fn test_bad_items_are_skipped() {
        let (_dir, store) = setup();
        let mut loader = BulkLoader::new(&store, BulkLoadConfig::for_store(&store));
        let nodes = vec![
            NodeData {
                id: Some(1),
                ..NodeData::default()
            },
            NodeData {
                id: Some(2),
                properties: props(json!({ "mixed": [1, "two"] })),
                ..NodeData::default()
            },
            NodeData {
                id: Some(1),
                ..NodeData::default()
            },
        ];
        let relationships = vec![RelationshipData {
            source_id: 1,
            target_id: 2,
            rel_type: "LINK".to_string(),
            properties: HashMap::new(),
        }];
        let stats = loader
            .load(DataSource::InMemory { nodes, relationships }, None)
            .unwrap();
        assert_eq!(stats.nodes_loaded, 1);
        assert_eq!(stats.relationships_loaded, 0);
        assert_eq!(stats.errors.len(), 3);
        assert_eq!(store.stores().nodes.high_id(), 1);
    }

    #[test]
    fn test_json_conversion() {
        assert_eq!(json_to_value(&json!(true)).unwrap(), Value::Bool(true));
        assert_eq!(json_to_value(&json!(-7)).unwrap(), Value::Long(-7));
        assert_eq!(json_to_value(&json!(0.5)).unwrap(), Value::Double(0.5));
        assert_eq!(
            json_to_value(&json!(["a", "b"])).unwrap(),
            Value::StringArray(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(json_to_value(&json!([1, 2])).unwrap(), Value::LongArray(vec![1, 2]));
        assert_eq!(json_to_value(&json!([])).unwrap(), Value::StringArray(Vec::new()));
        for bad in [
            json!(null),
            json!({ "a": 1 }),
            json!([true, 1]),
            json!([[1]]),
            json!(u64::MAX),
        ] {
            assert!(matches!(json_to_value(&bad), Err(Error::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_missing_file_is_invalid_argument() {
        let (dir, store) = setup();
        let mut loader = BulkLoader::new(&store, BulkLoadConfig::for_store(&store));
        let source = DataSource::JsonFile {
            path: dir.path().join("missing.json"),
        };
        assert!(matches!(loader.load(source, None), Err(Error::InvalidArgument(_))));
    }
}
