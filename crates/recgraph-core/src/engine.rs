//! Store directory and the stores inside it
//!
//! A [`GraphStore`] owns one directory holding every record store, the token
//! stores and a `meta.json` describing how the directory was created. Block
//! sizes of the dynamic stores are fixed when the directory is created; a
//! later open with different sizes keeps the persisted ones.

use crate::config::StoreConfig;
use crate::consistency::{self, ConsistencyReport};
use crate::storage::format::{
    DynamicFormat, GroupFormat, NodeFormat, PropertyFormat, RelationshipFormat, TokenFormat,
};
use crate::storage::{RecordAccessSet, RecordStore, StoreStats};
use crate::token::{TokenHolder, TokenKind};
use crate::writer::GraphWriter;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// On-disk layout version written to `meta.json`
pub const FORMAT_VERSION: u32 = 1;

const META_FILE: &str = "meta.json";

/// Contents of `meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub string_block_size: usize,
    pub array_block_size: usize,
    pub label_block_size: usize,
    pub token_name_block_size: usize,
}

impl StoreMeta {
    fn new(config: &StoreConfig) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            string_block_size: config.string_block_size,
            array_block_size: config.array_block_size,
            label_block_size: config.label_block_size,
            token_name_block_size: config.token_name_block_size,
        }
    }

    fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let meta: StoreMeta = serde_json::from_str(&content)?;
        if meta.format_version != FORMAT_VERSION {
            return Err(Error::storage(format!(
                "store format version {} is not supported (expected {})",
                meta.format_version, FORMAT_VERSION
            )));
        }
        Ok(Some(meta))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overwrite the block sizes of `config` with the persisted ones
    fn apply_to(&self, config: &mut StoreConfig) {
        let persisted = [
            ("string_block_size", self.string_block_size, &mut config.string_block_size),
            ("array_block_size", self.array_block_size, &mut config.array_block_size),
            ("label_block_size", self.label_block_size, &mut config.label_block_size),
            (
                "token_name_block_size",
                self.token_name_block_size,
                &mut config.token_name_block_size,
            ),
        ];
        for (name, stored, configured) in persisted {
            if *configured != stored {
                tracing::warn!(
                    setting = name,
                    configured = *configured,
                    persisted = stored,
                    "block size differs from the store directory; using the persisted value"
                );
                *configured = stored;
            }
        }
    }
}

/// Every store of one directory
pub struct Stores {
    pub nodes: Arc<RecordStore<NodeFormat>>,
    pub relationships: Arc<RecordStore<RelationshipFormat>>,
    pub groups: Arc<RecordStore<GroupFormat>>,
    pub properties: Arc<RecordStore<PropertyFormat>>,
    pub strings: Arc<RecordStore<DynamicFormat>>,
    pub arrays: Arc<RecordStore<DynamicFormat>>,
    pub node_labels: Arc<RecordStore<DynamicFormat>>,
    pub labels: TokenHolder,
    pub property_keys: TokenHolder,
    pub relationship_types: TokenHolder,
    pub config: StoreConfig,
}

impl Stores {
    fn open(dir: &Path, config: StoreConfig) -> Result<Self> {
        let page_size = config.page_size;
        let pages = config.page_cache_pages;
        let open = |file: &str| dir.join(file);

        macro_rules! store {
            ($file:expr, $format:expr) => {
                Arc::new(RecordStore::open(open($file), $format, page_size, pages)?)
            };
        }

        let token = |kind: TokenKind, file: &str, names_file: &str, name: &'static str| {
            let tokens = RecordStore::open(
                open(file),
                TokenFormat::new(kind.name(), kind.capacity()),
                page_size,
                pages,
            )?;
            let names = RecordStore::open(
                open(names_file),
                DynamicFormat::new(name, config.token_name_block_size)?,
                page_size,
                pages,
            )?;
            TokenHolder::open(kind, Arc::new(tokens), Arc::new(names))
        };

        let labels = token(TokenKind::Label, "labels.store", "label_names.store", "label name")?;
        let property_keys = token(
            TokenKind::PropertyKey,
            "property_keys.store",
            "property_key_names.store",
            "property key name",
        )?;
        let relationship_types = token(
            TokenKind::RelationshipType,
            "relationship_types.store",
            "relationship_type_names.store",
            "relationship type name",
        )?;

        Ok(Self {
            nodes: store!("nodes.store", NodeFormat),
            relationships: store!("relationships.store", RelationshipFormat),
            groups: store!("relationship_groups.store", GroupFormat),
            properties: store!("properties.store", PropertyFormat),
            strings: store!(
                "property_strings.store",
                DynamicFormat::new("string", config.string_block_size)?
            ),
            arrays: store!(
                "property_arrays.store",
                DynamicFormat::new("array", config.array_block_size)?
            ),
            node_labels: store!(
                "node_labels.store",
                DynamicFormat::new("node label", config.label_block_size)?
            ),
            labels,
            property_keys,
            relationship_types,
            config,
        })
    }

    fn tokens(&self) -> [&TokenHolder; 3] {
        [&self.labels, &self.property_keys, &self.relationship_types]
    }

    /// Flush every store; id files stay marked unclean
    pub fn flush(&self) -> Result<()> {
        self.nodes.flush()?;
        self.relationships.flush()?;
        self.groups.flush()?;
        self.properties.flush()?;
        self.strings.flush()?;
        self.arrays.flush()?;
        self.node_labels.flush()?;
        for holder in self.tokens() {
            let (tokens, names) = holder.stores();
            tokens.flush()?;
            names.flush()?;
        }
        Ok(())
    }

    /// Flush every store and write clean id files
    pub fn close(&self) -> Result<()> {
        self.nodes.close()?;
        self.relationships.close()?;
        self.groups.close()?;
        self.properties.close()?;
        self.strings.close()?;
        self.arrays.close()?;
        self.node_labels.close()?;
        for holder in self.tokens() {
            let (tokens, names) = holder.stores();
            tokens.close()?;
            names.close()?;
        }
        Ok(())
    }

    /// Counters of every store
    pub fn stats(&self) -> Vec<StoreStats> {
        let mut stats = vec![
            self.nodes.stats(),
            self.relationships.stats(),
            self.groups.stats(),
            self.properties.stats(),
            self.strings.stats(),
            self.arrays.stats(),
            self.node_labels.stats(),
        ];
        for holder in self.tokens() {
            let (tokens, names) = holder.stores();
            stats.push(tokens.stats());
            stats.push(names.stats());
        }
        stats
    }
}

/// Summary of a store directory
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Ids in use below the high-water mark, per entity store
    pub nodes: u64,
    pub relationships: u64,
    pub relationship_groups: u64,
    pub property_records: u64,
    pub labels: usize,
    pub property_keys: usize,
    pub relationship_types: usize,
    pub stores: Vec<StoreStats>,
}

/// An open store directory
pub struct GraphStore {
    dir: PathBuf,
    meta: StoreMeta,
    stores: Arc<Stores>,
}

impl GraphStore {
    /// Open the store directory at `dir`, creating it when missing
    pub fn open<P: AsRef<Path>>(dir: P, mut config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let meta_path = dir.join(META_FILE);
        let meta = match StoreMeta::load(&meta_path)? {
            Some(meta) => {
                meta.apply_to(&mut config);
                meta
            }
            None => {
                let meta = StoreMeta::new(&config);
                meta.save(&meta_path)?;
                meta
            }
        };

        let stores = Stores::open(&dir, config)?;
        tracing::info!(
            path = %dir.display(),
            nodes = stores.nodes.high_id(),
            relationships = stores.relationships.high_id(),
            "opened graph store"
        );
        Ok(Self {
            dir,
            meta,
            stores: Arc::new(stores),
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    /// Effective configuration, block sizes as persisted
    pub fn config(&self) -> &StoreConfig {
        &self.stores.config
    }

    pub fn stores(&self) -> &Arc<Stores> {
        &self.stores
    }

    /// A fresh, unbounded record access set over every store
    pub fn record_access(&self) -> RecordAccessSet {
        RecordAccessSet::new(&self.stores)
    }

    /// A writer with its own change buffer
    pub fn writer(&self) -> GraphWriter {
        GraphWriter::new(self.stores.clone())
    }

    /// Flush every store without marking the id files clean
    pub fn flush(&self) -> Result<()> {
        self.stores.flush()
    }

    /// Flush every store and write clean id files
    ///
    /// Uncommitted changes held by writers are not part of the close.
    pub fn close(&self) -> Result<()> {
        self.stores.close()?;
        tracing::info!(path = %self.dir.display(), "closed graph store");
        Ok(())
    }

    /// Counts and per-store counters
    ///
    /// Entity counts come from the id spaces: high id minus free and skipped ids.
    pub fn stats(&self) -> GraphStats {
        let in_use =
            |stats: &StoreStats| stats.high_id - stats.free_count as u64 - stats.skipped_count;
        let stores = self.stores.stats();
        GraphStats {
            path: self.dir.clone(),
            created_at: self.meta.created_at,
            nodes: in_use(&stores[0]),
            relationships: in_use(&stores[1]),
            relationship_groups: in_use(&stores[2]),
            property_records: in_use(&stores[3]),
            labels: self.stores.labels.len(),
            property_keys: self.stores.property_keys.len(),
            relationship_types: self.stores.relationship_types.len(),
            stores,
        }
    }

    /// Walk every in-use record and report inconsistencies
    pub fn check_consistency(&self) -> Result<ConsistencyReport> {
        consistency::check(&self.stores)
    }

    /// Like [`check_consistency`](Self::check_consistency), but any finding
    /// is returned as [`Error::Corruption`]
    pub fn check_consistency_strict(&self) -> Result<()> {
        let report = self.check_consistency()?;
        if report.is_clean() {
            Ok(())
        } else {
            Err(Error::corruption(report.to_string()))
        }
    }
}
