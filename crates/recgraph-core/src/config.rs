//! Store configuration

use crate::storage::format::dynamic::DYNAMIC_RECORD_HEADER_SIZE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration consumed by the record storage engine
///
/// Every field has a default, so a TOML file only needs the keys it
/// overrides:
///
/// ```toml
/// dense_node_threshold = 100
/// string_block_size = 256
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Degree above which a node switches to grouped (dense) relationship chains
    pub dense_node_threshold: u32,
    /// Bytes per record in the dynamic string store (header included)
    pub string_block_size: usize,
    /// Bytes per record in the dynamic array store (header included)
    pub array_block_size: usize,
    /// Bytes per record in the node label overflow store
    pub label_block_size: usize,
    /// Bytes per record in the token name stores
    pub token_name_block_size: usize,
    /// Page size used by the per-store page cache
    pub page_size: usize,
    /// Number of pages cached per store file
    pub page_cache_pages: usize,
    /// Records the bulk loader buffers before flushing them to the stores
    pub batch_cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dense_node_threshold: 50,
            string_block_size: 128,
            array_block_size: 128,
            label_block_size: 64,
            token_name_block_size: 32,
            page_size: 8192,
            page_cache_pages: 256,
            batch_cache_capacity: 100_000,
        }
    }
}

impl StoreConfig {
    /// Load a configuration from a TOML file and validate it
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoreConfig =
            toml::from_str(content).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if self.dense_node_threshold < 1 {
            return Err(Error::config("dense_node_threshold must be >= 1"));
        }
        for (name, size) in [
            ("string_block_size", self.string_block_size),
            ("array_block_size", self.array_block_size),
            ("label_block_size", self.label_block_size),
            ("token_name_block_size", self.token_name_block_size),
        ] {
            if !(16..=65536).contains(&size) {
                return Err(Error::config(format!(
                    "{} must be within [16, 65536], got {}",
                    name, size
                )));
            }
        }
        if self.page_size < 512 || !self.page_size.is_power_of_two() {
            return Err(Error::config(format!(
                "page_size must be a power of two >= 512, got {}",
                self.page_size
            )));
        }
        if self.page_cache_pages == 0 {
            return Err(Error::config("page_cache_pages must be > 0"));
        }
        if self.batch_cache_capacity == 0 {
            return Err(Error::config("batch_cache_capacity must be > 0"));
        }
        Ok(())
    }

    /// Data bytes a dynamic string record can hold
    pub fn string_block_capacity(&self) -> usize {
        self.string_block_size - DYNAMIC_RECORD_HEADER_SIZE
    }

    /// Data bytes a dynamic array record can hold
    pub fn array_block_capacity(&self) -> usize {
        self.array_block_size - DYNAMIC_RECORD_HEADER_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StoreConfig::default();
        config.validate().unwrap();
        assert_eq!(config.dense_node_threshold, 50);
        assert_eq!(config.string_block_capacity(), 120);
        assert_eq!(config.array_block_capacity(), 120);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = StoreConfig::from_toml_str("dense_node_threshold = 7\n").unwrap();
        assert_eq!(config.dense_node_threshold, 7);
        assert_eq!(config.string_block_size, 128);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            StoreConfig::from_toml_str("dense_node_threshold = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_toml_str("string_block_size = 8"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_toml_str("page_size = 1000"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_toml_str("dense_node_threshold = \"many\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.toml");
        std::fs::write(&path, "array_block_size = 256\npage_cache_pages = 4\n").unwrap();
        let config = StoreConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.array_block_capacity(), 248);
        assert_eq!(config.page_cache_pages, 4);
    }
}
