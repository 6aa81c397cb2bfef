pub mod check;
pub mod import;
pub mod inspect;

use anyhow::{Context, Result};
use recgraph_core::{GraphStore, StoreConfig};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct OutputContext {
    pub json: bool,
    pub verbose: bool,
}

impl OutputContext {
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print `lines` as text, or `value` as JSON when requested
    pub fn print<T: Serialize>(&self, value: &T, lines: &[String]) -> Result<()> {
        if self.json {
            return self.print_json(value);
        }
        for line in lines {
            println!("{}", line);
        }
        Ok(())
    }
}

/// Open a store directory that must already hold a store
pub fn open_existing(dir: &Path, config: StoreConfig) -> Result<GraphStore> {
    if !dir.join("meta.json").exists() {
        anyhow::bail!("{} is not a recgraph store directory", dir.display());
    }
    GraphStore::open(dir, config).with_context(|| format!("opening {}", dir.display()))
}
