use anyhow::{Context, Result};
use recgraph_core::loader::{
    BulkLoadConfig, BulkLoader, DataSource, LoadingProgress, ProgressCallback,
};
use recgraph_core::{GraphStore, StoreConfig};
use std::path::Path;
use std::process::ExitCode;

use super::OutputContext;

pub fn execute(
    dir: &Path,
    file: &Path,
    config: StoreConfig,
    output: &OutputContext,
) -> Result<ExitCode> {
    let store =
        GraphStore::open(dir, config).with_context(|| format!("opening {}", dir.display()))?;

    let mut load_config = BulkLoadConfig::for_store(&store);
    load_config.enable_progress = output.verbose;
    let report = |progress: &LoadingProgress| {
        tracing::debug!(
            phase = ?progress.phase,
            nodes = progress.nodes_processed,
            relationships = progress.relationships_processed,
            "{:.0}%",
            progress.progress * 100.0
        );
    };
    let callback: ProgressCallback<'_> = &report;

    let mut loader = BulkLoader::new(&store, load_config);
    let stats = loader
        .load(
            DataSource::JsonFile {
                path: file.to_path_buf(),
            },
            Some(callback),
        )
        .with_context(|| format!("importing {}", file.display()))?;
    store.close()?;

    let mut lines = vec![format!(
        "Imported {} nodes, {} relationships and {} properties into {}",
        stats.nodes_loaded,
        stats.relationships_loaded,
        stats.properties_loaded,
        dir.display()
    )];
    if !stats.errors.is_empty() {
        lines.push(format!("Skipped {} items:", stats.errors.len()));
        lines.extend(stats.errors.iter().map(|e| format!("  {}", e)));
    }
    if output.verbose {
        lines.extend(stats.warnings.iter().map(|w| format!("warning: {}", w)));
    }
    output.print(&stats, &lines)?;
    Ok(ExitCode::SUCCESS)
}
