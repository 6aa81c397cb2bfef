use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recgraph_core::StoreConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::OutputContext;

/// Command-line interface for recgraph store directories
#[derive(Parser)]
#[command(name = "recgraph")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML store configuration
    #[arg(long, global = true, env = "RECGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bulk load a JSON document of nodes and relationships
    Import {
        /// Store directory, created when missing
        dir: PathBuf,
        /// JSON file with `nodes` and `relationships` arrays
        file: PathBuf,
    },
    /// Show record counts and per-store statistics
    Stats {
        /// Store directory
        dir: PathBuf,
    },
    /// Show one node with its labels, properties and relationships
    Node {
        /// Store directory
        dir: PathBuf,
        /// Node id
        id: u64,
    },
    /// Check every store for broken links and counts
    Check {
        /// Store directory
        dir: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "recgraph_core=debug,recgraph_cli=debug".into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "recgraph_core=warn,recgraph_cli=warn".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<StoreConfig> {
    match path {
        Some(path) => StoreConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(StoreConfig::default()),
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_ref())?;
    let output = OutputContext {
        json: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Import { dir, file } => commands::import::execute(&dir, &file, config, &output),
        Commands::Stats { dir } => commands::inspect::stats(&dir, config, &output),
        Commands::Node { dir, id } => commands::inspect::node(&dir, id, config, &output),
        Commands::Check { dir } => commands::check::execute(&dir, config, &output),
    }
}
