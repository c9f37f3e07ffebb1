//! fsgate server binary.
//!
//! Exposes sandboxed filesystem tools over a JSON-lines protocol on stdio.
//!
//! Usage:
//!   # Serve two roots with default settings
//!   fsgate-server ~/projects /srv/shared
//!
//!   # Roots and tuning from a RON file, caching off
//!   fsgate-server --config fsgate.ron --no-cache
//!
//!   # Show the available tools
//!   fsgate-server --list-tools .

mod host;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt};

use fsgate_kernel::{FsConfig, SandboxFs, ToolRegistry, register_file_tools};

/// Sandboxed filesystem tool server.
#[derive(Parser, Debug)]
#[command(name = "fsgate-server")]
#[command(about = "Sandboxed, cached filesystem tools over JSON lines")]
struct Args {
    /// Allowed root directories (added to any from the config file)
    roots: Vec<String>,

    /// RON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable the content cache
    #[arg(long)]
    no_cache: bool,

    /// Cap on search results
    #[arg(long)]
    max_results: Option<usize>,

    /// Search and tree walk time budget in milliseconds
    #[arg(long)]
    search_timeout_ms: Option<u64>,

    /// Print available tool names and descriptions, then exit
    #[arg(long)]
    list_tools: bool,
}

impl Args {
    fn into_config(self) -> Result<FsConfig> {
        let mut config = match &self.config {
            Some(path) => FsConfig::load(path)?,
            None => FsConfig::default(),
        };
        config.roots.extend(self.roots);
        if self.no_cache {
            config.cache.enabled = false;
        }
        if let Some(max) = self.max_results {
            config.search.max_results = max;
        }
        if let Some(ms) = self.search_timeout_ms {
            config.search.timeout_ms = ms;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the protocol.
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let list_tools = args.list_tools;
    let config = args.into_config()?;
    if config.roots.is_empty() {
        bail!("at least one allowed directory is required");
    }

    let working_dir = std::env::current_dir().context("cannot determine working directory")?;
    let fs = SandboxFs::from_config(&config, &working_dir)
        .map_err(|e| anyhow::anyhow!(e.log_message()))?;
    for root in fs.list_allowed_directories() {
        tracing::info!(root = %root.display(), "serving");
    }

    let mut registry = ToolRegistry::new();
    register_file_tools(&mut registry, Arc::new(fs));

    if list_tools {
        for tool in registry.list_available().await {
            println!("{:<28} {}", tool.name, tool.description);
        }
        return Ok(());
    }

    tracing::info!(
        cache = config.cache.enabled,
        max_results = config.search.max_results,
        "fsgate-server ready"
    );
    let stdin = BufReader::new(tokio::io::stdin());
    host::serve(Arc::new(registry), stdin, tokio::io::stdout()).await?;

    tracing::info!("fsgate-server shutting down");
    Ok(())
}
