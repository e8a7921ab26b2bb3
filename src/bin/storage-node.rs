//! Storage node daemon: scans its export root, registers with the naming
//! server, feeds the liveness link, and serves both the proxied and the
//! direct data ports.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use nameplane::logging::init_logging;
use nameplane::storage::StorageNode;
use nameplane::load_storage_config;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "storage-node", about = "File-holding node of the store")]
struct Cli {
    /// Path to the node's YAML config (server_id and root are required).
    #[arg(long)]
    config: PathBuf,

    /// env_logger-style filter string; overrides RUST_LOG and defaults.
    #[arg(long)]
    log_filter: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());
    let config = load_storage_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    info!(
        "event=storage_start server_id={} root={}",
        config.server_id,
        config.root.display()
    );
    let handle = StorageNode::run(config).context("starting storage node")?;
    info!(
        "event=storage_serving proxy={} data={}",
        handle.proxy_addr(),
        handle.data_addr()
    );
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
