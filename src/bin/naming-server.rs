//! Naming server daemon: binds the registration and heartbeat listeners,
//! waits for the startup quorum, then opens the client-facing port.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use nameplane::logging::init_logging;
use nameplane::net::{
    ClientService, ClientServiceConfig, HeartbeatService, HeartbeatServiceConfig,
    RegistrationService, RegistrationServiceConfig,
};
use nameplane::{load_naming_config, NamingConfig, NamingCore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "naming-server", about = "Namespace owner and request router")]
struct Cli {
    /// Path to a YAML config; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// env_logger-style filter string; overrides RUST_LOG and defaults.
    #[arg(long)]
    log_filter: Option<String>,

    /// Seconds between metrics snapshot dumps (0 disables).
    #[arg(long, default_value_t = 60)]
    metrics_interval: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());
    let config = match &cli.config {
        Some(path) => load_naming_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NamingConfig::default(),
    };
    info!(
        "event=naming_start init_servers={} replica_quota={} cache_capacity={}",
        config.init_servers, config.replica_quota, config.cache_capacity
    );

    let core = Arc::new(NamingCore::new(
        config.init_servers,
        config.replica_quota,
        config.cache_capacity,
    ));

    let _registration = RegistrationService::spawn(
        RegistrationServiceConfig {
            bind: config
                .registration_bind()
                .parse()
                .context("parsing registration bind address")?,
        },
        core.clone(),
    )
    .context("starting registration listener")?;
    let _heartbeat = HeartbeatService::spawn(
        HeartbeatServiceConfig {
            bind: config
                .heartbeat_bind()
                .parse()
                .context("parsing heartbeat bind address")?,
        },
        core.clone(),
    )
    .context("starting heartbeat listener")?;

    info!(
        "event=awaiting_quorum required={} online={}",
        config.init_servers,
        core.online_count()
    );
    core.gate().wait();

    let _clients = ClientService::spawn(
        ClientServiceConfig {
            bind: config
                .client_bind()
                .parse()
                .context("parsing client bind address")?,
            max_clients: config.max_clients,
        },
        core.clone(),
    )
    .context("starting client listener")?;

    loop {
        let interval = if cli.metrics_interval == 0 {
            3600
        } else {
            cli.metrics_interval
        };
        std::thread::sleep(Duration::from_secs(interval));
        if cli.metrics_interval != 0 {
            let snapshot = core.metrics_snapshot();
            match serde_json::to_string(&snapshot) {
                Ok(json) => info!("event=metrics snapshot={json}"),
                Err(err) => log::warn!("event=metrics_serialize_failed error={err}"),
            }
        }
    }
}
