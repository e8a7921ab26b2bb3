//! YAML configuration for the naming server and storage node processes.

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::redundancy::DEFAULT_MAX_REDUNDANCY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamingConfig {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    /// Client-facing port (request routing).
    #[serde(default = "default_client_port")]
    pub client_port: u16,
    /// One-shot storage-server registration port.
    #[serde(default = "default_registration_port")]
    pub registration_port: u16,
    /// Long-lived liveness links.
    #[serde(default = "default_heartbeat_port")]
    pub heartbeat_port: u16,
    /// Registrations required before client traffic is accepted.
    #[serde(default = "default_init_servers")]
    pub init_servers: usize,
    /// Replica peers maintained per storage server.
    #[serde(default = "default_replica_quota")]
    pub replica_quota: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            client_port: default_client_port(),
            registration_port: default_registration_port(),
            heartbeat_port: default_heartbeat_port(),
            init_servers: default_init_servers(),
            replica_quota: default_replica_quota(),
            cache_capacity: default_cache_capacity(),
            max_clients: default_max_clients(),
        }
    }
}

impl NamingConfig {
    pub fn client_bind(&self) -> String {
        format!("{}:{}", self.bind_host, self.client_port)
    }

    pub fn registration_bind(&self) -> String {
        format!("{}:{}", self.bind_host, self.registration_port)
    }

    pub fn heartbeat_bind(&self) -> String {
        format!("{}:{}", self.bind_host, self.heartbeat_port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageNodeConfig {
    pub server_id: u16,
    /// Directory the node exports; scanned at startup for the initial
    /// path report.
    pub root: PathBuf,
    /// Host address advertised to the naming server.
    #[serde(default = "default_advertise_host")]
    pub advertise_host: String,
    /// Port serving proxied (privileged) operations from the naming server.
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,
    /// Port serving direct client data operations.
    #[serde(default = "default_data_port")]
    pub data_port: u16,
    #[serde(default = "default_advertise_host")]
    pub naming_host: String,
    #[serde(default = "default_registration_port")]
    pub naming_registration_port: u16,
    #[serde(default = "default_heartbeat_port")]
    pub naming_heartbeat_port: u16,
}

impl StorageNodeConfig {
    pub fn proxy_bind(&self) -> String {
        format!("0.0.0.0:{}", self.proxy_port)
    }

    pub fn data_bind(&self) -> String {
        format!("0.0.0.0:{}", self.data_port)
    }

    pub fn registration_target(&self) -> String {
        format!("{}:{}", self.naming_host, self.naming_registration_port)
    }

    pub fn heartbeat_target(&self) -> String {
        format!("{}:{}", self.naming_host, self.naming_heartbeat_port)
    }
}

pub fn load_naming_config(path: &Path) -> Result<NamingConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}

pub fn load_storage_config(path: &Path) -> Result<StorageNodeConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn default_bind_host() -> String {
    "0.0.0.0".into()
}

fn default_advertise_host() -> String {
    "127.0.0.1".into()
}

fn default_client_port() -> u16 {
    8080
}

fn default_registration_port() -> u16 {
    8081
}

fn default_heartbeat_port() -> u16 {
    8082
}

fn default_proxy_port() -> u16 {
    6060
}

fn default_data_port() -> u16 {
    7070
}

fn default_init_servers() -> usize {
    1
}

fn default_replica_quota() -> usize {
    DEFAULT_MAX_REDUNDANCY
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_max_clients() -> usize {
    100
}
