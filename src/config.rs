//! Configuration loading and types for treegate.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, logging, observability, the metadata store, the
//! placement service and the identity service.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::metadata::record::StorageNode;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + health probes).
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Metadata store settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Replica placement settings.
    #[serde(default)]
    pub placement: PlacementConfig,

    /// Identity service seed data.
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Name reported in the `x-server-name` response header.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            name: default_server_name(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` probe.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
        }
    }
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Shard name reported by the in-memory store.
    #[serde(default = "default_shard")]
    pub shard: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            shard: default_shard(),
        }
    }
}

/// Replica placement configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacementConfig {
    /// Copies stored when a request does not ask for a durability level.
    #[serde(default = "default_copies")]
    pub default_copies: u32,

    /// Highest durability level a request may ask for.
    #[serde(default = "default_max_copies")]
    pub max_copies: u32,

    /// Storage nodes available for placement.
    #[serde(default)]
    pub nodes: Vec<StorageNode>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            default_copies: default_copies(),
            max_copies: default_max_copies(),
            nodes: Vec::new(),
        }
    }
}

/// Identity service seed data.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct IdentityConfig {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// One account and its roles and sub-users.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub login: String,
    pub uuid: String,
    #[serde(default)]
    pub operator: bool,
    /// Role name -> role uuid.
    #[serde(default)]
    pub roles: BTreeMap<String, String>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// A sub-user of an account.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub login: String,
    pub uuid: String,
    /// Names of roles active by default.
    #[serde(default)]
    pub default_roles: Vec<String>,
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_server_name() -> String {
    "treegate".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_shard() -> String {
    "1.meta.local".to_string()
}

fn default_copies() -> u32 {
    2
}

fn default_max_copies() -> u32 {
    9
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
