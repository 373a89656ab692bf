//! Client configuration file support.
//!
//! Provides configuration structure and loading for connection, SSH and web
//! settings. Every field is optional in the file; accessors fall back to the
//! built-in defaults.

use cqlscope_abstraction::Endpoint;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default native protocol port.
pub const DEFAULT_PORT: u16 = 9042;
/// Default rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Credentials used when none are given.
pub const DEFAULT_USER: &str = "sdn";
pub const DEFAULT_PASSWORD: &str = "sdncassandra";
/// Default SSH login on the hop host.
pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_KEEPALIVE_MS: u64 = 500;
const DEFAULT_WEB_ADDRESS: &str = "127.0.0.1:8383";
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1800;

/// Client configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Database connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// SSH hop settings
    #[serde(default)]
    pub ssh: SshConfig,

    /// Web front-end settings
    #[serde(default)]
    pub web: WebConfig,

    /// Log level
    #[serde(default)]
    pub log_level: Option<String>,
}

/// `[connection]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Driver name (scylla, fixture)
    #[serde(default)]
    pub driver: Option<String>,
}

/// `[ssh]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SshConfig {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub keepalive_ms: Option<u64>,
    /// Look up the database listen address on the hop host
    #[serde(default)]
    pub detect_address: Option<bool>,
}

/// `[web]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    #[serde(default)]
    pub address: Option<String>,
    /// Seconds a browser session may sit unused before it is closed
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".cqlscope")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".cqlscoperc")
    }

    /// Discover and load configuration files.
    ///
    /// Loads configuration from:
    /// 1. Global config (~/.cqlscope/config.toml)
    /// 2. Local config (./.cqlscoperc)
    ///
    /// Local config overrides global config. Unreadable files are skipped.
    pub fn discover_and_load() -> Self {
        let mut config = Self::default();

        if let Ok(global_config) = Self::load_from_file(&Self::default_global_path()) {
            config.merge(&global_config);
        }

        if let Ok(local_config) = Self::load_from_file(&Self::default_local_path()) {
            config.merge(&local_config);
        }

        config
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &Self) {
        fn take<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if let Some(value) = src {
                *dst = Some(value.clone());
            }
        }

        take(&mut self.connection.port, &other.connection.port);
        take(&mut self.connection.user, &other.connection.user);
        take(&mut self.connection.password, &other.connection.password);
        take(&mut self.connection.page_size, &other.connection.page_size);
        take(&mut self.connection.driver, &other.connection.driver);
        take(&mut self.ssh.user, &other.ssh.user);
        take(&mut self.ssh.port, &other.ssh.port);
        take(&mut self.ssh.keepalive_ms, &other.ssh.keepalive_ms);
        take(&mut self.ssh.detect_address, &other.ssh.detect_address);
        take(&mut self.web.address, &other.web.address);
        take(&mut self.web.idle_timeout_secs, &other.web.idle_timeout_secs);
        take(&mut self.log_level, &other.log_level);
    }

    pub fn port(&self) -> u16 {
        self.connection.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn page_size(&self) -> usize {
        self.connection.page_size.filter(|&n| n > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn driver(&self) -> &str {
        self.connection.driver.as_deref().unwrap_or("scylla")
    }

    /// Credentials; the built-in pair applies only when neither is configured.
    pub fn credentials(&self) -> (String, String) {
        match (&self.connection.user, &self.connection.password) {
            (None, None) => (DEFAULT_USER.to_string(), DEFAULT_PASSWORD.to_string()),
            (user, password) => (
                user.clone().unwrap_or_default(),
                password.clone().unwrap_or_default(),
            ),
        }
    }

    /// Endpoint for the given hosts using the configured port and credentials.
    pub fn endpoint(&self, hosts: Vec<String>) -> Endpoint {
        let (user, password) = self.credentials();
        Endpoint::new(hosts, self.port()).with_credentials(user, password)
    }

    pub fn ssh_user(&self) -> &str {
        self.ssh.user.as_deref().unwrap_or(DEFAULT_SSH_USER)
    }

    pub fn ssh_port(&self) -> u16 {
        self.ssh.port.unwrap_or(DEFAULT_SSH_PORT)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.ssh.keepalive_ms.unwrap_or(DEFAULT_KEEPALIVE_MS))
    }

    pub fn detect_address(&self) -> bool {
        self.ssh.detect_address.unwrap_or(true)
    }

    /// Address the web front-end binds to.
    pub fn web_address(&self) -> ConfigResult<SocketAddr> {
        let raw = self.web.address.as_deref().unwrap_or(DEFAULT_WEB_ADDRESS);
        raw.parse()
            .map_err(|e| ConfigError::InvalidValue(format!("web.address '{}': {}", raw, e)))
    }

    /// How long an unused web session lives. Zero is treated as the default.
    pub fn idle_timeout(&self) -> Duration {
        let secs = self.web.idle_timeout_secs.filter(|&s| s > 0);
        Duration::from_secs(secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }
}

/// Splits a comma-separated host list, dropping blanks.
pub fn parse_hosts(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|h| !h.is_empty()).map(ToString::to_string).collect()
}
