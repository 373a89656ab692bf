//! CLI configuration loading and merging.

use cqlscope_core::config::{ClientConfig, ConfigError, ConnectionConfig, SshConfig};
use std::path::Path;

/// Load and merge CLI configuration.
///
/// Configuration precedence:
/// 1. CLI arguments (applied by [`apply_overrides`])
/// 2. Explicit `--config` file
/// 3. Local config file (./.cqlscoperc)
/// 4. Global config file (~/.cqlscope/config.toml)
/// 5. Defaults
pub fn load_config(explicit: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::discover_and_load();
    if let Some(path) = explicit {
        config.merge(&ClientConfig::load_from_file(path)?);
    }
    Ok(config)
}

/// Values given on the command line.
#[derive(Debug, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub page_size: Option<usize>,
    pub driver: Option<String>,
    pub remote_user: Option<String>,
    pub log_level: Option<String>,
}

/// Layers command-line values over the loaded configuration.
pub fn apply_overrides(config: &mut ClientConfig, overrides: Overrides) {
    let layer = ClientConfig {
        connection: ConnectionConfig {
            port: overrides.port,
            user: overrides.user,
            password: overrides.password,
            page_size: overrides.page_size,
            driver: overrides.driver,
        },
        ssh: SshConfig { user: overrides.remote_user, ..SshConfig::default() },
        log_level: overrides.log_level,
        ..ClientConfig::default()
    };
    config.merge(&layer);
}
