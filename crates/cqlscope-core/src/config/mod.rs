//! Configuration module for cqlscope.
//!
//! Configuration precedence:
//! 1. Command-line arguments (handled by the binaries)
//! 2. Explicit `--config` file
//! 3. Local config file (./.cqlscoperc)
//! 4. Global config file (~/.cqlscope/config.toml)
//! 5. Defaults

mod client_config;

pub use client_config::{
    ClientConfig, ConfigError, ConfigResult, ConnectionConfig, DEFAULT_PAGE_SIZE, DEFAULT_PASSWORD,
    DEFAULT_PORT, DEFAULT_SSH_PORT, DEFAULT_SSH_USER, DEFAULT_USER, SshConfig, WebConfig,
    parse_hosts,
};
