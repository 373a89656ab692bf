//! cqlscope core - paginated query sessions over a wide-column database.
//!
//! This crate provides the core functionality shared by the CLI and the web
//! front-end, including:
//! - `QuerySession`: page-at-a-time query execution with an opaque paging state
//! - SSH tunnels for reaching clusters behind a hop host
//! - `system_schema` helper queries
//! - Configuration and error handling
//!
//! # Example
//!
//! ```rust,no_run
//! use cqlscope_core::{QuerySession, config::ClientConfig};
//! use cqlscope_drivers::{DriverType, connector_for};
//!
//! #[tokio::main]
//! async fn main() -> cqlscope_core::Result<()> {
//!     let config = ClientConfig::discover_and_load();
//!     let endpoint = config.endpoint(vec!["127.0.0.1".to_string()]);
//!     let mut session = QuerySession::new(endpoint, connector_for(DriverType::Scylla));
//!
//!     let page = session.query("SELECT * FROM system_schema.keyspaces", 50).await?;
//!     for row in &page.rows {
//!         println!("{row}");
//!     }
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod schema;
pub mod session;
pub mod tunnel;

pub use config::{ClientConfig, ConfigError};
pub use error::{Result, SessionError};
pub use schema::{DescribeCommand, SchemaError, SchemaSummary, is_system_keyspace, user_tables};
pub use session::{HopOptions, Page, QuerySession, SessionHandle, SessionState, SessionStore};
pub use tunnel::{RemoteHop, RemoteOutput, Tunnel, TunnelError};
