//! Driver factory for creating connectors from configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cqlscope_abstraction::Connector;
use tracing::debug;

use crate::{FixtureConnector, ScyllaConnector};

/// Driver type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverType {
    /// Cassandra or Scylla cluster over the native protocol.
    #[default]
    Scylla,
    /// Built-in in-memory dataset.
    Fixture,
}

impl FromStr for DriverType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scylla" | "cassandra" => Ok(Self::Scylla),
            "fixture" | "mock" => Ok(Self::Fixture),
            other => Err(format!("Unrecognized driver type: {other}")),
        }
    }
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scylla => f.write_str("scylla"),
            Self::Fixture => f.write_str("fixture"),
        }
    }
}

/// Creates the connector for a driver type.
///
/// The fixture connector serves [`crate::Fixture::system_schema`].
pub fn connector_for(driver_type: DriverType) -> Arc<dyn Connector> {
    debug!(driver = %driver_type, "Creating connector");
    match driver_type {
        DriverType::Scylla => Arc::new(ScyllaConnector::new()),
        DriverType::Fixture => Arc::new(FixtureConnector::new(crate::Fixture::system_schema())),
    }
}
