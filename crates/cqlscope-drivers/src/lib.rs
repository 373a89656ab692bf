//! Driver implementations for cqlscope.
//!
//! This crate provides concrete implementations of the `CqlDriver` and
//! `Connector` traits.
//!
//! # Supported Drivers
//!
//! - **Scylla**: Cassandra/Scylla clusters over the native protocol
//! - **Fixture**: In-memory tables for tests, demos and offline use

pub mod cluster;
pub mod factory;
pub mod fixture;

pub use cluster::{ScyllaConnector, ScyllaDriver};
pub use factory::{DriverType, connector_for};
pub use fixture::{Fixture, FixtureConnector, FixtureDriver, FixtureLink, FixtureTable};
