//! Driver abstraction layer for cqlscope.
//!
//! This module defines the core traits and types for talking to a wide-column
//! database: statements, result pages, row values and the opaque paging state
//! the database hands back between pages.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error that can occur when talking to the database.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverError {
    /// The database refused the statement (syntax error, unknown table, etc.).
    #[error("Query rejected: {0}")]
    Rejected(String),

    /// The cluster could not be reached or the connection dropped.
    #[error("Connection unavailable: {0}")]
    Unavailable(String),

    /// Other unexpected errors.
    #[error("Driver error: {0}")]
    Other(String),
}

impl DriverError {
    /// Returns true if the error means the connection is no longer usable.
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Opaque continuation token returned by the database for multi-page results.
///
/// The bytes are passed back verbatim on the next fetch and never inspected.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PagingState(Bytes);

impl PagingState {
    /// Wraps raw paging state bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns a cheap clone of the underlying buffer.
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// Base64 form, used when the token is logged or printed.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

impl fmt::Debug for PagingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PagingState({})", self.to_base64())
    }
}

impl fmt::Display for PagingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// A single value in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    Null,
    Boolean(bool),
    Int(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    List(Vec<CqlValue>),
    Map(Vec<(CqlValue, CqlValue)>),
    /// Types without a dedicated variant, pre-rendered by the driver.
    Other(String),
}

impl CqlValue {
    /// Returns the text content for text-like values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the value the way it would appear in a CQL statement.
    pub fn to_cql_literal(&self) -> String {
        match self {
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(Self::to_cql_literal).collect();
                format!("[{}]", parts.join(", "))
            }
            Self::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.to_cql_literal(), v.to_cql_literal()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Text(s) | Self::Other(s) => f.write_str(s),
            Self::Blob(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Self::List(_) | Self::Map(_) => f.write_str(&self.to_cql_literal()),
        }
    }
}

impl From<&str> for CqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for CqlValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// A result row: column names mapped to values, in result-set column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, CqlValue)>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<CqlValue>) {
        self.columns.push((name.into(), value.into()));
    }

    /// Builder-style variant of [`Row::push`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Looks a column up by name.
    pub fn get(&self, name: &str) -> Option<&CqlValue> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = &CqlValue> {
        self.columns.iter().map(|(_, v)| v)
    }

    /// Name/value pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CqlValue)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{}': {}", name, value.to_cql_literal())?;
        }
        f.write_str("}")
    }
}

impl FromIterator<(String, CqlValue)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, CqlValue)>>(iter: T) -> Self {
        Self { columns: iter.into_iter().collect() }
    }
}

/// A statement submitted to the database with its fetch size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Query text in the database's query language.
    pub text: String,
    /// Maximum number of rows the database should return per page.
    pub page_size: usize,
}

impl Statement {
    pub fn new(text: impl Into<String>, page_size: usize) -> Self {
        Self { text: text.into(), page_size }
    }
}

/// One page of results as returned by a driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    /// Column names in result-set order.
    pub columns: Vec<String>,
    /// Rows of this page.
    pub rows: Vec<Row>,
    /// Token for the next page, `None` when the result is exhausted.
    pub paging_state: Option<PagingState>,
}

/// Contact points and credentials for a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hosts to contact (IP addresses or hostnames).
    pub hosts: Vec<String>,
    /// Native protocol port.
    pub port: u16,
    /// Optional plain-text username.
    pub user: Option<String>,
    /// Optional plain-text password.
    pub password: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint without credentials.
    pub fn new(hosts: Vec<String>, port: u16) -> Self {
        Self { hosts, port, user: None, password: None }
    }

    /// Sets plain-text credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// `host:port` strings for every contact point.
    pub fn addresses(&self) -> Vec<String> {
        self.hosts.iter().map(|h| format!("{}:{}", h, self.port)).collect()
    }
}

/// A connected database session able to execute paged statements.
///
/// All drivers must be `Send + Sync` so a handle can be shared across tasks.
#[async_trait]
pub trait CqlDriver: Send + Sync {
    /// Executes a statement, resuming from `paging_state` when given.
    ///
    /// # Errors
    /// Returns a `DriverError` if the database rejects the statement or the
    /// connection fails.
    async fn execute(
        &self,
        statement: &Statement,
        paging_state: Option<&PagingState>,
    ) -> Result<ResultPage, DriverError>;

    /// Releases the connection. Later calls to `execute` fail with
    /// `DriverError::Unavailable`.
    async fn shutdown(&self) {}

    /// Returns the ID of the driver implementation.
    fn driver_id(&self) -> &str;
}

/// Creates connected drivers on demand.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to the given endpoint.
    ///
    /// # Errors
    /// Returns `DriverError::Unavailable` if no contact point can be reached.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn CqlDriver>, DriverError>;
}
