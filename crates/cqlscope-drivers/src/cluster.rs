//! Scylla/Cassandra driver implementation.
//!
//! This module provides an implementation of the `CqlDriver` trait on top of
//! the `scylla` native protocol driver.

use async_trait::async_trait;
use cqlscope_abstraction::{
    Connector, CqlDriver, CqlValue, DriverError, Endpoint, PagingState, ResultPage, Row, Statement,
};
use scylla::frame::response::result::{CqlValue as ScyllaValue, Row as ScyllaRow};
use scylla::query::Query;
use scylla::transport::errors::{DbError, QueryError};
use scylla::{Session, SessionBuilder};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

/// Holds a value until it is taken out for good.
///
/// Callers get a clone of the `Arc`, so an in-flight request keeps the value
/// alive until it finishes even if the slot is emptied meanwhile.
struct Slot<T> {
    inner: Mutex<Option<Arc<T>>>,
}

impl<T> Slot<T> {
    fn new(value: T) -> Self {
        Self { inner: Mutex::new(Some(Arc::new(value))) }
    }

    fn get(&self) -> Option<Arc<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Empties the slot. False if it was already empty.
    fn take(&self) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).take().is_some()
    }
}

/// Driver backed by a connected `scylla::Session`.
pub struct ScyllaDriver {
    /// The driver session; connections are released when the last handle to
    /// it is dropped.
    session: Slot<Session>,
    /// Contact points, for logging.
    contact: String,
}

impl ScyllaDriver {
    /// Wraps an already connected session.
    pub fn new(session: Session, contact: String) -> Self {
        Self { session: Slot::new(session), contact }
    }
}

#[async_trait]
impl CqlDriver for ScyllaDriver {
    async fn execute(
        &self,
        statement: &Statement,
        paging_state: Option<&PagingState>,
    ) -> Result<ResultPage, DriverError> {
        debug!(
            contact = %self.contact,
            query = %statement.text,
            page_size = statement.page_size,
            paging_state = ?paging_state,
            "Sending query"
        );

        let session = self
            .session
            .get()
            .ok_or_else(|| DriverError::Unavailable("Cluster is already shut down".to_string()))?;

        let mut query = Query::new(statement.text.clone());
        query.set_page_size(i32::try_from(statement.page_size).unwrap_or(i32::MAX));

        let result = session
            .query_paged(query, &[], paging_state.map(PagingState::to_bytes))
            .await
            .map_err(|e| {
                error!(contact = %self.contact, error = %e, "Query failed");
                classify_query_error(&e)
            })?;

        let columns: Vec<String> =
            result.col_specs.iter().map(|spec| spec.name.clone()).collect();
        let rows = result
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| convert_row(&columns, row))
            .collect();
        let paging_state = result.paging_state.map(PagingState::new);

        debug!(contact = %self.contact, paging_state = ?paging_state, "Response paging");
        Ok(ResultPage { columns, rows, paging_state })
    }

    async fn shutdown(&self) {
        if self.session.take() {
            debug!(contact = %self.contact, "Closed cluster session");
        }
    }

    fn driver_id(&self) -> &str {
        "scylla"
    }
}

/// Connects to a cluster with `scylla::SessionBuilder`.
#[derive(Debug, Default, Clone)]
pub struct ScyllaConnector;

impl ScyllaConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for ScyllaConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn CqlDriver>, DriverError> {
        let addresses = endpoint.addresses();
        if addresses.is_empty() {
            return Err(DriverError::Unavailable("no contact points configured".to_string()));
        }
        let contact = addresses.join(",");
        debug!(contact = %contact, user = ?endpoint.user, "Creating cluster session");

        let mut builder = SessionBuilder::new();
        for address in &addresses {
            builder = builder.known_node(address);
        }
        if let (Some(user), Some(password)) = (&endpoint.user, &endpoint.password) {
            builder = builder.user(user, password);
        }

        let session = builder.build().await.map_err(|e| {
            error!(contact = %contact, error = %e, "Failed to connect cluster");
            DriverError::Unavailable(e.to_string())
        })?;

        Ok(Arc::new(ScyllaDriver::new(session, contact)))
    }
}

/// Maps driver errors onto rejected / unavailable / other.
///
/// Client-side timeouts count as a lost connection: the session drops its
/// handle and the next statement reconnects.
fn classify_query_error(err: &QueryError) -> DriverError {
    match err {
        QueryError::DbError(db_error, message) => match db_error {
            DbError::SyntaxError
            | DbError::Invalid
            | DbError::Unauthorized
            | DbError::ConfigError
            | DbError::AlreadyExists { .. }
            | DbError::FunctionFailure { .. } => DriverError::Rejected(message.clone()),
            DbError::Unavailable { .. }
            | DbError::Overloaded
            | DbError::IsBootstrapping
            | DbError::ReadTimeout { .. }
            | DbError::WriteTimeout { .. } => DriverError::Unavailable(message.clone()),
            _ => DriverError::Other(message.clone()),
        },
        QueryError::BadQuery(_) => DriverError::Rejected(err.to_string()),
        QueryError::IoError(_) | QueryError::TimeoutError | QueryError::RequestTimeout(_) => {
            DriverError::Unavailable(err.to_string())
        }
        _ => DriverError::Other(err.to_string()),
    }
}

fn convert_row(columns: &[String], row: ScyllaRow) -> Row {
    columns
        .iter()
        .cloned()
        .zip(row.columns)
        .map(|(name, value)| (name, value.map_or(CqlValue::Null, convert_value)))
        .collect()
}

fn convert_value(value: ScyllaValue) -> CqlValue {
    match value {
        ScyllaValue::Ascii(s) | ScyllaValue::Text(s) => CqlValue::Text(s),
        ScyllaValue::Boolean(b) => CqlValue::Boolean(b),
        ScyllaValue::TinyInt(i) => CqlValue::Int(i64::from(i)),
        ScyllaValue::SmallInt(i) => CqlValue::Int(i64::from(i)),
        ScyllaValue::Int(i) => CqlValue::Int(i64::from(i)),
        ScyllaValue::BigInt(i) => CqlValue::Int(i),
        ScyllaValue::Float(f) => CqlValue::Double(f64::from(f)),
        ScyllaValue::Double(d) => CqlValue::Double(d),
        ScyllaValue::Blob(bytes) => CqlValue::Blob(bytes),
        ScyllaValue::Uuid(uuid) => CqlValue::Other(uuid.to_string()),
        ScyllaValue::Inet(addr) => CqlValue::Other(addr.to_string()),
        ScyllaValue::List(items) | ScyllaValue::Set(items) => {
            CqlValue::List(items.into_iter().map(convert_value).collect())
        }
        ScyllaValue::Map(entries) => CqlValue::Map(
            entries.into_iter().map(|(k, v)| (convert_value(k), convert_value(v))).collect(),
        ),
        ScyllaValue::Empty => CqlValue::Null,
        other => CqlValue::Other(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_scalar_values() {
        assert_eq!(convert_value(ScyllaValue::Text("ks".into())), CqlValue::Text("ks".into()));
        assert_eq!(convert_value(ScyllaValue::Int(7)), CqlValue::Int(7));
        assert_eq!(convert_value(ScyllaValue::Boolean(true)), CqlValue::Boolean(true));
        assert_eq!(convert_value(ScyllaValue::Empty), CqlValue::Null);
    }

    #[test]
    fn test_convert_collections() {
        let map = ScyllaValue::Map(vec![(
            ScyllaValue::Text("class".into()),
            ScyllaValue::Text("SimpleStrategy".into()),
        )]);
        assert_eq!(
            convert_value(map),
            CqlValue::Map(vec![(CqlValue::from("class"), CqlValue::from("SimpleStrategy"))])
        );
        let set = ScyllaValue::Set(vec![ScyllaValue::BigInt(1), ScyllaValue::BigInt(2)]);
        assert_eq!(convert_value(set), CqlValue::List(vec![CqlValue::Int(1), CqlValue::Int(2)]));
    }

    #[test]
    fn test_convert_row_with_nulls() {
        let columns = vec!["keyspace_name".to_string(), "comment".to_string()];
        let row = ScyllaRow { columns: vec![Some(ScyllaValue::Text("ks".into())), None] };
        let converted = convert_row(&columns, row);
        assert_eq!(converted.get("keyspace_name"), Some(&CqlValue::from("ks")));
        assert_eq!(converted.get("comment"), Some(&CqlValue::Null));
    }

    fn db_error(error: DbError) -> QueryError {
        QueryError::DbError(error, "server said no".to_string())
    }

    #[test]
    fn test_bad_statements_are_rejected() {
        for error in [DbError::SyntaxError, DbError::Invalid, DbError::Unauthorized] {
            assert_eq!(
                classify_query_error(&db_error(error)),
                DriverError::Rejected("server said no".to_string())
            );
        }
    }

    #[test]
    fn test_lost_nodes_are_unavailable() {
        let unavailable = DbError::Unavailable {
            consistency: scylla::statement::Consistency::Quorum,
            required: 2,
            alive: 1,
        };
        for error in [unavailable, DbError::Overloaded, DbError::IsBootstrapping] {
            assert_eq!(
                classify_query_error(&db_error(error)),
                DriverError::Unavailable("server said no".to_string())
            );
        }

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let io = QueryError::IoError(Arc::new(reset));
        assert!(matches!(classify_query_error(&io), DriverError::Unavailable(_)));
    }

    #[test]
    fn test_timeouts_are_unavailable() {
        assert!(matches!(
            classify_query_error(&QueryError::TimeoutError),
            DriverError::Unavailable(_)
        ));
        let timeout = QueryError::RequestTimeout("no response in 30s".to_string());
        assert!(matches!(classify_query_error(&timeout), DriverError::Unavailable(_)));
    }

    #[test]
    fn test_other_failures() {
        assert_eq!(
            classify_query_error(&db_error(DbError::ServerError)),
            DriverError::Other("server said no".to_string())
        );
        let invalid = QueryError::InvalidMessage("unexpected frame".to_string());
        assert!(matches!(classify_query_error(&invalid), DriverError::Other(_)));
    }

    #[test]
    fn test_slot_take_releases_value() {
        let slot = Slot::new("session".to_string());
        let held = slot.get().unwrap();
        assert!(slot.take());
        assert!(slot.get().is_none());
        assert!(!slot.take());
        assert_eq!(held.as_str(), "session");
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[tokio::test]
    async fn test_connect_without_contact_points() {
        let connector = ScyllaConnector::new();
        let result = connector.connect(&Endpoint::new(Vec::new(), 9042)).await;
        assert!(matches!(result, Err(DriverError::Unavailable(_))));
    }
}
