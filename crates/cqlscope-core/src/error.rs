//! Error types for cqlscope core.

use crate::tunnel::TunnelError;
use thiserror::Error;

/// Errors surfaced by a `QuerySession`.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The database refused the query. Session state is left unchanged.
    #[error("Query rejected: {detail}")]
    QueryRejected {
        /// Error detail reported by the database.
        detail: String,
    },

    /// The connection could not be established or was dropped.
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// The SSH hop failed.
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    /// The session was closed.
    #[error("Session is closed")]
    Closed,

    /// The query text was empty.
    #[error("Query text is empty")]
    EmptyQuery,

    /// The page size must be positive.
    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),

    /// Unclassified driver errors.
    #[error("Driver error: {0}")]
    Driver(String),
}

impl SessionError {
    /// Returns true for errors the caller can recover from by fixing input.
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::QueryRejected { .. } | Self::EmptyQuery | Self::InvalidPageSize(_))
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_rejected_display() {
        let err =
            SessionError::QueryRejected { detail: "line 1:0 no viable alternative".to_string() };
        let msg = format!("{}", err);
        assert!(msg.contains("Query rejected"));
        assert!(msg.contains("no viable alternative"));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_tunnel_error_conversion() {
        let tunnel_err = TunnelError::Authentication("root@10.0.0.1".to_string());
        let err: SessionError = tunnel_err.into();
        match err {
            SessionError::Tunnel(TunnelError::Authentication(who)) => {
                assert_eq!(who, "root@10.0.0.1")
            }
            _ => panic!("Expected Tunnel::Authentication error variant"),
        }
    }

    #[test]
    fn test_connection_errors_are_not_rejections() {
        assert!(!SessionError::ConnectionUnavailable("reset".to_string()).is_rejection());
        assert!(!SessionError::Closed.is_rejection());
        assert!(SessionError::InvalidPageSize(0).is_rejection());
    }
}
