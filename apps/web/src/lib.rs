//! cqlscope web front-end.
//!
//! A login page creates a per-user `QuerySession` bound to a cookie; the
//! query page runs statements one page at a time and lists the non-system
//! keyspaces and tables in a sidebar.

pub mod error;
pub mod logging;
pub mod routes;
pub mod state;
pub mod templates;

pub use routes::app;
pub use state::{AppState, SESSION_COOKIE};
