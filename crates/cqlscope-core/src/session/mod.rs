//! Query sessions and the per-user session store.

mod page;
mod query;
mod store;

pub use page::Page;
pub use query::{HopOptions, QuerySession, SessionState};
pub use store::{SessionHandle, SessionStore};
