//! In-memory registry of query sessions keyed by id.
//!
//! Each front-end user owns one session. The store hands out shared handles
//! so a request can hold its session's lock across awaits without blocking
//! other users. Sessions nobody has looked up for a while are closed by
//! [`SessionStore::sweep_idle`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::QuerySession;

/// Shared, lockable session.
pub type SessionHandle = Arc<Mutex<QuerySession>>;

struct Entry {
    handle: SessionHandle,
    last_used: Instant,
}

impl Entry {
    fn new(session: QuerySession) -> Self {
        Self { handle: Arc::new(Mutex::new(session)), last_used: Instant::now() }
    }

    /// Idle for at least `max_idle` and not held by any request.
    fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        now.duration_since(self.last_used) >= max_idle && Arc::strong_count(&self.handle) == 1
    }
}

/// Registry of live sessions.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under its own id and returns that id.
    pub async fn insert(&self, session: QuerySession) -> Uuid {
        let id = session.id();
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Entry::new(session));
        info!(session_id = %id, "Registered session");
        id
    }

    /// Looks up a session and marks it used.
    pub async fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(Arc::clone(&entry.handle))
    }

    /// Removes a session and closes it. Returns false if it was unknown.
    pub async fn remove_and_close(&self, id: &Uuid) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(id)
        };
        match removed {
            Some(entry) => {
                entry.handle.lock().await.close().await;
                info!(session_id = %id, "Removed session");
                true
            }
            None => {
                debug!(session_id = %id, "Session not found for removal");
                false
            }
        }
    }

    /// Closes and drops every session.
    pub async fn close_all(&self) {
        let drained: Vec<(Uuid, Entry)> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().collect()
        };
        for (id, entry) in drained {
            entry.handle.lock().await.close().await;
            debug!(session_id = %id, "Closed session on shutdown");
        }
    }

    /// Closes and removes sessions unused for `max_idle`. Sessions a request
    /// still holds are kept. Returns the removed ids.
    pub async fn sweep_idle(&self, max_idle: Duration) -> Vec<Uuid> {
        let now = Instant::now();
        let expired: Vec<(Uuid, Entry)> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, entry)| entry.is_idle(now, max_idle))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| sessions.remove(&id).map(|e| (id, e))).collect()
        };
        for (id, entry) in &expired {
            entry.handle.lock().await.close().await;
            info!(session_id = %id, idle_secs = max_idle.as_secs(), "Closed idle session");
        }
        expired.into_iter().map(|(id, _)| id).collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
