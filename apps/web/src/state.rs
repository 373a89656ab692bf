//! Shared router state and the session cookie.

use cqlscope_abstraction::Connector;
use cqlscope_core::{ClientConfig, SessionStore};
use handlebars::TemplateError;
use http::HeaderMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::templates::{Sidebar, Templates};

/// Cookie naming the caller's query session.
pub const SESSION_COOKIE: &str = "cqlscope_session";

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub connector: Arc<dyn Connector>,
    pub templates: Arc<Templates>,
    pub config: Arc<ClientConfig>,
    sidebars: Arc<RwLock<HashMap<Uuid, Sidebar>>>,
}

impl AppState {
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self, TemplateError> {
        Ok(Self {
            store: SessionStore::new(),
            connector,
            templates: Arc::new(Templates::new()?),
            config: Arc::new(config),
            sidebars: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Cached sidebar for a session.
    pub async fn sidebar(&self, id: &Uuid) -> Sidebar {
        self.sidebars.read().await.get(id).cloned().unwrap_or_default()
    }

    pub async fn set_sidebar(&self, id: Uuid, sidebar: Sidebar) {
        self.sidebars.write().await.insert(id, sidebar);
    }

    /// Closes a session and drops everything kept for it.
    pub async fn forget(&self, id: &Uuid) {
        self.store.remove_and_close(id).await;
        self.sidebars.write().await.remove(id);
    }

    /// Closes sessions unused for `max_idle` and drops their sidebars.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let expired = self.store.sweep_idle(max_idle).await;
        let mut sidebars = self.sidebars.write().await;
        for id in &expired {
            sidebars.remove(id);
        }
        expired.len()
    }

    /// Closes every session.
    pub async fn shutdown(&self) {
        self.store.close_all().await;
        self.sidebars.write().await.clear();
    }
}

/// Session id from the request's `Cookie` header.
pub fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

/// `Set-Cookie` value binding the browser to a session.
pub fn session_cookie(id: Uuid) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value clearing the session cookie.
pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
