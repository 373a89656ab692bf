//! Paginated query session.
//!
//! A `QuerySession` starts a cursor with [`QuerySession::query`] and advances
//! it with [`QuerySession::query_next`]. Only the last query text and the
//! opaque paging state are kept between calls; rows are never buffered.

use cqlscope_abstraction::{Connector, CqlDriver, DriverError, Endpoint, PagingState, Statement};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::{Result, SessionError};
use crate::session::Page;
use crate::tunnel::{LISTENERS_COMMAND, RemoteHop, Tunnel, detect_listen_address};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection yet; one is made on the first query.
    Idle,
    /// A driver handle is held.
    Connected,
    /// `close()` was called. Terminal.
    Closed,
}

/// Options for [`QuerySession::open_remote`].
#[derive(Debug, Clone, Copy)]
pub struct HopOptions {
    /// SSH keepalive interval.
    pub keepalive: Duration,
    /// Look up the database listen address on the hop host.
    pub detect_address: bool,
}

impl Default for HopOptions {
    fn default() -> Self {
        Self { keepalive: Duration::from_millis(500), detect_address: true }
    }
}

/// Page-at-a-time query session over one database connection.
pub struct QuerySession {
    id: Uuid,
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    driver: Option<Arc<dyn CqlDriver>>,
    tunnel: Option<Tunnel>,
    last_query: Option<String>,
    page_size: usize,
    paging_state: Option<PagingState>,
    closed: bool,
    span: Span,
}

impl QuerySession {
    /// Creates an idle session. Nothing is connected until the first query.
    pub fn new(endpoint: Endpoint, connector: Arc<dyn Connector>) -> Self {
        let id = Uuid::new_v4();
        let span = info_span!("query_session", session_id = %id);
        Self {
            id,
            endpoint,
            connector,
            driver: None,
            tunnel: None,
            last_query: None,
            page_size: DEFAULT_PAGE_SIZE,
            paging_state: None,
            closed: false,
            span,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        if self.closed {
            SessionState::Closed
        } else if self.driver.is_some() {
            SessionState::Connected
        } else {
            SessionState::Idle
        }
    }

    /// Contact points the driver connects to (rewritten by a tunnel).
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Text of the last successful `query()`.
    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    pub fn paging_state(&self) -> Option<&PagingState> {
        self.paging_state.as_ref()
    }

    /// Page size of the current cursor.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// True when `query_next()` will fetch another page.
    pub fn has_more(&self) -> bool {
        self.paging_state.is_some()
    }

    pub fn is_tunneled(&self) -> bool {
        self.tunnel.is_some()
    }

    /// Routes the connection through an SSH hop.
    ///
    /// The database is reached at its configured address as seen from the hop
    /// host, or at the address detected there. Any existing driver handle is
    /// dropped so the next query connects through the tunnel. A second call
    /// while a tunnel is open does nothing.
    pub async fn open_remote(&mut self, hop: &RemoteHop, options: HopOptions) -> Result<()> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if self.tunnel.is_some() {
            return Ok(());
        }

        let span = self.span.clone();
        async {
            let mut tunnel = Tunnel::connect(hop, options.keepalive).await?;

            let mut service_host =
                self.endpoint.hosts.first().cloned().unwrap_or_else(|| "127.0.0.1".to_string());
            if options.detect_address {
                match tunnel.exec(LISTENERS_COMMAND).await {
                    Ok(output) => {
                        let port = self.endpoint.port;
                        if let Some(address) = detect_listen_address(&output.stdout, port) {
                            service_host = address;
                        }
                    }
                    Err(e) => warn!(error = %e, "Listen address detection failed"),
                }
                info!(service_host = %service_host, "Database address on hop host");
            }

            let local_port = match tunnel.forward(&service_host, self.endpoint.port).await {
                Ok(port) => port,
                Err(e) => {
                    tunnel.stop().await;
                    return Err(e.into());
                }
            };

            self.release_driver().await;
            self.endpoint.hosts = vec!["127.0.0.1".to_string()];
            self.endpoint.port = local_port;
            self.tunnel = Some(tunnel);
            Ok::<(), SessionError>(())
        }
        .instrument(span)
        .await
    }

    /// Starts a new cursor for `text` and returns its first page.
    ///
    /// On failure the previously stored query and paging state are kept, so
    /// `query_next()` keeps working against the earlier query.
    pub async fn query(&mut self, text: &str, page_size: usize) -> Result<Page> {
        self.query_with_state(text, page_size, None).await
    }

    /// Like [`QuerySession::query`], but resumes from a token the caller kept.
    pub async fn query_with_state(
        &mut self,
        text: &str,
        page_size: usize,
        paging_state: Option<PagingState>,
    ) -> Result<Page> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        if page_size == 0 {
            return Err(SessionError::InvalidPageSize(page_size));
        }

        let statement = Statement::new(text, page_size);
        let page = self.fetch(&statement, paging_state.as_ref()).await?;

        self.last_query = Some(statement.text);
        self.page_size = page_size;
        self.paging_state = page.paging_state.clone();
        Ok(page)
    }

    /// Fetches the next page of the last query.
    ///
    /// Without a stored paging state (exhausted cursor, no prior query, or a
    /// closed session) this returns [`Page::empty`].
    pub async fn query_next(&mut self) -> Result<Page> {
        let (Some(text), Some(token)) = (self.last_query.clone(), self.paging_state.clone()) else {
            return Ok(Page::empty());
        };

        let statement = Statement::new(text, self.page_size);
        let page = self.fetch(&statement, Some(&token)).await?;
        self.paging_state = page.paging_state.clone();
        Ok(page)
    }

    /// Releases the driver and any tunnel. Idempotent.
    pub async fn close(&mut self) {
        let span = self.span.clone();
        async {
            self.release_driver().await;
            if let Some(mut tunnel) = self.tunnel.take() {
                tunnel.stop().await;
            }
            self.last_query = None;
            self.paging_state = None;
            if !self.closed {
                self.closed = true;
                info!("Session closed");
            }
        }
        .instrument(span)
        .await;
    }

    async fn driver(&mut self) -> Result<Arc<dyn CqlDriver>> {
        if let Some(driver) = &self.driver {
            return Ok(Arc::clone(driver));
        }

        info!(hosts = ?self.endpoint.hosts, port = self.endpoint.port, "Connecting to cluster");
        let driver = self
            .connector
            .connect(&self.endpoint)
            .await
            .map_err(|e| SessionError::ConnectionUnavailable(e.to_string()))?;
        self.driver = Some(Arc::clone(&driver));
        Ok(driver)
    }

    async fn release_driver(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.shutdown().await;
        }
    }

    async fn fetch(
        &mut self,
        statement: &Statement,
        paging_state: Option<&PagingState>,
    ) -> Result<Page> {
        let span = self.span.clone();
        async {
            let driver = self.driver().await?;

            debug!(
                query = %statement.text,
                page_size = statement.page_size,
                resume = paging_state.is_some(),
                "Send query"
            );
            let started = Instant::now();
            match driver.execute(statement, paging_state).await {
                Ok(result) => {
                    let page = Page::from_result(result, started.elapsed());
                    debug!(
                        rows = page.len(),
                        elapsed_ms = page.elapsed.as_millis() as u64,
                        has_more = page.has_more(),
                        "Page fetched"
                    );
                    Ok(page)
                }
                Err(DriverError::Rejected(detail)) => {
                    info!(detail = %detail, "Query rejected");
                    Err(SessionError::QueryRejected { detail })
                }
                Err(DriverError::Unavailable(detail)) => {
                    warn!(detail = %detail, "Connection lost, dropping driver");
                    self.release_driver().await;
                    Err(SessionError::ConnectionUnavailable(detail))
                }
                Err(DriverError::Other(detail)) => Err(SessionError::Driver(detail)),
            }
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for QuerySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("hosts", &self.endpoint.hosts)
            .field("port", &self.endpoint.port)
            .field("last_query", &self.last_query)
            .field("page_size", &self.page_size)
            .field("paging_state", &self.paging_state)
            .finish_non_exhaustive()
    }
}
