//! Router and page handlers.

use axum::extract::{Form, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use cqlscope_abstraction::Endpoint;
use cqlscope_core::config::parse_hosts;
use cqlscope_core::schema::TABLES_QUERY;
use cqlscope_core::{
    ClientConfig, HopOptions, Page, QuerySession, RemoteHop, SessionError, user_tables,
};
use http::header::{CACHE_CONTROL, SET_COOKIE};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

use crate::error::{WebError, not_found};
use crate::logging::RequestLoggerLayer;
use crate::state::{AppState, expired_session_cookie, session_cookie, session_id};
use crate::templates::{DB, DbView, KeyspaceView, LOGIN, LoginView, Sidebar, format_secs};

/// Page size used when loading the keyspace/table sidebar.
const SIDEBAR_PAGE_SIZE: usize = 1000;

/// Builds the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(login_page))
        .route("/db", get(db_page).post(connect))
        .route("/db/query", post(run_query))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(RequestLoggerLayer)
                .layer(SetResponseHeaderLayer::if_not_present(
                    CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                )),
        )
        .with_state(state)
}

/// Login form fields. Blank inputs arrive as empty strings.
#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub ip: String,
    pub port: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssh: Option<String>,
    pub ssh_ip: Option<String>,
    pub ssh_user: Option<String>,
    pub ssh_password: Option<String>,
}

/// Query form fields. `next` and `disconnect` are submit buttons.
#[derive(Debug, Default, Deserialize)]
pub struct QueryForm {
    pub cql: Option<String>,
    pub next: Option<String>,
    pub disconnect: Option<String>,
}

fn filled(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Database endpoint from the login form; configured defaults fill the gaps.
fn login_endpoint(form: &LoginForm, config: &ClientConfig) -> Result<Endpoint, String> {
    let hosts = parse_hosts(&form.ip);
    if hosts.is_empty() {
        return Err("Please input the database IP.".to_string());
    }
    let port = match filled(form.port.as_ref()) {
        Some(raw) => raw.parse::<u16>().map_err(|_| format!("Invalid port: {raw}"))?,
        None => config.port(),
    };
    let (user, password) = match (filled(form.user.as_ref()), filled(form.password.as_ref())) {
        (None, None) => config.credentials(),
        (user, password) => {
            (user.unwrap_or_default().to_string(), password.unwrap_or_default().to_string())
        }
    };
    Ok(Endpoint::new(hosts, port).with_credentials(user, password))
}

/// SSH hop from the login form, when the box is ticked.
fn login_hop(form: &LoginForm, config: &ClientConfig) -> Result<Option<RemoteHop>, String> {
    if filled(form.ssh.as_ref()).is_none() {
        return Ok(None);
    }
    match (
        filled(form.ssh_ip.as_ref()),
        filled(form.ssh_user.as_ref()),
        filled(form.ssh_password.as_ref()),
    ) {
        (Some(host), Some(user), Some(password)) => {
            Ok(Some(RemoteHop::new(host, password).with_user(user).with_port(config.ssh_port())))
        }
        _ => Err("Please input ssh information.".to_string()),
    }
}

fn render_login(
    state: &AppState,
    status: StatusCode,
    error: Option<String>,
) -> Result<Response, WebError> {
    let html = state.templates.render(LOGIN, &LoginView::new(state.config.port(), error))?;
    Ok((status, Html(html)).into_response())
}

/// Lists non-system keyspaces and tables through the user's session.
async fn load_sidebar(session: &mut QuerySession) -> Sidebar {
    let mut rows = Vec::new();
    let mut elapsed = Duration::ZERO;

    let mut result = session.query(TABLES_QUERY, SIDEBAR_PAGE_SIZE).await;
    loop {
        match result {
            Ok(page) => {
                elapsed += page.elapsed;
                rows.extend(page.rows);
                if !session.has_more() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to load schema sidebar");
                return Sidebar { error: Some(e.to_string()), ..Sidebar::default() };
            }
        }
        result = session.query_next().await;
    }

    let summary = user_tables(&rows);
    let keyspaces = summary
        .keyspaces
        .into_iter()
        .map(|(name, tables)| KeyspaceView { name, tables: tables.into_iter().collect() })
        .collect();
    Sidebar { keyspaces, query_time: Some(format_secs(elapsed.as_secs_f64())), error: None }
}

fn fill_results(view: &mut DbView, page: &Page) {
    view.columns.clone_from(&page.columns);
    view.rows = page
        .rows
        .iter()
        .map(|row| {
            page.columns
                .iter()
                .map(|column| row.get(column).map(ToString::to_string).unwrap_or_default())
                .collect()
        })
        .collect();
    view.row_count = page.len();
    view.query_time = Some(format_secs(page.elapsed_secs()));
    view.has_more = page.has_more();
}

async fn login_page(State(state): State<AppState>) -> Result<Response, WebError> {
    render_login(&state, StatusCode::OK, None)
}

async fn connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, WebError> {
    let endpoint = match login_endpoint(&form, &state.config) {
        Ok(endpoint) => endpoint,
        Err(message) => return render_login(&state, StatusCode::BAD_REQUEST, Some(message)),
    };
    let hop = match login_hop(&form, &state.config) {
        Ok(hop) => hop,
        Err(message) => return render_login(&state, StatusCode::BAD_REQUEST, Some(message)),
    };

    if let Some(previous) = session_id(&headers) {
        state.forget(&previous).await;
    }

    let mut session = QuerySession::new(endpoint, Arc::clone(&state.connector));
    if let Some(hop) = hop {
        let options = HopOptions {
            keepalive: state.config.keepalive(),
            detect_address: state.config.detect_address(),
        };
        if let Err(e) = session.open_remote(&hop, options).await {
            session.close().await;
            return render_login(&state, StatusCode::BAD_GATEWAY, Some(format!("Error: {e}")));
        }
    }

    let sidebar = load_sidebar(&mut session).await;
    let id = state.store.insert(session).await;
    state.set_sidebar(id, sidebar.clone()).await;
    info!(session_id = %id, "User connected");

    let html = state.templates.render(DB, &DbView::new(sidebar))?;
    Ok(([(SET_COOKIE, session_cookie(id))], Html(html)).into_response())
}

async fn db_page(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, WebError> {
    let Some((id, handle)) = lookup(&state, &headers).await else {
        return Ok(Redirect::to("/").into_response());
    };

    let sidebar = load_sidebar(&mut *handle.lock().await).await;
    state.set_sidebar(id, sidebar.clone()).await;

    let html = state.templates.render(DB, &DbView::new(sidebar))?;
    Ok(Html(html).into_response())
}

async fn run_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<QueryForm>,
) -> Result<Response, WebError> {
    let Some((id, handle)) = lookup(&state, &headers).await else {
        return Ok(([(SET_COOKIE, expired_session_cookie())], Redirect::to("/")).into_response());
    };

    if form.disconnect.is_some() {
        state.forget(&id).await;
        info!(session_id = %id, "User disconnected");
        return Ok(([(SET_COOKIE, expired_session_cookie())], Redirect::to("/")).into_response());
    }

    let Some(cql) = filled(form.cql.as_ref()) else {
        return Ok(Redirect::to("/db").into_response());
    };

    let mut view = DbView::new(state.sidebar(&id).await);
    view.cql = cql.to_string();

    let (result, has_more) = {
        let mut session = handle.lock().await;
        let continues =
            form.next.is_some() && session.last_query() == Some(cql) && session.has_more();
        let result = if continues {
            session.query_next().await
        } else {
            session.query(cql, state.config.page_size()).await
        };
        (result, session.has_more())
    };

    let status = match result {
        Ok(page) => {
            fill_results(&mut view, &page);
            StatusCode::OK
        }
        Err(SessionError::Closed) => {
            state.forget(&id).await;
            let cookie = [(SET_COOKIE, expired_session_cookie())];
            return Ok((cookie, Redirect::to("/")).into_response());
        }
        Err(e) => {
            view.has_more = has_more;
            let status = if e.is_rejection() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            view.error = Some(e.to_string());
            status
        }
    };

    let html = state.templates.render(DB, &view)?;
    Ok((status, Html(html)).into_response())
}

async fn lookup(
    state: &AppState,
    headers: &HeaderMap,
) -> Option<(uuid::Uuid, cqlscope_core::SessionHandle)> {
    let id = session_id(headers)?;
    let handle = state.store.get(&id).await?;
    Some((id, handle))
}
