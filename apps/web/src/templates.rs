//! Handlebars pages.

use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;

pub const LOGIN: &str = "login";
pub const DB: &str = "db";

const PAGE_TITLE: &str = "Cassandra DB";

/// Compiled page templates.
pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_partial("header", include_str!("../templates/header.hbs"))?;
        registry.register_partial("sidebar", include_str!("../templates/sidebar.hbs"))?;
        registry.register_template_string(LOGIN, include_str!("../templates/login.hbs"))?;
        registry.register_template_string(DB, include_str!("../templates/db.hbs"))?;
        Ok(Self { registry })
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, RenderError> {
        self.registry.render(name, data)
    }
}

/// Login form data.
#[derive(Debug, Serialize)]
pub struct LoginView {
    pub page_title: &'static str,
    pub error: Option<String>,
    pub default_port: u16,
}

impl LoginView {
    pub fn new(default_port: u16, error: Option<String>) -> Self {
        Self { page_title: PAGE_TITLE, error, default_port }
    }
}

/// One keyspace in the sidebar.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KeyspaceView {
    pub name: String,
    pub tables: Vec<String>,
}

/// Keyspace/table listing shown next to the query form.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Sidebar {
    pub keyspaces: Vec<KeyspaceView>,
    pub query_time: Option<String>,
    pub error: Option<String>,
}

/// Query page data.
#[derive(Debug, Default, Serialize)]
pub struct DbView {
    pub page_title: &'static str,
    pub sidebar: Sidebar,
    pub cql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub row_count: usize,
    pub query_time: Option<String>,
    pub has_more: bool,
    pub error: Option<String>,
}

impl DbView {
    pub fn new(sidebar: Sidebar) -> Self {
        Self { page_title: PAGE_TITLE, sidebar, ..Self::default() }
    }
}

/// Seconds with millisecond precision.
pub fn format_secs(secs: f64) -> String {
    format!("{secs:.3}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_renders_error() {
        let templates = Templates::new().unwrap();
        let view = LoginView::new(9042, Some("Please input ssh information.".into()));
        let html = templates.render(LOGIN, &view).unwrap();
        assert!(html.contains("Cassandra DB"));
        assert!(html.contains("Please input ssh information."));
        assert!(html.contains("value=\"9042\""));
    }

    #[test]
    fn test_db_page_escapes_cells() {
        let templates = Templates::new().unwrap();
        let mut view = DbView::new(Sidebar {
            keyspaces: vec![KeyspaceView { name: "app".into(), tables: vec!["users".into()] }],
            query_time: Some(format_secs(0.0123)),
            error: None,
        });
        view.cql = "SELECT * FROM app.users".into();
        view.columns = vec!["name".into()];
        view.rows = vec![vec!["<b>bob</b>".into()]];
        view.row_count = 1;
        view.has_more = true;

        let html = templates.render(DB, &view).unwrap();
        assert!(html.contains("&lt;b&gt;bob&lt;/b&gt;"));
        assert!(html.contains("users"));
        assert!(html.contains("0.012"));
        assert!(html.contains("name=\"next\""));
    }

    #[test]
    fn test_no_next_button_on_last_page() {
        let templates = Templates::new().unwrap();
        let html = templates.render(DB, &DbView::new(Sidebar::default())).unwrap();
        assert!(!html.contains("name=\"next\""));
    }
}
