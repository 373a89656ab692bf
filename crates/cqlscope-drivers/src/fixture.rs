//! In-memory fixture driver.
//!
//! Serves a small set of tables from memory and understands a narrow subset
//! of CQL:
//!
//! ```text
//! SELECT <cols|*> FROM <keyspace>.<table> [WHERE col = 'v' [AND ...]] [ALLOW FILTERING]
//! ```
//!
//! Anything else is rejected the way a real cluster rejects bad syntax. The
//! paging state is the row offset of the next page.

use async_trait::async_trait;
use cqlscope_abstraction::{
    Connector, CqlDriver, CqlValue, DriverError, Endpoint, PagingState, ResultPage, Row, Statement,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

static SELECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        concat!(
            r#"(?is)^\s*select\s+(?P<cols>.+?)\s+from\s+(?P<first>"[^"]+"|\w+)"#,
            r#"(?:\s*\.\s*(?P<second>"[^"]+"|\w+))?"#,
            r#"(?:\s+where\s+(?P<filter>.+?))?(?:\s+allow\s+filtering)?\s*;?\s*$"#,
        ),
    )
    .expect("valid select pattern")
});

/// One `col = value` condition, optionally followed by `AND <more>`.
static CONDITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        concat!(
            r#"(?s)^\s*(?P<col>"[^"]+"|\w+)\s*=\s*(?P<val>'(?:[^']|'')*'|-?\d+)"#,
            r#"\s*(?:$|(?i:and)\s+(?P<rest>.+)$)"#,
        ),
    )
    .expect("valid condition pattern")
});

/// A table served by the fixture driver.
#[derive(Debug, Clone)]
pub struct FixtureTable {
    keyspace: String,
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<CqlValue>>,
}

impl FixtureTable {
    /// Creates an empty table with the given columns.
    pub fn new(keyspace: impl Into<String>, name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            keyspace: keyspace.into(),
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row. Missing trailing values are filled with nulls and
    /// extra values are dropped.
    #[must_use]
    pub fn with_row(mut self, mut values: Vec<CqlValue>) -> Self {
        values.resize(self.columns.len(), CqlValue::Null);
        self.rows.push(values);
        self
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// A set of in-memory tables.
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    tables: Vec<FixtureTable>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, replacing any table with the same qualified name.
    #[must_use]
    pub fn with_table(mut self, table: FixtureTable) -> Self {
        self.tables.retain(|t| !(t.keyspace == table.keyspace && t.name == table.name));
        self.tables.push(table);
        self
    }

    /// Looks a table up by keyspace and name.
    pub fn table(&self, keyspace: &str, name: &str) -> Option<&FixtureTable> {
        self.tables.iter().find(|t| t.keyspace == keyspace && t.name == name)
    }

    fn has_keyspace(&self, keyspace: &str) -> bool {
        self.tables.iter().any(|t| t.keyspace == keyspace)
    }

    /// A schema-only dataset: `system_schema.keyspaces` and
    /// `system_schema.tables` describing a handful of system and user
    /// keyspaces.
    pub fn system_schema() -> Self {
        let layout: &[(&str, &str, &[&str])] = &[
            ("system", "LocalStrategy", &["local", "peers", "size_estimates"]),
            ("system_auth", "SimpleStrategy", &["roles", "role_permissions"]),
            ("system_distributed", "SimpleStrategy", &["repair_history"]),
            ("system_schema", "LocalStrategy", &["keyspaces", "tables", "columns"]),
            ("system_traces", "SimpleStrategy", &["events", "sessions"]),
            ("config_db_uuid", "SimpleStrategy", &["obj_fq_name_table", "obj_uuid_table"]),
            (
                "ContrailAnalyticsCql",
                "SimpleStrategy",
                &["messagetablev2", "sessiontable", "statstablev4"],
            ),
        ];

        let mut keyspaces = FixtureTable::new(
            "system_schema",
            "keyspaces",
            &["keyspace_name", "durable_writes", "replication"],
        );
        let mut tables = FixtureTable::new(
            "system_schema",
            "tables",
            &["keyspace_name", "table_name", "comment", "gc_grace_seconds"],
        );

        for (keyspace, strategy, names) in layout {
            let class = format!("org.apache.cassandra.locator.{strategy}");
            let mut replication = vec![(CqlValue::from("class"), CqlValue::from(class))];
            if *strategy == "SimpleStrategy" {
                replication.push((CqlValue::from("replication_factor"), CqlValue::from("3")));
            }
            keyspaces = keyspaces.with_row(vec![
                CqlValue::from(*keyspace),
                CqlValue::Boolean(true),
                CqlValue::Map(replication),
            ]);
            for name in *names {
                tables = tables.with_row(vec![
                    CqlValue::from(*keyspace),
                    CqlValue::from(*name),
                    CqlValue::from(""),
                    CqlValue::Int(864_000),
                ]);
            }
        }

        Self::new().with_table(keyspaces).with_table(tables)
    }

    /// Executes a statement against the fixture.
    ///
    /// # Errors
    /// Returns `DriverError::Rejected` for unsupported syntax, unknown tables
    /// or columns, and malformed paging state.
    pub fn run(
        &self,
        statement: &Statement,
        paging_state: Option<&PagingState>,
    ) -> Result<ResultPage, DriverError> {
        let caps =
            SELECT_RE.captures(&statement.text).ok_or_else(|| syntax_error(&statement.text))?;

        let (keyspace, table_name) = match caps.name("second") {
            Some(second) => {
                (normalize_identifier(&caps["first"]), normalize_identifier(second.as_str()))
            }
            None => {
                return Err(DriverError::Rejected(
                    "No keyspace has been specified. \
                     USE a keyspace, or explicitly specify keyspace.tablename"
                        .to_string(),
                ));
            }
        };

        if !self.has_keyspace(&keyspace) {
            return Err(DriverError::Rejected(format!("Keyspace {keyspace} does not exist")));
        }
        let table = self
            .table(&keyspace, &table_name)
            .ok_or_else(|| DriverError::Rejected(format!("unconfigured table {table_name}")))?;

        let projection = projection(table, caps["cols"].trim())?;
        let conditions = match caps.name("filter") {
            Some(filter) => conditions(table, filter.as_str())?,
            None => Vec::new(),
        };

        let offset = match paging_state {
            Some(state) => decode_offset(state)?,
            None => 0,
        };

        let matching: Vec<&Vec<CqlValue>> = table
            .rows
            .iter()
            .filter(|row| conditions.iter().all(|(idx, expected)| &row[*idx] == expected))
            .collect();

        let page_size = if statement.page_size == 0 { matching.len() } else { statement.page_size };
        let end = offset.saturating_add(page_size).min(matching.len());
        let rows: Vec<Row> = matching
            .get(offset.min(end)..end)
            .unwrap_or_default()
            .iter()
            .map(|values| {
                projection
                    .iter()
                    .map(|&idx| (table.columns[idx].clone(), values[idx].clone()))
                    .collect()
            })
            .collect();

        let paging_state = (end < matching.len()).then(|| encode_offset(end));
        debug!(
            table = %format!("{keyspace}.{table_name}"),
            offset,
            rows = rows.len(),
            has_more = paging_state.is_some(),
            "Fixture page served"
        );

        Ok(ResultPage {
            columns: projection.iter().map(|&idx| table.columns[idx].clone()).collect(),
            rows,
            paging_state,
        })
    }
}

fn syntax_error(text: &str) -> DriverError {
    let token = text.split_whitespace().next().unwrap_or_default();
    DriverError::Rejected(format!("line 1:0 no viable alternative at input '{token}'"))
}

/// Unquoted identifiers are case-insensitive; quoted ones are kept verbatim.
fn normalize_identifier(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        raw[1..raw.len() - 1].to_string()
    } else {
        raw.to_lowercase()
    }
}

fn projection(table: &FixtureTable, cols: &str) -> Result<Vec<usize>, DriverError> {
    if cols == "*" {
        return Ok((0..table.columns.len()).collect());
    }
    cols.split(',')
        .map(|col| {
            let name = normalize_identifier(col);
            table
                .column_index(&name)
                .ok_or_else(|| DriverError::Rejected(format!("Undefined column name {name}")))
        })
        .collect()
}

/// Parses `col = value [AND ...]` left to right, so `and` inside a quoted
/// literal stays part of the value.
fn conditions(table: &FixtureTable, filter: &str) -> Result<Vec<(usize, CqlValue)>, DriverError> {
    let mut parsed = Vec::new();
    let mut remaining = Some(filter);
    while let Some(filter) = remaining {
        let caps = CONDITION_RE.captures(filter).ok_or_else(|| {
            DriverError::Rejected(format!("line 1:0 mismatched input near '{}'", filter.trim()))
        })?;
        let name = normalize_identifier(&caps["col"]);
        let idx = table
            .column_index(&name)
            .ok_or_else(|| DriverError::Rejected(format!("Undefined column name {name}")))?;
        let raw = &caps["val"];
        let value = match raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
            Some(quoted) => CqlValue::Text(quoted.replace("''", "'")),
            None => raw.parse::<i64>().map(CqlValue::Int).map_err(|_| {
                DriverError::Rejected(format!("Invalid integer constant {raw}"))
            })?,
        };
        parsed.push((idx, value));
        remaining = caps.name("rest").map(|rest| rest.as_str());
    }
    Ok(parsed)
}

fn encode_offset(offset: usize) -> PagingState {
    PagingState::new((offset as u64).to_be_bytes().to_vec())
}

fn decode_offset(state: &PagingState) -> Result<usize, DriverError> {
    let bytes: [u8; 8] = state
        .as_bytes()
        .try_into()
        .map_err(|_| DriverError::Rejected("Invalid value for the paging state".to_string()))?;
    Ok(u64::from_be_bytes(bytes) as usize)
}

/// Shared switchboard between a fixture connector and its drivers.
///
/// Taking the link offline makes every connect and execute fail as if the
/// cluster had gone away.
#[derive(Debug)]
pub struct FixtureLink {
    online: AtomicBool,
    connects: AtomicUsize,
    executions: AtomicUsize,
}

impl FixtureLink {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of statements executed so far, failed ones included.
    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Default for FixtureLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver serving a [`Fixture`].
pub struct FixtureDriver {
    fixture: Arc<Fixture>,
    link: Arc<FixtureLink>,
    closed: AtomicBool,
}

impl FixtureDriver {
    pub fn new(fixture: Arc<Fixture>, link: Arc<FixtureLink>) -> Self {
        Self { fixture, link, closed: AtomicBool::new(false) }
    }
}

#[async_trait]
impl CqlDriver for FixtureDriver {
    async fn execute(
        &self,
        statement: &Statement,
        paging_state: Option<&PagingState>,
    ) -> Result<ResultPage, DriverError> {
        self.link.executions.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Unavailable("Cluster is already shut down".to_string()));
        }
        if !self.link.is_online() {
            return Err(DriverError::Unavailable("connection reset by peer".to_string()));
        }
        self.fixture.run(statement, paging_state)
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn driver_id(&self) -> &str {
        "fixture"
    }
}

/// Connector handing out [`FixtureDriver`]s over a shared fixture.
#[derive(Clone)]
pub struct FixtureConnector {
    fixture: Arc<Fixture>,
    link: Arc<FixtureLink>,
}

impl FixtureConnector {
    pub fn new(fixture: Fixture) -> Self {
        Self { fixture: Arc::new(fixture), link: Arc::new(FixtureLink::new()) }
    }

    /// Handle for toggling connectivity and counting calls.
    pub fn link(&self) -> Arc<FixtureLink> {
        Arc::clone(&self.link)
    }
}

#[async_trait]
impl Connector for FixtureConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn CqlDriver>, DriverError> {
        if endpoint.hosts.is_empty() {
            return Err(DriverError::Unavailable("no contact points configured".to_string()));
        }
        if !self.link.is_online() {
            return Err(DriverError::Unavailable(format!(
                "Unable to connect to any servers: {}",
                endpoint.addresses().join(",")
            )));
        }
        self.link.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FixtureDriver::new(Arc::clone(&self.fixture), Arc::clone(&self.link))))
    }
}
