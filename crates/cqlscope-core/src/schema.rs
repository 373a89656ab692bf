//! `system_schema` helper queries and `desc` command parsing.

use cqlscope_abstraction::{CqlValue, Row};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// All keyspaces.
pub const KEYSPACES_QUERY: &str = "SELECT * FROM system_schema.keyspaces";

/// All keyspace/table pairs.
pub const TABLES_QUERY: &str = "SELECT keyspace_name, table_name FROM system_schema.tables";

/// Errors from parsing a `desc` command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// `desc table` or `desc keyspace` without a name.
    #[error("Missing {0} name")]
    MissingName(&'static str),

    /// `desc` on its own.
    #[error("Usage: desc tables | desc keyspaces | desc table <name> | desc keyspace <name>")]
    MissingTarget,

    #[error("Unknown desc target: {0}")]
    UnknownTarget(String),
}

/// Query over `system_schema.keyspaces`, optionally for one keyspace.
pub fn keyspaces_query(keyspace: Option<&str>) -> String {
    match keyspace {
        Some(name) => format!("{KEYSPACES_QUERY} WHERE keyspace_name = {}", quote_literal(name)),
        None => KEYSPACES_QUERY.to_string(),
    }
}

/// Query over `system_schema.tables`, optionally for one table name.
///
/// Filtering by table name alone is not a partition key lookup, so it needs
/// `ALLOW FILTERING`.
pub fn tables_query(table: Option<&str>) -> String {
    match table {
        Some(name) => format!(
            "SELECT * FROM system_schema.tables WHERE table_name = {} ALLOW FILTERING",
            quote_literal(name)
        ),
        None => TABLES_QUERY.to_string(),
    }
}

/// Single-quoted CQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// True for keyspaces managed by the database itself.
pub fn is_system_keyspace(name: &str) -> bool {
    name.starts_with("system")
}

/// Non-system keyspaces and their tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSummary {
    pub keyspaces: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaSummary {
    /// Keyspace names in sorted order.
    pub fn keyspace_names(&self) -> impl Iterator<Item = &str> {
        self.keyspaces.keys().map(String::as_str)
    }

    /// `(keyspace, table)` pairs in sorted order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keyspaces
            .iter()
            .flat_map(|(ks, tables)| tables.iter().map(move |t| (ks.as_str(), t.as_str())))
    }

    pub fn table_count(&self) -> usize {
        self.keyspaces.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.keyspaces.is_empty()
    }
}

/// Groups `keyspace_name`/`table_name` rows, skipping system keyspaces.
///
/// Rows without a `table_name` column (e.g. `system_schema.keyspaces`)
/// contribute their keyspace only.
pub fn user_tables(rows: &[Row]) -> SchemaSummary {
    let mut summary = SchemaSummary::default();
    for row in rows {
        let Some(keyspace) = row.get("keyspace_name").and_then(CqlValue::as_text) else {
            continue;
        };
        if is_system_keyspace(keyspace) {
            continue;
        }
        let tables = summary.keyspaces.entry(keyspace.to_string()).or_default();
        if let Some(table) = row.get("table_name").and_then(CqlValue::as_text) {
            tables.insert(table.to_string());
        }
    }
    summary
}

/// A `desc`/`describe` shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescribeCommand {
    Keyspaces,
    Tables,
    Keyspace(String),
    Table(String),
}

impl DescribeCommand {
    /// Parses a `desc` line. Returns `Ok(None)` for anything that is not a
    /// `desc` command, so the caller can run it as CQL.
    pub fn parse(input: &str) -> Result<Option<Self>, SchemaError> {
        let input = input.trim().trim_end_matches(';');
        let mut words = input.split_whitespace();
        let Some(first) = words.next() else {
            return Ok(None);
        };
        if !["desc", "describe"].iter().any(|keyword| first.eq_ignore_ascii_case(keyword)) {
            return Ok(None);
        }

        let target = words.next().ok_or(SchemaError::MissingTarget)?.to_lowercase();
        let name = words.next().map(str::to_string);
        let command = match (target.as_str(), name) {
            ("keyspaces", _) => Self::Keyspaces,
            ("tables", _) => Self::Tables,
            ("keyspace", Some(name)) => Self::Keyspace(name),
            ("keyspace", None) => return Err(SchemaError::MissingName("keyspace")),
            ("table", Some(name)) => Self::Table(name),
            ("table", None) => return Err(SchemaError::MissingName("table")),
            (other, _) => return Err(SchemaError::UnknownTarget(other.to_string())),
        };
        Ok(Some(command))
    }

    /// The `system_schema` query this command runs.
    pub fn to_query(&self) -> String {
        match self {
            Self::Keyspaces => keyspaces_query(None),
            Self::Tables => tables_query(None),
            Self::Keyspace(name) => keyspaces_query(Some(name)),
            Self::Table(name) => tables_query(Some(name)),
        }
    }

    /// Listing commands hide system keyspaces from their output.
    pub fn hides_system(&self) -> bool {
        matches!(self, Self::Keyspaces | Self::Tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspaces_query() {
        assert_eq!(keyspaces_query(None), "SELECT * FROM system_schema.keyspaces");
        assert_eq!(
            keyspaces_query(Some("config_db_uuid")),
            "SELECT * FROM system_schema.keyspaces WHERE keyspace_name = 'config_db_uuid'"
        );
    }

    #[test]
    fn test_tables_query() {
        assert_eq!(tables_query(None), TABLES_QUERY);
        assert_eq!(
            tables_query(Some("obj_uuid_table")),
            "SELECT * FROM system_schema.tables WHERE table_name = 'obj_uuid_table' ALLOW FILTERING"
        );
    }

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_is_system_keyspace() {
        assert!(is_system_keyspace("system"));
        assert!(is_system_keyspace("system_schema"));
        assert!(!is_system_keyspace("config_db_uuid"));
    }

    #[test]
    fn test_user_tables_groups_and_filters() {
        let rows = vec![
            Row::new().with("keyspace_name", "system_auth").with("table_name", "roles"),
            Row::new().with("keyspace_name", "config_db_uuid").with("table_name", "obj_uuid_table"),
            Row::new()
                .with("keyspace_name", "config_db_uuid")
                .with("table_name", "obj_fq_name_table"),
            Row::new().with("keyspace_name", "analytics").with("table_name", "stats"),
        ];
        let summary = user_tables(&rows);
        let names: Vec<_> = summary.keyspace_names().collect();
        assert_eq!(names, vec!["analytics", "config_db_uuid"]);
        assert_eq!(summary.table_count(), 3);
        assert_eq!(
            summary.tables().collect::<Vec<_>>(),
            vec![
                ("analytics", "stats"),
                ("config_db_uuid", "obj_fq_name_table"),
                ("config_db_uuid", "obj_uuid_table"),
            ]
        );
    }

    #[test]
    fn test_user_tables_keyspace_rows() {
        let rows = vec![Row::new().with("keyspace_name", "app").with("durable_writes", true)];
        let summary = user_tables(&rows);
        assert_eq!(summary.keyspace_names().collect::<Vec<_>>(), vec!["app"]);
        assert_eq!(summary.table_count(), 0);
    }

    #[test]
    fn test_parse_describe() {
        assert_eq!(DescribeCommand::parse("desc tables").unwrap(), Some(DescribeCommand::Tables));
        let parsed = DescribeCommand::parse("DESCRIBE keyspaces;").unwrap();
        assert_eq!(parsed, Some(DescribeCommand::Keyspaces));
        assert_eq!(
            DescribeCommand::parse("desc table obj_uuid_table").unwrap(),
            Some(DescribeCommand::Table("obj_uuid_table".to_string()))
        );
        assert_eq!(
            DescribeCommand::parse("desc keyspace config_db_uuid").unwrap(),
            Some(DescribeCommand::Keyspace("config_db_uuid".to_string()))
        );
        assert_eq!(DescribeCommand::parse("SELECT * FROM system.local").unwrap(), None);
        assert_eq!(DescribeCommand::parse("description").unwrap(), None);
    }

    #[test]
    fn test_parse_describe_errors() {
        assert_eq!(DescribeCommand::parse("desc table"), Err(SchemaError::MissingName("table")));
        let parsed = DescribeCommand::parse("desc keyspace");
        assert_eq!(parsed, Err(SchemaError::MissingName("keyspace")));
        assert_eq!(DescribeCommand::parse("desc"), Err(SchemaError::MissingTarget));
        assert_eq!(
            DescribeCommand::parse("desc views"),
            Err(SchemaError::UnknownTarget("views".to_string()))
        );
    }

    #[test]
    fn test_hides_system() {
        assert!(DescribeCommand::Tables.hides_system());
        assert!(!DescribeCommand::Table("t".into()).hides_system());
        assert_eq!(DescribeCommand::Keyspaces.to_query(), KEYSPACES_QUERY);
    }
}
