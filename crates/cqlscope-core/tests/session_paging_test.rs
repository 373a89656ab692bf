//! End-to-end paging behavior of `QuerySession` over the fixture driver.

use cqlscope_abstraction::{CqlValue, Endpoint, PagingState, Row};
use cqlscope_core::schema::TABLES_QUERY;
use cqlscope_core::{QuerySession, SessionError, SessionState};
use cqlscope_drivers::{Fixture, FixtureConnector, FixtureTable};
use std::sync::Arc;
use std::time::Duration;

fn five_tables() -> FixtureConnector {
    let mut tables = FixtureTable::new("system_schema", "tables", &["keyspace_name", "table_name"]);
    for (ks, table) in [
        ("config_db_uuid", "obj_fq_name_table"),
        ("config_db_uuid", "obj_uuid_table"),
        ("config_db_uuid", "obj_shared_table"),
        ("svc_monitor_keyspace", "pool_table"),
        ("svc_monitor_keyspace", "loadbalancer_table"),
    ] {
        tables = tables.with_row(vec![CqlValue::from(ks), CqlValue::from(table)]);
    }
    FixtureConnector::new(Fixture::new().with_table(tables))
}

fn session_for(connector: &FixtureConnector) -> QuerySession {
    let endpoint = Endpoint::new(vec!["10.0.0.5".to_string()], 9042)
        .with_credentials("sdn", "sdncassandra");
    QuerySession::new(endpoint, Arc::new(connector.clone()))
}

#[tokio::test]
async fn test_pages_of_two_two_one() {
    let connector = five_tables();
    let mut session = session_for(&connector);

    let first = session.query(TABLES_QUERY, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.paging_state.is_some());

    let second = session.query_next().await.unwrap();
    assert_eq!(second.len(), 2);
    assert!(second.paging_state.is_some());

    let third = session.query_next().await.unwrap();
    assert_eq!(third.len(), 1);
    assert!(third.paging_state.is_none());
    assert!(!session.has_more());

    let after = session.query_next().await.unwrap();
    assert!(after.is_empty());
    assert_eq!(after.elapsed, Duration::ZERO);
    assert!(after.paging_state.is_none());
}

#[tokio::test]
async fn test_concatenated_pages_match_unbounded_fetch() {
    let connector = five_tables();
    let mut paged = session_for(&connector);

    let mut rows: Vec<Row> = paged.query(TABLES_QUERY, 2).await.unwrap().rows;
    while paged.has_more() {
        rows.extend(paged.query_next().await.unwrap().rows);
    }

    let mut whole = session_for(&connector);
    let all = whole.query(TABLES_QUERY, 100).await.unwrap();
    assert!(all.paging_state.is_none());
    assert_eq!(rows, all.rows);
    assert_eq!(rows.len(), 5);
}

#[tokio::test]
async fn test_query_next_without_query_is_empty() {
    let connector = five_tables();
    let mut session = session_for(&connector);

    let page = session.query_next().await.unwrap();
    assert!(page.is_empty());
    assert_eq!(page.elapsed_secs(), 0.0);
    assert!(page.paging_state.is_none());
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(connector.link().connect_count(), 0);
}

#[tokio::test]
async fn test_rejected_query_keeps_previous_cursor() {
    let connector = five_tables();
    let mut session = session_for(&connector);

    session.query(TABLES_QUERY, 2).await.unwrap();
    let token: Option<PagingState> = session.paging_state().cloned();

    let err = session.query("SELEKT * FROM x", 2).await.unwrap_err();
    assert!(err.is_rejection());
    match err {
        SessionError::QueryRejected { detail } => assert!(detail.contains("SELEKT")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.paging_state().cloned(), token);
    assert_eq!(session.last_query(), Some(TABLES_QUERY));

    let next = session.query_next().await.unwrap();
    assert_eq!(next.len(), 2);
    assert_eq!(next.rows[0].get("table_name"), Some(&CqlValue::from("obj_shared_table")));
}

#[tokio::test]
async fn test_unknown_table_rejected() {
    let connector = five_tables();
    let mut session = session_for(&connector);
    let err = session.query("SELECT * FROM system_schema.nope", 2).await.unwrap_err();
    assert!(matches!(err, SessionError::QueryRejected { .. }));
}

#[tokio::test]
async fn test_close_twice() {
    let connector = five_tables();
    let mut session = session_for(&connector);
    session.query(TABLES_QUERY, 2).await.unwrap();

    session.close().await;
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.query_next().await.unwrap().is_empty());
    assert!(matches!(session.query(TABLES_QUERY, 2).await, Err(SessionError::Closed)));
}

#[tokio::test]
async fn test_dropped_connection_surfaces_and_reconnects() {
    let connector = five_tables();
    let link = connector.link();
    let mut session = session_for(&connector);

    session.query(TABLES_QUERY, 2).await.unwrap();
    assert_eq!(link.connect_count(), 1);

    link.set_online(false);
    let err = session.query_next().await.unwrap_err();
    assert!(matches!(err, SessionError::ConnectionUnavailable(_)));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.has_more());

    link.set_online(true);
    let page = session.query_next().await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(link.connect_count(), 2);
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_schema_fixture_keyspace_lookup() {
    let connector = FixtureConnector::new(Fixture::system_schema());
    let mut session = session_for(&connector);
    let page = session
        .query(&cqlscope_core::schema::keyspaces_query(Some("config_db_uuid")), 50)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page.rows[0].get("keyspace_name"), Some(&CqlValue::from("config_db_uuid")));

    let tables = session.query(TABLES_QUERY, 50).await.unwrap();
    let summary = cqlscope_core::user_tables(&tables.rows);
    assert!(summary.keyspace_names().all(|ks| !ks.starts_with("system")));
    assert!(summary.tables().any(|(ks, t)| ks == "config_db_uuid" && t == "obj_uuid_table"));
}
