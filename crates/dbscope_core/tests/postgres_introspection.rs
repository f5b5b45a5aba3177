//! Introspection tests against a real PostgreSQL server.
//!
//! Each test starts its own container, seeds a small schema, and checks the
//! snapshot, profiler, and query executor end to end.

use dbscope_core::{
    ColumnDescriptor, ColumnProfile, ConnectionConfig, DbScopeError, Introspector,
    ProfilerOptions, SnapshotEvent, NO_SUMMARY_AVAILABLE,
};
use serde_json::{json, Number};
use std::collections::BTreeSet;
use std::time::Duration;
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::testcontainers::ContainerAsync;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const PASSWORD: &str = "postgres";

struct TestDb {
    _container: ContainerAsync<Postgres>,
    config: ConnectionConfig,
}

async fn start_postgres() -> TestDb {
    start_postgres_with_timeout(Some(30)).await
}

async fn start_postgres_with_timeout(query_timeout_secs: Option<u32>) -> TestDb {
    let container = Postgres::default().start().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let config = ConnectionConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .database("postgres")
        .username("postgres")
        .query_timeout_secs(query_timeout_secs)
        .build()
        .unwrap();

    wait_for_postgres_ready(&config, 30).await;
    TestDb { _container: container, config }
}

/// Wait until the server accepts sessions.
async fn wait_for_postgres_ready(config: &ConnectionConfig, max_attempts: u32) {
    for _ in 0..max_attempts {
        if let Ok(introspector) = Introspector::connect(config.clone(), PASSWORD).await {
            introspector.close().await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("PostgreSQL failed to become ready after {max_attempts} attempts");
}

async fn seed(introspector: &Introspector) {
    for sql in [
        "CREATE TABLE t (id integer, name text)",
        "INSERT INTO t VALUES (1, 'a'), (2, 'b'), (2, 'a')",
        "CREATE TABLE measurements (reading double precision, total numeric, big bigint, \
         label character varying(20), taken_at timestamptz, payload bytea)",
        "INSERT INTO measurements VALUES \
         (0.5, 1.5, 10, 'x', now(), '\\x00'), \
         (1.5, 2.5, 30, NULL, now(), NULL)",
        "CREATE TABLE empty_table (n integer, s text)",
        "CREATE TABLE \"Order Items\" (\"Qty\" integer, \"Sku\" text)",
        "INSERT INTO \"Order Items\" VALUES (3, 'A-1'), (5, 'B-2')",
        "CREATE VIEW broken AS SELECT 1 / (n - n) AS boom FROM generate_series(1, 2) AS n",
    ] {
        introspector.query(sql).await.unwrap();
    }
}

async fn seeded(db: &TestDb) -> Introspector {
    let introspector = Introspector::connect(db.config.clone(), PASSWORD).await.unwrap();
    seed(&introspector).await;
    introspector
}

fn descriptor(table: &str, name: &str, declared_type: &str) -> ColumnDescriptor {
    ColumnDescriptor::new(table, name, declared_type)
}

#[tokio::test]
async fn test_textual_and_numeric_profiles() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;

    let name = introspector.profile(&descriptor("t", "name", "text")).await;
    assert_eq!(name, ColumnProfile::DistinctValues { values: vec![json!("a"), json!("b")] });

    let id = introspector.profile(&descriptor("t", "id", "integer")).await;
    let summary = id.numeric_summary().expect("numeric summary");
    assert!((summary.avg.unwrap() - 5.0 / 3.0).abs() < 1e-9);
    assert_eq!(summary.min, Some(Number::from(1)));
    assert_eq!(summary.max, Some(Number::from(2)));
    assert!(summary.is_ordered());

    introspector.close().await;
}

#[tokio::test]
async fn test_numeric_types_keep_their_own_values() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;
    let snapshot = introspector.build_snapshot().await.unwrap();

    let (_, reading) = snapshot.find_profile("measurements", "reading").unwrap();
    let reading = reading.numeric_summary().unwrap();
    assert_eq!(reading.avg, Some(1.0));
    assert_eq!(reading.min.as_ref().and_then(Number::as_f64), Some(0.5));
    assert_eq!(reading.max.as_ref().and_then(Number::as_f64), Some(1.5));

    let (_, total) = snapshot.find_profile("measurements", "total").unwrap();
    let total = total.numeric_summary().unwrap();
    assert_eq!(total.avg, Some(2.0));
    assert_eq!(total.min.as_ref().and_then(Number::as_f64), Some(1.5));

    let (_, big) = snapshot.find_profile("measurements", "big").unwrap();
    let big = big.numeric_summary().unwrap();
    assert_eq!(big.avg, Some(20.0));
    assert_eq!(big.max, Some(Number::from(30)));

    let (_, label) = snapshot.find_profile("measurements", "label").unwrap();
    assert_eq!(label.distinct_values().unwrap(), &[json!("x"), serde_json::Value::Null]);

    for column in ["taken_at", "payload"] {
        let (_, profile) = snapshot.find_profile("measurements", column).unwrap();
        assert_eq!(profile, &ColumnProfile::unavailable());
    }

    introspector.close().await;
}

#[tokio::test]
async fn test_empty_table_profiles() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;

    let n = introspector.profile(&descriptor("empty_table", "n", "integer")).await;
    let summary = n.numeric_summary().unwrap();
    assert_eq!((summary.avg, summary.min.clone(), summary.max.clone()), (None, None, None));

    let s = introspector.profile(&descriptor("empty_table", "s", "text")).await;
    assert_eq!(s.distinct_values().unwrap(), &[] as &[serde_json::Value]);

    introspector.close().await;
}

#[tokio::test]
async fn test_profiling_is_idempotent() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;

    for d in [descriptor("t", "name", "text"), descriptor("t", "id", "integer")] {
        let first = introspector.profile(&d).await;
        let second = introspector.profile(&d).await;
        assert_eq!(first, second);
    }

    introspector.close().await;
}

#[tokio::test]
async fn test_snapshot_column_listings_agree() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;
    let snapshot = introspector.build_snapshot().await.unwrap();
    let descriptors = introspector.column_types().await.unwrap();

    let expected: BTreeSet<&str> = ["t", "measurements", "empty_table", "Order Items", "broken"].into();
    let tables: BTreeSet<&str> = snapshot.tables().iter().map(String::as_str).collect();
    assert_eq!(tables, expected);

    for table in snapshot.tables() {
        let listed: Vec<&str> = snapshot.columns(table).unwrap().iter().map(String::as_str).collect();
        let typed: Vec<&str> = descriptors
            .iter()
            .filter(|d| &d.table == table)
            .map(|d| d.name.as_str())
            .collect();

        let listed_set: BTreeSet<&str> = listed.iter().copied().collect();
        let typed_set: BTreeSet<&str> = typed.iter().copied().collect();
        assert_eq!(listed_set, typed_set, "columns of {table}");
        assert_eq!(typed.len(), typed_set.len(), "each column described once in {table}");
    }

    assert_eq!(snapshot.columns("t").unwrap(), &["id".to_string(), "name".to_string()]);
    assert_eq!(snapshot.column_count(), descriptors.len());

    introspector.close().await;
}

#[tokio::test]
async fn test_profiling_failure_is_isolated() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;
    let snapshot = introspector.build_snapshot().await.unwrap();

    let (boom, profile) = snapshot.find_profile("broken", "boom").unwrap();
    assert_eq!(boom.declared_type, "integer");
    assert_eq!(profile, &ColumnProfile::Unavailable { reason: NO_SUMMARY_AVAILABLE.to_string() });

    let (_, name) = snapshot.find_profile("t", "name").unwrap();
    assert!(name.is_available());

    for (descriptor, _) in snapshot.profiles() {
        assert!(snapshot.columns(&descriptor.table).unwrap().contains(&descriptor.name));
    }

    // The session survived the failed profile.
    let result = introspector.query("SELECT 1 AS x").await.unwrap();
    assert_eq!(result.value(0, "x"), Some(&json!(1)));

    introspector.close().await;
}

#[tokio::test]
async fn test_quoted_identifiers() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;

    let qty = introspector.profile(&descriptor("Order Items", "Qty", "integer")).await;
    let qty = qty.numeric_summary().unwrap();
    assert_eq!(qty.avg, Some(4.0));

    let (_, sku) = introspector.profile_column("Order Items", "Sku").await.unwrap();
    assert_eq!(sku.distinct_values().unwrap(), &[json!("A-1"), json!("B-2")]);

    let missing = introspector.profile_column("Order Items", "Nope").await.unwrap_err();
    assert!(missing.is_schema_error());

    introspector.close().await;
}

#[tokio::test]
async fn test_select_one() {
    let db = start_postgres().await;
    let introspector = Introspector::connect(db.config.clone(), PASSWORD).await.unwrap();

    let result = introspector.query("SELECT 1 AS x").await.unwrap();
    assert_eq!(result.column_names(), vec!["x"]);
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.value(0, "x"), Some(&json!(1)));

    let empty = introspector.query("SELECT 1 AS x WHERE false").await.unwrap();
    assert_eq!(empty.column_names(), vec!["x"]);
    assert!(empty.is_empty());

    introspector.close().await;
}

#[tokio::test]
async fn test_query_decodes_common_types() {
    let db = start_postgres().await;
    let introspector = Introspector::connect(db.config.clone(), PASSWORD).await.unwrap();

    let result = introspector
        .query(
            "SELECT true AS b, 2::int2 AS s, 9000000000::int8 AS l, 1.25::float8 AS f, \
             12.50::numeric AS n, 'hi'::varchar AS v, '{\"k\": 1}'::jsonb AS j, \
             '2024-01-02'::date AS d, ARRAY[1, NULL, 3] AS a, NULL::text AS nothing, \
             '1 day'::interval AS i, '\\x00ff'::bytea AS bin, '10.0.0.1'::inet AS addr",
        )
        .await
        .unwrap();

    assert_eq!(result.value(0, "b"), Some(&json!(true)));
    assert_eq!(result.value(0, "s"), Some(&json!(2)));
    assert_eq!(result.value(0, "l"), Some(&json!(9_000_000_000_i64)));
    assert_eq!(result.value(0, "f"), Some(&json!(1.25)));
    assert_eq!(result.value(0, "n"), Some(&json!("12.50")));
    assert_eq!(result.value(0, "v"), Some(&json!("hi")));
    assert_eq!(result.value(0, "j"), Some(&json!({ "k": 1 })));
    assert_eq!(result.value(0, "d"), Some(&json!("2024-01-02")));
    assert_eq!(result.value(0, "a"), Some(&json!([1, null, 3])));
    assert_eq!(result.value(0, "nothing"), Some(&serde_json::Value::Null));
    assert_eq!(result.value(0, "i"), Some(&json!("1 day")));
    assert_eq!(result.value(0, "bin"), Some(&json!("\\x00ff")));
    assert_eq!(result.value(0, "addr"), Some(&json!("10.0.0.1")));

    introspector.close().await;
}

#[tokio::test]
async fn test_numeric_values_are_exact() {
    let db = start_postgres().await;
    let introspector = Introspector::connect(db.config.clone(), PASSWORD).await.unwrap();

    let result = introspector
        .query(
            "SELECT x FROM (VALUES (1::numeric), (1e30::numeric), \
             (0.1234567890123456789012345678901::numeric), (NULL)) AS v(x)",
        )
        .await
        .unwrap();

    let values: Vec<_> = result.rows().into_iter().map(|row| row[0].clone()).collect();
    assert_eq!(
        values,
        vec![
            json!("1"),
            json!("1000000000000000000000000000000"),
            json!("0.1234567890123456789012345678901"),
            serde_json::Value::Null,
        ]
    );

    introspector.close().await;
}

#[tokio::test]
async fn test_wide_numeric_column_is_summarized() {
    let db = start_postgres().await;
    let introspector = Introspector::connect(db.config.clone(), PASSWORD).await.unwrap();
    introspector.query("CREATE TABLE ledger (amount numeric)").await.unwrap();
    introspector.query("INSERT INTO ledger VALUES (1), (1e30)").await.unwrap();

    let profile = introspector.profile(&descriptor("ledger", "amount", "numeric")).await;
    let summary = profile.numeric_summary().expect("numeric summary");
    assert_eq!(summary.min, Some(Number::from(1)));
    assert_eq!(summary.max.as_ref().and_then(Number::as_f64), Some(1e30));
    assert_eq!(summary.avg, Some(5e29));
    assert!(summary.is_ordered());

    introspector.close().await;
}

#[tokio::test]
async fn test_missing_table_is_a_schema_error() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;

    let err = introspector.columns("no_such_table").await.unwrap_err();
    assert!(err.is_schema_error());
    assert!(err.to_string().contains("no_such_table"));

    introspector.close().await;
}

#[tokio::test]
async fn test_empty_schema_has_no_tables() {
    let db = start_postgres().await;
    let admin = seeded(&db).await;
    admin.query("CREATE SCHEMA empty_space").await.unwrap();
    admin.close().await;

    let mut config = db.config.clone();
    config.options.schema = "empty_space".to_string();
    let introspector = Introspector::connect(config, PASSWORD).await.unwrap();

    assert!(introspector.tables().await.unwrap().is_empty());
    let snapshot = introspector.build_snapshot().await.unwrap();
    assert!(snapshot.tables().is_empty());
    assert_eq!(snapshot.column_count(), 0);

    introspector.close().await;
}

#[tokio::test]
async fn test_query_error_keeps_session_usable() {
    let db = start_postgres().await;
    let introspector = Introspector::connect(db.config.clone(), PASSWORD).await.unwrap();

    let err = introspector.query("SELECT * FROM nonexistent_table").await.unwrap_err();
    assert!(err.is_query_error());
    assert_eq!(err.pg_code(), Some("42P01"));
    assert!(err.to_string().contains("nonexistent_table"));

    let err = introspector.query("SELEC 1").await.unwrap_err();
    assert!(err.is_query_error());
    assert_eq!(err.pg_code(), Some("42601"));
    assert!(err.position().is_some());

    let result = introspector.query("SELECT 1 AS x").await.unwrap();
    assert_eq!(result.value(0, "x"), Some(&json!(1)));

    introspector.close().await;
}

#[tokio::test]
async fn test_statements_without_columns_report_rows_affected() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;

    let result = introspector.query("UPDATE t SET name = 'c' WHERE id = 2").await.unwrap();
    assert!(result.columns().is_empty());
    assert_eq!(result.rows_affected, Some(2));

    introspector.close().await;
}

#[tokio::test]
async fn test_snapshot_is_stale_until_refresh() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;

    let before = introspector.build_snapshot().await.unwrap();
    introspector.query("CREATE TABLE later (x integer)").await.unwrap();

    assert!(!introspector.snapshot().unwrap().tables().contains("later"));

    let after = introspector.refresh().await.unwrap();
    assert!(after.tables().contains("later"));
    assert!(!before.tables().contains("later"));
    assert!(introspector.snapshot().unwrap().tables().contains("later"));

    introspector.close().await;
}

#[tokio::test]
async fn test_parallel_build_matches_sequential() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;
    let sequential = introspector.build_snapshot().await.unwrap();
    introspector.close().await;

    let parallel = Introspector::open(
        db.config.clone(),
        PASSWORD,
        ProfilerOptions::default().with_workers(4),
    )
    .await
    .unwrap();
    let snapshot = parallel.snapshot().unwrap();

    assert_eq!(snapshot.tables(), sequential.tables());
    assert_eq!(snapshot.columns_by_table(), sequential.columns_by_table());
    assert_eq!(snapshot.profiles(), sequential.profiles());

    parallel.close().await;
}

#[tokio::test]
async fn test_distinct_limit() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;
    introspector.close().await;

    let limited = Introspector::open(
        db.config.clone(),
        PASSWORD,
        ProfilerOptions::default().with_distinct_limit(1),
    )
    .await
    .unwrap();
    let snapshot = limited.snapshot().unwrap();
    let (_, name) = snapshot.find_profile("t", "name").unwrap();
    assert_eq!(name.distinct_values().unwrap(), &[json!("a")]);

    limited.close().await;
}

#[tokio::test]
async fn test_progress_events() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;

    let (tx, mut rx) = mpsc::channel(256);
    let snapshot = introspector.build_snapshot_with_progress(tx).await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(
        events.first(),
        Some(SnapshotEvent::Discovered { tables: 5, columns }) if *columns == snapshot.column_count()
    ));
    assert!(matches!(events.last(), Some(SnapshotEvent::Complete { .. })));

    let profiled: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            SnapshotEvent::ColumnProfiled { completed, .. } => Some(*completed),
            _ => None,
        })
        .collect();
    assert_eq!(profiled, (1..=snapshot.column_count()).collect::<Vec<_>>());

    introspector.close().await;
}

#[tokio::test]
async fn test_cancelled_build_keeps_previous_snapshot() {
    let db = start_postgres().await;
    let introspector = seeded(&db).await;
    let first = introspector.build_snapshot().await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = introspector
        .build_snapshot_with_cancellation(cancel, None)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    let current = introspector.snapshot().unwrap();
    assert_eq!(current.captured_at(), first.captured_at());

    introspector.close().await;
}

#[tokio::test]
async fn test_query_timeout_cancels_statement() {
    let db = start_postgres_with_timeout(Some(1)).await;
    let introspector = Introspector::connect(db.config.clone(), PASSWORD).await.unwrap();

    let err = introspector.query("SELECT pg_sleep(10)").await.unwrap_err();
    assert!(err.is_query_error());
    assert!(err.is_timeout());
    assert_eq!(err.pg_code(), Some("57014"));

    let result = introspector.query("SELECT 1 AS x").await.unwrap();
    assert_eq!(result.value(0, "x"), Some(&json!(1)));

    introspector.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let db = start_postgres().await;
    let introspector = Introspector::connect(db.config.clone(), PASSWORD).await.unwrap();

    introspector.close().await;
    introspector.close().await;
    assert!(introspector.is_closed());

    let err = introspector.query("SELECT 1").await.unwrap_err();
    assert!(err.is_connection_error());
    assert!(introspector.build_snapshot().await.unwrap_err().is_connection_error());
    assert!(introspector.snapshot().is_none());
}

#[tokio::test]
async fn test_connection_failures() {
    let db = start_postgres().await;

    let err = Introspector::connect(db.config.clone(), "wrong-password").await.unwrap_err();
    assert!(err.is_connection_error());
    assert!(err.hint().unwrap().contains("password"));

    let mut missing_db = db.config.clone();
    missing_db.database = "no_such_database".to_string();
    let err = Introspector::connect(missing_db, PASSWORD).await.unwrap_err();
    assert!(err.is_connection_error());

    let mut unreachable = db.config.clone();
    unreachable.port = 1;
    unreachable.options.connect_timeout_secs = 2;
    let err = Introspector::connect(unreachable, PASSWORD).await.unwrap_err();
    assert!(matches!(err, DbScopeError::Connection { .. }));
}
