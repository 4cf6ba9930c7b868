use std::sync::Arc;
use std::time::Duration;

use sqlbridge_core::{
    Adapter, Binds, ColumnDefinition, ColumnType, ConnectionConfig, DriverError, ErrorClass,
    Insert, InsertMode, TableDefinition, UpdateField, Value,
};
use sqlbridge_dialect_postgres::PostgresDialect;
use sqlbridge_testkit::{Recorder, RecordingDialect, rows};

fn adapter_with(config: ConnectionConfig) -> (Adapter, Recorder) {
    let dialect = RecordingDialect::new(PostgresDialect);
    let recorder = dialect.recorder();
    (Adapter::new(Arc::new(dialect), config), recorder)
}

fn adapter() -> (Adapter, Recorder) {
    adapter_with(ConnectionConfig::default())
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

fn sqlstate(code: &str, message: &str) -> DriverError {
    DriverError::new(Some(code.to_string()), message)
}

#[test]
fn session_settings_run_once_per_connection() {
    let mut config = ConnectionConfig::default();
    config
        .extra
        .insert("postgres.search_path".to_string(), "app, public".to_string());
    let (mut adapter, recorder) = adapter_with(config);

    adapter.query("SELECT 1", Binds::new()).expect("query runs");
    adapter.query("SELECT 2", Binds::new()).expect("query runs");

    assert_eq!(
        recorder.statements(),
        vec![
            "SET client_encoding TO 'UTF8'",
            "SET standard_conforming_strings = on",
            "SET search_path TO \"app\", \"public\"",
            "SELECT 1",
            "SELECT 2",
        ]
    );
    assert_eq!(recorder.connect_count(), 1);
}

#[test]
fn insert_returning_reports_the_last_generated_id() {
    let (mut adapter, recorder) = adapter();
    recorder.respond(
        "RETURNING",
        rows(&["id"], vec![vec![Value::Int(41)], vec![Value::Int(42)]]),
    );

    let insert = Insert::new(
        "stock",
        names(&["sku", "qty"]),
        vec![
            vec![Value::from("A-1"), Value::from(3)],
            vec![Value::from("A-2"), Value::from(4)],
        ],
    )
    .returning(Some("id".to_string()));
    adapter.execute_insert(insert).expect("insert runs");

    assert_eq!(adapter.last_insert_id(), Some(42));
    let call = recorder.calls().pop().expect("insert recorded");
    assert_eq!(
        call.sql,
        "INSERT INTO \"stock\" (\"sku\", \"qty\") VALUES (?, ?), (?, ?) RETURNING \"id\""
    );
    assert_eq!(
        call.params,
        vec![
            Value::from("A-1"),
            Value::from(3),
            Value::from("A-2"),
            Value::from(4)
        ]
    );
}

#[test]
fn upsert_uses_the_given_unique_keys() {
    let (mut adapter, recorder) = adapter();
    let insert = Insert::new(
        "stock",
        names(&["sku", "qty"]),
        vec![vec![Value::from("A-1"), Value::from(3)]],
    )
    .mode(InsertMode::Update(vec![UpdateField::column("qty")]))
    .unique_keys(vec![names(&["sku"])])
    .returning(Some("id".to_string()));
    adapter.execute_insert(insert).expect("upsert runs");

    assert_eq!(
        recorder.queries().last().map(String::as_str),
        Some(
            "INSERT INTO \"stock\" (\"sku\", \"qty\") VALUES (?, ?) \
             ON CONFLICT (\"sku\") DO UPDATE SET \"qty\" = EXCLUDED.\"qty\" RETURNING \"id\""
        )
    );
    assert_eq!(adapter.last_insert_id(), None);
}

#[test]
fn terminated_sessions_reconnect_and_retry() {
    let (mut adapter, recorder) = adapter();
    recorder.fail_next("SELECT 1", sqlstate("57P01", "terminating connection"));

    adapter.query("SELECT 1", Binds::new()).expect("retry succeeds");

    assert_eq!(recorder.connect_count(), 2);
    assert_eq!(
        recorder.statements(),
        vec![
            "SET client_encoding TO 'UTF8'",
            "SET standard_conforming_strings = on",
            "SELECT 1",
            "SET client_encoding TO 'UTF8'",
            "SET standard_conforming_strings = on",
            "SELECT 1",
        ]
    );
}

#[test]
fn deadlocks_inside_a_transaction_roll_back_every_level() {
    let (mut adapter, recorder) = adapter();
    adapter.begin().expect("outer begin");
    adapter.begin().expect("inner begin");
    recorder.fail_next("UPDATE", sqlstate("40P01", "deadlock detected"));

    let error = adapter
        .query("UPDATE stock SET qty = 0", Binds::new())
        .expect_err("deadlock should surface");

    assert_eq!(error.class(), Some(ErrorClass::Deadlock));
    assert_eq!(adapter.transaction_level(), 0);
    assert_eq!(
        recorder.queries(),
        vec!["BEGIN", "UPDATE stock SET qty = 0", "ROLLBACK"]
    );
}

#[test]
fn constraint_violations_outside_a_transaction_are_not_retried() {
    let (mut adapter, recorder) = adapter();
    recorder.fail_next("INSERT", sqlstate("23505", "duplicate key value"));

    let error = adapter
        .query("INSERT INTO stock (sku) VALUES (?)", Value::from("A-1"))
        .expect_err("duplicate should surface");

    assert_eq!(error.class(), Some(ErrorClass::Constraint));
    assert_eq!(recorder.queries().len(), 1);
}

#[test]
fn advisory_locks_poll_by_checksum_key() {
    let (mut adapter, recorder) = adapter();
    recorder
        .respond(
            "pg_try_advisory_lock",
            rows(&["acquired"], vec![vec![Value::Bool(true)]]),
        )
        .respond(
            "pg_advisory_unlock",
            rows(&["released"], vec![vec![Value::Bool(true)]]),
        )
        .respond("pg_locks", rows(&["?column?"], vec![vec![Value::Int(1)]]));

    assert!(
        adapter
            .get_lock("nightly-import", Duration::from_secs(1))
            .expect("lock query runs")
    );
    assert!(adapter.is_locked("nightly-import").expect("lookup runs"));
    assert!(adapter.release_lock("nightly-import").expect("unlock runs"));

    let calls = recorder
        .calls()
        .into_iter()
        .filter(|call| !call.batch)
        .collect::<Vec<_>>();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].sql, "SELECT pg_try_advisory_lock(?) AS acquired");
    let key = calls[0].params.clone();
    assert!(matches!(key.as_slice(), [Value::Int(key)] if *key >= 0));
    assert!(calls.iter().all(|call| call.params == key));
}

#[test]
fn busy_advisory_locks_give_up_at_the_deadline() {
    let (mut adapter, recorder) = adapter();
    recorder.respond(
        "pg_try_advisory_lock",
        rows(&["acquired"], vec![vec![Value::Bool(false)]]),
    );

    assert!(
        !adapter
            .get_lock("nightly-import", Duration::ZERO)
            .expect("lock query runs")
    );
    assert_eq!(recorder.queries().len(), 1);
}

#[test]
fn unheld_locks_are_not_reported() {
    let (mut adapter, _recorder) = adapter();
    assert!(!adapter.is_locked("nobody").expect("lookup runs"));
}

#[test]
fn setup_mode_switches_replication_role() {
    let (mut adapter, recorder) = adapter();
    adapter.start_setup().expect("setup starts");
    assert!(adapter.is_setup_active());
    adapter.close_connection();
    adapter.query("SELECT 1", Binds::new()).expect("query runs");
    adapter.end_setup().expect("setup ends");

    assert_eq!(
        recorder.statements(),
        vec![
            "SET client_encoding TO 'UTF8'",
            "SET standard_conforming_strings = on",
            "SET session_replication_role = replica",
            "SET client_encoding TO 'UTF8'",
            "SET standard_conforming_strings = on",
            "SET session_replication_role = replica",
            "SELECT 1",
            "SET session_replication_role = DEFAULT",
        ]
    );
}

#[test]
fn create_table_runs_each_generated_statement() {
    let (mut adapter, recorder) = adapter();
    let table = TableDefinition::new("tag")
        .set_comment("Tags")
        .add_column(
            ColumnDefinition::new("id", ColumnType::Integer)
                .identity()
                .primary(1),
        )
        .add_column(ColumnDefinition::new("label", ColumnType::Text).comment("Shown name"));

    adapter.create_table(&table).expect("table is created");

    assert_eq!(
        recorder.queries(),
        vec![
            "CREATE TABLE \"tag\" (\"id\" INTEGER GENERATED BY DEFAULT AS IDENTITY NOT NULL, \
             \"label\" TEXT, CONSTRAINT \"tag_pkey\" PRIMARY KEY (\"id\"))",
            "COMMENT ON TABLE \"tag\" IS 'Tags'",
            "COMMENT ON COLUMN \"tag\".\"label\" IS 'Shown name'",
        ]
    );
}
