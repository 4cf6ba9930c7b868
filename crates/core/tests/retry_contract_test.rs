use std::sync::Arc;
use std::time::Duration;

use sqlbridge_core::{
    Adapter, AdapterOptions, Binds, ConnectionConfig, Dialect, DriverError, Error, ErrorClass,
    ExecutionError, RetryPolicy, TransactionError,
};
use sqlbridge_dialect_postgres::PostgresDialect;
use sqlbridge_dialect_sqlite::SqliteDialect;
use sqlbridge_testkit::{Recorder, RecordingDialect};

fn recorded<D: Dialect + 'static>(dialect: D, retry: RetryPolicy) -> (Adapter, Recorder) {
    let dialect = RecordingDialect::new(dialect);
    let recorder = dialect.recorder();
    let options = AdapterOptions {
        retry,
        ..AdapterOptions::default()
    };
    (
        Adapter::with_options(Arc::new(dialect), ConnectionConfig::default(), options),
        recorder,
    )
}

fn failure(code: &str, message: &str) -> DriverError {
    DriverError::new(Some(code.to_string()), message)
}

fn attempts(error: &Error) -> Option<u32> {
    match error {
        Error::Execute(ExecutionError::StatementFailed { attempts, .. }) => Some(*attempts),
        _ => None,
    }
}

#[test]
fn lost_connections_are_reopened_until_attempts_run_out() {
    let (mut adapter, recorder) =
        recorded(PostgresDialect, RetryPolicy::new(3, Duration::ZERO));
    for _ in 0..3 {
        recorder.fail_next("SELECT 1", failure("08006", "connection failure"));
    }

    let error = adapter
        .query("SELECT 1", Binds::new())
        .expect_err("third failure is final");

    assert_eq!(error.class(), Some(ErrorClass::ConnectionLost));
    assert_eq!(attempts(&error), Some(3));
    assert_eq!(recorder.connect_count(), 3);
}

#[test]
fn lost_connections_inside_a_transaction_are_not_retried() {
    let (mut adapter, recorder) = recorded(PostgresDialect, RetryPolicy::default());
    adapter.begin().expect("begin");
    recorder.fail_next("SELECT 1", failure("57P01", "terminating connection"));

    let error = adapter
        .query("SELECT 1", Binds::new())
        .expect_err("work done in the transaction is gone");

    assert_eq!(attempts(&error), Some(1));
    assert_eq!(recorder.connect_count(), 1);
}

#[test]
fn busy_databases_are_retried_after_a_backoff() {
    let (mut adapter, recorder) =
        recorded(SqliteDialect, RetryPolicy::new(4, Duration::from_millis(1)));
    recorder
        .fail_next("UPDATE", failure("5", "database is locked"))
        .fail_next("UPDATE", failure("5", "database is locked"));

    adapter
        .query("UPDATE t SET qty = 1", Binds::new())
        .expect("third attempt succeeds");

    assert_eq!(
        recorder.queries(),
        vec![
            "UPDATE t SET qty = 1",
            "UPDATE t SET qty = 1",
            "UPDATE t SET qty = 1"
        ]
    );
    assert_eq!(recorder.connect_count(), 1);
}

#[test]
fn constraint_failures_in_a_transaction_collapse_it() {
    let (mut adapter, recorder) = recorded(SqliteDialect, RetryPolicy::default());
    adapter.begin().expect("begin");
    recorder.fail_next("INSERT", failure("2067", "UNIQUE constraint failed: t.sku"));

    let error = adapter
        .query("INSERT INTO t (sku) VALUES ('A')", Binds::new())
        .expect_err("violation surfaces");

    assert_eq!(error.class(), Some(ErrorClass::Constraint));
    assert!(!adapter.is_in_transaction());
    assert_eq!(recorder.queries().last().map(String::as_str), Some("ROLLBACK"));
}

#[test]
fn caller_rollbacks_after_a_collapse_are_no_ops() {
    let (mut adapter, recorder) = recorded(SqliteDialect, RetryPolicy::default());
    adapter.begin().expect("outer");
    adapter.begin().expect("inner");
    recorder.fail_next("INSERT", failure("2067", "UNIQUE constraint failed: t.sku"));

    adapter
        .query("INSERT INTO t (sku) VALUES ('A')", Binds::new())
        .expect_err("violation surfaces");
    assert_eq!(adapter.transaction_level(), 0);

    adapter.rollback().expect("inner handler rolls back");
    adapter.rollback().expect("outer handler rolls back");
    assert!(matches!(
        adapter.rollback(),
        Err(Error::Transaction(TransactionError::NotStarted { .. }))
    ));
    assert_eq!(
        recorder.queries(),
        vec!["BEGIN", "INSERT INTO t (sku) VALUES ('A')", "ROLLBACK"]
    );
}

#[test]
fn a_new_transaction_forgets_collapsed_levels() {
    let (mut adapter, recorder) = recorded(SqliteDialect, RetryPolicy::default());
    adapter.begin().expect("begin");
    recorder.fail_next("UPDATE", failure("2067", "UNIQUE constraint failed: t.sku"));
    adapter
        .query("UPDATE t SET sku = 'A'", Binds::new())
        .expect_err("violation surfaces");

    adapter.begin().expect("fresh transaction");
    adapter.commit().expect("commit");
    assert!(adapter.rollback().is_err());
}

#[test]
fn commits_are_attempted_once() {
    let (mut adapter, recorder) =
        recorded(SqliteDialect, RetryPolicy::new(5, Duration::ZERO));
    adapter.begin().expect("begin");
    recorder.fail_next("COMMIT", failure("5", "database is locked"));

    let error = adapter.commit().expect_err("commit failure surfaces");
    assert_eq!(attempts(&error), Some(1));
    assert_eq!(adapter.transaction_level(), 1);
    adapter.rollback().expect("caller can still roll back");
}

#[test]
fn disabled_policy_fails_immediately() {
    let (mut adapter, recorder) = recorded(SqliteDialect, RetryPolicy::disabled());
    recorder.fail_next("SELECT", failure("5", "database is locked"));

    let error = adapter
        .query("SELECT 1", Binds::new())
        .expect_err("no retries");
    assert_eq!(error.class(), Some(ErrorClass::LockContention));
    assert_eq!(recorder.queries().len(), 1);
}
