use std::sync::Arc;

use sqlbridge_core::{Adapter, Binds, ConnectionConfig, Error, TransactionError};
use sqlbridge_dialect_sqlite::SqliteDialect;
use sqlbridge_testkit::{Recorder, RecordingDialect};

fn recorded_adapter() -> (Adapter, Recorder) {
    let dialect = RecordingDialect::new(SqliteDialect);
    let recorder = dialect.recorder();
    (
        Adapter::new(Arc::new(dialect), ConnectionConfig::default()),
        recorder,
    )
}

#[test]
fn only_the_outermost_level_reaches_the_server() {
    let (mut adapter, recorder) = recorded_adapter();

    adapter.begin().expect("level 1");
    adapter.begin().expect("level 2");
    adapter.begin().expect("level 3");
    assert_eq!(adapter.transaction_level(), 3);
    adapter.commit().expect("back to 2");
    adapter.commit().expect("back to 1");
    adapter.commit().expect("back to 0");

    assert_eq!(recorder.queries(), vec!["BEGIN", "COMMIT"]);
    assert!(!adapter.is_in_transaction());
}

#[test]
fn inner_rollback_leaves_the_outer_level_pending() {
    let (mut adapter, recorder) = recorded_adapter();

    adapter.begin().expect("outer");
    adapter.begin().expect("inner");
    adapter.rollback().expect("inner rollback only counts");
    assert_eq!(recorder.queries(), vec!["BEGIN"]);

    let error = adapter.commit().expect_err("outer commit is refused");
    assert!(matches!(
        error,
        Error::Transaction(TransactionError::NestedRollbackPending)
    ));
    assert_eq!(adapter.transaction_level(), 1);

    adapter.rollback().expect("outer rollback");
    assert_eq!(recorder.queries(), vec!["BEGIN", "ROLLBACK"]);

    adapter.begin().expect("a fresh transaction is not doomed");
    adapter.commit().expect("commit goes through");
    assert_eq!(
        recorder.queries(),
        vec!["BEGIN", "ROLLBACK", "BEGIN", "COMMIT"]
    );
}

#[test]
fn asymmetric_calls_are_errors() {
    let (mut adapter, recorder) = recorded_adapter();

    assert!(matches!(
        adapter.commit(),
        Err(Error::Transaction(TransactionError::NotStarted { operation: "commit" }))
    ));
    assert!(matches!(
        adapter.rollback(),
        Err(Error::Transaction(TransactionError::NotStarted { operation: "rollback" }))
    ));
    assert!(recorder.calls().is_empty());
}

#[test]
fn scopes_roll_back_unless_committed() {
    let (mut adapter, recorder) = recorded_adapter();

    {
        let mut scope = adapter.transaction().expect("scope opens");
        scope
            .query("UPDATE t SET qty = 0", Binds::new())
            .expect("update runs");
    }
    assert_eq!(adapter.transaction_level(), 0);

    let scope = adapter.transaction().expect("scope opens");
    scope.commit().expect("scope commits");

    assert_eq!(
        recorder.queries(),
        vec!["BEGIN", "UPDATE t SET qty = 0", "ROLLBACK", "BEGIN", "COMMIT"]
    );
}

#[test]
fn closing_with_an_open_transaction_rolls_back_and_reports() {
    let (mut adapter, recorder) = recorded_adapter();
    adapter.begin().expect("outer");
    adapter.begin().expect("inner");

    let error = adapter.close().expect_err("open levels are reported");
    assert!(matches!(
        error,
        Error::Transaction(TransactionError::OpenAtTeardown { level: 2 })
    ));
    assert_eq!(recorder.queries(), vec!["BEGIN", "ROLLBACK"]);
}

#[test]
fn dropping_the_adapter_rolls_back() {
    let (mut adapter, recorder) = recorded_adapter();
    adapter.begin().expect("begin");
    drop(adapter);
    assert_eq!(recorder.queries(), vec!["BEGIN", "ROLLBACK"]);
}

#[test]
fn dropping_the_connection_forgets_the_transaction() {
    let (mut adapter, recorder) = recorded_adapter();
    adapter.begin().expect("begin");
    adapter.close_connection();

    assert!(!adapter.is_in_transaction());
    assert!(!adapter.is_connected());
    adapter.rollback().expect("the lost level can still be rolled back");
    adapter.query("SELECT 1", Binds::new()).expect("reconnects");
    assert_eq!(recorder.connect_count(), 2);
}
