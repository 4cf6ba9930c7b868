use std::sync::{Arc, Mutex};

use sqlbridge_core::{
    Adapter, Binds, Condition, ConnectionConfig, Select, SqlExpr, Value, WriterSink,
};
use sqlbridge_dialect_sqlite::SqliteDialect;
use sqlbridge_testkit::{Recorder, RecordingDialect, rows};

fn recorded_adapter(config: ConnectionConfig) -> (Adapter, Recorder) {
    let dialect = RecordingDialect::new(SqliteDialect);
    let recorder = dialect.recorder();
    (Adapter::new(Arc::new(dialect), config), recorder)
}

#[test]
fn named_and_positional_binds_reach_the_driver_in_text_order() {
    let (mut adapter, recorder) = recorded_adapter(ConnectionConfig::default());
    let binds = Binds::new()
        .bind("sku", "A-1")
        .bind(":since", SqlExpr::new("DATE('now')"))
        .bind("states", Value::List(vec![Value::from("new"), Value::from("held")]));

    adapter
        .query(
            "SELECT * FROM t WHERE sku = :sku AND created_at > :since AND state IN (:states) \
             AND note <> ':sku'",
            binds,
        )
        .expect("query runs");

    let call = recorder.calls().pop().expect("query recorded");
    assert_eq!(
        call.sql,
        "SELECT * FROM t WHERE sku = ? AND created_at > DATE('now') AND state IN ('new', 'held') \
         AND note <> ':sku'"
    );
    assert_eq!(call.params, vec![Value::from("A-1")]);
}

#[test]
fn selects_are_rendered_by_the_dialect() {
    let (mut adapter, recorder) = recorded_adapter(ConnectionConfig::default());
    let select = Select::new()
        .from("t", None)
        .column("sku")
        .where_(Condition::new("qty > ?", 3));

    adapter.query(&select, Binds::new()).expect("select runs");

    assert_eq!(
        recorder.queries(),
        vec!["SELECT \"sku\" FROM \"t\" WHERE (qty > 3)"]
    );
}

#[test]
fn fetch_helpers_shape_the_result() {
    let (mut adapter, recorder) = recorded_adapter(ConnectionConfig::default());
    recorder.respond(
        "FROM stock",
        rows(
            &["sku", "qty"],
            vec![
                vec![Value::from("A-1"), Value::from(3)],
                vec![Value::from("B-2"), Value::from(0)],
            ],
        ),
    );
    let sql = "SELECT sku, qty FROM stock";

    assert_eq!(
        adapter.fetch_one(sql, Binds::new()).expect("fetch one"),
        Some(Value::from("A-1"))
    );
    assert_eq!(
        adapter.fetch_col(sql, Binds::new()).expect("fetch col"),
        vec![Value::from("A-1"), Value::from("B-2")]
    );
    let pairs = adapter.fetch_pairs(sql, Binds::new()).expect("fetch pairs");
    assert_eq!(pairs.get("B-2"), Some(&Value::from(0)));
    assert_eq!(pairs.keys().collect::<Vec<_>>(), vec!["A-1", "B-2"]);
    let assoc = adapter.fetch_assoc(sql, Binds::new()).expect("fetch assoc");
    assert_eq!(assoc["A-1"].get_i64("qty"), Some(3));
    let row = adapter
        .fetch_row(sql, Binds::new())
        .expect("fetch row")
        .expect("first row");
    assert_eq!(row.get("sku"), Some(&Value::from("A-1")));
    assert_eq!(
        adapter.fetch_one("SELECT 1 FROM empty", Binds::new()).expect("fetch one"),
        None
    );
}

#[test]
fn query_hooks_see_the_final_statement() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let dialect = RecordingDialect::new(SqliteDialect);
    let mut adapter = Adapter::new(Arc::new(dialect), ConnectionConfig::default())
        .with_query_hook(move |sql, params| {
            sink.lock()
                .expect("hook lock")
                .push((sql.to_string(), params.to_vec()));
        });

    adapter
        .query("UPDATE t SET qty = :qty", Binds::new().bind("qty", 7))
        .expect("update runs");

    assert_eq!(
        *seen.lock().expect("hook lock"),
        vec![("UPDATE t SET qty = ?".to_string(), vec![Value::from(7)])]
    );
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().expect("buffer lock").clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

#[test]
fn profiler_sink_records_connects_and_statements() {
    let buffer = SharedBuffer::default();
    let config = ConnectionConfig {
        profiler: true,
        ..ConnectionConfig::default()
    };
    let (adapter, _recorder) = recorded_adapter(config);
    let mut adapter = adapter.with_sink(Box::new(WriterSink::new(buffer.clone())));

    adapter.begin().expect("begin");
    adapter
        .query("SELECT ? AS n", Binds::positional([5]))
        .expect("query runs");
    adapter.commit().expect("commit");

    let lines = buffer.lines();
    assert_eq!(lines.len(), 4, "{lines:?}");
    assert!(lines[0].starts_with("## CONNECT "));
    assert!(lines[1].starts_with("## TRANSACTION ") && lines[1].ends_with(": BEGIN"));
    assert!(lines[2].ends_with(": SELECT ? AS n BIND: [5]"));
    assert!(lines[3].ends_with(": COMMIT"));
}

#[test]
fn profiling_is_off_unless_configured() {
    let buffer = SharedBuffer::default();
    let (adapter, _recorder) = recorded_adapter(ConnectionConfig::default());
    let mut adapter = adapter.with_sink(Box::new(WriterSink::new(buffer.clone())));

    adapter.query("SELECT 1", Binds::new()).expect("query runs");
    assert!(buffer.lines().is_empty());
}
