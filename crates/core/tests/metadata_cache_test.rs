use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlbridge_core::{
    Adapter, CacheBackend, ColumnDefinition, ColumnType, ConnectionConfig, TableDefinition,
    TableName,
};
use sqlbridge_dialect_sqlite::SqliteDialect;

type Log = Arc<Mutex<Vec<String>>>;

fn logged_adapter() -> (Adapter, Log) {
    let log = Log::default();
    let sink = Arc::clone(&log);
    let adapter = Adapter::new(Arc::new(SqliteDialect), ConnectionConfig::default())
        .with_query_hook(move |sql, _| {
            sink.lock().expect("log lock").push(sql.to_string());
        });
    (adapter, log)
}

fn drain(log: &Log) -> usize {
    let mut log = log.lock().expect("log lock");
    let count = log.len();
    log.clear();
    count
}

fn stock_table() -> TableDefinition {
    TableDefinition::new("t")
        .set_comment("Stock levels")
        .add_column(
            ColumnDefinition::new("id", ColumnType::Integer)
                .identity()
                .primary(1),
        )
        .add_column(ColumnDefinition::new("qty", ColumnType::Integer))
}

#[derive(Default, Clone)]
struct SharedBackend {
    store: Arc<Mutex<HashMap<String, (Vec<u8>, Vec<String>)>>>,
}

impl CacheBackend for SharedBackend {
    fn load(&mut self, key: &str) -> Option<Vec<u8>> {
        let store = self.store.lock().expect("store lock");
        store.get(key).map(|(data, _)| data.clone())
    }

    fn save(&mut self, key: &str, data: &[u8], tags: &[&str]) {
        let tags = tags.iter().map(|tag| (*tag).to_string()).collect();
        self.store
            .lock()
            .expect("store lock")
            .insert(key.to_string(), (data.to_vec(), tags));
    }

    fn remove(&mut self, key: &str) {
        self.store.lock().expect("store lock").remove(key);
    }

    fn clean(&mut self, tags: &[&str]) {
        self.store
            .lock()
            .expect("store lock")
            .retain(|_, (_, saved)| !tags.iter().any(|tag| saved.iter().any(|s| s == tag)));
    }
}

#[test]
fn describe_is_served_from_cache_until_the_table_changes() {
    let (mut adapter, log) = logged_adapter();
    adapter.create_table(&stock_table()).expect("table is created");
    drain(&log);

    let first = adapter.describe_table("t").expect("describe runs");
    assert!(drain(&log) > 0);
    let second = adapter.describe_table("t").expect("describe is cached");
    assert_eq!(drain(&log), 0);
    assert_eq!(first, second);

    adapter
        .add_column("t", ColumnDefinition::new("note", ColumnType::Text))
        .expect("column is added");
    drain(&log);
    let columns = adapter.describe_table("t").expect("describe runs again");
    assert!(drain(&log) > 0);
    assert!(columns.iter().any(|column| column.name == "note"));
}

#[test]
fn a_disallowed_cache_always_asks_the_catalog() {
    let (mut adapter, log) = logged_adapter();
    adapter.create_table(&stock_table()).expect("table is created");
    adapter.describe_table("t").expect("describe runs");
    adapter.disallow_ddl_cache();
    drain(&log);

    adapter.describe_table("t").expect("describe runs");
    let uncached = drain(&log);
    adapter.describe_table("t").expect("describe runs");
    assert!(uncached > 0);
    assert_eq!(drain(&log), uncached);

    adapter.allow_ddl_cache();
    adapter.describe_table("t").expect("describe runs");
    drain(&log);
    adapter.describe_table("t").expect("describe is cached");
    assert_eq!(drain(&log), 0);
}

#[test]
fn resetting_one_table_keeps_the_others() {
    let (mut adapter, log) = logged_adapter();
    adapter.create_table(&stock_table()).expect("t is created");
    let mut other = stock_table();
    other.name = "u".to_string();
    adapter.create_table(&other).expect("u is created");
    adapter.describe_table("t").expect("describe t");
    adapter.describe_table("u").expect("describe u");
    drain(&log);

    adapter.reset_ddl_cache(Some(&TableName::new("t")));
    adapter.describe_table("u").expect("u is cached");
    assert_eq!(drain(&log), 0);
    adapter.describe_table("t").expect("t is asked again");
    assert!(drain(&log) > 0);
}

#[test]
fn a_shared_backend_serves_other_adapters() {
    let backend = SharedBackend::default();
    let (writer, _) = logged_adapter();
    let mut writer = writer.with_cache_backend(Box::new(backend.clone()));
    writer.create_table(&stock_table()).expect("table is created");
    let described = writer.describe_table("t").expect("describe runs");

    let (reader, log) = logged_adapter();
    let mut reader = reader.with_cache_backend(Box::new(backend.clone()));
    let cached = reader
        .describe_table("t")
        .expect("served without a table in this database");
    assert_eq!(cached, described);
    assert_eq!(drain(&log), 0);

    reader.start_setup().expect("setup starts");
    reader.end_setup().expect("setup ends and clears the cache");
    assert!(backend.store.lock().expect("store lock").is_empty());
}
