use std::sync::Arc;

use sqlbridge_core::{
    Adapter, Binds, ColumnDefinition, ColumnType, ConnectionConfig, Error, IndexDefinition,
    IndexType, TableDefinition, TransactionError, UpdateField, Value,
};
use sqlbridge_dialect_mysql::MysqlDialect;

fn live_adapter() -> Option<Adapter> {
    if std::env::var("SQLBRIDGE_MYSQL_ENABLE_IGNORED").as_deref() != Ok("1") {
        return None;
    }
    let config = ConnectionConfig {
        host: Some(
            std::env::var("SQLBRIDGE_MYSQL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        ),
        port: std::env::var("SQLBRIDGE_MYSQL_PORT")
            .ok()
            .and_then(|raw| raw.parse::<u16>().ok()),
        user: Some(std::env::var("SQLBRIDGE_MYSQL_USER").unwrap_or_else(|_| "root".to_string())),
        password: Some(std::env::var("SQLBRIDGE_MYSQL_PASSWORD").unwrap_or_default()),
        database: std::env::var("SQLBRIDGE_MYSQL_DATABASE")
            .unwrap_or_else(|_| "sqlbridge".to_string()),
        ..ConnectionConfig::default()
    };
    Some(Adapter::new(Arc::new(MysqlDialect), config))
}

fn stock_table(name: &str) -> TableDefinition {
    TableDefinition::new(name)
        .set_comment("Stock levels")
        .add_column(
            ColumnDefinition::new("id", ColumnType::Integer)
                .identity()
                .primary(1),
        )
        .add_column(
            ColumnDefinition::new("sku", ColumnType::Varchar)
                .length(32)
                .not_null(),
        )
        .add_column(ColumnDefinition::new("qty", ColumnType::Integer))
        .add_index(IndexDefinition::new("", IndexType::Unique, ["sku"]))
}

#[test]
#[ignore = "requires mysql container runtime"]
fn upsert_round_trip_with_container_runtime() {
    let Some(mut adapter) = live_adapter() else {
        return;
    };
    let table = "sqlbridge_live_stock";
    adapter.drop_table(table).expect("drop should succeed");
    adapter
        .create_table(&stock_table(table))
        .expect("create should succeed");

    adapter
        .insert(table, &[("sku", Value::from("ABC")), ("qty", Value::from(1))])
        .expect("insert should succeed");
    assert_eq!(adapter.last_insert_id(), Some(1));
    adapter
        .insert_on_duplicate(
            table,
            &["sku", "qty"],
            vec![vec![Value::from("ABC"), Value::from(5)]],
            vec![UpdateField::column("qty")],
        )
        .expect("upsert should succeed");

    let rows = adapter
        .fetch_all(format!("SELECT id, sku, qty FROM {table}"), Binds::new())
        .expect("select should succeed");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_i64("id"), Some(1));
    assert_eq!(rows[0].get_i64("qty"), Some(5));

    let definition = adapter
        .introspect_as_definition(table)
        .expect("introspection should succeed");
    let id = definition.column("id").expect("id column");
    assert!(id.identity);
    assert_eq!(definition.primary_key_columns(), vec!["id".to_string()]);
    assert_eq!(
        definition.column("sku").map(|column| (column.column_type, column.length)),
        Some((ColumnType::Varchar, Some(32)))
    );

    adapter.drop_table(table).expect("cleanup should succeed");
}

#[test]
#[ignore = "requires mysql container runtime"]
fn ddl_is_refused_inside_a_transaction_with_container_runtime() {
    let Some(mut adapter) = live_adapter() else {
        return;
    };
    adapter.begin().expect("begin should succeed");
    let error = adapter
        .create_table(&stock_table("sqlbridge_live_refused"))
        .expect_err("implicit commit should be refused");
    assert!(matches!(
        error,
        Error::Transaction(TransactionError::DdlInTransaction { dialect: "mysql", .. })
    ));
    adapter.rollback().expect("rollback should succeed");
}
