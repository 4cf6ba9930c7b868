#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use sqlbridge_core::{
    Adapter, Binds, ColumnDefault, ColumnDefinition, ColumnType, ConnectionConfig,
    IndexDefinition, IndexType, TableDefinition, Value,
};
use sqlbridge_dialect_sqlite::SqliteDialect;

/// Adapter over a private in-memory database.
pub fn memory_adapter() -> Adapter {
    Adapter::new(Arc::new(SqliteDialect), ConnectionConfig::default())
}

/// Adapter over a database file; several adapters may share one path.
pub fn file_adapter(path: &Path) -> Adapter {
    let config = ConnectionConfig {
        path: Some(path.to_string_lossy().into_owned()),
        ..ConnectionConfig::default()
    };
    Adapter::new(Arc::new(SqliteDialect), config)
}

/// `t(id identity, sku varchar(32) unique, qty integer)`.
pub fn stock_table() -> TableDefinition {
    TableDefinition::new("t")
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

pub fn customer_table() -> TableDefinition {
    TableDefinition::new("customer")
        .set_comment("Customers")
        .add_column(
            ColumnDefinition::new("id", ColumnType::Integer)
                .identity()
                .primary(1),
        )
        .add_column(ColumnDefinition::new("email", ColumnType::Varchar).length(128))
        .add_column(
            ColumnDefinition::new("active", ColumnType::Boolean)
                .not_null()
                .default_value(ColumnDefault::Literal(Value::Bool(true))),
        )
}

pub fn orders_table() -> TableDefinition {
    TableDefinition::new("orders")
        .set_comment("Orders")
        .add_column(
            ColumnDefinition::new("id", ColumnType::Integer)
                .identity()
                .primary(1),
        )
        .add_column(ColumnDefinition::new("customer_id", ColumnType::Integer).not_null())
        .add_column(ColumnDefinition::new("email", ColumnType::Varchar).length(128))
        .add_column(
            ColumnDefinition::new("total", ColumnType::Decimal)
                .decimal(12, 4)
                .not_null()
                .default_value(ColumnDefault::Literal(Value::Int(0))),
        )
}

pub fn exec(adapter: &mut Adapter, sql: &str) {
    adapter
        .query(sql, Binds::new())
        .unwrap_or_else(|error| panic!("`{sql}` should succeed: {error}"));
}

pub fn count(adapter: &mut Adapter, table: &str) -> i64 {
    adapter
        .fetch_one(format!("SELECT COUNT(*) FROM \"{table}\""), Binds::new())
        .expect("count query should succeed")
        .and_then(|value| value.as_i64())
        .unwrap_or_default()
}
