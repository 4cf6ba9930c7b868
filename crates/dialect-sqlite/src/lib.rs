mod catalog;
mod connection;
mod dml;
mod generator;
mod lock;
mod types;

use std::time::Duration;

use sqlbridge_core::{
    AlterOp, BoundQuery, ColumnDefinition, ColumnDescription, Connection, ConnectionConfig,
    Dialect, DriverError, ErrorClass, ForeignKeyDescription, IndexDescription, Insert,
    InsertMode, IntervalUnit, QueryRunner, Quoting, Result, ReverseType, Select, SelectStyle,
    SqlExpr, Statement, TableDefinition, TableName, translate_date_format,
};

use crate::generator::Generator;

static QUOTING: Quoting = Quoting::sqlite();

const SELECT_STYLE: SelectStyle = SelectStyle {
    supports_for_update: false,
    unbounded_limit: Some("-1"),
};

/// Kept equal to the row-store limit so generated names match across
/// backends.
const IDENTIFIER_LIMIT: usize = 64;

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqliteDialect {
    fn generator(&self) -> Generator<'static> {
        Generator::new(&QUOTING, self.names())
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quoting(&self) -> &Quoting {
        &QUOTING
    }

    fn identifier_limit(&self) -> usize {
        IDENTIFIER_LIMIT
    }

    fn cache_prefix(&self) -> &'static str {
        "SQLITE_DDL"
    }

    fn select_style(&self) -> SelectStyle {
        SELECT_STYLE
    }

    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        connection::connect(config)
    }

    fn session_init_sql(&self, _config: &ConnectionConfig) -> Vec<String> {
        vec!["PRAGMA foreign_keys = ON".to_string()]
    }

    fn classify_error(&self, error: &DriverError) -> ErrorClass {
        connection::classify(error)
    }

    fn start_setup_sql(&self) -> Vec<String> {
        vec!["PRAGMA foreign_keys = OFF".to_string()]
    }

    fn end_setup_sql(&self) -> Vec<String> {
        vec!["PRAGMA foreign_keys = ON".to_string()]
    }

    fn suspend_foreign_keys_sql(&self) -> Vec<String> {
        vec!["PRAGMA foreign_keys = OFF".to_string()]
    }

    fn restore_foreign_keys_sql(&self) -> Vec<String> {
        vec!["PRAGMA foreign_keys = ON".to_string()]
    }

    fn column_type_sql(&self, column: &ColumnDefinition) -> String {
        types::column_type_sql(column)
    }

    fn reverse_type(&self, column: &ColumnDescription) -> ReverseType {
        types::reverse_type(&column.data_type)
    }

    fn create_table(&self, table: &TableDefinition, temporary: bool) -> Result<Vec<Statement>> {
        self.generator().create_table(table, temporary)
    }

    fn drop_table(&self, table: &TableName, temporary: bool) -> Vec<Statement> {
        let target = if temporary {
            QUOTING.quote_identifier(["temp", table.name.as_str()])
        } else {
            QUOTING.quote_identifier(table.path())
        };
        vec![Statement::sql(format!("DROP TABLE IF EXISTS {target}"))]
    }

    fn alter_table(&self, current: &TableDefinition, op: &AlterOp) -> Result<Vec<Statement>> {
        self.generator().alter_table(current, op)
    }

    fn insert(&self, insert: &Insert) -> Result<BoundQuery> {
        dml::insert(&QUOTING, insert)
    }

    fn insert_from_select(
        &self,
        select: &Select,
        table: &TableName,
        columns: &[String],
        mode: &InsertMode,
        unique_keys: &[Vec<String>],
    ) -> Result<String> {
        dml::insert_from_select(
            &QUOTING,
            SELECT_STYLE,
            select,
            table,
            columns,
            mode,
            unique_keys,
        )
    }

    fn update_from_select(
        &self,
        select: &Select,
        table: &TableName,
        alias: &str,
    ) -> Result<String> {
        dml::update_from_select(&QUOTING, select, table, alias)
    }

    fn delete_from_select(
        &self,
        select: &Select,
        table: &TableName,
        alias: &str,
    ) -> Result<String> {
        dml::delete_from_select(&QUOTING, select, table, alias)
    }

    fn concat_sql(&self, parts: &[&str], separator: Option<&str>) -> SqlExpr {
        let glue = match separator {
            Some(separator) => format!(" || {} || ", QUOTING.quote_string(separator)),
            None => " || ".to_string(),
        };
        SqlExpr::new(format!("({})", parts.join(&glue)))
    }

    fn least_sql(&self, expressions: &[&str]) -> SqlExpr {
        SqlExpr::new(format!("MIN({})", expressions.join(", ")))
    }

    fn greatest_sql(&self, expressions: &[&str]) -> SqlExpr {
        SqlExpr::new(format!("MAX({})", expressions.join(", ")))
    }

    fn substring_sql(&self, expression: &str, position: i64, length: Option<i64>) -> SqlExpr {
        match length {
            Some(length) => SqlExpr::new(format!("SUBSTR({expression}, {position}, {length})")),
            None => SqlExpr::new(format!("SUBSTR({expression}, {position})")),
        }
    }

    fn interval_sql(&self, date: &str, amount: i64, unit: IntervalUnit) -> SqlExpr {
        let (amount, unit) = match unit {
            IntervalUnit::Week => (amount * 7, IntervalUnit::Day),
            other => (amount, other),
        };
        SqlExpr::new(format!("datetime({date}, '{amount:+} {}')", unit.plural()))
    }

    fn date_format_sql(&self, date: &str, format: &str) -> SqlExpr {
        let format = translate_date_format(format, |directive| match directive {
            'Y' => Some("%Y"),
            'm' => Some("%m"),
            'd' => Some("%d"),
            'H' => Some("%H"),
            'i' => Some("%M"),
            's' => Some("%S"),
            _ => None,
        });
        SqlExpr::new(format!("strftime({}, {date})", QUOTING.quote_string(&format)))
    }

    fn unix_timestamp_sql(&self, date: &str) -> SqlExpr {
        SqlExpr::new(format!("CAST(strftime('%s', {date}) AS INTEGER)"))
    }

    fn from_unixtime_sql(&self, timestamp: &str) -> SqlExpr {
        SqlExpr::new(format!("datetime({timestamp}, 'unixepoch')"))
    }

    fn json_extract_sql(&self, column: &str, path: &str) -> SqlExpr {
        SqlExpr::new(format!("json_extract({column}, {})", QUOTING.quote_string(path)))
    }

    fn json_contains_sql(&self, column: &str, json_value: &str, path: &str) -> SqlExpr {
        SqlExpr::new(format!(
            "EXISTS (SELECT 1 FROM json_each({column}, {}) \
             WHERE json_each.value = json_extract({json_value}, '$'))",
            QUOTING.quote_string(path)
        ))
    }

    fn json_search_sql(&self, column: &str, needle: &str, path: &str) -> SqlExpr {
        SqlExpr::new(format!(
            "EXISTS (SELECT 1 FROM json_tree({column}, {}) \
             WHERE json_tree.type = 'text' AND json_tree.value = {needle})",
            QUOTING.quote_string(path)
        ))
    }

    fn list_tables(
        &self,
        runner: &mut dyn QueryRunner,
        schema: Option<&str>,
    ) -> Result<Vec<String>> {
        catalog::list_tables(runner, schema)
    }

    fn table_exists(&self, runner: &mut dyn QueryRunner, table: &TableName) -> Result<bool> {
        catalog::table_exists(runner, table)
    }

    fn describe_table(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Vec<ColumnDescription>> {
        catalog::describe_table(runner, table, self.names())
    }

    fn index_list(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Vec<IndexDescription>> {
        catalog::index_list(runner, table)
    }

    fn foreign_keys(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Vec<ForeignKeyDescription>> {
        catalog::foreign_keys(runner, table, self.names())
    }

    /// Comments have nowhere to live in the catalog.
    fn table_comment(
        &self,
        _runner: &mut dyn QueryRunner,
        _table: &TableName,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    fn show_create_table(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Option<String>> {
        catalog::show_create_table(runner, table)
    }

    fn get_lock(
        &self,
        runner: &mut dyn QueryRunner,
        name: &str,
        timeout: Duration,
    ) -> Result<bool> {
        lock::get_lock(runner, name, timeout)
    }

    fn release_lock(&self, runner: &mut dyn QueryRunner, name: &str) -> Result<bool> {
        lock::release_lock(runner, name)
    }

    fn is_locked(&self, runner: &mut dyn QueryRunner, name: &str) -> Result<bool> {
        lock::is_locked(runner, name)
    }
}
