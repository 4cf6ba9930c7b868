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
    SqlExpr, Statement, TableDefinition, TableName, json_path_segments, translate_date_format,
};

use crate::generator::Generator;

pub(crate) static QUOTING: Quoting = Quoting::postgres();

const SELECT_STYLE: SelectStyle = SelectStyle {
    supports_for_update: true,
    unbounded_limit: None,
};

/// `NAMEDATALEN - 1`.
const IDENTIFIER_LIMIT: usize = 63;
const DEFAULT_CLIENT_ENCODING: &str = "UTF8";
const SEARCH_PATH_KEY: &str = "postgres.search_path";

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl PostgresDialect {
    fn generator(&self) -> Generator<'static> {
        Generator::new(&QUOTING, self.names())
    }
}

/// `'{a,b,0}'` for the `#>` operators.
fn json_path_literal(path: &str) -> String {
    QUOTING.quote_string(&format!("{{{}}}", json_path_segments(path).join(",")))
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quoting(&self) -> &Quoting {
        &QUOTING
    }

    fn identifier_limit(&self) -> usize {
        IDENTIFIER_LIMIT
    }

    fn cache_prefix(&self) -> &'static str {
        "POSTGRES_DDL"
    }

    fn select_style(&self) -> SelectStyle {
        SELECT_STYLE
    }

    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        connection::connect(config)
    }

    fn session_init_sql(&self, config: &ConnectionConfig) -> Vec<String> {
        let encoding = config.charset.as_deref().unwrap_or(DEFAULT_CLIENT_ENCODING);
        // Literals are quoted with doubled quotes only, so backslashes must stay literal.
        let mut statements = vec![
            format!("SET client_encoding TO {}", QUOTING.quote_string(encoding)),
            "SET standard_conforming_strings = on".to_string(),
        ];
        if let Some(search_path) = config.extra(SEARCH_PATH_KEY) {
            let schemas = search_path
                .split(',')
                .map(str::trim)
                .filter(|schema| !schema.is_empty())
                .map(|schema| QUOTING.quote_segment(schema))
                .collect::<Vec<_>>();
            if !schemas.is_empty() {
                statements.push(format!("SET search_path TO {}", schemas.join(", ")));
            }
        }
        statements
    }

    fn classify_error(&self, error: &DriverError) -> ErrorClass {
        connection::classify(error)
    }

    /// Replica mode skips triggers, which is what enforces foreign keys.
    fn start_setup_sql(&self) -> Vec<String> {
        vec!["SET session_replication_role = replica".to_string()]
    }

    fn end_setup_sql(&self) -> Vec<String> {
        vec!["SET session_replication_role = DEFAULT".to_string()]
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

    /// Temporary tables live in the session's own schema and are dropped by
    /// bare name.
    fn drop_table(&self, table: &TableName, temporary: bool) -> Vec<Statement> {
        let target = if temporary {
            QUOTING.quote_segment(&table.name)
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

    fn returns_identity(&self) -> bool {
        true
    }

    fn concat_sql(&self, parts: &[&str], separator: Option<&str>) -> SqlExpr {
        match separator {
            Some(separator) => SqlExpr::new(format!(
                "CONCAT_WS({}, {})",
                QUOTING.quote_string(separator),
                parts.join(", ")
            )),
            None => SqlExpr::new(format!("CONCAT({})", parts.join(", "))),
        }
    }

    fn interval_sql(&self, date: &str, amount: i64, unit: IntervalUnit) -> SqlExpr {
        SqlExpr::new(format!(
            "({date} + INTERVAL '{amount} {}')",
            unit.plural()
        ))
    }

    fn date_format_sql(&self, date: &str, format: &str) -> SqlExpr {
        let format = translate_date_format(format, |directive| match directive {
            'Y' => Some("YYYY"),
            'm' => Some("MM"),
            'd' => Some("DD"),
            'H' => Some("HH24"),
            'i' => Some("MI"),
            's' => Some("SS"),
            _ => None,
        });
        SqlExpr::new(format!("TO_CHAR({date}, {})", QUOTING.quote_string(&format)))
    }

    fn date_part_sql(&self, date: &str) -> SqlExpr {
        SqlExpr::new(format!("CAST({date} AS DATE)"))
    }

    fn unix_timestamp_sql(&self, date: &str) -> SqlExpr {
        SqlExpr::new(format!("CAST(EXTRACT(EPOCH FROM {date}) AS BIGINT)"))
    }

    fn from_unixtime_sql(&self, timestamp: &str) -> SqlExpr {
        SqlExpr::new(format!("TO_TIMESTAMP({timestamp})"))
    }

    fn json_extract_sql(&self, column: &str, path: &str) -> SqlExpr {
        SqlExpr::new(format!(
            "(CAST({column} AS JSONB) #> {})",
            json_path_literal(path)
        ))
    }

    fn json_contains_sql(&self, column: &str, json_value: &str, path: &str) -> SqlExpr {
        SqlExpr::new(format!(
            "(CAST({column} AS JSONB) #> {} @> CAST({json_value} AS JSONB))",
            json_path_literal(path)
        ))
    }

    fn json_search_sql(&self, column: &str, needle: &str, path: &str) -> SqlExpr {
        SqlExpr::new(format!(
            "EXISTS (SELECT 1 FROM jsonb_path_query(CAST({column} AS JSONB) #> {}, \
             'strict $.**') AS found(item) \
             WHERE jsonb_typeof(item) = 'string' AND item #>> '{{}}' = {needle})",
            json_path_literal(path)
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
        catalog::foreign_keys(runner, table)
    }

    fn table_comment(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Option<String>> {
        catalog::table_comment(runner, table)
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
