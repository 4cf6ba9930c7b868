mod catalog;
mod connection;
mod dml;
mod generator;
mod types;

use sqlbridge_core::{
    AlterOp, BoundQuery, ColumnDefault, ColumnDefinition, ColumnDescription, ColumnType,
    Connection, ConnectionConfig, Dialect, DriverError, ErrorClass, ForeignKeyDescription,
    IndexDescription, Insert, InsertMode, IntervalUnit, QueryRunner, Quoting, Result,
    ReverseType, Select, SelectStyle, SqlExpr, Statement, TableDefinition, TableName, Value,
    parse_default_literal,
};

use crate::generator::Generator;

static QUOTING: Quoting = Quoting::mysql();

const SELECT_STYLE: SelectStyle = SelectStyle {
    supports_for_update: true,
    unbounded_limit: Some("18446744073709551615"),
};

const IDENTIFIER_LIMIT: usize = 64;
const DEFAULT_CHARSET: &str = "utf8mb4";

#[derive(Debug, Default, Clone, Copy)]
pub struct MysqlDialect;

impl MysqlDialect {
    fn generator(&self) -> Generator<'static> {
        Generator::new(&QUOTING, self.names())
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quoting(&self) -> &Quoting {
        &QUOTING
    }

    fn identifier_limit(&self) -> usize {
        IDENTIFIER_LIMIT
    }

    fn cache_prefix(&self) -> &'static str {
        "MYSQL_DDL"
    }

    fn select_style(&self) -> SelectStyle {
        SELECT_STYLE
    }

    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        connection::connect(config)
    }

    /// Client encoding plus a permissive `SQL_MODE`.
    fn session_init_sql(&self, config: &ConnectionConfig) -> Vec<String> {
        let charset = config.charset.as_deref().unwrap_or(DEFAULT_CHARSET);
        vec![
            format!("SET NAMES {}", QUOTING.quote_string(charset)),
            "SET SQL_MODE = ''".to_string(),
        ]
    }

    fn classify_error(&self, error: &DriverError) -> ErrorClass {
        connection::classify(error)
    }

    fn begin_sql(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn start_setup_sql(&self) -> Vec<String> {
        vec![
            "SET @OLD_FOREIGN_KEY_CHECKS = @@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS = 0"
                .to_string(),
            "SET @OLD_SQL_MODE = @@SQL_MODE, SQL_MODE = 'NO_AUTO_VALUE_ON_ZERO'".to_string(),
        ]
    }

    fn end_setup_sql(&self) -> Vec<String> {
        vec![
            "SET SQL_MODE = IFNULL(@OLD_SQL_MODE, '')".to_string(),
            "SET FOREIGN_KEY_CHECKS = IF(@OLD_FOREIGN_KEY_CHECKS = 0, 0, 1)".to_string(),
        ]
    }

    fn column_type_sql(&self, column: &ColumnDefinition) -> String {
        types::column_type_sql(column)
    }

    fn reverse_type(&self, column: &ColumnDescription) -> ReverseType {
        types::reverse_type(&column.data_type)
    }

    /// Newer servers report string defaults without quotes, so anything on a
    /// string column that is not a keyword stays text.
    fn reverse_default(&self, column: &ColumnDescription) -> Option<ColumnDefault> {
        if column.identity {
            return None;
        }
        let on_update = column
            .extra
            .as_deref()
            .is_some_and(|extra| extra.to_ascii_lowercase().contains("on update"));
        let parsed = parse_default_literal(column.default.as_deref(), on_update)?;
        let string_column = matches!(
            self.reverse_type(column).column_type(),
            ColumnType::Varchar | ColumnType::Text
        );
        match (&parsed, column.default.as_deref()) {
            (ColumnDefault::Literal(value), Some(raw))
                if string_column && !matches!(value, Value::Text(_)) =>
            {
                Some(ColumnDefault::Literal(Value::Text(raw.to_string())))
            }
            _ => Some(parsed),
        }
    }

    fn create_table(&self, table: &TableDefinition, temporary: bool) -> Result<Vec<Statement>> {
        self.generator().create_table(table, temporary)
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
        _unique_keys: &[Vec<String>],
    ) -> Result<String> {
        dml::insert_from_select(&QUOTING, SELECT_STYLE, select, table, columns, mode)
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

    fn needs_conflict_target(&self) -> bool {
        false
    }

    fn transactional_ddl(&self) -> bool {
        false
    }

    fn check_sql(&self, condition: &str, when_true: &str, when_false: &str) -> SqlExpr {
        SqlExpr::new(format!("IF({condition}, {when_true}, {when_false})"))
    }

    fn if_null_sql(&self, expression: &str, fallback: &str) -> SqlExpr {
        SqlExpr::new(format!("IFNULL({expression}, {fallback})"))
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

    fn length_sql(&self, expression: &str) -> SqlExpr {
        SqlExpr::new(format!("CHAR_LENGTH({expression})"))
    }

    fn interval_sql(&self, date: &str, amount: i64, unit: IntervalUnit) -> SqlExpr {
        SqlExpr::new(format!("DATE_ADD({date}, INTERVAL {amount} {})", unit.keyword()))
    }

    /// The format directives are native here.
    fn date_format_sql(&self, date: &str, format: &str) -> SqlExpr {
        SqlExpr::new(format!("DATE_FORMAT({date}, {})", QUOTING.quote_string(format)))
    }

    fn unix_timestamp_sql(&self, date: &str) -> SqlExpr {
        SqlExpr::new(format!("UNIX_TIMESTAMP({date})"))
    }

    fn from_unixtime_sql(&self, timestamp: &str) -> SqlExpr {
        SqlExpr::new(format!("FROM_UNIXTIME({timestamp})"))
    }

    fn json_extract_sql(&self, column: &str, path: &str) -> SqlExpr {
        SqlExpr::new(format!("JSON_EXTRACT({column}, {})", QUOTING.quote_string(path)))
    }

    fn json_contains_sql(&self, column: &str, json_value: &str, path: &str) -> SqlExpr {
        SqlExpr::new(format!(
            "JSON_CONTAINS({column}, {json_value}, {})",
            QUOTING.quote_string(path)
        ))
    }

    fn json_search_sql(&self, column: &str, needle: &str, path: &str) -> SqlExpr {
        SqlExpr::new(format!(
            "JSON_SEARCH({column}, 'one', {needle}, NULL, {}) IS NOT NULL",
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
        catalog::describe_table(runner, table)
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

    fn show_create_table(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Option<String>> {
        let quoted = QUOTING.quote_identifier(table.path());
        catalog::show_create_table(runner, table, &quoted)
    }
}
