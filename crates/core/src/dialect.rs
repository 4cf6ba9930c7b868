use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::dml::render_assignments;
use crate::{
    BoundQuery, ColumnDefault, ColumnDefinition, ColumnDescription, ColumnType, Condition,
    ConfigError, Connection, ConnectionConfig, DriverError, Error, ErrorClass,
    ForeignKeyDefinition, ForeignKeyDescription, IdentPath, IndexDefinition, IndexDescription,
    Insert, InsertMode, IntervalUnit, JoinKind, NameBuilder, QueryRunner, Quoting, Result,
    ReverseType, Select, SelectStyle, SqlExpr, Statement, TableDefinition, TableName, Value,
    parse_default_literal,
};

/// One structural change to an existing table.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterOp {
    AddColumn(ColumnDefinition),
    DropColumn(String),
    /// Rename `from` and redefine it in one step.
    ChangeColumn {
        from: String,
        column: ColumnDefinition,
    },
    ModifyColumn(ColumnDefinition),
    AddIndex(IndexDefinition),
    DropIndex(String),
    AddForeignKey(ForeignKeyDefinition),
    DropForeignKey(String),
    SetComment(String),
    Truncate,
    Rename(TableName),
}

/// Per-backend SQL generation, session handling and catalog access. The
/// adapter owns no backend knowledge; everything that differs lives here.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn quoting(&self) -> &Quoting;

    /// Maximum identifier length in bytes.
    fn identifier_limit(&self) -> usize;

    fn names(&self) -> NameBuilder {
        NameBuilder::new(self.identifier_limit())
    }

    /// Namespace for metadata cache keys and tags.
    fn cache_prefix(&self) -> &'static str;

    fn select_style(&self) -> SelectStyle;

    // --- session ---------------------------------------------------------

    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;

    /// Statements run once after every (re)connect.
    fn session_init_sql(&self, config: &ConnectionConfig) -> Vec<String>;

    fn classify_error(&self, error: &DriverError) -> ErrorClass;

    fn begin_sql(&self) -> &'static str {
        "BEGIN"
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK"
    }

    /// Relaxes constraint enforcement for a batch of DDL.
    fn start_setup_sql(&self) -> Vec<String>;

    fn end_setup_sql(&self) -> Vec<String>;

    /// Statements that disable foreign key enforcement around a table rebuild.
    /// Rebuilds only run outside transactions.
    fn suspend_foreign_keys_sql(&self) -> Vec<String> {
        Vec::new()
    }

    fn restore_foreign_keys_sql(&self) -> Vec<String> {
        Vec::new()
    }

    // --- types -----------------------------------------------------------

    fn column_type_sql(&self, column: &ColumnDefinition) -> String;

    fn reverse_type(&self, column: &ColumnDescription) -> ReverseType;

    fn reverse_default(&self, column: &ColumnDescription) -> Option<ColumnDefault> {
        if column.identity {
            return None;
        }
        let on_update = column
            .extra
            .as_deref()
            .is_some_and(|extra| extra.to_ascii_lowercase().contains("on update"));
        parse_default_literal(column.default.as_deref(), on_update)
    }

    // --- DDL -------------------------------------------------------------

    fn create_table(&self, table: &TableDefinition, temporary: bool) -> Result<Vec<Statement>>;

    fn drop_table(&self, table: &TableName, temporary: bool) -> Vec<Statement> {
        let keyword = if temporary {
            "DROP TEMPORARY TABLE IF EXISTS"
        } else {
            "DROP TABLE IF EXISTS"
        };
        vec![Statement::sql(format!(
            "{keyword} {}",
            self.quoting().quote_identifier(table.path())
        ))]
    }

    /// Renders `op` against the table as it currently exists.
    fn alter_table(&self, current: &TableDefinition, op: &AlterOp) -> Result<Vec<Statement>>;

    // --- DML -------------------------------------------------------------

    fn insert(&self, insert: &Insert) -> Result<BoundQuery>;

    fn insert_from_select(
        &self,
        select: &Select,
        table: &TableName,
        columns: &[String],
        mode: &InsertMode,
        unique_keys: &[Vec<String>],
    ) -> Result<String>;

    fn update(
        &self,
        table: &TableName,
        assignments: &[(String, Value)],
        conditions: &[Condition],
    ) -> Result<BoundQuery> {
        let quoting = self.quoting();
        let mut params = Vec::new();
        let mut sql = format!(
            "UPDATE {} SET {}",
            quoting.quote_identifier(table.path()),
            render_assignments(assignments, quoting, &mut params)
        );
        push_conditions(&mut sql, conditions, quoting);
        Ok(BoundQuery::new(sql, params))
    }

    fn delete(&self, table: &TableName, conditions: &[Condition]) -> String {
        let quoting = self.quoting();
        let mut sql = format!("DELETE FROM {}", quoting.quote_identifier(table.path()));
        push_conditions(&mut sql, conditions, quoting);
        sql
    }

    /// Updates `table AS alias` from the select's columns; each projected
    /// column name becomes an assignment target. The select either reads from
    /// the target under the same alias or joins to it through its conditions.
    fn update_from_select(&self, select: &Select, table: &TableName, alias: &str)
    -> Result<String>;

    /// Deletes the rows of `table AS alias` that the select matches.
    fn delete_from_select(&self, select: &Select, table: &TableName, alias: &str)
    -> Result<String>;

    fn render_select(&self, select: &Select) -> String {
        select.render(self.quoting(), self.select_style())
    }

    /// Whether identity values come back through `RETURNING`.
    fn returns_identity(&self) -> bool {
        false
    }

    /// Whether upserts name the unique key they resolve against, so the
    /// adapter has to supply the table's unique keys.
    fn needs_conflict_target(&self) -> bool {
        true
    }

    /// `false` when DDL commits an open transaction implicitly.
    fn transactional_ddl(&self) -> bool {
        true
    }

    // --- expressions -----------------------------------------------------

    fn check_sql(&self, condition: &str, when_true: &str, when_false: &str) -> SqlExpr {
        SqlExpr::new(format!(
            "CASE WHEN {condition} THEN {when_true} ELSE {when_false} END"
        ))
    }

    fn if_null_sql(&self, expression: &str, fallback: &str) -> SqlExpr {
        SqlExpr::new(format!("COALESCE({expression}, {fallback})"))
    }

    fn case_sql(
        &self,
        subject: Option<&str>,
        cases: &[(&str, &str)],
        default: Option<&str>,
    ) -> SqlExpr {
        let mut sql = String::from("CASE");
        if let Some(subject) = subject {
            sql.push(' ');
            sql.push_str(subject);
        }
        for (when, then) in cases {
            sql.push_str(&format!(" WHEN {when} THEN {then}"));
        }
        if let Some(default) = default {
            sql.push_str(&format!(" ELSE {default}"));
        }
        sql.push_str(" END");
        SqlExpr::new(sql)
    }

    fn concat_sql(&self, parts: &[&str], separator: Option<&str>) -> SqlExpr;

    fn length_sql(&self, expression: &str) -> SqlExpr {
        SqlExpr::new(format!("LENGTH({expression})"))
    }

    fn least_sql(&self, expressions: &[&str]) -> SqlExpr {
        SqlExpr::new(format!("LEAST({})", expressions.join(", ")))
    }

    fn greatest_sql(&self, expressions: &[&str]) -> SqlExpr {
        SqlExpr::new(format!("GREATEST({})", expressions.join(", ")))
    }

    fn substring_sql(&self, expression: &str, position: i64, length: Option<i64>) -> SqlExpr {
        match length {
            Some(length) => SqlExpr::new(format!("SUBSTRING({expression}, {position}, {length})")),
            None => SqlExpr::new(format!("SUBSTRING({expression}, {position})")),
        }
    }

    /// `date` shifted by a signed amount of `unit`.
    fn interval_sql(&self, date: &str, amount: i64, unit: IntervalUnit) -> SqlExpr;

    fn date_add_sql(&self, date: &str, amount: i64, unit: &str) -> Result<SqlExpr> {
        let unit = unit.parse::<IntervalUnit>()?;
        Ok(self.interval_sql(date, amount, unit))
    }

    fn date_sub_sql(&self, date: &str, amount: i64, unit: &str) -> Result<SqlExpr> {
        let unit = unit.parse::<IntervalUnit>()?;
        Ok(self.interval_sql(date, -amount, unit))
    }

    /// `format` uses `%Y %m %d %H %i %s` directives.
    fn date_format_sql(&self, date: &str, format: &str) -> SqlExpr;

    fn date_part_sql(&self, date: &str) -> SqlExpr {
        SqlExpr::new(format!("DATE({date})"))
    }

    fn unix_timestamp_sql(&self, date: &str) -> SqlExpr;

    fn from_unixtime_sql(&self, timestamp: &str) -> SqlExpr;

    fn json_extract_sql(&self, column: &str, path: &str) -> SqlExpr;

    /// True when the JSON at `path` contains `json_value`.
    fn json_contains_sql(&self, column: &str, json_value: &str, path: &str) -> SqlExpr;

    /// True when some string under `path` equals `needle`.
    fn json_search_sql(&self, column: &str, needle: &str, path: &str) -> SqlExpr;

    /// Quoted date or datetime literal.
    fn format_date(&self, value: &NaiveDateTime, include_time: bool) -> String {
        let format = if include_time {
            "%Y-%m-%d %H:%M:%S"
        } else {
            "%Y-%m-%d"
        };
        self.quoting()
            .quote_string(&value.format(format).to_string())
    }

    // --- introspection ---------------------------------------------------

    fn list_tables(&self, runner: &mut dyn QueryRunner, schema: Option<&str>)
    -> Result<Vec<String>>;

    fn table_exists(&self, runner: &mut dyn QueryRunner, table: &TableName) -> Result<bool>;

    /// Columns in ordinal order; empty when the table does not exist.
    fn describe_table(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Vec<ColumnDescription>>;

    fn index_list(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Vec<IndexDescription>>;

    fn foreign_keys(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Vec<ForeignKeyDescription>>;

    fn table_comment(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Option<String>>;

    /// Native DDL text if the backend can produce it; `None` lets the adapter
    /// render it from the introspected definition.
    fn show_create_table(
        &self,
        _runner: &mut dyn QueryRunner,
        _table: &TableName,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    // --- advisory locks --------------------------------------------------

    fn get_lock(
        &self,
        _runner: &mut dyn QueryRunner,
        _name: &str,
        _timeout: Duration,
    ) -> Result<bool> {
        Err(Error::unsupported(self.name(), "advisory locks"))
    }

    fn release_lock(&self, _runner: &mut dyn QueryRunner, _name: &str) -> Result<bool> {
        Err(Error::unsupported(self.name(), "advisory locks"))
    }

    fn is_locked(&self, _runner: &mut dyn QueryRunner, _name: &str) -> Result<bool> {
        Err(Error::unsupported(self.name(), "advisory locks"))
    }
}

fn push_conditions(sql: &mut String, conditions: &[Condition], quoting: &Quoting) {
    if conditions.is_empty() {
        return;
    }
    let rendered = conditions
        .iter()
        .map(|condition| format!("({})", condition.render(quoting)))
        .collect::<Vec<_>>();
    sql.push_str(" WHERE ");
    sql.push_str(&rendered.join(" AND "));
}

/// Source side of an `UPDATE ... FROM` or `DELETE ... USING`: every table
/// but the target, plus the predicates tying them together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinedSources {
    pub from: Option<String>,
    pub predicates: Vec<String>,
}

impl JoinedSources {
    #[must_use]
    pub fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicates.join(" AND "))
        }
    }
}

/// Splits `select` around the target aliased `alias`. When the select reads
/// from the target itself, its first join becomes the source table and that
/// join's condition moves into the predicates.
pub fn joined_sources(
    select: &Select,
    quoting: &Quoting,
    alias: &str,
    operation: &'static str,
) -> Result<JoinedSources> {
    let mut predicates = Vec::new();
    let from = if select.selects_from(alias) {
        let mut joins = select.joins().iter();
        match joins.next() {
            None => None,
            Some(first) => {
                if first.kind != JoinKind::Inner {
                    return Err(ConfigError::IncompleteSelect {
                        operation,
                        part: "inner join to the target table",
                    }
                    .into());
                }
                predicates.push(format!("({})", first.condition));
                let mut sql = Select::render_table(quoting, &first.table, first.alias.as_deref());
                for join in joins {
                    sql.push(' ');
                    sql.push_str(&join.render(quoting));
                }
                Some(sql)
            }
        }
    } else {
        select.render_sources(quoting)
    };
    if let Some(conditions) = select.render_where(quoting) {
        predicates.push(format!("({conditions})"));
    }
    Ok(JoinedSources { from, predicates })
}

/// Shared pieces of `update_from_select`: the select's `SET` list against the
/// target alias.
pub fn select_assignments(
    select: &Select,
    quoting: &Quoting,
    qualify: Option<&str>,
) -> Result<Vec<String>> {
    let assignments = select
        .selected_columns()
        .iter()
        .map(|column| -> Result<String> {
            let target = column.output_name().ok_or(ConfigError::IncompleteSelect {
                operation: "update from select",
                part: "column alias",
            })?;
            let target = match qualify {
                Some(alias) => quoting.quote_identifier([alias, target]),
                None => quoting.quote_identifier(target),
            };
            let source = match &column.expr {
                IdentPath::Expr(expr) => expr.as_str().to_string(),
                path => quoting.quote_identifier(path.clone()),
            };
            Ok(format!("{target} = {source}"))
        })
        .collect::<Result<Vec<_>>>()?;
    if assignments.is_empty() {
        return Err(ConfigError::IncompleteSelect {
            operation: "update from select",
            part: "columns",
        }
        .into());
    }
    Ok(assignments)
}

/// Maps one catalog column back to an abstract column definition.
pub fn column_from_description(
    dialect: &dyn Dialect,
    column: &ColumnDescription,
) -> ColumnDefinition {
    let reverse = dialect.reverse_type(column);
    if let ReverseType::Unknown(raw) = &reverse {
        warn!(
            dialect = dialect.name(),
            table = %column.table,
            column = %column.name,
            data_type = %raw,
            "unknown column type, treating it as text"
        );
    }
    let column_type = reverse.column_type();
    let mut definition = ColumnDefinition::new(column.name.clone(), column_type);
    if matches!(column_type, ColumnType::Varchar | ColumnType::VarBinary)
        || (column_type.is_large_object() && column.length.is_some())
    {
        definition.length = column.length;
    }
    if column_type.is_decimal() {
        definition.precision = column.precision;
        definition.scale = column.scale;
    }
    definition.nullable = column.nullable;
    definition.unsigned = column.unsigned;
    definition.comment = column.comment.clone().filter(|comment| !comment.is_empty());
    definition.default = dialect.reverse_default(column);
    if column.identity {
        definition = definition.identity();
    }
    if column.primary {
        definition = definition.primary(column.primary_position.unwrap_or(1));
    }
    definition
}
