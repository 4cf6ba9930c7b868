use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sqlbridge_core::{
    AlterOp, BoundQuery, ColumnDefault, ColumnDefinition, ColumnDescription, Condition,
    Connection, ConnectionConfig, Dialect, DriverError, DriverResult, ErrorClass,
    ForeignKeyDescription, IndexDescription, Insert, InsertMode, IntervalUnit, NameBuilder,
    QueryRunner, Quoting, Result, ResultSet, ReverseType, Select, SelectStyle, SqlExpr,
    Statement, TableDefinition, TableName, Value,
};

/// One call that reached the fake connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub sql: String,
    pub params: Vec<Value>,
    /// `true` for `execute_batch`, `false` for `query`.
    pub batch: bool,
}

#[derive(Debug, Default)]
struct ScriptState {
    calls: Vec<RecordedCall>,
    responses: Vec<(String, ResultSet)>,
    failures: Vec<(String, DriverError)>,
    connects: usize,
    last_insert_id: Option<i64>,
    alive: bool,
}

impl ScriptState {
    /// Takes the first pending failure whose pattern occurs in `sql`.
    fn take_failure(&mut self, sql: &str) -> Option<DriverError> {
        let index = self
            .failures
            .iter()
            .position(|(pattern, _)| sql.contains(pattern.as_str()))?;
        Some(self.failures.remove(index).1)
    }

    fn response(&self, sql: &str) -> ResultSet {
        self.responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default()
    }
}

/// Handle onto the script shared by a [`RecordingDialect`] and every
/// connection it opens.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    state: Arc<Mutex<ScriptState>>,
}

impl Recorder {
    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// SQL of every call, session setup included, in execution order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .map(|call| call.sql.clone())
            .collect()
    }

    /// SQL of the `query` calls only.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|call| !call.batch)
            .map(|call| call.sql.clone())
            .collect()
    }

    /// Answers every query containing `pattern` with `result`. Earlier
    /// patterns win.
    pub fn respond(&self, pattern: impl Into<String>, result: ResultSet) -> &Self {
        self.state().responses.push((pattern.into(), result));
        self
    }

    /// Fails the next statement containing `pattern` once.
    pub fn fail_next(&self, pattern: impl Into<String>, error: DriverError) -> &Self {
        self.state().failures.push((pattern.into(), error));
        self
    }

    pub fn set_last_insert_id(&self, id: Option<i64>) {
        self.state().last_insert_id = id;
    }

    /// Makes `ping` report a dead session.
    pub fn kill_session(&self) {
        self.state().alive = false;
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    /// Forgets recorded calls; scripted responses stay.
    pub fn clear(&self) {
        self.state().calls.clear();
    }
}

/// Fake session writing into the shared script.
#[derive(Debug)]
pub struct RecordingConnection {
    recorder: Recorder,
}

impl RecordingConnection {
    fn call(&mut self, sql: &str, params: &[Value], batch: bool) -> DriverResult<ResultSet> {
        let mut state = self.recorder.state();
        state.calls.push(RecordedCall {
            sql: sql.to_string(),
            params: params.to_vec(),
            batch,
        });
        match state.take_failure(sql) {
            Some(error) => Err(error),
            None => Ok(state.response(sql)),
        }
    }
}

impl Connection for RecordingConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> DriverResult<ResultSet> {
        self.call(sql, params, false)
    }

    fn execute_batch(&mut self, sql: &str) -> DriverResult<()> {
        self.call(sql, &[], true).map(|_| ())
    }

    fn last_insert_id(&mut self) -> Option<i64> {
        self.recorder.state().last_insert_id
    }

    fn ping(&mut self) -> bool {
        self.recorder.state().alive
    }
}

/// A real dialect whose `connect` hands out [`RecordingConnection`]s. Every
/// other method delegates, so generated SQL and error classes are the
/// wrapped dialect's own.
#[derive(Debug)]
pub struct RecordingDialect<D> {
    inner: D,
    recorder: Recorder,
}

impl<D: Dialect> RecordingDialect<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            recorder: Recorder::default(),
        }
    }

    #[must_use]
    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }
}

impl<D: Dialect> Dialect for RecordingDialect<D> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn quoting(&self) -> &Quoting {
        self.inner.quoting()
    }

    fn identifier_limit(&self) -> usize {
        self.inner.identifier_limit()
    }

    fn names(&self) -> NameBuilder {
        self.inner.names()
    }

    fn cache_prefix(&self) -> &'static str {
        self.inner.cache_prefix()
    }

    fn select_style(&self) -> SelectStyle {
        self.inner.select_style()
    }

    fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let mut state = self.recorder.state();
        state.connects += 1;
        state.alive = true;
        Ok(Box::new(RecordingConnection {
            recorder: self.recorder.clone(),
        }))
    }

    fn session_init_sql(&self, config: &ConnectionConfig) -> Vec<String> {
        self.inner.session_init_sql(config)
    }

    fn classify_error(&self, error: &DriverError) -> ErrorClass {
        self.inner.classify_error(error)
    }

    fn begin_sql(&self) -> &'static str {
        self.inner.begin_sql()
    }

    fn commit_sql(&self) -> &'static str {
        self.inner.commit_sql()
    }

    fn rollback_sql(&self) -> &'static str {
        self.inner.rollback_sql()
    }

    fn start_setup_sql(&self) -> Vec<String> {
        self.inner.start_setup_sql()
    }

    fn end_setup_sql(&self) -> Vec<String> {
        self.inner.end_setup_sql()
    }

    fn suspend_foreign_keys_sql(&self) -> Vec<String> {
        self.inner.suspend_foreign_keys_sql()
    }

    fn restore_foreign_keys_sql(&self) -> Vec<String> {
        self.inner.restore_foreign_keys_sql()
    }

    fn column_type_sql(&self, column: &ColumnDefinition) -> String {
        self.inner.column_type_sql(column)
    }

    fn reverse_type(&self, column: &ColumnDescription) -> ReverseType {
        self.inner.reverse_type(column)
    }

    fn reverse_default(&self, column: &ColumnDescription) -> Option<ColumnDefault> {
        self.inner.reverse_default(column)
    }

    fn create_table(&self, table: &TableDefinition, temporary: bool) -> Result<Vec<Statement>> {
        self.inner.create_table(table, temporary)
    }

    fn drop_table(&self, table: &TableName, temporary: bool) -> Vec<Statement> {
        self.inner.drop_table(table, temporary)
    }

    fn alter_table(&self, current: &TableDefinition, op: &AlterOp) -> Result<Vec<Statement>> {
        self.inner.alter_table(current, op)
    }

    fn insert(&self, insert: &Insert) -> Result<BoundQuery> {
        self.inner.insert(insert)
    }

    fn insert_from_select(
        &self,
        select: &Select,
        table: &TableName,
        columns: &[String],
        mode: &InsertMode,
        unique_keys: &[Vec<String>],
    ) -> Result<String> {
        self.inner
            .insert_from_select(select, table, columns, mode, unique_keys)
    }

    fn update(
        &self,
        table: &TableName,
        assignments: &[(String, Value)],
        conditions: &[Condition],
    ) -> Result<BoundQuery> {
        self.inner.update(table, assignments, conditions)
    }

    fn delete(&self, table: &TableName, conditions: &[Condition]) -> String {
        self.inner.delete(table, conditions)
    }

    fn update_from_select(
        &self,
        select: &Select,
        table: &TableName,
        alias: &str,
    ) -> Result<String> {
        self.inner.update_from_select(select, table, alias)
    }

    fn delete_from_select(
        &self,
        select: &Select,
        table: &TableName,
        alias: &str,
    ) -> Result<String> {
        self.inner.delete_from_select(select, table, alias)
    }

    fn render_select(&self, select: &Select) -> String {
        self.inner.render_select(select)
    }

    fn returns_identity(&self) -> bool {
        self.inner.returns_identity()
    }

    fn needs_conflict_target(&self) -> bool {
        self.inner.needs_conflict_target()
    }

    fn transactional_ddl(&self) -> bool {
        self.inner.transactional_ddl()
    }

    fn check_sql(&self, condition: &str, when_true: &str, when_false: &str) -> SqlExpr {
        self.inner.check_sql(condition, when_true, when_false)
    }

    fn if_null_sql(&self, expression: &str, fallback: &str) -> SqlExpr {
        self.inner.if_null_sql(expression, fallback)
    }

    fn case_sql(
        &self,
        subject: Option<&str>,
        cases: &[(&str, &str)],
        default: Option<&str>,
    ) -> SqlExpr {
        self.inner.case_sql(subject, cases, default)
    }

    fn concat_sql(&self, parts: &[&str], separator: Option<&str>) -> SqlExpr {
        self.inner.concat_sql(parts, separator)
    }

    fn length_sql(&self, expression: &str) -> SqlExpr {
        self.inner.length_sql(expression)
    }

    fn least_sql(&self, expressions: &[&str]) -> SqlExpr {
        self.inner.least_sql(expressions)
    }

    fn greatest_sql(&self, expressions: &[&str]) -> SqlExpr {
        self.inner.greatest_sql(expressions)
    }

    fn substring_sql(&self, expression: &str, position: i64, length: Option<i64>) -> SqlExpr {
        self.inner.substring_sql(expression, position, length)
    }

    fn interval_sql(&self, date: &str, amount: i64, unit: IntervalUnit) -> SqlExpr {
        self.inner.interval_sql(date, amount, unit)
    }

    fn date_add_sql(&self, date: &str, amount: i64, unit: &str) -> Result<SqlExpr> {
        self.inner.date_add_sql(date, amount, unit)
    }

    fn date_sub_sql(&self, date: &str, amount: i64, unit: &str) -> Result<SqlExpr> {
        self.inner.date_sub_sql(date, amount, unit)
    }

    fn date_format_sql(&self, date: &str, format: &str) -> SqlExpr {
        self.inner.date_format_sql(date, format)
    }

    fn date_part_sql(&self, date: &str) -> SqlExpr {
        self.inner.date_part_sql(date)
    }

    fn unix_timestamp_sql(&self, date: &str) -> SqlExpr {
        self.inner.unix_timestamp_sql(date)
    }

    fn from_unixtime_sql(&self, timestamp: &str) -> SqlExpr {
        self.inner.from_unixtime_sql(timestamp)
    }

    fn json_extract_sql(&self, column: &str, path: &str) -> SqlExpr {
        self.inner.json_extract_sql(column, path)
    }

    fn json_contains_sql(&self, column: &str, json_value: &str, path: &str) -> SqlExpr {
        self.inner.json_contains_sql(column, json_value, path)
    }

    fn json_search_sql(&self, column: &str, needle: &str, path: &str) -> SqlExpr {
        self.inner.json_search_sql(column, needle, path)
    }

    fn format_date(&self, value: &chrono::NaiveDateTime, include_time: bool) -> String {
        self.inner.format_date(value, include_time)
    }

    fn list_tables(
        &self,
        runner: &mut dyn QueryRunner,
        schema: Option<&str>,
    ) -> Result<Vec<String>> {
        self.inner.list_tables(runner, schema)
    }

    fn table_exists(&self, runner: &mut dyn QueryRunner, table: &TableName) -> Result<bool> {
        self.inner.table_exists(runner, table)
    }

    fn describe_table(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Vec<ColumnDescription>> {
        self.inner.describe_table(runner, table)
    }

    fn index_list(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Vec<IndexDescription>> {
        self.inner.index_list(runner, table)
    }

    fn foreign_keys(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Vec<ForeignKeyDescription>> {
        self.inner.foreign_keys(runner, table)
    }

    fn table_comment(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Option<String>> {
        self.inner.table_comment(runner, table)
    }

    fn show_create_table(
        &self,
        runner: &mut dyn QueryRunner,
        table: &TableName,
    ) -> Result<Option<String>> {
        self.inner.show_create_table(runner, table)
    }

    fn get_lock(
        &self,
        runner: &mut dyn QueryRunner,
        name: &str,
        timeout: Duration,
    ) -> Result<bool> {
        self.inner.get_lock(runner, name, timeout)
    }

    fn release_lock(&self, runner: &mut dyn QueryRunner, name: &str) -> Result<bool> {
        self.inner.release_lock(runner, name)
    }

    fn is_locked(&self, runner: &mut dyn QueryRunner, name: &str) -> Result<bool> {
        self.inner.is_locked(runner, name)
    }
}

/// Result set with named columns, for scripting catalog answers.
#[must_use]
pub fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> ResultSet {
    ResultSet {
        columns: columns.iter().map(|column| (*column).to_string()).collect(),
        rows,
        affected_rows: 0,
    }
}
