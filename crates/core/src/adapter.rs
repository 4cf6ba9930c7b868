mod ddl;
mod dml;

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::retry::RetryDecision;
use crate::{
    AdapterOptions, Binds, CacheBackend, Connection, ConnectionConfig, ConnectionError, Dialect,
    ExecutionError, IdentPath, MetadataCache, QueryEvent, QueryKind, QueryRunner, QuerySink,
    Quoting, Result, ResultSet, Row, Select, Transaction, TransactionError, Value, bind,
};

type QueryHook = Box<dyn FnMut(&str, &[Value]) + Send>;

/// SQL text or a builder to render with the adapter's dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySource {
    Sql(String),
    Select(Select),
}

impl From<&str> for QuerySource {
    fn from(sql: &str) -> Self {
        Self::Sql(sql.to_string())
    }
}

impl From<String> for QuerySource {
    fn from(sql: String) -> Self {
        Self::Sql(sql)
    }
}

impl From<Select> for QuerySource {
    fn from(select: Select) -> Self {
        Self::Select(select)
    }
}

impl From<&Select> for QuerySource {
    fn from(select: &Select) -> Self {
        Self::Select(select.clone())
    }
}

/// One logical database session: a lazily opened connection, the transaction
/// nesting counter and the metadata cache. Not meant to be shared between
/// threads; use one adapter per worker.
///
/// Finish with [`Adapter::close`], which reports a transaction left open as
/// [`TransactionError::OpenAtTeardown`]. Dropping the adapter rolls such a
/// transaction back too, but can only log the failure.
pub struct Adapter {
    dialect: Arc<dyn Dialect>,
    config: ConnectionConfig,
    options: AdapterOptions,
    quoting: Quoting,
    connection: Option<Box<dyn Connection>>,
    transaction_level: u32,
    rollback_pending: bool,
    /// Caller levels closed by an implicit rollback; their `rollback` calls
    /// succeed without touching the server.
    collapsed_levels: u32,
    setup_active: bool,
    cache: MetadataCache,
    query_hook: Option<QueryHook>,
    sink: Option<Box<dyn QuerySink>>,
    last_insert_id: Option<i64>,
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("dialect", &self.dialect.name())
            .field("connected", &self.connection.is_some())
            .field("transaction_level", &self.transaction_level)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Adapter {
    pub fn new(dialect: Arc<dyn Dialect>, config: ConnectionConfig) -> Self {
        Self::with_options(dialect, config, AdapterOptions::default())
    }

    pub fn with_options(
        dialect: Arc<dyn Dialect>,
        config: ConnectionConfig,
        options: AdapterOptions,
    ) -> Self {
        let quoting = dialect
            .quoting()
            .clone()
            .with_auto_quote(options.auto_quote_identifiers);
        let cache = MetadataCache::new(dialect.cache_prefix(), options.ddl_cache_enabled);
        Self {
            dialect,
            config,
            options,
            quoting,
            connection: None,
            transaction_level: 0,
            rollback_pending: false,
            collapsed_levels: 0,
            setup_active: false,
            cache,
            query_hook: None,
            sink: None,
            last_insert_id: None,
        }
    }

    #[must_use]
    pub fn with_cache_backend(mut self, backend: Box<dyn CacheBackend>) -> Self {
        self.cache.set_backend(backend);
        self
    }

    /// Called with the final SQL and parameters before every execution.
    #[must_use]
    pub fn with_query_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&str, &[Value]) + Send + 'static,
    {
        self.query_hook = Some(Box::new(hook));
        self
    }

    /// Receives timing events when the `profiler` config flag is set.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn QuerySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[must_use]
    pub fn quoting(&self) -> &Quoting {
        &self.quoting
    }

    pub fn quote_identifier(&self, ident: impl Into<IdentPath>) -> String {
        self.quoting.quote_identifier(ident)
    }

    #[must_use]
    pub fn quote_value(&self, value: &Value) -> String {
        self.quoting.quote_value(value, None)
    }

    #[must_use]
    pub fn quote_into(&self, template: &str, value: &Value, count: Option<usize>) -> String {
        self.quoting.quote_into(template, value, None, count)
    }

    // --- connection ------------------------------------------------------

    /// Opens the connection if needed and applies session settings.
    pub fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }
        let started = Instant::now();
        let mut connection = self.dialect.connect(&self.config)?;
        let mut init = self.dialect.session_init_sql(&self.config);
        if self.setup_active {
            init.extend(self.dialect.start_setup_sql());
        }
        for sql in init {
            connection.execute_batch(&sql).map_err(|source| {
                let class = self.dialect.classify_error(&source);
                ExecutionError::statement_failed(&sql, 1, class, source)
            })?;
        }
        self.connection = Some(connection);

        let elapsed = started.elapsed();
        info!(
            dialect = self.dialect.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            "database connection established"
        );
        self.record(QueryKind::Connect, "connect", &[], elapsed);
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Round-trips to the server; `false` when disconnected or dead.
    pub fn ping(&mut self) -> bool {
        self.connection
            .as_mut()
            .is_some_and(|connection| connection.ping())
    }

    /// Drops the connection; the next query reconnects. An open transaction is
    /// lost with it.
    pub fn close_connection(&mut self) {
        if self.connection.take().is_some() && self.transaction_level > 0 {
            warn!(
                dialect = self.dialect.name(),
                level = self.transaction_level,
                "connection closed with an open transaction"
            );
            self.collapsed_levels = self.transaction_level;
            self.transaction_level = 0;
            self.rollback_pending = false;
        }
    }

    /// Consumes the adapter. Fails if a transaction was left open, after
    /// rolling it back.
    pub fn close(mut self) -> Result<()> {
        let level = self.transaction_level;
        if level == 0 {
            self.connection = None;
            return Ok(());
        }
        self.abandon_transaction();
        Err(TransactionError::OpenAtTeardown { level }.into())
    }

    fn abandon_transaction(&mut self) {
        self.transaction_level = 1;
        self.rollback_pending = false;
        if let Err(rollback_error) = self.rollback() {
            error!(%rollback_error, "failed to roll back abandoned transaction");
        }
        self.transaction_level = 0;
    }

    // --- execution -------------------------------------------------------

    /// Executes one statement with the retry policy applied.
    pub(crate) fn run(
        &mut self,
        kind: QueryKind,
        sql: &str,
        params: &[Value],
    ) -> Result<ResultSet> {
        self.execute(kind, sql, params, true)
    }

    /// Executes once; used for `COMMIT`/`ROLLBACK`, where a retry cannot help.
    fn run_once(&mut self, kind: QueryKind, sql: &str) -> Result<ResultSet> {
        self.execute(kind, sql, &[], false)
    }

    fn execute(
        &mut self,
        kind: QueryKind,
        sql: &str,
        params: &[Value],
        retry: bool,
    ) -> Result<ResultSet> {
        self.connect()?;
        if let Some(hook) = self.query_hook.as_mut() {
            hook(sql, params);
        }

        let mut attempt = 1;
        loop {
            let started = Instant::now();
            let Some(connection) = self.connection.as_mut() else {
                return Err(ConnectionError::new(
                    self.dialect.name(),
                    std::io::Error::other("connection unavailable"),
                )
                .into());
            };
            let failure = match connection.query(sql, params) {
                Ok(result) => {
                    let elapsed = started.elapsed();
                    debug!(
                        dialect = self.dialect.name(),
                        sql,
                        params = params.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        rows = result.rows.len(),
                        affected = result.affected_rows,
                        "statement executed"
                    );
                    self.record(kind, sql, params, elapsed);
                    return Ok(result);
                }
                Err(failure) => failure,
            };

            let class = self.dialect.classify_error(&failure);
            let decision = if retry {
                self.options
                    .retry
                    .decide(class, attempt, self.is_in_transaction())
            } else {
                RetryDecision::Fail
            };
            match decision {
                RetryDecision::Reconnect => {
                    warn!(
                        dialect = self.dialect.name(),
                        attempt,
                        error = %failure,
                        "connection lost, reconnecting"
                    );
                    self.connection = None;
                    self.connect()?;
                }
                RetryDecision::Backoff(delay) => {
                    warn!(
                        dialect = self.dialect.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "lock contention, retrying"
                    );
                    thread::sleep(delay);
                }
                RetryDecision::RollbackAndFail => {
                    warn!(
                        dialect = self.dialect.name(),
                        %class,
                        level = self.transaction_level,
                        "implicit rollback, collapsing transaction"
                    );
                    let collapsed = self.transaction_level;
                    self.abandon_transaction();
                    self.collapsed_levels = collapsed;
                    return Err(
                        ExecutionError::statement_failed(sql, attempt, class, failure).into(),
                    );
                }
                RetryDecision::Fail => {
                    return Err(
                        ExecutionError::statement_failed(sql, attempt, class, failure).into(),
                    );
                }
            }
            attempt += 1;
        }
    }

    fn record(&mut self, kind: QueryKind, sql: &str, params: &[Value], elapsed: Duration) {
        if !self.config.profiler {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.record(&QueryEvent {
                kind,
                sql,
                params,
                elapsed,
            });
        }
    }

    // --- transactions ----------------------------------------------------

    /// Starts a transaction at level 0; deeper calls only count.
    pub fn begin(&mut self) -> Result<()> {
        if self.transaction_level == 0 {
            let sql = self.dialect.begin_sql();
            self.run(QueryKind::Transaction, sql, &[])?;
            self.rollback_pending = false;
            self.collapsed_levels = 0;
        }
        self.transaction_level += 1;
        Ok(())
    }

    /// Commits at level 1; deeper calls only count.
    pub fn commit(&mut self) -> Result<()> {
        if self.transaction_level == 0 {
            return Err(TransactionError::NotStarted {
                operation: "commit",
            }
            .into());
        }
        if self.rollback_pending {
            return Err(TransactionError::NestedRollbackPending.into());
        }
        if self.transaction_level == 1 {
            let sql = self.dialect.commit_sql();
            self.run_once(QueryKind::Transaction, sql)?;
        }
        self.transaction_level -= 1;
        Ok(())
    }

    /// Rolls back at level 1; deeper calls mark the outer levels as doomed.
    /// After an implicit rollback each collapsed level may still be rolled
    /// back once, as a no-op.
    pub fn rollback(&mut self) -> Result<()> {
        match self.transaction_level {
            0 if self.collapsed_levels > 0 => {
                self.collapsed_levels -= 1;
                Ok(())
            }
            0 => Err(TransactionError::NotStarted {
                operation: "rollback",
            }
            .into()),
            1 => {
                let sql = self.dialect.rollback_sql();
                let outcome = self.run_once(QueryKind::Transaction, sql);
                self.transaction_level = 0;
                self.rollback_pending = false;
                outcome.map(|_| ())
            }
            _ => {
                self.rollback_pending = true;
                self.transaction_level -= 1;
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.transaction_level > 0
    }

    #[must_use]
    pub fn transaction_level(&self) -> u32 {
        self.transaction_level
    }

    /// Scoped transaction that rolls back unless committed.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.begin()?;
        Ok(Transaction::new(self))
    }

    // --- queries ---------------------------------------------------------

    pub fn query(
        &mut self,
        source: impl Into<QuerySource>,
        binds: impl Into<Binds>,
    ) -> Result<ResultSet> {
        let sql = match source.into() {
            QuerySource::Sql(sql) => sql,
            QuerySource::Select(select) => self.dialect.render_select(&select),
        };
        let bound = bind::normalize(&sql, &binds.into(), self.dialect.quoting())?;
        self.run(QueryKind::Query, &bound.sql, &bound.params)
    }

    pub fn fetch_all(
        &mut self,
        source: impl Into<QuerySource>,
        binds: impl Into<Binds>,
    ) -> Result<Vec<Row>> {
        Ok(self.query(source, binds)?.into_rows())
    }

    pub fn fetch_row(
        &mut self,
        source: impl Into<QuerySource>,
        binds: impl Into<Binds>,
    ) -> Result<Option<Row>> {
        Ok(self.fetch_all(source, binds)?.into_iter().next())
    }

    /// First column of the first row.
    pub fn fetch_one(
        &mut self,
        source: impl Into<QuerySource>,
        binds: impl Into<Binds>,
    ) -> Result<Option<Value>> {
        let result = self.query(source, binds)?;
        Ok(result
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next()))
    }

    /// First column of every row.
    pub fn fetch_col(
        &mut self,
        source: impl Into<QuerySource>,
        binds: impl Into<Binds>,
    ) -> Result<Vec<Value>> {
        let result = self.query(source, binds)?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    /// First column as key, second as value.
    pub fn fetch_pairs(
        &mut self,
        source: impl Into<QuerySource>,
        binds: impl Into<Binds>,
    ) -> Result<IndexMap<String, Value>> {
        let result = self.query(source, binds)?;
        Ok(result
            .rows
            .into_iter()
            .map(|row| {
                let mut values = row.into_iter();
                let key = values.next().and_then(|key| key.to_text()).unwrap_or_default();
                (key, values.next().unwrap_or(Value::Null))
            })
            .collect())
    }

    /// Whole rows keyed by their first column.
    pub fn fetch_assoc(
        &mut self,
        source: impl Into<QuerySource>,
        binds: impl Into<Binds>,
    ) -> Result<IndexMap<String, Row>> {
        Ok(self
            .fetch_all(source, binds)?
            .into_iter()
            .map(|row| {
                let key = row.first().and_then(Value::to_text).unwrap_or_default();
                (key, row)
            })
            .collect())
    }

    // --- advisory locks --------------------------------------------------

    pub fn get_lock(&mut self, name: &str, timeout: Duration) -> Result<bool> {
        let dialect = Arc::clone(&self.dialect);
        dialect.get_lock(self, name, timeout)
    }

    pub fn release_lock(&mut self, name: &str) -> Result<bool> {
        let dialect = Arc::clone(&self.dialect);
        dialect.release_lock(self, name)
    }

    pub fn is_locked(&mut self, name: &str) -> Result<bool> {
        let dialect = Arc::clone(&self.dialect);
        dialect.is_locked(self, name)
    }
}

impl QueryRunner for Adapter {
    fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.run(QueryKind::Query, sql, params)
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        if self.transaction_level > 0 {
            error!(
                dialect = self.dialect.name(),
                level = self.transaction_level,
                "adapter dropped with an open transaction; rolling back"
            );
            self.abandon_transaction();
        }
    }
}
