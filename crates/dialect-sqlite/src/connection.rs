use std::io;

use rusqlite::params_from_iter;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use sqlbridge_core::{
    Connection, ConnectionConfig, ConnectionError, DriverError, DriverResult, ErrorClass,
    ResultSet, Result, Value, Version,
};

use crate::catalog;

const IN_MEMORY_PATH: &str = ":memory:";
const MINIMUM_SQLITE_MAJOR_VERSION: u16 = 3;
const MINIMUM_SQLITE_MINOR_VERSION: u16 = 35;
const SERVER_VERSION_OVERRIDE_KEY: &str = "sqlite.server_version";
const BUSY_TIMEOUT_KEY: &str = "sqlite.busy_timeout_ms";
const DIALECT_NAME: &str = "sqlite";

pub(crate) struct SqliteConnection {
    connection: rusqlite::Connection,
}

/// Opens the database file named by `path`, falling back to `database`; an
/// empty name opens a private in-memory database.
pub(crate) fn connect(config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
    if let Some(raw_version) = config.extra(SERVER_VERSION_OVERRIDE_KEY) {
        ensure_minimum_version(raw_version)?;
    }

    let path = config
        .path
        .as_deref()
        .filter(|path| !path.is_empty())
        .unwrap_or(config.database.as_str());
    let path = if path.is_empty() { IN_MEMORY_PATH } else { path };
    let connection = rusqlite::Connection::open(path)
        .map_err(|source| ConnectionError::new(DIALECT_NAME, source))?;

    if let Some(timeout) = config.extra_duration_ms(BUSY_TIMEOUT_KEY) {
        connection
            .busy_timeout(timeout)
            .map_err(|source| ConnectionError::new(DIALECT_NAME, source))?;
    }

    let server_version = match config.extra(SERVER_VERSION_OVERRIDE_KEY) {
        Some(raw_version) => raw_version.to_string(),
        None => connection
            .query_row(catalog::SERVER_VERSION_QUERY, [], |row| row.get::<_, String>(0))
            .map_err(|source| ConnectionError::new(DIALECT_NAME, source))?,
    };
    ensure_minimum_version(&server_version)?;

    Ok(Box::new(SqliteConnection { connection }))
}

impl Connection for SqliteConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> DriverResult<ResultSet> {
        let bound = params
            .iter()
            .map(to_sqlite_value)
            .collect::<DriverResult<Vec<_>>>()?;
        let mut statement = self.connection.prepare(sql).map_err(driver_error)?;
        let columns = statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        if columns.is_empty() {
            let affected = statement
                .execute(params_from_iter(bound.iter()))
                .map_err(driver_error)?;
            return Ok(ResultSet::affected(affected as u64));
        }

        let readonly = statement.readonly();
        let mut rows = statement
            .query(params_from_iter(bound.iter()))
            .map_err(driver_error)?;
        let mut values = Vec::new();
        while let Some(row) = rows.next().map_err(driver_error)? {
            let mut record = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                record.push(from_value_ref(row.get_ref(index).map_err(driver_error)?));
            }
            values.push(record);
        }
        drop(rows);
        drop(statement);

        let affected_rows = if readonly {
            0
        } else {
            self.connection.changes() as u64
        };
        Ok(ResultSet {
            columns,
            rows: values,
            affected_rows,
        })
    }

    fn execute_batch(&mut self, sql: &str) -> DriverResult<()> {
        self.connection.execute_batch(sql).map_err(driver_error)
    }

    fn last_insert_id(&mut self) -> Option<i64> {
        match self.connection.last_insert_rowid() {
            0 => None,
            id => Some(id),
        }
    }

    fn ping(&mut self) -> bool {
        self.connection.execute_batch("SELECT 1").is_ok()
    }
}

/// Maps a driver failure onto the retry classes. `SQLITE_BUSY` and
/// `SQLITE_LOCKED` mean another connection holds the database.
pub(crate) fn classify(error: &DriverError) -> ErrorClass {
    let primary = error
        .code
        .as_deref()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| code & 0xff);
    match primary {
        Some(5 | 6) => ErrorClass::LockContention,
        Some(19) => ErrorClass::Constraint,
        _ if error.message.contains("database is locked") => ErrorClass::LockContention,
        _ => ErrorClass::Other,
    }
}

fn driver_error(error: rusqlite::Error) -> DriverError {
    let code = match &error {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.extended_code.to_string()),
        _ => None,
    };
    DriverError::from_source(code, error)
}

fn to_sqlite_value(value: &Value) -> DriverResult<SqliteValue> {
    Ok(match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(value) => SqliteValue::Integer(i64::from(*value)),
        Value::Int(value) => SqliteValue::Integer(*value),
        Value::Float(value) => SqliteValue::Real(*value),
        Value::Text(value) => SqliteValue::Text(value.clone()),
        Value::Bytes(value) => SqliteValue::Blob(value.clone()),
        Value::List(_) | Value::Expr(_) => {
            return Err(DriverError::new(
                None,
                "lists and raw expressions must be inlined before binding",
            ));
        }
    })
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(value) => Value::Int(value),
        ValueRef::Real(value) => Value::Float(value),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

fn ensure_minimum_version(raw_version: &str) -> Result<()> {
    let version = Version::parse(raw_version).ok_or_else(|| {
        ConnectionError::new(
            DIALECT_NAME,
            io::Error::other(format!(
                "failed to parse sqlite server version string: `{raw_version}`"
            )),
        )
    })?;
    if version.major > MINIMUM_SQLITE_MAJOR_VERSION
        || (version.major == MINIMUM_SQLITE_MAJOR_VERSION
            && version.minor >= MINIMUM_SQLITE_MINOR_VERSION)
    {
        return Ok(());
    }
    Err(ConnectionError::new(
        DIALECT_NAME,
        io::Error::other(format!(
            "sqlite server version `{raw_version}` is not supported; requires \
             {MINIMUM_SQLITE_MAJOR_VERSION}.{MINIMUM_SQLITE_MINOR_VERSION}+"
        )),
    )
    .into())
}
