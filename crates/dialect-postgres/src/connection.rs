use std::io;
use std::time::Duration;

use postgres::config::SslMode;
use postgres::{Client, NoTls, SimpleQueryMessage};
use sqlbridge_core::{
    ConfigError, Connection, ConnectionConfig, ConnectionError, DriverError, DriverResult,
    ErrorClass, Result, ResultSet, Value, Version, inline_params,
};

use crate::{QUOTING, catalog};

const DEFAULT_POSTGRES_HOST: &str = "127.0.0.1";
const MINIMUM_POSTGRES_MAJOR_VERSION: u16 = 13;
const SERVER_VERSION_OVERRIDE_KEY: &str = "postgres.server_version";
const CONNECT_TIMEOUT_KEY: &str = "postgres.connect_timeout_ms";
const SSL_MODE_KEY: &str = "sslmode";
const APPLICATION_NAME_KEY: &str = "application_name";
const DIALECT_NAME: &str = "postgres";
const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// SQLSTATE reported for a connection the server or network dropped.
const CONNECTION_FAILURE: &str = "08006";

pub(crate) struct PostgresConnection {
    client: Client,
}

/// A socket directory (or `path`) takes precedence over `host`.
pub(crate) fn connect(config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
    if let Some(raw_version) = config.extra(SERVER_VERSION_OVERRIDE_KEY) {
        ensure_minimum_version(raw_version)?;
    }

    let mut client = client_config(config)?
        .connect(NoTls)
        .map_err(|source| ConnectionError::new(DIALECT_NAME, source))?;

    let server_version = match config.extra(SERVER_VERSION_OVERRIDE_KEY) {
        Some(raw_version) => raw_version.to_string(),
        None => client
            .query_one(catalog::SERVER_VERSION_QUERY, &[])
            .and_then(|row| row.try_get::<_, String>(0))
            .map_err(|source| ConnectionError::new(DIALECT_NAME, source))?,
    };
    ensure_minimum_version(&server_version)?;

    Ok(Box::new(PostgresConnection { client }))
}

fn client_config(config: &ConnectionConfig) -> Result<postgres::Config> {
    let mut client_config = postgres::Config::new();
    if let Some(socket) = config.socket.as_ref().or(config.path.as_ref()) {
        client_config.host_path(socket);
    } else {
        client_config.host(config.host.as_deref().unwrap_or(DEFAULT_POSTGRES_HOST));
    }
    if let Some(port) = config.port {
        client_config.port(port);
    }
    if let Some(user) = &config.user {
        client_config.user(user);
    }
    if let Some(password) = &config.password {
        client_config.password(password);
    }
    if !config.database.is_empty() {
        client_config.dbname(&config.database);
    }
    if let Some(raw_mode) = config.extra(SSL_MODE_KEY) {
        client_config.ssl_mode(ssl_mode(raw_mode)?);
    }
    if let Some(application_name) = config.extra(APPLICATION_NAME_KEY) {
        client_config.application_name(application_name);
    }
    if let Some(timeout) = config.extra_duration_ms(CONNECT_TIMEOUT_KEY) {
        client_config.connect_timeout(timeout);
    }
    Ok(client_config)
}

/// Only modes that work without a TLS connector are accepted.
fn ssl_mode(raw: &str) -> Result<SslMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "disable" => Ok(SslMode::Disable),
        "allow" | "prefer" => Ok(SslMode::Prefer),
        _ => Err(ConfigError::InvalidConnectionOption {
            key: SSL_MODE_KEY.to_string(),
            value: raw.to_string(),
        }
        .into()),
    }
}

impl Connection for PostgresConnection {
    /// Runs over the simple query protocol with parameters inlined, so
    /// results arrive as text and the caller decides how to read them.
    fn query(&mut self, sql: &str, params: &[Value]) -> DriverResult<ResultSet> {
        if params
            .iter()
            .any(|value| matches!(value, Value::List(_) | Value::Expr(_)))
        {
            return Err(DriverError::new(
                None,
                "lists and raw expressions must be inlined before binding",
            ));
        }
        let sql = inline_params(sql, params, &QUOTING);
        let messages = self.client.simple_query(&sql).map_err(driver_error)?;

        let mut result = ResultSet::default();
        for message in messages {
            match message {
                SimpleQueryMessage::RowDescription(columns) if result.columns.is_empty() => {
                    result.columns = columns
                        .iter()
                        .map(|column| column.name().to_string())
                        .collect();
                }
                SimpleQueryMessage::Row(row) => {
                    if result.columns.is_empty() {
                        result.columns = row
                            .columns()
                            .iter()
                            .map(|column| column.name().to_string())
                            .collect();
                    }
                    let values = (0..row.len())
                        .map(|index| {
                            row.get(index)
                                .map_or(Value::Null, |text| Value::Text(text.to_string()))
                        })
                        .collect();
                    result.rows.push(values);
                }
                SimpleQueryMessage::CommandComplete(count) => result.affected_rows = count,
                _ => {}
            }
        }
        Ok(result)
    }

    fn execute_batch(&mut self, sql: &str) -> DriverResult<()> {
        self.client.batch_execute(sql).map_err(driver_error)
    }

    /// Identity values come back through `RETURNING` instead.
    fn last_insert_id(&mut self) -> Option<i64> {
        None
    }

    fn ping(&mut self) -> bool {
        self.client.is_valid(PING_TIMEOUT).is_ok()
    }
}

/// Maps a SQLSTATE onto the retry classes.
pub(crate) fn classify(error: &DriverError) -> ErrorClass {
    let code = error.code.as_deref().unwrap_or_default();
    match code {
        _ if code.starts_with("08") => ErrorClass::ConnectionLost,
        "57P01" | "57P02" | "57P03" => ErrorClass::ConnectionLost,
        "40P01" | "40001" => ErrorClass::Deadlock,
        "55P03" => ErrorClass::LockContention,
        _ if code.starts_with("23") => ErrorClass::Constraint,
        _ if error
            .message
            .contains("server closed the connection unexpectedly") =>
        {
            ErrorClass::ConnectionLost
        }
        _ => ErrorClass::Other,
    }
}

fn driver_error(error: postgres::Error) -> DriverError {
    let code = match error.code() {
        Some(state) => Some(state.code().to_string()),
        None if error.is_closed() => Some(CONNECTION_FAILURE.to_string()),
        None => None,
    };
    DriverError::from_source(code, error)
}

fn ensure_minimum_version(raw_version: &str) -> Result<()> {
    let version = Version::parse(raw_version).ok_or_else(|| {
        ConnectionError::new(
            DIALECT_NAME,
            io::Error::other(format!(
                "failed to parse postgres server version string: `{raw_version}`"
            )),
        )
    })?;
    if version.major >= MINIMUM_POSTGRES_MAJOR_VERSION {
        return Ok(());
    }
    Err(ConnectionError::new(
        DIALECT_NAME,
        io::Error::other(format!(
            "postgres server version `{raw_version}` is not supported; requires \
             {MINIMUM_POSTGRES_MAJOR_VERSION}+"
        )),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use sqlbridge_core::{ConfigError, DriverError, Error, ErrorClass};

    use super::{classify, ensure_minimum_version, ssl_mode};

    fn class(code: &str) -> ErrorClass {
        classify(&DriverError::new(Some(code.to_string()), "failed"))
    }

    #[test]
    fn sqlstates_map_onto_retry_classes() {
        assert_eq!(class("08006"), ErrorClass::ConnectionLost);
        assert_eq!(class("57P01"), ErrorClass::ConnectionLost);
        assert_eq!(class("40P01"), ErrorClass::Deadlock);
        assert_eq!(class("55P03"), ErrorClass::LockContention);
        assert_eq!(class("23505"), ErrorClass::Constraint);
        assert_eq!(class("42P01"), ErrorClass::Other);
        assert_eq!(
            classify(&DriverError::new(
                None,
                "server closed the connection unexpectedly"
            )),
            ErrorClass::ConnectionLost
        );
    }

    #[test]
    fn old_servers_are_refused() {
        assert!(ensure_minimum_version("16.2 (Debian 16.2-1.pgdg120+2)").is_ok());
        assert!(matches!(
            ensure_minimum_version("12.18"),
            Err(Error::Connection(_))
        ));
    }

    #[test]
    fn tls_modes_need_a_connector() {
        assert!(ssl_mode("disable").is_ok());
        assert!(ssl_mode("Prefer").is_ok());
        assert!(matches!(
            ssl_mode("verify-full"),
            Err(Error::Config(ConfigError::InvalidConnectionOption { .. }))
        ));
    }
}
