use std::io;

use mysql::consts::ColumnType as WireType;
use mysql::prelude::{Protocol, Queryable};
use mysql::{Conn, OptsBuilder, Params, QueryResult, Value as MysqlValue};
use sqlbridge_core::{
    Connection, ConnectionConfig, ConnectionError, DriverError, DriverResult, ErrorClass,
    Result, ResultSet, Value, Version,
};

use crate::catalog;

const DEFAULT_MYSQL_HOST: &str = "127.0.0.1";
const DEFAULT_MYSQL_PORT: u16 = 3306;
const MINIMUM_MYSQL_MAJOR_VERSION: u16 = 5;
const MINIMUM_MYSQL_MINOR_VERSION: u16 = 7;
const SERVER_VERSION_OVERRIDE_KEY: &str = "mysql.server_version";
const DIALECT_NAME: &str = "mysql";

/// Character set number the server reports for binary strings.
const BINARY_CHARSET: u16 = 63;
/// Client-side code for "Lost connection to MySQL server during query".
const CR_SERVER_LOST: &str = "2013";
/// Statement kinds the binary protocol refuses.
const ER_UNSUPPORTED_PS: u16 = 1295;

pub(crate) struct MysqlConnection {
    connection: Conn,
}

#[derive(Debug, Clone, Copy)]
struct WireColumn {
    wire_type: WireType,
    binary: bool,
}

/// A socket, when configured, takes precedence over host and port.
pub(crate) fn connect(config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
    if let Some(raw_version) = config.extra(SERVER_VERSION_OVERRIDE_KEY) {
        ensure_minimum_version(raw_version)?;
    }

    let mut builder = OptsBuilder::new()
        .ip_or_hostname(config.host.clone().or(Some(DEFAULT_MYSQL_HOST.to_string())))
        .tcp_port(config.port.unwrap_or(DEFAULT_MYSQL_PORT))
        .user(config.user.clone())
        .pass(config.password.clone())
        .db_name(Some(config.database.clone()).filter(|database| !database.is_empty()));
    if let Some(socket) = config.socket.as_ref().or(config.path.as_ref()) {
        builder = builder.socket(Some(socket.clone()));
    }
    let mut connection =
        Conn::new(builder).map_err(|source| ConnectionError::new(DIALECT_NAME, source))?;

    let server_version = match config.extra(SERVER_VERSION_OVERRIDE_KEY) {
        Some(raw_version) => raw_version.to_string(),
        None => connection
            .query_first::<String, _>(catalog::SERVER_VERSION_QUERY)
            .map_err(|source| ConnectionError::new(DIALECT_NAME, source))?
            .unwrap_or_default(),
    };
    ensure_minimum_version(&server_version)?;

    Ok(Box::new(MysqlConnection { connection }))
}

impl Connection for MysqlConnection {
    /// Uses the binary protocol, falling back to the text protocol for
    /// parameterless statements the server cannot prepare.
    fn query(&mut self, sql: &str, params: &[Value]) -> DriverResult<ResultSet> {
        let bound = params
            .iter()
            .map(to_mysql_value)
            .collect::<DriverResult<Vec<_>>>()?;
        let params = if bound.is_empty() {
            Params::Empty
        } else {
            Params::Positional(bound)
        };
        let unprepared = matches!(params, Params::Empty);
        let error = match self.connection.exec_iter(sql, params) {
            Ok(result) => return collect(result),
            Err(error) => error,
        };
        match error {
            mysql::Error::MySqlError(error)
                if unprepared && error.code == ER_UNSUPPORTED_PS =>
            {
                let result = self.connection.query_iter(sql).map_err(driver_error)?;
                collect(result)
            }
            error => Err(driver_error(error)),
        }
    }

    fn execute_batch(&mut self, sql: &str) -> DriverResult<()> {
        self.connection.query_drop(sql).map_err(driver_error)
    }

    fn last_insert_id(&mut self) -> Option<i64> {
        match self.connection.last_insert_id() {
            0 => None,
            id => i64::try_from(id).ok(),
        }
    }

    fn ping(&mut self) -> bool {
        self.connection.query_drop("SELECT 1").is_ok()
    }
}

/// Reads the first result set; later sets are drained and discarded.
fn collect<P: Protocol>(mut result: QueryResult<'_, '_, '_, P>) -> DriverResult<ResultSet> {
    let columns = result.columns();
    let wire_columns = columns
        .as_ref()
        .iter()
        .map(|column| WireColumn {
            wire_type: column.column_type(),
            binary: column.character_set() == BINARY_CHARSET,
        })
        .collect::<Vec<_>>();
    let names = columns
        .as_ref()
        .iter()
        .map(|column| column.name_str().into_owned())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for row in result.by_ref() {
        let row = row.map_err(driver_error)?;
        let values = row
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(index, value)| from_mysql_value(value, wire_columns.get(index).copied()))
            .collect();
        rows.push(values);
    }
    let affected_rows = result.affected_rows();
    drop(result);

    Ok(ResultSet {
        columns: names,
        rows,
        affected_rows,
    })
}

/// Maps server error numbers onto the retry classes.
pub(crate) fn classify(error: &DriverError) -> ErrorClass {
    let code = error
        .code
        .as_deref()
        .and_then(|code| code.parse::<u32>().ok());
    match code {
        Some(2006 | 2013) => ErrorClass::ConnectionLost,
        Some(1213 | 1205) => ErrorClass::Deadlock,
        Some(1022 | 1062 | 1216 | 1217 | 1451 | 1452 | 1557 | 1586) => ErrorClass::Constraint,
        _ if error.message.contains("server has gone away")
            || error.message.contains("Lost connection") =>
        {
            ErrorClass::ConnectionLost
        }
        _ => ErrorClass::Other,
    }
}

fn driver_error(error: mysql::Error) -> DriverError {
    let code = match &error {
        mysql::Error::MySqlError(server) => Some(server.code.to_string()),
        mysql::Error::IoError(_) => Some(CR_SERVER_LOST.to_string()),
        _ => None,
    };
    DriverError::from_source(code, error)
}

fn to_mysql_value(value: &Value) -> DriverResult<MysqlValue> {
    Ok(match value {
        Value::Null => MysqlValue::NULL,
        Value::Bool(value) => MysqlValue::Int(i64::from(*value)),
        Value::Int(value) => MysqlValue::Int(*value),
        Value::Float(value) => MysqlValue::Double(*value),
        Value::Text(value) => MysqlValue::Bytes(value.clone().into_bytes()),
        Value::Bytes(value) => MysqlValue::Bytes(value.clone()),
        Value::List(_) | Value::Expr(_) => {
            return Err(DriverError::new(
                None,
                "lists and raw expressions must be inlined before binding",
            ));
        }
    })
}

/// The text protocol hands every value over as bytes, so numeric columns
/// are parsed back using the column's wire type.
fn from_mysql_value(value: MysqlValue, column: Option<WireColumn>) -> Value {
    let wire_type = column.map(|column| column.wire_type);
    match value {
        MysqlValue::NULL => Value::Null,
        MysqlValue::Int(value) => Value::Int(value),
        MysqlValue::UInt(value) => match i64::try_from(value) {
            Ok(value) => Value::Int(value),
            Err(_) => Value::Text(value.to_string()),
        },
        MysqlValue::Float(value) => Value::Float(f64::from(value)),
        MysqlValue::Double(value) => Value::Float(value),
        MysqlValue::Bytes(bytes) => bytes_value(bytes, column),
        MysqlValue::Date(year, month, day, hour, minute, second, micros) => {
            if matches!(wire_type, Some(WireType::MYSQL_TYPE_DATE)) {
                Value::Text(format!("{year:04}-{month:02}-{day:02}"))
            } else if micros > 0 {
                Value::Text(format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
                ))
            } else {
                Value::Text(format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                ))
            }
        }
        MysqlValue::Time(negative, days, hours, minutes, seconds, _) => {
            let sign = if negative { "-" } else { "" };
            let hours = u32::from(hours) + days * 24;
            Value::Text(format!("{sign}{hours:02}:{minutes:02}:{seconds:02}"))
        }
    }
}

fn bytes_value(bytes: Vec<u8>, column: Option<WireColumn>) -> Value {
    let Some(column) = column else {
        return match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(error) => Value::Bytes(error.into_bytes()),
        };
    };
    let integral = matches!(
        column.wire_type,
        WireType::MYSQL_TYPE_TINY
            | WireType::MYSQL_TYPE_SHORT
            | WireType::MYSQL_TYPE_INT24
            | WireType::MYSQL_TYPE_LONG
            | WireType::MYSQL_TYPE_LONGLONG
            | WireType::MYSQL_TYPE_YEAR
    );
    let fractional = matches!(
        column.wire_type,
        WireType::MYSQL_TYPE_FLOAT | WireType::MYSQL_TYPE_DOUBLE
    );
    let binary = column.binary
        && !integral
        && !fractional
        && !matches!(
            column.wire_type,
            WireType::MYSQL_TYPE_NEWDECIMAL
                | WireType::MYSQL_TYPE_DECIMAL
                | WireType::MYSQL_TYPE_DATE
                | WireType::MYSQL_TYPE_DATETIME
                | WireType::MYSQL_TYPE_TIMESTAMP
        );
    if binary {
        return Value::Bytes(bytes);
    }
    match String::from_utf8(bytes) {
        Ok(text) if integral => text
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or(Value::Text(text)),
        Ok(text) if fractional => text
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Text(text)),
        Ok(text) => Value::Text(text),
        Err(error) => Value::Bytes(error.into_bytes()),
    }
}

fn ensure_minimum_version(raw_version: &str) -> Result<()> {
    let version = Version::parse(raw_version).ok_or_else(|| {
        ConnectionError::new(
            DIALECT_NAME,
            io::Error::other(format!(
                "failed to parse mysql server version string: `{raw_version}`"
            )),
        )
    })?;
    if version.major > MINIMUM_MYSQL_MAJOR_VERSION
        || (version.major == MINIMUM_MYSQL_MAJOR_VERSION
            && version.minor >= MINIMUM_MYSQL_MINOR_VERSION)
    {
        return Ok(());
    }
    Err(ConnectionError::new(
        DIALECT_NAME,
        io::Error::other(format!(
            "mysql server version `{raw_version}` is not supported; requires \
             {MINIMUM_MYSQL_MAJOR_VERSION}.{MINIMUM_MYSQL_MINOR_VERSION}+"
        )),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use mysql::Value as MysqlValue;
    use mysql::consts::ColumnType as WireType;
    use sqlbridge_core::{DriverError, ErrorClass, Value};

    use super::{WireColumn, classify, ensure_minimum_version, from_mysql_value};

    fn text(wire_type: WireType) -> Option<WireColumn> {
        Some(WireColumn {
            wire_type,
            binary: false,
        })
    }

    fn error(code: &str, message: &str) -> DriverError {
        DriverError::new(Some(code.to_string()), message)
    }

    #[test]
    fn server_error_numbers_map_to_retry_classes() {
        assert_eq!(classify(&error("2006", "gone")), ErrorClass::ConnectionLost);
        assert_eq!(classify(&error("1213", "deadlock")), ErrorClass::Deadlock);
        assert_eq!(classify(&error("1205", "lock wait")), ErrorClass::Deadlock);
        assert_eq!(classify(&error("1062", "duplicate")), ErrorClass::Constraint);
        assert_eq!(classify(&error("1452", "fk")), ErrorClass::Constraint);
        assert_eq!(classify(&error("1146", "no table")), ErrorClass::Other);
        assert_eq!(
            classify(&DriverError::new(None, "MySQL server has gone away")),
            ErrorClass::ConnectionLost
        );
    }

    #[test]
    fn text_protocol_numbers_are_parsed_by_wire_type() {
        assert_eq!(
            from_mysql_value(MysqlValue::Bytes(b"42".to_vec()), text(WireType::MYSQL_TYPE_LONG)),
            Value::Int(42)
        );
        assert_eq!(
            from_mysql_value(
                MysqlValue::Bytes(b"42".to_vec()),
                text(WireType::MYSQL_TYPE_VAR_STRING)
            ),
            Value::from("42")
        );
        assert_eq!(
            from_mysql_value(
                MysqlValue::Bytes(vec![0x00, 0xff]),
                Some(WireColumn {
                    wire_type: WireType::MYSQL_TYPE_BLOB,
                    binary: true,
                })
            ),
            Value::Bytes(vec![0x00, 0xff])
        );
        assert_eq!(
            from_mysql_value(
                MysqlValue::Date(2024, 1, 31, 10, 0, 0, 0),
                text(WireType::MYSQL_TYPE_DATETIME)
            ),
            Value::from("2024-01-31 10:00:00")
        );
        assert_eq!(
            from_mysql_value(
                MysqlValue::Date(2024, 1, 31, 0, 0, 0, 0),
                text(WireType::MYSQL_TYPE_DATE)
            ),
            Value::from("2024-01-31")
        );
    }

    #[test]
    fn old_servers_are_rejected() {
        assert!(ensure_minimum_version("8.0.36").is_ok());
        assert!(ensure_minimum_version("10.11.6-MariaDB").is_ok());
        assert!(ensure_minimum_version("5.6.51").is_err());
        assert!(ensure_minimum_version("unknown").is_err());
    }
}
