use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::{Result, Value};

/// Raw driver failure, before it is classified and wrapped.
#[derive(Debug, Error)]
#[error("{}{message}", code_prefix(.code.as_deref()))]
pub struct DriverError {
    /// Vendor error number or SQLSTATE.
    pub code: Option<String>,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DriverError {
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn from_source<E>(code: Option<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            code,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

fn code_prefix(code: Option<&str>) -> String {
    code.map(|code| format!("[{code}] ")).unwrap_or_default()
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// How the retry layer should treat a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    ConnectionLost,
    LockContention,
    Deadlock,
    Constraint,
    Other,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConnectionLost => "connection lost",
            Self::LockContention => "lock contention",
            Self::Deadlock => "deadlock",
            Self::Constraint => "constraint violation",
            Self::Other => "error",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub affected_rows: u64,
}

impl ResultSet {
    #[must_use]
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
            .into_iter()
            .map(|values| Row {
                values: self
                    .columns
                    .iter()
                    .cloned()
                    .zip(values)
                    .collect::<IndexMap<_, _>>(),
            })
            .collect()
    }
}

/// A fetched row, keyed by column name in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: IndexMap<String, Value>,
}

impl Row {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column).or_else(|| {
            self.values
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, value)| value)
        })
    }

    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_string(&self, column: &str) -> Option<String> {
        self.get(column).and_then(Value::to_text)
    }

    #[must_use]
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    #[must_use]
    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.values.get_index(0).map(|(_, value)| value)
    }

    #[must_use]
    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get_index(index).map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values.into_values().collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}

/// A single live driver session. Placeholders are always `?`.
pub trait Connection: Send {
    fn query(&mut self, sql: &str, params: &[Value]) -> DriverResult<ResultSet>;

    /// Runs one or more statements that take no parameters and return no rows.
    fn execute_batch(&mut self, sql: &str) -> DriverResult<()>;

    fn last_insert_id(&mut self) -> Option<i64>;

    fn ping(&mut self) -> bool;
}

/// Read access used by dialect introspection; implemented by the adapter so
/// catalog queries share its retry, hook, and logging path.
pub trait QueryRunner {
    fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet>;

    fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        Ok(self.fetch(sql, params)?.into_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::{DriverError, ResultSet, Row};
    use crate::Value;

    #[test]
    fn rows_are_keyed_in_select_order() {
        let result = ResultSet {
            columns: vec!["id".to_string(), "Sku".to_string()],
            rows: vec![vec![Value::Int(1), Value::from("ABC")]],
            affected_rows: 0,
        };
        let rows = result.into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("id"), Some(1));
        assert_eq!(rows[0].get_str("sku"), Some("ABC"));
        assert_eq!(rows[0].first(), Some(&Value::Int(1)));
    }

    #[test]
    fn row_collects_from_pairs() {
        let row = [("a", Value::Int(1)), ("b", Value::Null)]
            .into_iter()
            .collect::<Row>();
        assert_eq!(row.len(), 2);
        assert_eq!(row.value_at(1), Some(&Value::Null));
    }

    #[test]
    fn driver_error_display_includes_code() {
        let error = DriverError::new(Some("1213".to_string()), "Deadlock found");
        assert_eq!(error.to_string(), "[1213] Deadlock found");
        assert_eq!(DriverError::new(None, "boom").to_string(), "boom");
    }
}
