use std::error::Error as StdError;

use thiserror::Error;

use crate::{ErrorClass, TableName};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Execute(#[from] ExecutionError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("{dialect} does not support {operation}")]
    Unsupported {
        dialect: &'static str,
        operation: String,
    },
}

impl Error {
    pub fn unsupported(dialect: &'static str, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            dialect,
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::Execute(ExecutionError::StatementFailed { class, .. }) => Some(*class),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("table `{table}` requires a comment before it can be created")]
    MissingTableComment { table: String },
    #[error("table `{table}` declares column `{column}` more than once")]
    DuplicateColumn { table: String, column: String },
    #[error("table `{table}` has no columns")]
    EmptyTable { table: String },
    #[error("table `{table}` declares more than one primary index")]
    MultiplePrimaryIndexes { table: String },
    #[error(
        "primary index of `{table}` ({index:?}) disagrees with primary column flags ({flags:?})"
    )]
    PrimaryKeyMismatch {
        table: String,
        index: Vec<String>,
        flags: Vec<String>,
    },
    #[error("index `{index}` on `{table}` references unknown column `{column}`")]
    UnknownIndexColumn {
        table: String,
        index: String,
        column: String,
    },
    #[error("index `{index}` on `{table}` has no columns")]
    EmptyIndex { table: String, index: String },
    #[error("foreign key `{name}` on `{table}` references unknown column `{column}`")]
    UnknownForeignKeyColumn {
        table: String,
        name: String,
        column: String,
    },
    #[error("foreign key `{name}` uses SET NULL but column `{column}` is not nullable")]
    SetNullOnNotNullColumn { name: String, column: String },
    #[error("column `{column}` has invalid decimal precision and scale ({precision},{scale})")]
    InvalidDecimal {
        column: String,
        precision: u32,
        scale: u32,
    },
    #[error("column `{column}` of type {column_type} cannot be an identity column")]
    InvalidIdentityType { column: String, column_type: String },
    #[error("identity column `{column}` must be the only primary key column on {dialect}")]
    IdentityRequiresSinglePrimaryKey {
        column: String,
        dialect: &'static str,
    },
    #[error("unknown column type `{0}`")]
    UnknownColumnType(String),
    #[error("unknown column option `{0}`")]
    UnknownColumnOption(String),
    #[error("invalid value `{value}` for column option `{option}`")]
    InvalidColumnOption { option: String, value: String },
    #[error("invalid value `{value}` for connection option `{key}`")]
    InvalidConnectionOption { key: String, value: String },
    #[error("unknown index type `{0}`")]
    UnknownIndexType(String),
    #[error("unknown foreign key action `{0}`")]
    UnknownForeignKeyAction(String),
    #[error("invalid interval unit `{0}`")]
    InvalidIntervalUnit(String),
    #[error("statement has {placeholders} positional placeholders but {given} values were bound")]
    BindCountMismatch { placeholders: usize, given: usize },
    #[error("insert into `{table}` has no data")]
    EmptyInsert { table: String },
    #[error("row {row} of insert into `{table}` has {given} values, expected {expected}")]
    RaggedInsertRow {
        table: String,
        row: usize,
        expected: usize,
        given: usize,
    },
    #[error("no unique index on `{table}` is covered by the inserted columns {columns:?}")]
    NoConflictTarget { table: String, columns: Vec<String> },
    #[error("select used for `{operation}` has no {part}")]
    IncompleteSelect {
        operation: &'static str,
        part: &'static str,
    },
}

#[derive(Debug, Error)]
#[error("failed to connect to {dialect}: {source}")]
pub struct ConnectionError {
    pub dialect: &'static str,
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
}

impl ConnectionError {
    pub fn new<E>(dialect: &'static str, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            dialect,
            source: Box::new(source),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("statement failed after {attempts} attempt(s) [{class}]: {sql}: {source}")]
    StatementFailed {
        sql: String,
        attempts: u32,
        class: ErrorClass,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("unexpected result for `{sql}`: {message}")]
    UnexpectedResult { sql: String, message: String },
}

impl ExecutionError {
    pub fn statement_failed<E>(sql: &str, attempts: u32, class: ErrorClass, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::StatementFailed {
            sql: sql.to_string(),
            attempts,
            class,
            source: Box::new(source),
        }
    }

    pub fn unexpected(sql: &str, message: impl Into<String>) -> Self {
        Self::UnexpectedResult {
            sql: sql.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("table `{0}` does not exist")]
    Table(TableName),
    #[error("column `{column}` does not exist in `{table}`")]
    Column { table: TableName, column: String },
    #[error("index `{index}` does not exist on `{table}`")]
    Index { table: TableName, index: String },
    #[error("foreign key `{name}` does not exist on `{table}`")]
    ForeignKey { table: TableName, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("asymmetric transaction {operation}: no transaction is open")]
    NotStarted { operation: &'static str },
    #[error("rolled back nested transaction has not been completed; roll back the outer level")]
    NestedRollbackPending,
    #[error("adapter closed with {level} open transaction level(s)")]
    OpenAtTeardown { level: u32 },
    #[error("`{operation}` is not allowed inside a transaction on {dialect}")]
    DdlInTransaction {
        dialect: &'static str,
        operation: &'static str,
    },
}
