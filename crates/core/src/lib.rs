mod adapter;
pub mod bind;
mod cache;
mod config;
mod connection;
mod describe;
mod dialect;
mod dml;
mod error;
mod expr;
mod naming;
mod quote;
mod retry;
mod schema;
mod select;
mod sink;
mod statement;
mod transaction;
mod value;

pub use adapter::{Adapter, QuerySource};
pub use bind::{Binds, BoundQuery, inline_params};
pub use cache::{CacheBackend, MetadataCache};
pub use config::{AdapterOptions, ConnectionConfig, Version};
pub use connection::{
    Connection, DriverError, DriverResult, ErrorClass, QueryRunner, ResultSet, Row,
};
pub use describe::{
    CachedMetadata, ColumnDescription, ForeignKeyDescription, IndexDescription, MetadataKind,
    ReverseType, TableName, parse_default_literal,
};
pub use dialect::{
    AlterOp, Dialect, JoinedSources, column_from_description, joined_sources, select_assignments,
};
pub use dml::{
    Insert, InsertMode, UpdateField, UpdateValue, infer_conflict_columns, upsert_clause,
};
pub use error::{
    ConfigError, ConnectionError, Error, ExecutionError, NotFoundError, Result, TransactionError,
};
pub use expr::{IntervalUnit, json_path_segments, translate_date_format};
pub use naming::{NameBuilder, NameKind, shorten_name};
pub use quote::{BytesLiteral, FloatFormat, IdentPath, Quoting, StringEscape};
pub use retry::{MAX_ATTEMPTS_CEILING, RetryDecision, RetryPolicy};
pub use schema::{
    ColumnDefault, ColumnDefinition, ColumnType, ForeignKeyAction, ForeignKeyDefinition,
    IndexColumn, IndexDefinition, IndexType, TableDefinition,
};
pub use select::{
    Condition, Conjunction, Join, JoinKind, Order, Select, SelectColumn, SelectStyle,
};
pub use sink::{QueryEvent, QueryKind, QuerySink, WriterSink};
pub use statement::{RebuildStep, Statement, StatementContext};
pub use transaction::Transaction;
pub use value::{SqlExpr, Value};
