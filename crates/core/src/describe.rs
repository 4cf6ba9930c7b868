use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ColumnDefault, ColumnType, ForeignKeyAction, IndexType, Value};

/// Table reference, optionally qualified by schema (or attached database).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Dotted path suitable for `Quoting::quote_identifier`.
    #[must_use]
    pub fn path(&self) -> Vec<String> {
        match &self.schema {
            Some(schema) => vec![schema.clone(), self.name.clone()],
            None => vec![self.name.clone()],
        }
    }

    #[must_use]
    pub fn cache_key(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name).to_ascii_lowercase(),
            None => self.name.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl From<&str> for TableName {
    fn from(value: &str) -> Self {
        match value.split_once('.') {
            Some((schema, name)) if !schema.is_empty() => Self::qualified(schema, name),
            Some((_, name)) => Self::new(name),
            None => Self::new(value),
        }
    }
}

impl From<String> for TableName {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&String> for TableName {
    fn from(value: &String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&TableName> for TableName {
    fn from(value: &TableName) -> Self {
        value.clone()
    }
}

/// One row of `describe_table`, with raw catalog strings kept intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub schema: Option<String>,
    pub table: String,
    pub name: String,
    pub position: u32,
    pub data_type: String,
    pub default: Option<String>,
    pub nullable: bool,
    pub length: Option<u64>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub unsigned: bool,
    pub primary: bool,
    pub primary_position: Option<u32>,
    pub identity: bool,
    pub comment: Option<String>,
    /// Backend extra attributes such as mysql's `on update CURRENT_TIMESTAMP`.
    pub extra: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescription {
    pub schema: Option<String>,
    pub table: String,
    pub name: String,
    pub index_type: IndexType,
    pub columns: Vec<String>,
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescription {
    pub name: String,
    pub schema: Option<String>,
    pub table: String,
    pub column: String,
    pub ref_schema: Option<String>,
    pub ref_table: String,
    pub ref_column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Describe,
    CreateDdl,
    Indexes,
    ForeignKeys,
}

impl MetadataKind {
    pub const ALL: [Self; 4] = [
        Self::Describe,
        Self::CreateDdl,
        Self::Indexes,
        Self::ForeignKeys,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Describe => "describe",
            Self::CreateDdl => "create",
            Self::Indexes => "indexes",
            Self::ForeignKeys => "foreign_keys",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CachedMetadata {
    Describe(Vec<ColumnDescription>),
    CreateDdl(String),
    Indexes(Vec<IndexDescription>),
    ForeignKeys(Vec<ForeignKeyDescription>),
}

impl CachedMetadata {
    #[must_use]
    pub const fn kind(&self) -> MetadataKind {
        match self {
            Self::Describe(_) => MetadataKind::Describe,
            Self::CreateDdl(_) => MetadataKind::CreateDdl,
            Self::Indexes(_) => MetadataKind::Indexes,
            Self::ForeignKeys(_) => MetadataKind::ForeignKeys,
        }
    }
}

/// Result of mapping a catalog type name back to the abstract type set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReverseType {
    Known(ColumnType),
    Unknown(String),
}

impl ReverseType {
    /// Unknown catalog types degrade to text.
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Known(column_type) => *column_type,
            Self::Unknown(_) => ColumnType::Text,
        }
    }
}

/// Interprets a catalog default expression shared by all three backends:
/// `NULL`, quoted literals (optionally with a `::type` cast), numbers and the
/// current-timestamp family.
#[must_use]
pub fn parse_default_literal(raw: Option<&str>, on_update: bool) -> Option<ColumnDefault> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let uncast = match raw.find("::") {
        Some(index) if !raw.starts_with('\'') || raw[..index].ends_with('\'') => &raw[..index],
        _ => raw,
    };
    let unwrapped = uncast
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(uncast)
        .trim();
    let lowered = unwrapped.to_ascii_lowercase();
    if lowered == "null" {
        return Some(ColumnDefault::Null);
    }
    if matches!(
        lowered.as_str(),
        "current_timestamp" | "current_timestamp()" | "now()" | "localtimestamp"
    ) {
        return Some(if on_update {
            ColumnDefault::NowOnUpdate
        } else {
            ColumnDefault::Now
        });
    }
    if let Some(inner) = unwrapped
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
    {
        return Some(ColumnDefault::Literal(Value::Text(inner.replace("''", "'"))));
    }
    if let Ok(number) = unwrapped.parse::<i64>() {
        return Some(ColumnDefault::Literal(Value::Int(number)));
    }
    if let Ok(number) = unwrapped.parse::<f64>() {
        return Some(ColumnDefault::Literal(Value::Float(number)));
    }
    if matches!(lowered.as_str(), "true" | "false") {
        return Some(ColumnDefault::Literal(Value::Bool(lowered == "true")));
    }
    Some(ColumnDefault::Literal(Value::Text(unwrapped.to_string())))
}

#[cfg(test)]
mod tests {
    use super::{TableName, parse_default_literal};
    use crate::{ColumnDefault, Value};

    #[test]
    fn table_names_split_on_schema() {
        let name = TableName::from("shop.orders");
        assert_eq!(name.schema.as_deref(), Some("shop"));
        assert_eq!(name.to_string(), "shop.orders");
        assert_eq!(TableName::from(".orders"), TableName::new("orders"));
        assert_eq!(TableName::from("Orders").cache_key(), "orders");
    }

    #[test]
    fn default_literals_unwrap_casts_and_quotes() {
        assert_eq!(
            parse_default_literal(Some("'new'::character varying"), false),
            Some(ColumnDefault::Literal(Value::Text("new".to_string())))
        );
        assert_eq!(
            parse_default_literal(Some("'it''s'"), false),
            Some(ColumnDefault::Literal(Value::Text("it's".to_string())))
        );
        assert_eq!(
            parse_default_literal(Some("0"), false),
            Some(ColumnDefault::Literal(Value::Int(0)))
        );
        assert_eq!(
            parse_default_literal(Some("CURRENT_TIMESTAMP"), true),
            Some(ColumnDefault::NowOnUpdate)
        );
        assert_eq!(parse_default_literal(Some("NULL"), false), Some(ColumnDefault::Null));
        assert_eq!(parse_default_literal(None, false), None);
    }
}
