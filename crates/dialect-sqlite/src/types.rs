use sqlbridge_core::{ColumnDefinition, ColumnType, ReverseType};

const DEFAULT_VARCHAR_LENGTH: u64 = 255;

/// Declared type for a column. Storage is dynamically typed, so the names
/// mostly matter for affinity and for mapping the column back on
/// introspection.
pub(crate) fn column_type_sql(column: &ColumnDefinition) -> String {
    match column.column_type {
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::SmallInt => "SMALLINT".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::Float => "REAL".to_string(),
        ColumnType::Decimal | ColumnType::Numeric => {
            let (precision, scale) = column.decimal_spec();
            let keyword = if column.column_type == ColumnType::Decimal {
                "DECIMAL"
            } else {
                "NUMERIC"
            };
            format!("{keyword}({precision},{scale})")
        }
        ColumnType::Date => "DATE".to_string(),
        ColumnType::Timestamp => "TIMESTAMP".to_string(),
        ColumnType::DateTime => "DATETIME".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Varchar => {
            format!("VARCHAR({})", column.length.unwrap_or(DEFAULT_VARCHAR_LENGTH))
        }
        ColumnType::Blob => "BLOB".to_string(),
        ColumnType::VarBinary => {
            format!("VARBINARY({})", column.length.unwrap_or(DEFAULT_VARCHAR_LENGTH))
        }
    }
}

/// Splits `DECIMAL(12, 4)` into `DECIMAL` and `[12, 4]`.
pub(crate) fn split_declared_type(raw: &str) -> (String, Vec<u64>) {
    let raw = raw.trim();
    let Some((base, rest)) = raw.split_once('(') else {
        return (raw.to_ascii_uppercase(), Vec::new());
    };
    let params = rest
        .trim_end_matches(')')
        .split(',')
        .filter_map(|param| param.trim().parse().ok())
        .collect();
    (base.trim().to_ascii_uppercase(), params)
}

pub(crate) fn reverse_type(raw: &str) -> ReverseType {
    let (base, _) = split_declared_type(raw);
    let base = base.strip_suffix(" UNSIGNED").unwrap_or(&base);
    let column_type = match base {
        "BOOLEAN" | "BOOL" => ColumnType::Boolean,
        "SMALLINT" | "TINYINT" => ColumnType::SmallInt,
        "INTEGER" | "INT" | "MEDIUMINT" => ColumnType::Integer,
        "BIGINT" => ColumnType::BigInt,
        "REAL" | "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" => ColumnType::Float,
        "DECIMAL" => ColumnType::Decimal,
        "NUMERIC" => ColumnType::Numeric,
        "DATE" => ColumnType::Date,
        "TIMESTAMP" => ColumnType::Timestamp,
        "DATETIME" => ColumnType::DateTime,
        "TEXT" | "CLOB" => ColumnType::Text,
        "VARCHAR" | "CHARACTER VARYING" | "NVARCHAR" | "CHAR" => ColumnType::Varchar,
        "BLOB" => ColumnType::Blob,
        "VARBINARY" => ColumnType::VarBinary,
        _ => return ReverseType::Unknown(raw.to_string()),
    };
    ReverseType::Known(column_type)
}
