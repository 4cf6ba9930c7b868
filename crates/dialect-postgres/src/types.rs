use sqlbridge_core::{ColumnDefinition, ColumnType, ReverseType};

/// Concrete type for a column. There are no unsigned integers and no
/// distinct `DATETIME`; both collapse onto the nearest native type.
pub(crate) fn column_type_sql(column: &ColumnDefinition) -> String {
    match column.column_type {
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::SmallInt => "SMALLINT".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::Float => "DOUBLE PRECISION".to_string(),
        ColumnType::Decimal | ColumnType::Numeric => {
            let (precision, scale) = column.decimal_spec();
            format!("NUMERIC({precision},{scale})")
        }
        ColumnType::Date => "DATE".to_string(),
        ColumnType::Timestamp | ColumnType::DateTime => "TIMESTAMP".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Varchar => match column.length {
            Some(length) => format!("VARCHAR({length})"),
            None => "VARCHAR".to_string(),
        },
        ColumnType::Blob | ColumnType::VarBinary => "BYTEA".to_string(),
    }
}

/// Splits `format_type` output such as `timestamp(0) without time zone` or
/// `numeric(12,4)` into the lowercase base name and its parameters.
pub(crate) fn split_format_type(raw: &str) -> (String, Vec<u64>) {
    let raw = raw.trim().to_ascii_lowercase();
    let Some((head, rest)) = raw.split_once('(') else {
        return (raw, Vec::new());
    };
    let (inner, tail) = rest.split_once(')').unwrap_or((rest, ""));
    let params = inner
        .split(',')
        .filter_map(|param| param.trim().parse().ok())
        .collect();
    let base = format!("{} {}", head.trim(), tail.trim());
    (base.trim().to_string(), params)
}

pub(crate) fn reverse_type(raw: &str) -> ReverseType {
    let (base, _) = split_format_type(raw);
    let base = base.trim_end_matches("[]");
    let column_type = match base {
        "boolean" | "bool" => ColumnType::Boolean,
        "smallint" | "int2" => ColumnType::SmallInt,
        "integer" | "int" | "int4" => ColumnType::Integer,
        "bigint" | "int8" => ColumnType::BigInt,
        "double precision" | "real" | "float4" | "float8" => ColumnType::Float,
        "numeric" | "decimal" => ColumnType::Decimal,
        "date" => ColumnType::Date,
        "timestamp" | "timestamp without time zone" | "timestamp with time zone"
        | "timestamptz" => ColumnType::Timestamp,
        "text" => ColumnType::Text,
        "character varying" | "varchar" | "character" | "char" | "bpchar" => ColumnType::Varchar,
        "bytea" => ColumnType::Blob,
        _ => return ReverseType::Unknown(raw.to_string()),
    };
    ReverseType::Known(column_type)
}

#[cfg(test)]
mod tests {
    use sqlbridge_core::{ColumnDefinition, ColumnType, ReverseType};

    use super::{column_type_sql, reverse_type, split_format_type};

    #[test]
    fn catalog_type_names_are_split_around_modifiers() {
        assert_eq!(
            split_format_type("numeric(12,4)"),
            ("numeric".to_string(), vec![12, 4])
        );
        assert_eq!(
            split_format_type("timestamp(0) without time zone"),
            ("timestamp without time zone".to_string(), vec![0])
        );
        assert_eq!(
            split_format_type("character varying(32)"),
            ("character varying".to_string(), vec![32])
        );
    }

    #[test]
    fn collapsed_types_map_back_to_their_canonical_form() {
        assert_eq!(
            column_type_sql(&ColumnDefinition::new("c", ColumnType::DateTime)),
            "TIMESTAMP"
        );
        assert_eq!(
            column_type_sql(&ColumnDefinition::new("c", ColumnType::VarBinary).length(16)),
            "BYTEA"
        );
        assert_eq!(
            reverse_type("numeric(12,4)"),
            ReverseType::Known(ColumnType::Decimal)
        );
        assert_eq!(
            reverse_type("timestamp without time zone"),
            ReverseType::Known(ColumnType::Timestamp)
        );
        assert_eq!(
            reverse_type("character varying(32)"),
            ReverseType::Known(ColumnType::Varchar)
        );
        assert_eq!(reverse_type("jsonb"), ReverseType::Unknown("jsonb".to_string()));
    }

    #[test]
    fn unsigned_is_not_rendered() {
        let column = ColumnDefinition::new("qty", ColumnType::Integer).unsigned(true);
        assert_eq!(column_type_sql(&column), "INTEGER");
    }
}
