use sqlbridge_core::{ColumnDefinition, ColumnType, ReverseType};

const DEFAULT_VARCHAR_LENGTH: u64 = 255;
const TEXT_MAX_LENGTH: u64 = 65_535;
const MEDIUM_MAX_LENGTH: u64 = 16_777_215;

pub(crate) fn column_type_sql(column: &ColumnDefinition) -> String {
    let base = match column.column_type {
        ColumnType::Boolean => return "TINYINT(1)".to_string(),
        ColumnType::SmallInt => "SMALLINT".to_string(),
        ColumnType::Integer => "INT".to_string(),
        ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::Float => "DOUBLE".to_string(),
        ColumnType::Decimal | ColumnType::Numeric => {
            let (precision, scale) = column.decimal_spec();
            format!("DECIMAL({precision},{scale})")
        }
        ColumnType::Date => return "DATE".to_string(),
        ColumnType::Timestamp => return "TIMESTAMP".to_string(),
        ColumnType::DateTime => return "DATETIME".to_string(),
        ColumnType::Text => return sized_large_object(column.length, "TEXT"),
        ColumnType::Varchar => {
            return format!("VARCHAR({})", column.length.unwrap_or(DEFAULT_VARCHAR_LENGTH));
        }
        ColumnType::Blob => return sized_large_object(column.length, "BLOB"),
        ColumnType::VarBinary => {
            return format!("VARBINARY({})", column.length.unwrap_or(DEFAULT_VARCHAR_LENGTH));
        }
    };
    if column.unsigned {
        format!("{base} UNSIGNED")
    } else {
        base
    }
}

/// `TEXT`, `MEDIUMTEXT` or `LONGTEXT` (and the blob equivalents) by the
/// largest value the column has to hold.
fn sized_large_object(length: Option<u64>, suffix: &str) -> String {
    match length {
        Some(length) if length > MEDIUM_MAX_LENGTH => format!("LONG{suffix}"),
        Some(length) if length > TEXT_MAX_LENGTH => format!("MEDIUM{suffix}"),
        _ => suffix.to_string(),
    }
}

/// Length recorded for a large-object column on introspection, `None` for
/// the plain sizes so the column maps back to the bare type.
pub(crate) fn large_object_length(base: &str) -> Option<u64> {
    match base {
        "MEDIUMTEXT" | "MEDIUMBLOB" => Some(MEDIUM_MAX_LENGTH),
        "LONGTEXT" | "LONGBLOB" => Some(u64::from(u32::MAX)),
        _ => None,
    }
}

/// Splits `decimal(12,4) unsigned` into `DECIMAL`, `[12, 4]` and the
/// unsigned flag.
pub(crate) fn split_column_type(raw: &str) -> (String, Vec<u64>, bool) {
    let lowered = raw.trim().to_ascii_lowercase();
    let unsigned = lowered.split_whitespace().any(|word| word == "unsigned");
    let head = lowered
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();
    let (base, params) = match head.split_once('(') {
        Some((base, rest)) => (
            base.to_string(),
            rest.trim_end_matches(')')
                .split(',')
                .filter_map(|param| param.trim().parse().ok())
                .collect(),
        ),
        None => (head, Vec::new()),
    };
    (base.to_ascii_uppercase(), params, unsigned)
}

pub(crate) fn reverse_type(raw: &str) -> ReverseType {
    let (base, params, _) = split_column_type(raw);
    let column_type = match base.as_str() {
        "TINYINT" if params.first() == Some(&1) => ColumnType::Boolean,
        "BOOL" | "BOOLEAN" => ColumnType::Boolean,
        "TINYINT" | "SMALLINT" => ColumnType::SmallInt,
        "MEDIUMINT" | "INT" | "INTEGER" => ColumnType::Integer,
        "BIGINT" => ColumnType::BigInt,
        "FLOAT" | "DOUBLE" | "REAL" => ColumnType::Float,
        "DECIMAL" | "NUMERIC" => ColumnType::Decimal,
        "DATE" => ColumnType::Date,
        "TIMESTAMP" => ColumnType::Timestamp,
        "DATETIME" => ColumnType::DateTime,
        "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" => ColumnType::Text,
        "VARCHAR" | "CHAR" => ColumnType::Varchar,
        "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => ColumnType::Blob,
        "VARBINARY" | "BINARY" => ColumnType::VarBinary,
        _ => return ReverseType::Unknown(raw.to_string()),
    };
    ReverseType::Known(column_type)
}

#[cfg(test)]
mod tests {
    use sqlbridge_core::{ColumnDefinition, ColumnType, ReverseType};

    use super::{column_type_sql, reverse_type, split_column_type};

    #[test]
    fn large_objects_grow_with_length() {
        let text = ColumnDefinition::new("body", ColumnType::Text);
        assert_eq!(column_type_sql(&text), "TEXT");
        assert_eq!(column_type_sql(&text.clone().length(70_000)), "MEDIUMTEXT");
        assert_eq!(column_type_sql(&text.length(20_000_000)), "LONGTEXT");
        let blob = ColumnDefinition::new("data", ColumnType::Blob).length(70_000);
        assert_eq!(column_type_sql(&blob), "MEDIUMBLOB");
    }

    #[test]
    fn numeric_types_carry_unsigned() {
        let column = ColumnDefinition::new("qty", ColumnType::Integer).unsigned(true);
        assert_eq!(column_type_sql(&column), "INT UNSIGNED");
        let column = ColumnDefinition::new("price", ColumnType::Numeric).decimal(12, 4);
        assert_eq!(column_type_sql(&column), "DECIMAL(12,4)");
        let column = ColumnDefinition::new("flag", ColumnType::Boolean).unsigned(true);
        assert_eq!(column_type_sql(&column), "TINYINT(1)");
    }

    #[test]
    fn column_types_are_split() {
        assert_eq!(
            split_column_type("decimal(12,4) unsigned zerofill"),
            ("DECIMAL".to_string(), vec![12, 4], true)
        );
        assert_eq!(
            split_column_type("varchar(32)"),
            ("VARCHAR".to_string(), vec![32], false)
        );
    }

    #[test]
    fn catalog_types_map_back() {
        assert_eq!(reverse_type("tinyint(1)"), ReverseType::Known(ColumnType::Boolean));
        assert_eq!(reverse_type("tinyint(4)"), ReverseType::Known(ColumnType::SmallInt));
        assert_eq!(
            reverse_type("int(10) unsigned"),
            ReverseType::Known(ColumnType::Integer)
        );
        assert_eq!(reverse_type("longtext"), ReverseType::Known(ColumnType::Text));
        assert_eq!(
            reverse_type("enum('a','b')"),
            ReverseType::Unknown("enum('a','b')".to_string())
        );
        for column_type in ColumnType::ALL {
            let expected = if column_type == ColumnType::Numeric {
                ColumnType::Decimal
            } else {
                column_type
            };
            let column = ColumnDefinition::new("c", column_type).length(16);
            assert_eq!(
                reverse_type(&column_type_sql(&column)),
                ReverseType::Known(expected),
                "{column_type}"
            );
        }
    }
}
