use std::collections::BTreeMap;

use sqlbridge_core::{
    ColumnDescription, ColumnType, ForeignKeyAction, ForeignKeyDescription, IndexDescription,
    IndexType, QueryRunner, Result, Row, TableName, Value,
};

use crate::types;

pub(crate) const SERVER_VERSION_QUERY: &str = "SELECT VERSION()";

/// Every catalog query resolves an unqualified table against the current
/// database.
const SCHEMA_FILTER: &str = "TABLE_SCHEMA = COALESCE(?, DATABASE())";

const COLUMNS_QUERY: &str = r"
SELECT
  COLUMN_NAME AS column_name,
  ORDINAL_POSITION AS ordinal_position,
  COLUMN_DEFAULT AS column_default,
  IS_NULLABLE AS is_nullable,
  COLUMN_TYPE AS column_type,
  CHARACTER_MAXIMUM_LENGTH AS character_maximum_length,
  NUMERIC_PRECISION AS numeric_precision,
  NUMERIC_SCALE AS numeric_scale,
  EXTRA AS extra,
  COLUMN_COMMENT AS column_comment
FROM information_schema.COLUMNS";

const STATISTICS_QUERY: &str = r"
SELECT
  INDEX_NAME AS index_name,
  NON_UNIQUE AS non_unique,
  INDEX_TYPE AS index_type,
  COLUMN_NAME AS column_name,
  SEQ_IN_INDEX AS seq_in_index
FROM information_schema.STATISTICS";

const FOREIGN_KEYS_QUERY: &str = r"
SELECT
  k.CONSTRAINT_NAME AS constraint_name,
  k.COLUMN_NAME AS column_name,
  k.REFERENCED_TABLE_SCHEMA AS ref_schema,
  k.REFERENCED_TABLE_NAME AS ref_table,
  k.REFERENCED_COLUMN_NAME AS ref_column,
  r.DELETE_RULE AS delete_rule,
  r.UPDATE_RULE AS update_rule
FROM information_schema.KEY_COLUMN_USAGE k
JOIN information_schema.REFERENTIAL_CONSTRAINTS r
  ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
  AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
  AND r.TABLE_NAME = k.TABLE_NAME";

fn table_params(table: &TableName) -> Vec<Value> {
    vec![
        table.schema.as_deref().map_or(Value::Null, Value::from),
        Value::from(table.name.as_str()),
    ]
}

pub(crate) fn list_tables(
    runner: &mut dyn QueryRunner,
    schema: Option<&str>,
) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT TABLE_NAME AS table_name FROM information_schema.TABLES \
         WHERE {SCHEMA_FILTER} AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME ASC"
    );
    let params = [schema.map_or(Value::Null, Value::from)];
    Ok(runner
        .fetch_rows(&sql, &params)?
        .into_iter()
        .filter_map(|row| row.get_string("table_name"))
        .collect())
}

pub(crate) fn table_exists(runner: &mut dyn QueryRunner, table: &TableName) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM information_schema.TABLES WHERE {SCHEMA_FILTER} AND TABLE_NAME = ? LIMIT 1"
    );
    let result = runner.fetch(&sql, &table_params(table))?;
    Ok(!result.rows.is_empty())
}

fn primary_positions(
    runner: &mut dyn QueryRunner,
    table: &TableName,
) -> Result<BTreeMap<String, u32>> {
    let sql = format!(
        "{STATISTICS_QUERY} WHERE {SCHEMA_FILTER} AND TABLE_NAME = ? AND INDEX_NAME = 'PRIMARY'"
    );
    Ok(runner
        .fetch_rows(&sql, &table_params(table))?
        .into_iter()
        .filter_map(|row| {
            let position = u32::try_from(row.get_i64("seq_in_index")?).ok()?;
            Some((row.get_string("column_name")?.to_ascii_lowercase(), position))
        })
        .collect())
}

/// Columns from `information_schema.COLUMNS`; `data_type` keeps the full
/// column type so `tinyint(1)` and `unsigned` survive.
pub(crate) fn describe_table(
    runner: &mut dyn QueryRunner,
    table: &TableName,
) -> Result<Vec<ColumnDescription>> {
    let sql = format!(
        "{COLUMNS_QUERY} WHERE {SCHEMA_FILTER} AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION"
    );
    let rows = runner.fetch_rows(&sql, &table_params(table))?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let primary = primary_positions(runner, table)?;
    Ok(rows
        .into_iter()
        .map(|row| column_description(table, &row, &primary))
        .collect())
}

fn column_description(
    table: &TableName,
    row: &Row,
    primary: &BTreeMap<String, u32>,
) -> ColumnDescription {
    let name = row.get_string("column_name").unwrap_or_default();
    let data_type = row.get_string("column_type").unwrap_or_default();
    let (base, _, unsigned) = types::split_column_type(&data_type);
    let column_type = types::reverse_type(&data_type).column_type();
    let length = match column_type {
        ColumnType::Varchar | ColumnType::VarBinary => row
            .get_i64("character_maximum_length")
            .and_then(|length| u64::try_from(length).ok()),
        ColumnType::Text | ColumnType::Blob => types::large_object_length(&base),
        _ => None,
    };
    let (precision, scale) = if column_type.is_decimal() {
        (
            row.get_i64("numeric_precision")
                .and_then(|value| u32::try_from(value).ok()),
            row.get_i64("numeric_scale")
                .and_then(|value| u32::try_from(value).ok()),
        )
    } else {
        (None, None)
    };
    let extra = row
        .get_string("extra")
        .filter(|extra| !extra.trim().is_empty());
    let identity = extra
        .as_deref()
        .is_some_and(|extra| extra.to_ascii_lowercase().contains("auto_increment"));
    let primary_position = primary.get(&name.to_ascii_lowercase()).copied();

    ColumnDescription {
        schema: table.schema.clone(),
        table: table.name.clone(),
        position: row
            .get_i64("ordinal_position")
            .and_then(|position| u32::try_from(position).ok())
            .unwrap_or(0),
        default: row.get_string("column_default"),
        nullable: row.get_str("is_nullable") == Some("YES"),
        length,
        precision,
        scale,
        unsigned,
        primary: primary_position.is_some(),
        primary_position,
        identity,
        comment: row
            .get_string("column_comment")
            .filter(|comment| !comment.is_empty()),
        extra,
        data_type,
        name,
    }
}

/// Indexes keyed by name in first-seen order, primary key first.
pub(crate) fn index_list(
    runner: &mut dyn QueryRunner,
    table: &TableName,
) -> Result<Vec<IndexDescription>> {
    let sql = format!(
        "{STATISTICS_QUERY} WHERE {SCHEMA_FILTER} AND TABLE_NAME = ? \
         ORDER BY INDEX_NAME = 'PRIMARY' DESC, INDEX_NAME, SEQ_IN_INDEX"
    );
    let mut indexes: Vec<IndexDescription> = Vec::new();
    for row in runner.fetch_rows(&sql, &table_params(table))? {
        let Some(name) = row.get_string("index_name") else {
            continue;
        };
        let column = row.get_string("column_name").unwrap_or_default();
        if let Some(index) = indexes.iter_mut().find(|index| index.name == name) {
            index.columns.push(column);
            continue;
        }
        let method = row.get_string("index_type");
        let index_type = if name == "PRIMARY" {
            IndexType::Primary
        } else if method.as_deref() == Some("FULLTEXT") {
            IndexType::Fulltext
        } else if row.get_i64("non_unique") == Some(0) {
            IndexType::Unique
        } else {
            IndexType::Index
        };
        indexes.push(IndexDescription {
            schema: table.schema.clone(),
            table: table.name.clone(),
            name,
            index_type,
            columns: vec![column],
            method,
        });
    }
    Ok(indexes)
}

pub(crate) fn foreign_keys(
    runner: &mut dyn QueryRunner,
    table: &TableName,
) -> Result<Vec<ForeignKeyDescription>> {
    let sql = format!(
        "{FOREIGN_KEYS_QUERY} WHERE k.{SCHEMA_FILTER} AND k.TABLE_NAME = ? \
         AND k.REFERENCED_TABLE_NAME IS NOT NULL \
         ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION"
    );
    runner
        .fetch_rows(&sql, &table_params(table))?
        .into_iter()
        .map(|row| {
            Ok(ForeignKeyDescription {
                name: row.get_string("constraint_name").unwrap_or_default(),
                schema: table.schema.clone(),
                table: table.name.clone(),
                column: row.get_string("column_name").unwrap_or_default(),
                ref_schema: row.get_string("ref_schema"),
                ref_table: row.get_string("ref_table").unwrap_or_default(),
                ref_column: row.get_string("ref_column").unwrap_or_default(),
                on_delete: action(&row, "delete_rule")?,
                on_update: action(&row, "update_rule")?,
            })
        })
        .collect()
}

fn action(row: &Row, column: &str) -> Result<ForeignKeyAction> {
    Ok(row
        .get_str(column)
        .unwrap_or_default()
        .parse::<ForeignKeyAction>()?)
}

pub(crate) fn table_comment(
    runner: &mut dyn QueryRunner,
    table: &TableName,
) -> Result<Option<String>> {
    let sql = format!(
        "SELECT TABLE_COMMENT AS table_comment FROM information_schema.TABLES \
         WHERE {SCHEMA_FILTER} AND TABLE_NAME = ?"
    );
    Ok(runner
        .fetch_rows(&sql, &table_params(table))?
        .into_iter()
        .find_map(|row| row.get_string("table_comment"))
        .filter(|comment| !comment.is_empty()))
}

/// Second column of `SHOW CREATE TABLE`.
pub(crate) fn show_create_table(
    runner: &mut dyn QueryRunner,
    table: &TableName,
    quoted: &str,
) -> Result<Option<String>> {
    if !table_exists(runner, table)? {
        return Ok(None);
    }
    let rows = runner.fetch_rows(&format!("SHOW CREATE TABLE {quoted}"), &[])?;
    Ok(rows
        .first()
        .and_then(|row| row.value_at(1))
        .and_then(Value::to_text))
}
