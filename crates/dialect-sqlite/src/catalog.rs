use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use sqlbridge_core::{
    ColumnDescription, ColumnType, ForeignKeyAction, ForeignKeyDescription, IndexDescription,
    IndexType, NameBuilder, QueryRunner, Quoting, Result, Row, TableName, Value,
};

use crate::types;

pub(crate) const SERVER_VERSION_QUERY: &str = "SELECT sqlite_version()";

// Unqualified names resolve against both the main and the temp database.
const MAIN_AND_TEMP_MASTER: &str = "(SELECT type, name, tbl_name, sql FROM sqlite_master \
     UNION ALL SELECT type, name, tbl_name, sql FROM sqlite_temp_master)";

const TABLE_NAMES_FILTER: &str = r"
WHERE type = 'table'
  AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
  AND name NOT LIKE '\_\_sqlbridge\_%' ESCAPE '\'
ORDER BY name ASC";

const ON_UPDATE_EXTRA: &str = "on update CURRENT_TIMESTAMP";

static FOREIGN_KEY_CONSTRAINT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)CONSTRAINT\s+"((?:[^"]|"")+)"\s+FOREIGN\s+KEY\s*\(\s*"((?:[^"]|"")+)"\s*\)"#,
    )
    .ok()
});

fn master(schema: Option<&str>) -> String {
    match schema {
        Some(schema) => format!(
            "{}.sqlite_master",
            Quoting::sqlite().quote_segment(schema)
        ),
        None => MAIN_AND_TEMP_MASTER.to_string(),
    }
}

/// Table-valued pragma call with the schema passed as the hidden argument.
fn pragma(function: &str, object: &str, schema: Option<&str>) -> (String, Vec<Value>) {
    match schema {
        Some(schema) => (
            format!("{function}(?, ?)"),
            vec![Value::from(object), Value::from(schema)],
        ),
        None => (format!("{function}(?)"), vec![Value::from(object)]),
    }
}

pub(crate) fn list_tables(
    runner: &mut dyn QueryRunner,
    schema: Option<&str>,
) -> Result<Vec<String>> {
    let sql = format!("SELECT name FROM {}{TABLE_NAMES_FILTER}", master(schema));
    Ok(runner
        .fetch_rows(&sql, &[])?
        .into_iter()
        .filter_map(|row| row.get_string("name"))
        .collect())
}

pub(crate) fn table_exists(runner: &mut dyn QueryRunner, table: &TableName) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE type = 'table' AND name = ? COLLATE NOCASE LIMIT 1",
        master(table.schema.as_deref())
    );
    let result = runner.fetch(&sql, &[Value::from(table.name.as_str())])?;
    Ok(!result.rows.is_empty())
}

fn table_sql(runner: &mut dyn QueryRunner, table: &TableName) -> Result<Option<String>> {
    let sql = format!(
        "SELECT sql FROM {} WHERE type = 'table' AND name = ? COLLATE NOCASE",
        master(table.schema.as_deref())
    );
    Ok(runner
        .fetch_rows(&sql, &[Value::from(table.name.as_str())])?
        .into_iter()
        .find_map(|row| row.get_string("sql")))
}

fn trigger_names(runner: &mut dyn QueryRunner, table: &TableName) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT name FROM {} WHERE type = 'trigger' AND tbl_name = ? COLLATE NOCASE",
        master(table.schema.as_deref())
    );
    Ok(runner
        .fetch_rows(&sql, &[Value::from(table.name.as_str())])?
        .into_iter()
        .filter_map(|row| row.get_string("name"))
        .collect())
}

fn table_info(runner: &mut dyn QueryRunner, table: &TableName) -> Result<Vec<Row>> {
    let (source, params) = pragma("pragma_table_info", &table.name, table.schema.as_deref());
    let sql = format!(
        "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM {source} ORDER BY cid"
    );
    runner.fetch_rows(&sql, &params)
}

/// Columns from `pragma_table_info`. A lone `INTEGER` primary key declared
/// with `AUTOINCREMENT` is the identity column; generated on-update triggers
/// surface as the mysql-style extra attribute.
pub(crate) fn describe_table(
    runner: &mut dyn QueryRunner,
    table: &TableName,
    names: NameBuilder,
) -> Result<Vec<ColumnDescription>> {
    let rows = table_info(runner, table)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let autoincrement = table_sql(runner, table)?
        .is_some_and(|sql| sql.to_ascii_uppercase().contains("AUTOINCREMENT"));
    let triggers = trigger_names(runner, table)?;
    let primary_count = rows
        .iter()
        .filter(|row| row.get_i64("pk").unwrap_or(0) > 0)
        .count();

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name = row.get_string("name").unwrap_or_default();
        let data_type = row.get_string("type").unwrap_or_default();
        let primary_position = row
            .get_i64("pk")
            .and_then(|position| u32::try_from(position).ok())
            .filter(|position| *position > 0);
        let (base, params) = types::split_declared_type(&data_type);
        let column_type = types::reverse_type(&data_type).column_type();
        let identity =
            autoincrement && primary_count == 1 && primary_position.is_some() && base == "INTEGER";
        let (length, precision, scale) = match column_type {
            ColumnType::Varchar | ColumnType::VarBinary => (params.first().copied(), None, None),
            ColumnType::Decimal | ColumnType::Numeric => (
                None,
                params.first().and_then(|value| u32::try_from(*value).ok()),
                params.get(1).and_then(|value| u32::try_from(*value).ok()),
            ),
            _ => (None, None, None),
        };
        let on_update = names.on_update_trigger_name(&table.name, &name);
        let extra = triggers
            .iter()
            .any(|trigger| trigger.eq_ignore_ascii_case(&on_update))
            .then(|| ON_UPDATE_EXTRA.to_string());

        columns.push(ColumnDescription {
            schema: table.schema.clone(),
            table: table.name.clone(),
            position: row
                .get_i64("cid")
                .and_then(|cid| u32::try_from(cid + 1).ok())
                .unwrap_or(0),
            default: row.get_string("dflt_value"),
            nullable: row.get_i64("notnull") == Some(0) && primary_position.is_none(),
            length,
            precision,
            scale,
            unsigned: base.ends_with(" UNSIGNED"),
            primary: primary_position.is_some(),
            primary_position,
            identity,
            comment: None,
            extra,
            data_type,
            name,
        });
    }
    Ok(columns)
}

/// Indexes in creation order, primary key first. Rowid primary keys have no
/// backing index and are synthesized from the column list.
pub(crate) fn index_list(
    runner: &mut dyn QueryRunner,
    table: &TableName,
) -> Result<Vec<IndexDescription>> {
    let schema = table.schema.as_deref();
    let (source, params) = pragma("pragma_index_list", &table.name, schema);
    let sql = format!("SELECT seq, name, \"unique\", origin FROM {source} ORDER BY seq DESC");
    let listed = runner.fetch_rows(&sql, &params)?;

    let mut indexes = Vec::with_capacity(listed.len() + 1);
    for row in listed {
        let Some(name) = row.get_string("name") else {
            continue;
        };
        let (source, params) = pragma("pragma_index_info", &name, schema);
        let sql = format!("SELECT name FROM {source} ORDER BY seqno");
        let columns = runner
            .fetch_rows(&sql, &params)?
            .into_iter()
            .filter_map(|row| row.get_string("name"))
            .collect();
        let origin = row.get_string("origin").unwrap_or_default();
        let (name, index_type) = if origin == "pk" {
            ("PRIMARY".to_string(), IndexType::Primary)
        } else if row.get_bool("unique") == Some(true) {
            (name, IndexType::Unique)
        } else {
            (name, IndexType::Index)
        };
        indexes.push(IndexDescription {
            schema: table.schema.clone(),
            table: table.name.clone(),
            name,
            index_type,
            columns,
            method: None,
        });
    }

    if !indexes.iter().any(|index| index.index_type == IndexType::Primary) {
        let mut primary = table_info(runner, table)?
            .into_iter()
            .filter_map(|row| {
                let position = row.get_i64("pk").filter(|position| *position > 0)?;
                Some((position, row.get_string("name")?))
            })
            .collect::<Vec<_>>();
        if !primary.is_empty() {
            primary.sort();
            indexes.insert(
                0,
                IndexDescription {
                    schema: table.schema.clone(),
                    table: table.name.clone(),
                    name: "PRIMARY".to_string(),
                    index_type: IndexType::Primary,
                    columns: primary.into_iter().map(|(_, name)| name).collect(),
                    method: None,
                },
            );
        }
    }
    indexes.sort_by_key(|index| index.index_type != IndexType::Primary);
    Ok(indexes)
}

/// Constraint names are not kept by the catalog; they are recovered from the
/// stored `CREATE TABLE` text, falling back to the generated name.
pub(crate) fn foreign_keys(
    runner: &mut dyn QueryRunner,
    table: &TableName,
    names: NameBuilder,
) -> Result<Vec<ForeignKeyDescription>> {
    let (source, params) = pragma("pragma_foreign_key_list", &table.name, table.schema.as_deref());
    let sql = format!(
        "SELECT id, seq, \"table\", \"from\", \"to\", on_update, on_delete FROM {source} \
         ORDER BY id, seq"
    );
    let rows = runner.fetch_rows(&sql, &params)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let declared = table_sql(runner, table)?
        .map(|sql| constraint_names(&sql))
        .unwrap_or_default();

    rows.into_iter()
        .map(|row| {
            let column = row.get_string("from").unwrap_or_default();
            let ref_table = row.get_string("table").unwrap_or_default();
            let ref_column = row.get_string("to").unwrap_or_default();
            let name = declared
                .get(&column.to_ascii_lowercase())
                .cloned()
                .unwrap_or_else(|| {
                    names.foreign_key_name(&table.name, &column, &ref_table, &ref_column)
                });
            Ok(ForeignKeyDescription {
                name,
                schema: table.schema.clone(),
                table: table.name.clone(),
                column,
                ref_schema: table.schema.clone(),
                ref_table,
                ref_column,
                on_delete: action(&row, "on_delete")?,
                on_update: action(&row, "on_update")?,
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

/// Maps lower-cased column name to the constraint declared on it.
fn constraint_names(table_sql: &str) -> BTreeMap<String, String> {
    let Some(pattern) = FOREIGN_KEY_CONSTRAINT.as_ref() else {
        return BTreeMap::new();
    };
    pattern
        .captures_iter(table_sql)
        .map(|captures| {
            let name = captures[1].replace("\"\"", "\"");
            let column = captures[2].replace("\"\"", "\"").to_ascii_lowercase();
            (column, name)
        })
        .collect()
}

/// Stored DDL of the table, its indexes and triggers.
pub(crate) fn show_create_table(
    runner: &mut dyn QueryRunner,
    table: &TableName,
) -> Result<Option<String>> {
    let sql = format!(
        "SELECT sql FROM {} WHERE tbl_name = ? COLLATE NOCASE AND sql IS NOT NULL \
         ORDER BY CASE type WHEN 'table' THEN 0 WHEN 'index' THEN 1 ELSE 2 END, name",
        master(table.schema.as_deref())
    );
    let statements = runner
        .fetch_rows(&sql, &[Value::from(table.name.as_str())])?
        .into_iter()
        .filter_map(|row| row.get_string("sql"))
        .collect::<Vec<_>>();
    if statements.is_empty() {
        return Ok(None);
    }
    Ok(Some(statements.join(";\n")))
}

#[cfg(test)]
mod tests {
    use super::constraint_names;

    #[test]
    fn constraint_names_are_read_from_table_sql() {
        let sql = r#"CREATE TABLE "orders" ("id" INTEGER PRIMARY KEY AUTOINCREMENT,
            "customer_id" INTEGER, CONSTRAINT "FK_ORDERS_CUSTOMER" FOREIGN KEY ("Customer_Id")
            REFERENCES "customer" ("id") ON DELETE CASCADE ON UPDATE NO ACTION)"#;
        let names = constraint_names(sql);
        assert_eq!(
            names.get("customer_id").map(String::as_str),
            Some("FK_ORDERS_CUSTOMER")
        );
        assert_eq!(names.len(), 1);
    }
}
