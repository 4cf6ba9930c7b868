use std::collections::{BTreeMap, BTreeSet};

use sqlbridge_core::{
    ColumnDescription, ColumnType, ForeignKeyAction, ForeignKeyDescription, IndexDescription,
    IndexType, NameBuilder, QueryRunner, Result, Row, TableName, Value,
};

use crate::{QUOTING, types};

pub(crate) const SERVER_VERSION_QUERY: &str = "SHOW server_version";

/// Resolves the table through the search path, so unqualified names find
/// temporary tables as well.
const RELATION_FILTER: &str = "c.oid = pg_catalog.to_regclass(?)";

const COLUMNS_QUERY: &str = r"
SELECT
  a.attname AS column_name,
  a.attnum AS ordinal_position,
  pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
  pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS column_default,
  NOT a.attnotnull AS is_nullable,
  a.attidentity AS identity_kind,
  pg_catalog.col_description(c.oid, a.attnum) AS column_comment,
  n.nspname AS table_schema
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum";

const INDEXES_QUERY: &str = r"
SELECT
  ic.relname AS index_name,
  i.indisprimary AS is_primary,
  i.indisunique AS is_unique,
  am.amname AS index_method,
  pg_catalog.pg_get_indexdef(i.indexrelid, k.seq, true) AS column_name,
  k.seq AS seq_in_index
FROM pg_catalog.pg_index i
JOIN pg_catalog.pg_class c ON c.oid = i.indrelid
JOIN pg_catalog.pg_class ic ON ic.oid = i.indexrelid
JOIN pg_catalog.pg_am am ON am.oid = ic.relam
CROSS JOIN LATERAL generate_series(1, i.indnkeyatts) AS k(seq)";

const FOREIGN_KEYS_QUERY: &str = r"
SELECT
  con.conname AS constraint_name,
  a.attname AS column_name,
  rn.nspname AS ref_schema,
  rc.relname AS ref_table,
  ra.attname AS ref_column,
  con.confdeltype AS delete_rule,
  con.confupdtype AS update_rule
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace
JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = con.conkey[1]
JOIN pg_catalog.pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = con.confkey[1]";

fn relation_params(table: &TableName) -> [Value; 1] {
    [Value::from(QUOTING.quote_identifier(table.path()))]
}

pub(crate) fn list_tables(
    runner: &mut dyn QueryRunner,
    schema: Option<&str>,
) -> Result<Vec<String>> {
    let sql = "SELECT c.relname AS table_name FROM pg_catalog.pg_class c \
               JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
               WHERE n.nspname = COALESCE(?, current_schema()) AND c.relkind IN ('r', 'p') \
               ORDER BY c.relname ASC";
    let params = [schema.map_or(Value::Null, Value::from)];
    Ok(runner
        .fetch_rows(sql, &params)?
        .into_iter()
        .filter_map(|row| row.get_string("table_name"))
        .collect())
}

pub(crate) fn table_exists(runner: &mut dyn QueryRunner, table: &TableName) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM pg_catalog.pg_class c WHERE {RELATION_FILTER} AND c.relkind IN ('r', 'p')"
    );
    let result = runner.fetch(&sql, &relation_params(table))?;
    Ok(!result.rows.is_empty())
}

fn primary_positions(
    runner: &mut dyn QueryRunner,
    table: &TableName,
) -> Result<BTreeMap<String, u32>> {
    let sql = format!(
        "SELECT a.attname AS column_name, k.seq AS key_position \
         FROM pg_catalog.pg_index i \
         JOIN pg_catalog.pg_class c ON c.oid = i.indrelid \
         CROSS JOIN LATERAL generate_series(1, i.indnkeyatts) AS k(seq) \
         JOIN pg_catalog.pg_attribute a \
           ON a.attrelid = c.oid AND a.attnum = i.indkey[k.seq - 1] \
         WHERE {RELATION_FILTER} AND i.indisprimary"
    );
    Ok(runner
        .fetch_rows(&sql, &relation_params(table))?
        .into_iter()
        .filter_map(|row| {
            let position = u32::try_from(row.get_i64("key_position")?).ok()?;
            Some((row.get_string("column_name")?.to_ascii_lowercase(), position))
        })
        .collect())
}

fn trigger_names(runner: &mut dyn QueryRunner, table: &TableName) -> Result<BTreeSet<String>> {
    let sql = format!(
        "SELECT t.tgname AS trigger_name FROM pg_catalog.pg_trigger t \
         JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid \
         WHERE {RELATION_FILTER} AND NOT t.tgisinternal"
    );
    Ok(runner
        .fetch_rows(&sql, &relation_params(table))?
        .into_iter()
        .filter_map(|row| row.get_string("trigger_name"))
        .collect())
}

/// Live columns in ordinal order. A column counts as refreshed on update
/// when the trigger generated for it is present.
pub(crate) fn describe_table(
    runner: &mut dyn QueryRunner,
    table: &TableName,
    names: NameBuilder,
) -> Result<Vec<ColumnDescription>> {
    let sql = format!(
        "{COLUMNS_QUERY} WHERE {RELATION_FILTER} AND a.attnum > 0 AND NOT a.attisdropped \
         ORDER BY a.attnum"
    );
    let rows = runner.fetch_rows(&sql, &relation_params(table))?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let primary = primary_positions(runner, table)?;
    let triggers = trigger_names(runner, table)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let mut column = column_description(table, &row, &primary);
            let trigger = names.on_update_trigger_name(&table.name, &column.name);
            if triggers.contains(&trigger) {
                column.extra = Some("on update CURRENT_TIMESTAMP".to_string());
            }
            column
        })
        .collect())
}

fn column_description(
    table: &TableName,
    row: &Row,
    primary: &BTreeMap<String, u32>,
) -> ColumnDescription {
    let name = row.get_string("column_name").unwrap_or_default();
    let data_type = row.get_string("data_type").unwrap_or_default();
    let (_, params) = types::split_format_type(&data_type);
    let column_type = types::reverse_type(&data_type).column_type();
    let length = match column_type {
        ColumnType::Varchar => params.first().copied(),
        _ => None,
    };
    let (precision, scale) = if column_type.is_decimal() {
        (
            params.first().and_then(|value| u32::try_from(*value).ok()),
            params.get(1).and_then(|value| u32::try_from(*value).ok()),
        )
    } else {
        (None, None)
    };
    let default = row.get_string("column_default");
    let identity = row
        .get_str("identity_kind")
        .is_some_and(|kind| matches!(kind, "a" | "d"))
        || default
            .as_deref()
            .is_some_and(|default| default.starts_with("nextval("));
    let primary_position = primary.get(&name.to_ascii_lowercase()).copied();

    ColumnDescription {
        schema: row.get_string("table_schema").or_else(|| table.schema.clone()),
        table: table.name.clone(),
        position: row
            .get_i64("ordinal_position")
            .and_then(|position| u32::try_from(position).ok())
            .unwrap_or(0),
        default,
        nullable: row.get_bool("is_nullable").unwrap_or(true),
        length,
        precision,
        scale,
        unsigned: false,
        primary: primary_position.is_some(),
        primary_position,
        identity,
        comment: row
            .get_string("column_comment")
            .filter(|comment| !comment.is_empty()),
        extra: None,
        data_type,
        name,
    }
}

/// Indexes keyed by name in first-seen order, primary key first. Full-text
/// indexes are GIN indexes over `to_tsvector(...)`; the indexed column is
/// read back out of the expression.
pub(crate) fn index_list(
    runner: &mut dyn QueryRunner,
    table: &TableName,
) -> Result<Vec<IndexDescription>> {
    let sql = format!(
        "{INDEXES_QUERY} WHERE {RELATION_FILTER} \
         ORDER BY i.indisprimary DESC, ic.relname, k.seq"
    );
    let mut indexes: Vec<IndexDescription> = Vec::new();
    for row in runner.fetch_rows(&sql, &relation_params(table))? {
        let Some(name) = row.get_string("index_name") else {
            continue;
        };
        let raw_column = row.get_string("column_name").unwrap_or_default();
        let method = row.get_string("index_method");
        let fulltext = method.as_deref() == Some("gin") && raw_column.starts_with("to_tsvector(");
        let column = if fulltext {
            tsvector_column(&raw_column)
        } else {
            unquote(&raw_column)
        };
        if let Some(index) = indexes.iter_mut().find(|index| index.name == name) {
            index.columns.push(column);
            continue;
        }
        let index_type = if row.get_bool("is_primary") == Some(true) {
            IndexType::Primary
        } else if fulltext {
            IndexType::Fulltext
        } else if row.get_bool("is_unique") == Some(true) {
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

/// `to_tsvector('simple'::regconfig, body)` -> `body`.
fn tsvector_column(expression: &str) -> String {
    let inner = expression
        .trim_start_matches("to_tsvector(")
        .trim_end_matches(')');
    let last = inner.rsplit(',').next().unwrap_or(inner).trim();
    let last = last.split("::").next().unwrap_or(last).trim();
    unquote(last.trim_start_matches('(').trim_end_matches(')'))
}

fn unquote(identifier: &str) -> String {
    identifier
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .map_or_else(|| identifier.to_string(), |inner| inner.replace("\"\"", "\""))
}

pub(crate) fn foreign_keys(
    runner: &mut dyn QueryRunner,
    table: &TableName,
) -> Result<Vec<ForeignKeyDescription>> {
    let sql = format!(
        "{FOREIGN_KEYS_QUERY} WHERE {RELATION_FILTER} AND con.contype = 'f' \
         ORDER BY con.conname"
    );
    Ok(runner
        .fetch_rows(&sql, &relation_params(table))?
        .into_iter()
        .map(|row| ForeignKeyDescription {
            name: row.get_string("constraint_name").unwrap_or_default(),
            schema: table.schema.clone(),
            table: table.name.clone(),
            column: row.get_string("column_name").unwrap_or_default(),
            ref_schema: row.get_string("ref_schema"),
            ref_table: row.get_string("ref_table").unwrap_or_default(),
            ref_column: row.get_string("ref_column").unwrap_or_default(),
            on_delete: action(row.get_str("delete_rule")),
            on_update: action(row.get_str("update_rule")),
        })
        .collect())
}

/// `pg_constraint` stores referential actions as single letters.
fn action(code: Option<&str>) -> ForeignKeyAction {
    match code {
        Some("c") => ForeignKeyAction::Cascade,
        Some("n") => ForeignKeyAction::SetNull,
        Some("r") => ForeignKeyAction::Restrict,
        Some("d") => ForeignKeyAction::SetDefault,
        _ => ForeignKeyAction::NoAction,
    }
}

pub(crate) fn table_comment(
    runner: &mut dyn QueryRunner,
    table: &TableName,
) -> Result<Option<String>> {
    let sql = format!(
        "SELECT pg_catalog.obj_description(c.oid, 'pg_class') AS table_comment \
         FROM pg_catalog.pg_class c WHERE {RELATION_FILTER}"
    );
    Ok(runner
        .fetch_rows(&sql, &relation_params(table))?
        .into_iter()
        .find_map(|row| row.get_string("table_comment"))
        .filter(|comment| !comment.is_empty()))
}

#[cfg(test)]
mod tests {
    use sqlbridge_core::ForeignKeyAction;

    use super::{action, tsvector_column, unquote};

    #[test]
    fn fulltext_expressions_yield_their_column() {
        assert_eq!(
            tsvector_column("to_tsvector('simple'::regconfig, body)"),
            "body"
        );
        assert_eq!(
            tsvector_column("to_tsvector('simple'::regconfig, \"Body\"::text)"),
            "Body"
        );
        assert_eq!(unquote("\"odd\"\"name\""), "odd\"name");
    }

    #[test]
    fn referential_action_codes() {
        assert_eq!(action(Some("c")), ForeignKeyAction::Cascade);
        assert_eq!(action(Some("n")), ForeignKeyAction::SetNull);
        assert_eq!(action(Some("a")), ForeignKeyAction::NoAction);
        assert_eq!(action(None), ForeignKeyAction::NoAction);
    }
}
