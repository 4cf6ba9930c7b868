use sqlbridge_core::{
    BoundQuery, ConfigError, Insert, InsertMode, Quoting, Result, Select, SelectStyle,
    TableName, UpdateField, joined_sources, select_assignments, upsert_clause,
};

const UPDATE_FROM_SELECT: &str = "update from select";
const DELETE_FROM_SELECT: &str = "delete from select";
const EXCLUDED_ROW: &str = "excluded";

fn insert_verb(mode: &InsertMode) -> &'static str {
    match mode {
        InsertMode::Plain | InsertMode::Update(_) => "INSERT INTO",
        InsertMode::Ignore => "INSERT OR IGNORE INTO",
        InsertMode::Replace => "INSERT OR REPLACE INTO",
    }
}

pub(crate) fn insert(quoting: &Quoting, insert: &Insert) -> Result<BoundQuery> {
    insert.validate()?;
    let mut bound = insert.render_values(insert_verb(&insert.mode), quoting);
    if let InsertMode::Update(_) = insert.mode {
        let fields = insert.update_fields();
        let clause = upsert_clause(
            quoting,
            &insert.table,
            &insert.columns,
            &fields,
            &insert.unique_keys,
            EXCLUDED_ROW,
            Some(&mut bound.params),
        )?;
        bound.sql.push_str(&clause);
    }
    Ok(bound)
}

/// An upsert over a select needs a `WHERE` so the parser does not read
/// `ON CONFLICT` as a join constraint.
pub(crate) fn insert_from_select(
    quoting: &Quoting,
    style: SelectStyle,
    select: &Select,
    table: &TableName,
    columns: &[String],
    mode: &InsertMode,
    unique_keys: &[Vec<String>],
) -> Result<String> {
    let upsert = matches!(mode, InsertMode::Update(_));
    let select_sql = if upsert && !select.has_where() {
        select.clone().where_("1").render(quoting, style)
    } else {
        select.render(quoting, style)
    };
    let mut sql = format!(
        "{} {}",
        insert_verb(mode),
        quoting.quote_identifier(table.path())
    );
    if !columns.is_empty() {
        let list = columns
            .iter()
            .map(|column| quoting.quote_segment(column))
            .collect::<Vec<_>>();
        sql.push_str(&format!(" ({})", list.join(", ")));
    }
    sql.push(' ');
    sql.push_str(&select_sql);

    if let InsertMode::Update(fields) = mode {
        let inserted = if columns.is_empty() {
            select
                .selected_columns()
                .iter()
                .filter_map(|column| column.output_name().map(str::to_string))
                .collect()
        } else {
            columns.to_vec()
        };
        let fields = if fields.is_empty() {
            inserted
                .iter()
                .map(|column| UpdateField::column(column.as_str()))
                .collect()
        } else {
            fields.clone()
        };
        sql.push_str(&upsert_clause(
            quoting,
            table,
            &inserted,
            &fields,
            unique_keys,
            EXCLUDED_ROW,
            None,
        )?);
    }
    Ok(sql)
}

/// `UPDATE t AS a SET x = ... FROM <other sources> WHERE ...`; assignment
/// targets stay unqualified.
pub(crate) fn update_from_select(
    quoting: &Quoting,
    select: &Select,
    table: &TableName,
    alias: &str,
) -> Result<String> {
    let assignments = select_assignments(select, quoting, None)?;
    let sources = joined_sources(select, quoting, alias, UPDATE_FROM_SELECT)?;
    let mut sql = format!(
        "UPDATE {} SET {}",
        quoting.quote_identifier_as(table.path(), Some(alias)),
        assignments.join(", ")
    );
    if let Some(from) = &sources.from {
        sql.push_str(" FROM ");
        sql.push_str(from);
    }
    sql.push_str(&sources.where_clause());
    Ok(sql)
}

/// Deletes by rowid, since `DELETE` takes neither joins nor an alias.
pub(crate) fn delete_from_select(
    quoting: &Quoting,
    select: &Select,
    table: &TableName,
    alias: &str,
) -> Result<String> {
    let sources = if select.selects_from(alias) {
        select.render_sources(quoting)
    } else {
        select.render_sources(quoting).map(|sources| {
            format!(
                "{}, {sources}",
                quoting.quote_identifier_as(table.path(), Some(alias))
            )
        })
    };
    let sources = sources.ok_or(ConfigError::IncompleteSelect {
        operation: DELETE_FROM_SELECT,
        part: "source table",
    })?;
    let mut sql = format!(
        "DELETE FROM {} WHERE rowid IN (SELECT {}.rowid FROM {sources}",
        quoting.quote_identifier(table.path()),
        quoting.quote_segment(alias)
    );
    if let Some(conditions) = select.render_where(quoting) {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions);
    }
    sql.push(')');
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use sqlbridge_core::{Insert, InsertMode, Quoting, Select, UpdateField, Value};

    use super::{delete_from_select, insert, update_from_select};

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| (*item).to_string()).collect()
    }

    #[test]
    fn upsert_targets_the_inferred_unique_key() {
        let upsert = Insert::new(
            "t",
            names(&["sku", "qty"]),
            vec![vec![Value::from("ABC"), Value::from(5)]],
        )
        .mode(InsertMode::Update(vec![UpdateField::column("qty")]))
        .unique_keys(vec![names(&["id"]), names(&["sku"])]);
        let bound = insert(&Quoting::sqlite(), &upsert).expect("upsert renders");
        assert_eq!(
            bound.sql,
            "INSERT INTO \"t\" (\"sku\", \"qty\") VALUES (?, ?) \
             ON CONFLICT (\"sku\") DO UPDATE SET \"qty\" = excluded.\"qty\""
        );
        assert_eq!(bound.params, vec![Value::from("ABC"), Value::from(5)]);
    }

    #[test]
    fn ignore_and_replace_use_conflict_keywords() {
        let row = vec![vec![Value::from(1)]];
        let ignore = Insert::new("t", names(&["id"]), row.clone()).mode(InsertMode::Ignore);
        let replace = Insert::new("t", names(&["id"]), row).mode(InsertMode::Replace);
        let quoting = Quoting::sqlite();
        assert!(
            insert(&quoting, &ignore)
                .expect("ignore renders")
                .sql
                .starts_with("INSERT OR IGNORE INTO")
        );
        assert!(
            insert(&quoting, &replace)
                .expect("replace renders")
                .sql
                .starts_with("INSERT OR REPLACE INTO")
        );
    }

    #[test]
    fn update_from_select_moves_the_join_into_from() {
        let select = Select::new()
            .from("orders", Some("o"))
            .inner_join("customer", Some("c"), "c.id = o.customer_id")
            .column_as("c.email", "email")
            .where_("c.active = 1");
        let sql = update_from_select(&Quoting::sqlite(), &select, &"orders".into(), "o")
            .expect("update renders");
        assert_eq!(
            sql,
            "UPDATE \"orders\" AS \"o\" SET \"email\" = \"c\".\"email\" \
             FROM \"customer\" AS \"c\" WHERE (c.id = o.customer_id) AND ((c.active = 1))"
        );
    }

    #[test]
    fn delete_from_select_filters_by_rowid() {
        let select = Select::new()
            .from("orders", Some("o"))
            .inner_join("customer", Some("c"), "c.id = o.customer_id")
            .where_("c.active = 0");
        let sql = delete_from_select(&Quoting::sqlite(), &select, &"orders".into(), "o")
            .expect("delete renders");
        assert_eq!(
            sql,
            "DELETE FROM \"orders\" WHERE rowid IN (SELECT \"o\".rowid FROM \"orders\" AS \"o\" \
             INNER JOIN \"customer\" AS \"c\" ON c.id = o.customer_id WHERE (c.active = 0))"
        );
    }
}
