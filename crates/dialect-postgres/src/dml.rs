use sqlbridge_core::{
    BoundQuery, Insert, InsertMode, Quoting, Result, Select, SelectStyle, TableName,
    UpdateField, joined_sources, select_assignments, upsert_clause,
};

const UPDATE_FROM_SELECT: &str = "update from select";
const DELETE_FROM_SELECT: &str = "delete from select";
const EXCLUDED_ROW: &str = "EXCLUDED";

/// Every mode shares the plain verb; conflicts are handled by the
/// `ON CONFLICT` tail. Replace overwrites every inserted column.
pub(crate) fn insert(quoting: &Quoting, insert: &Insert) -> Result<BoundQuery> {
    insert.validate()?;
    let mut bound = insert.render_values("INSERT INTO", quoting);
    match &insert.mode {
        InsertMode::Plain => {}
        InsertMode::Ignore => bound.sql.push_str(" ON CONFLICT DO NOTHING"),
        InsertMode::Update(_) | InsertMode::Replace => {
            let clause = upsert_clause(
                quoting,
                &insert.table,
                &insert.columns,
                &insert.update_fields(),
                &insert.unique_keys,
                EXCLUDED_ROW,
                Some(&mut bound.params),
            )?;
            bound.sql.push_str(&clause);
        }
    }
    if let Some(column) = &insert.returning {
        bound.sql.push_str(" RETURNING ");
        bound.sql.push_str(&quoting.quote_segment(column));
    }
    Ok(bound)
}

pub(crate) fn insert_from_select(
    quoting: &Quoting,
    style: SelectStyle,
    select: &Select,
    table: &TableName,
    columns: &[String],
    mode: &InsertMode,
    unique_keys: &[Vec<String>],
) -> Result<String> {
    let mut sql = format!("INSERT INTO {}", quoting.quote_identifier(table.path()));
    if !columns.is_empty() {
        let list = columns
            .iter()
            .map(|column| quoting.quote_segment(column))
            .collect::<Vec<_>>();
        sql.push_str(&format!(" ({})", list.join(", ")));
    }
    sql.push(' ');
    sql.push_str(&select.render(quoting, style));

    let explicit: &[UpdateField] = match mode {
        InsertMode::Plain => return Ok(sql),
        InsertMode::Ignore => {
            sql.push_str(" ON CONFLICT DO NOTHING");
            return Ok(sql);
        }
        InsertMode::Update(fields) => fields,
        InsertMode::Replace => &[],
    };
    let inserted = if columns.is_empty() {
        select
            .selected_columns()
            .iter()
            .filter_map(|column| column.output_name().map(str::to_string))
            .collect()
    } else {
        columns.to_vec()
    };
    let fields = if explicit.is_empty() {
        inserted
            .iter()
            .map(|column| UpdateField::column(column.as_str()))
            .collect()
    } else {
        explicit.to_vec()
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

/// `DELETE FROM t AS a USING <other sources> WHERE ...`.
pub(crate) fn delete_from_select(
    quoting: &Quoting,
    select: &Select,
    table: &TableName,
    alias: &str,
) -> Result<String> {
    let sources = joined_sources(select, quoting, alias, DELETE_FROM_SELECT)?;
    let mut sql = format!(
        "DELETE FROM {}",
        quoting.quote_identifier_as(table.path(), Some(alias))
    );
    if let Some(from) = &sources.from {
        sql.push_str(" USING ");
        sql.push_str(from);
    }
    sql.push_str(&sources.where_clause());
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
    fn upsert_binds_literals_and_returns_the_identity() {
        let upsert = Insert::new(
            "stock",
            names(&["sku", "qty"]),
            vec![vec![Value::from("ABC"), Value::from(5)]],
        )
        .mode(InsertMode::Update(vec![
            UpdateField::column("qty"),
            UpdateField::set("note", "restocked"),
        ]))
        .unique_keys(vec![names(&["id"]), names(&["sku"])])
        .returning(Some("id".to_string()));
        let bound = insert(&Quoting::postgres(), &upsert).expect("upsert renders");
        assert_eq!(
            bound.sql,
            "INSERT INTO \"stock\" (\"sku\", \"qty\") VALUES (?, ?) \
             ON CONFLICT (\"sku\") DO UPDATE SET \"qty\" = EXCLUDED.\"qty\", \"note\" = ? \
             RETURNING \"id\""
        );
        assert_eq!(
            bound.params,
            vec![Value::from("ABC"), Value::from(5), Value::from("restocked")]
        );
    }

    #[test]
    fn ignore_does_nothing_on_any_conflict() {
        let ignore = Insert::new("t", names(&["id"]), vec![vec![Value::from(1)]])
            .mode(InsertMode::Ignore);
        let bound = insert(&Quoting::postgres(), &ignore).expect("ignore renders");
        assert_eq!(
            bound.sql,
            "INSERT INTO \"t\" (\"id\") VALUES (?) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn replace_overwrites_every_inserted_column() {
        let replace = Insert::new(
            "t",
            names(&["id", "name"]),
            vec![vec![Value::from(1), Value::from("a")]],
        )
        .mode(InsertMode::Replace)
        .unique_keys(vec![names(&["id"])]);
        let bound = insert(&Quoting::postgres(), &replace).expect("replace renders");
        assert!(bound.sql.ends_with(
            "ON CONFLICT (\"id\") DO UPDATE SET \"id\" = EXCLUDED.\"id\", \
             \"name\" = EXCLUDED.\"name\""
        ));
    }

    #[test]
    fn update_from_select_moves_the_join_into_from() {
        let select = Select::new()
            .from("orders", Some("o"))
            .inner_join("customer", Some("c"), "c.id = o.customer_id")
            .column_as("c.email", "email")
            .where_("c.active = 1");
        let sql = update_from_select(&Quoting::postgres(), &select, &"orders".into(), "o")
            .expect("update renders");
        assert_eq!(
            sql,
            "UPDATE \"orders\" AS \"o\" SET \"email\" = \"c\".\"email\" \
             FROM \"customer\" AS \"c\" WHERE (c.id = o.customer_id) AND ((c.active = 1))"
        );
    }

    #[test]
    fn delete_from_select_uses_the_join_as_using() {
        let select = Select::new()
            .from("orders", Some("o"))
            .inner_join("customer", Some("c"), "c.id = o.customer_id")
            .where_("c.active = 0");
        let sql = delete_from_select(&Quoting::postgres(), &select, &"orders".into(), "o")
            .expect("delete renders");
        assert_eq!(
            sql,
            "DELETE FROM \"orders\" AS \"o\" USING \"customer\" AS \"c\" \
             WHERE (c.id = o.customer_id) AND ((c.active = 0))"
        );
    }
}
