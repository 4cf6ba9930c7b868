use sqlbridge_core::{
    BoundQuery, ConfigError, Insert, InsertMode, Quoting, Result, Select, SelectStyle,
    TableName, UpdateField, UpdateValue, Value, select_assignments,
};

const UPDATE_FROM_SELECT: &str = "update from select";
const DELETE_FROM_SELECT: &str = "delete from select";

fn insert_verb(mode: &InsertMode) -> &'static str {
    match mode {
        InsertMode::Plain | InsertMode::Update(_) => "INSERT INTO",
        InsertMode::Ignore => "INSERT IGNORE INTO",
        InsertMode::Replace => "REPLACE INTO",
    }
}

pub(crate) fn insert(quoting: &Quoting, insert: &Insert) -> Result<BoundQuery> {
    insert.validate()?;
    let mut bound = insert.render_values(insert_verb(&insert.mode), quoting);
    if let InsertMode::Update(_) = insert.mode {
        let clause = on_duplicate_clause(quoting, &insert.update_fields(), Some(&mut bound.params));
        bound.sql.push_str(&clause);
    }
    Ok(bound)
}

/// `ON DUPLICATE KEY UPDATE`; the server resolves the key itself. Literal
/// values are bound when `params` is given and inlined otherwise.
fn on_duplicate_clause(
    quoting: &Quoting,
    fields: &[UpdateField],
    mut params: Option<&mut Vec<Value>>,
) -> String {
    let assignments = fields
        .iter()
        .map(|field| {
            let target = quoting.quote_segment(&field.column);
            match &field.value {
                UpdateValue::Inserted(source) => {
                    format!("{target} = VALUES({})", quoting.quote_segment(source))
                }
                UpdateValue::Value(Value::Expr(expr)) => format!("{target} = {expr}"),
                UpdateValue::Value(value) => match params.as_deref_mut() {
                    Some(params) => {
                        params.push(value.clone());
                        format!("{target} = ?")
                    }
                    None => format!("{target} = {}", quoting.quote_value(value, None)),
                },
            }
        })
        .collect::<Vec<_>>();
    format!(" ON DUPLICATE KEY UPDATE {}", assignments.join(", "))
}

pub(crate) fn insert_from_select(
    quoting: &Quoting,
    style: SelectStyle,
    select: &Select,
    table: &TableName,
    columns: &[String],
    mode: &InsertMode,
) -> Result<String> {
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
    sql.push_str(&select.render(quoting, style));

    if let InsertMode::Update(fields) = mode {
        let fields = if fields.is_empty() {
            let inserted = if columns.is_empty() {
                select
                    .selected_columns()
                    .iter()
                    .filter_map(|column| column.output_name().map(str::to_string))
                    .collect()
            } else {
                columns.to_vec()
            };
            inserted
                .iter()
                .map(|column| UpdateField::column(column.as_str()))
                .collect::<Vec<_>>()
        } else {
            fields.clone()
        };
        if fields.is_empty() {
            return Err(ConfigError::IncompleteSelect {
                operation: "insert from select",
                part: "columns to update",
            }
            .into());
        }
        sql.push_str(&on_duplicate_clause(quoting, &fields, None));
    }
    Ok(sql)
}

/// Every source of the statement: the select's own tables when it reads
/// from the target alias, otherwise the target joined in front of them.
fn multi_table_sources(
    quoting: &Quoting,
    select: &Select,
    table: &TableName,
    alias: &str,
    operation: &'static str,
) -> Result<String> {
    let target = quoting.quote_identifier_as(table.path(), Some(alias));
    if select.selects_from(alias) {
        return select.render_sources(quoting).ok_or_else(|| {
            ConfigError::IncompleteSelect {
                operation,
                part: "source table",
            }
            .into()
        });
    }
    Ok(match select.render_sources(quoting) {
        Some(sources) => format!("{target}, {sources}"),
        None => target,
    })
}

/// `UPDATE t AS a INNER JOIN ... SET a.x = ... WHERE ...`.
pub(crate) fn update_from_select(
    quoting: &Quoting,
    select: &Select,
    table: &TableName,
    alias: &str,
) -> Result<String> {
    let assignments = select_assignments(select, quoting, Some(alias))?;
    let sources = multi_table_sources(quoting, select, table, alias, UPDATE_FROM_SELECT)?;
    let mut sql = format!("UPDATE {sources} SET {}", assignments.join(", "));
    if let Some(conditions) = select.render_where(quoting) {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions);
    }
    Ok(sql)
}

/// `DELETE a FROM t AS a INNER JOIN ... WHERE ...`.
pub(crate) fn delete_from_select(
    quoting: &Quoting,
    select: &Select,
    table: &TableName,
    alias: &str,
) -> Result<String> {
    let sources = multi_table_sources(quoting, select, table, alias, DELETE_FROM_SELECT)?;
    let mut sql = format!("DELETE {} FROM {sources}", quoting.quote_segment(alias));
    if let Some(conditions) = select.render_where(quoting) {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions);
    }
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
    fn upsert_references_the_inserted_values() {
        let upsert = Insert::new(
            "t",
            names(&["sku", "qty"]),
            vec![vec![Value::from("ABC"), Value::from(5)]],
        )
        .mode(InsertMode::Update(vec![
            UpdateField::column("qty"),
            UpdateField::set("note", "bumped"),
        ]));
        let bound = insert(&Quoting::mysql(), &upsert).expect("upsert renders");
        assert_eq!(
            bound.sql,
            "INSERT INTO `t` (`sku`, `qty`) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE `qty` = VALUES(`qty`), `note` = ?"
        );
        assert_eq!(
            bound.params,
            vec![Value::from("ABC"), Value::from(5), Value::from("bumped")]
        );
    }

    #[test]
    fn ignore_and_replace_use_their_own_verbs() {
        let row = vec![vec![Value::from(1)]];
        let quoting = Quoting::mysql();
        let ignore = Insert::new("t", names(&["id"]), row.clone()).mode(InsertMode::Ignore);
        let replace = Insert::new("t", names(&["id"]), row).mode(InsertMode::Replace);
        assert_eq!(
            insert(&quoting, &ignore).expect("ignore renders").sql,
            "INSERT IGNORE INTO `t` (`id`) VALUES (?)"
        );
        assert_eq!(
            insert(&quoting, &replace).expect("replace renders").sql,
            "REPLACE INTO `t` (`id`) VALUES (?)"
        );
    }

    #[test]
    fn update_from_select_joins_in_place() {
        let select = Select::new()
            .from("orders", Some("o"))
            .inner_join("customer", Some("c"), "c.id = o.customer_id")
            .column_as("c.email", "email")
            .where_("c.active = 1");
        let sql = update_from_select(&Quoting::mysql(), &select, &"orders".into(), "o")
            .expect("update renders");
        assert_eq!(
            sql,
            "UPDATE `orders` AS `o` INNER JOIN `customer` AS `c` ON c.id = o.customer_id \
             SET `o`.`email` = `c`.`email` WHERE (c.active = 1)"
        );
    }

    #[test]
    fn delete_from_select_names_the_target_alias() {
        let select = Select::new()
            .from("customer", Some("c"))
            .where_("c.id = o.customer_id")
            .where_("c.active = 0");
        let sql = delete_from_select(&Quoting::mysql(), &select, &"orders".into(), "o")
            .expect("delete renders");
        assert_eq!(
            sql,
            "DELETE `o` FROM `orders` AS `o`, `customer` AS `c` \
             WHERE (c.id = o.customer_id) AND (c.active = 0)"
        );
    }
}
