use crate::{ColumnType, IdentPath, Quoting, SqlExpr, TableName, Value};

/// A `WHERE`/`HAVING` fragment. `?` markers are filled with the quoted value.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub sql: String,
    pub value: Option<Value>,
    pub column_type: Option<ColumnType>,
}

impl Condition {
    pub fn new(sql: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            sql: sql.into(),
            value: Some(value.into()),
            column_type: None,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            value: None,
            column_type: None,
        }
    }

    #[must_use]
    pub fn typed(mut self, column_type: ColumnType) -> Self {
        self.column_type = Some(column_type);
        self
    }

    #[must_use]
    pub fn render(&self, quoting: &Quoting) -> String {
        match &self.value {
            Some(value) => quoting.quote_into(&self.sql, value, self.column_type, None),
            None => self.sql.clone(),
        }
    }
}

impl From<&str> for Condition {
    fn from(sql: &str) -> Self {
        Self::raw(sql)
    }
}

impl From<String> for Condition {
    fn from(sql: String) -> Self {
        Self::raw(sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableName,
    pub alias: Option<String>,
    /// Raw join predicate; identifiers are the caller's to quote.
    pub condition: String,
}

impl Join {
    /// `INNER JOIN t AS a ON cond`.
    #[must_use]
    pub fn render(&self, quoting: &Quoting) -> String {
        format!(
            "{} {} ON {}",
            self.kind.as_sql(),
            Select::render_table(quoting, &self.table, self.alias.as_deref()),
            self.condition
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    pub expr: IdentPath,
    pub alias: Option<String>,
}

impl SelectColumn {
    /// Name the column is projected under: the alias, else the last path segment.
    #[must_use]
    pub fn output_name(&self) -> Option<&str> {
        if let Some(alias) = &self.alias {
            return Some(alias);
        }
        match &self.expr {
            IdentPath::Segments(segments) => segments.last().map(String::as_str),
            IdentPath::Expr(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Dialect knobs the renderer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectStyle {
    pub supports_for_update: bool,
    /// `LIMIT` value meaning "no limit", for dialects that need one before `OFFSET`.
    pub unbounded_limit: Option<&'static str>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    distinct: bool,
    from: Option<(TableName, Option<String>)>,
    columns: Vec<SelectColumn>,
    joins: Vec<Join>,
    wheres: Vec<(Conjunction, Condition)>,
    group: Vec<IdentPath>,
    having: Vec<Condition>,
    order: Vec<(IdentPath, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
    for_update: bool,
}

impl Select {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, table: impl Into<TableName>, alias: Option<&str>) -> Self {
        self.from = Some((table.into(), alias.map(str::to_string)));
        self
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    #[must_use]
    pub fn column(mut self, expr: impl Into<IdentPath>) -> Self {
        self.columns.push(SelectColumn {
            expr: expr.into(),
            alias: None,
        });
        self
    }

    #[must_use]
    pub fn column_as(mut self, expr: impl Into<IdentPath>, alias: &str) -> Self {
        self.columns.push(SelectColumn {
            expr: expr.into(),
            alias: Some(alias.to_string()),
        });
        self
    }

    #[must_use]
    pub fn expr_as(self, sql: &str, alias: &str) -> Self {
        self.column_as(SqlExpr::new(sql), alias)
    }

    #[must_use]
    pub fn columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<IdentPath>,
    {
        for column in columns {
            self = self.column(column);
        }
        self
    }

    #[must_use]
    pub fn join(
        mut self,
        kind: JoinKind,
        table: impl Into<TableName>,
        alias: Option<&str>,
        condition: impl Into<String>,
    ) -> Self {
        self.joins.push(Join {
            kind,
            table: table.into(),
            alias: alias.map(str::to_string),
            condition: condition.into(),
        });
        self
    }

    #[must_use]
    pub fn inner_join(
        self,
        table: impl Into<TableName>,
        alias: Option<&str>,
        condition: impl Into<String>,
    ) -> Self {
        self.join(JoinKind::Inner, table, alias, condition)
    }

    #[must_use]
    pub fn left_join(
        self,
        table: impl Into<TableName>,
        alias: Option<&str>,
        condition: impl Into<String>,
    ) -> Self {
        self.join(JoinKind::Left, table, alias, condition)
    }

    #[must_use]
    pub fn where_(mut self, condition: impl Into<Condition>) -> Self {
        self.wheres.push((Conjunction::And, condition.into()));
        self
    }

    #[must_use]
    pub fn or_where(mut self, condition: impl Into<Condition>) -> Self {
        self.wheres.push((Conjunction::Or, condition.into()));
        self
    }

    #[must_use]
    pub fn group(mut self, expr: impl Into<IdentPath>) -> Self {
        self.group.push(expr.into());
        self
    }

    #[must_use]
    pub fn having(mut self, condition: impl Into<Condition>) -> Self {
        self.having.push(condition.into());
        self
    }

    #[must_use]
    pub fn order(mut self, expr: impl Into<IdentPath>, order: Order) -> Self {
        self.order.push((expr.into(), order));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64, offset: Option<u64>) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }

    #[must_use]
    pub fn from_table(&self) -> Option<(&TableName, Option<&str>)> {
        self.from
            .as_ref()
            .map(|(table, alias)| (table, alias.as_deref()))
    }

    #[must_use]
    pub fn selected_columns(&self) -> &[SelectColumn] {
        &self.columns
    }

    #[must_use]
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    #[must_use]
    pub fn has_where(&self) -> bool {
        !self.wheres.is_empty()
    }

    /// Conditions joined by their conjunctions, without the `WHERE` keyword.
    #[must_use]
    pub fn render_where(&self, quoting: &Quoting) -> Option<String> {
        if self.wheres.is_empty() {
            return None;
        }
        let mut rendered = String::new();
        for (position, (conjunction, condition)) in self.wheres.iter().enumerate() {
            if position > 0 {
                rendered.push_str(match conjunction {
                    Conjunction::And => " AND ",
                    Conjunction::Or => " OR ",
                });
            }
            rendered.push('(');
            rendered.push_str(&condition.render(quoting));
            rendered.push(')');
        }
        Some(rendered)
    }

    /// Whether the `FROM` table is known under `alias`, by alias or bare name.
    #[must_use]
    pub fn selects_from(&self, alias: &str) -> bool {
        self.from.as_ref().is_some_and(|(table, from_alias)| {
            from_alias
                .as_deref()
                .unwrap_or(&table.name)
                .eq_ignore_ascii_case(alias)
        })
    }

    /// The `FROM` table followed by its joins, without the `FROM` keyword.
    #[must_use]
    pub fn render_sources(&self, quoting: &Quoting) -> Option<String> {
        let (table, alias) = self.from.as_ref()?;
        let mut sql = Self::render_table(quoting, table, alias.as_deref());
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.render(quoting));
        }
        Some(sql)
    }

    #[must_use]
    pub fn render_table(quoting: &Quoting, table: &TableName, alias: Option<&str>) -> String {
        quoting.quote_identifier_as(table.path(), alias)
    }

    #[must_use]
    pub fn render(&self, quoting: &Quoting, style: SelectStyle) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let columns = self
                .columns
                .iter()
                .map(|column| {
                    quoting.quote_identifier_as(column.expr.clone(), column.alias.as_deref())
                })
                .collect::<Vec<_>>();
            sql.push_str(&columns.join(", "));
        }

        if let Some(sources) = self.render_sources(quoting) {
            sql.push_str(" FROM ");
            sql.push_str(&sources);
        }
        if let Some(conditions) = self.render_where(quoting) {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions);
        }
        if !self.group.is_empty() {
            let group = self
                .group
                .iter()
                .map(|expr| quoting.quote_identifier(expr.clone()))
                .collect::<Vec<_>>();
            sql.push_str(" GROUP BY ");
            sql.push_str(&group.join(", "));
        }
        if !self.having.is_empty() {
            let having = self
                .having
                .iter()
                .map(|condition| format!("({})", condition.render(quoting)))
                .collect::<Vec<_>>();
            sql.push_str(" HAVING ");
            sql.push_str(&having.join(" AND "));
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(expr, order)| {
                    let direction = match order {
                        Order::Asc => "ASC",
                        Order::Desc => "DESC",
                    };
                    format!("{} {direction}", quoting.quote_identifier(expr.clone()))
                })
                .collect::<Vec<_>>();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        match (self.limit, self.offset, style.unbounded_limit) {
            (Some(limit), Some(offset), _) => {
                sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
            }
            (Some(limit), None, _) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset), Some(unbounded)) => {
                sql.push_str(&format!(" LIMIT {unbounded} OFFSET {offset}"));
            }
            (None, Some(offset), None) => sql.push_str(&format!(" OFFSET {offset}")),
            (None, None, _) => {}
        }
        if self.for_update && style.supports_for_update {
            sql.push_str(" FOR UPDATE");
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::{Condition, Order, Select, SelectStyle};
    use crate::Quoting;

    const MYSQL: SelectStyle = SelectStyle {
        supports_for_update: true,
        unbounded_limit: Some("18446744073709551615"),
    };
    const SQLITE: SelectStyle = SelectStyle {
        supports_for_update: false,
        unbounded_limit: Some("-1"),
    };

    #[test]
    fn renders_full_select() {
        let select = Select::new()
            .from("sales_order", Some("o"))
            .columns(["o.entity_id", "o.grand_total"])
            .expr_as("COUNT(i.item_id)", "items")
            .left_join("sales_order_item", Some("i"), "i.order_id = o.entity_id")
            .where_(Condition::new("o.status = ?", "pending"))
            .or_where("o.state IS NULL")
            .group("o.entity_id")
            .order("o.created_at", Order::Desc)
            .limit(10, Some(20))
            .for_update();

        assert_eq!(
            select.render(&Quoting::mysql(), MYSQL),
            "SELECT `o`.`entity_id`, `o`.`grand_total`, COUNT(i.item_id) AS `items` \
             FROM `sales_order` AS `o` \
             LEFT JOIN `sales_order_item` AS `i` ON i.order_id = o.entity_id \
             WHERE (o.status = 'pending') OR (o.state IS NULL) \
             GROUP BY `o`.`entity_id` ORDER BY `o`.`created_at` DESC \
             LIMIT 10 OFFSET 20 FOR UPDATE"
        );
    }

    #[test]
    fn sqlite_drops_for_update_and_uses_unbounded_limit() {
        let select = Select::new().from("t", None).offset(5).for_update();
        assert_eq!(
            select.render(&Quoting::sqlite(), SQLITE),
            "SELECT * FROM \"t\" LIMIT -1 OFFSET 5"
        );
    }

    #[test]
    fn output_names_prefer_alias() {
        let select = Select::new().column("o.sku").column_as("o.qty", "amount");
        let names = select
            .selected_columns()
            .iter()
            .map(|column| column.output_name())
            .collect::<Vec<_>>();
        assert_eq!(names, vec![Some("sku"), Some("amount")]);
    }
}
