use tracing::debug;

use super::Adapter;
use crate::{
    Condition, Insert, InsertMode, QueryKind, Result, Select, TableName, UpdateField, Value,
};

impl Adapter {
    /// Inserts one row given as column/value pairs. Returns affected rows.
    pub fn insert(&mut self, table: impl Into<TableName>, row: &[(&str, Value)]) -> Result<u64> {
        let columns = row.iter().map(|(column, _)| (*column).to_string()).collect();
        let values = row.iter().map(|(_, value)| value.clone()).collect();
        self.execute_insert(Insert::new(table, columns, vec![values]))
    }

    pub fn insert_multiple(
        &mut self,
        table: impl Into<TableName>,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Result<u64> {
        self.execute_insert(Insert::new(table, owned(columns), rows))
    }

    /// Inserts rows, updating `fields` of rows that collide with a unique key.
    /// An empty `fields` list updates every inserted column.
    pub fn insert_on_duplicate(
        &mut self,
        table: impl Into<TableName>,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
        fields: Vec<UpdateField>,
    ) -> Result<u64> {
        let insert = Insert::new(table, owned(columns), rows).mode(InsertMode::Update(fields));
        self.execute_insert(insert)
    }

    /// Inserts rows, skipping those that collide with a unique key.
    pub fn insert_ignore(
        &mut self,
        table: impl Into<TableName>,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Result<u64> {
        let insert = Insert::new(table, owned(columns), rows).mode(InsertMode::Ignore);
        self.execute_insert(insert)
    }

    /// Runs a prepared insert. Unique keys and the identity column are looked
    /// up when the dialect needs them and the caller left them unset.
    pub fn execute_insert(&mut self, mut insert: Insert) -> Result<u64> {
        insert.validate()?;
        if resolves_conflicts(&insert.mode)
            && self.dialect.needs_conflict_target()
            && insert.unique_keys.is_empty()
        {
            insert.unique_keys = self.unique_keys(&insert.table)?;
        }
        if self.dialect.returns_identity() && insert.returning.is_none() {
            insert.returning = self.identity_column(&insert.table)?;
        }

        let bound = self.dialect.insert(&insert)?;
        let result = self.run(QueryKind::Query, &bound.sql, &bound.params)?;
        self.last_insert_id = if insert.returning.is_some() {
            result
                .rows
                .last()
                .and_then(|row| row.first())
                .and_then(Value::as_i64)
        } else {
            self.connection
                .as_mut()
                .and_then(|connection| connection.last_insert_id())
        };
        debug!(
            table = %insert.table,
            rows = insert.rows.len(),
            affected = result.affected_rows,
            last_insert_id = ?self.last_insert_id,
            "insert executed"
        );
        Ok(result.affected_rows)
    }

    /// `INSERT INTO table (columns) SELECT ...`, with the same conflict
    /// handling as the row inserts.
    pub fn insert_from_select(
        &mut self,
        select: &Select,
        table: impl Into<TableName>,
        columns: &[&str],
        mode: InsertMode,
    ) -> Result<u64> {
        let table = table.into();
        let unique_keys = if resolves_conflicts(&mode) && self.dialect.needs_conflict_target() {
            self.unique_keys(&table)?
        } else {
            Vec::new()
        };
        let sql =
            self.dialect
                .insert_from_select(select, &table, &owned(columns), &mode, &unique_keys)?;
        Ok(self.run(QueryKind::Query, &sql, &[])?.affected_rows)
    }

    /// Plain values are bound; `Value::Expr` assignments are inlined.
    pub fn update(
        &mut self,
        table: impl Into<TableName>,
        assignments: &[(&str, Value)],
        conditions: &[Condition],
    ) -> Result<u64> {
        let table = table.into();
        let assignments = assignments
            .iter()
            .map(|(column, value)| ((*column).to_string(), value.clone()))
            .collect::<Vec<_>>();
        let bound = self.dialect.update(&table, &assignments, conditions)?;
        Ok(self.run(QueryKind::Query, &bound.sql, &bound.params)?.affected_rows)
    }

    /// Updates `table AS alias` from the select's aliased columns.
    pub fn update_from_select(
        &mut self,
        select: &Select,
        table: impl Into<TableName>,
        alias: &str,
    ) -> Result<u64> {
        let sql = self
            .dialect
            .update_from_select(select, &table.into(), alias)?;
        Ok(self.run(QueryKind::Query, &sql, &[])?.affected_rows)
    }

    pub fn delete(&mut self, table: impl Into<TableName>, conditions: &[Condition]) -> Result<u64> {
        let sql = self.dialect.delete(&table.into(), conditions);
        Ok(self.run(QueryKind::Query, &sql, &[])?.affected_rows)
    }

    /// Deletes the rows of `table AS alias` that the select matches.
    pub fn delete_from_select(
        &mut self,
        select: &Select,
        table: impl Into<TableName>,
        alias: &str,
    ) -> Result<u64> {
        let sql = self
            .dialect
            .delete_from_select(select, &table.into(), alias)?;
        Ok(self.run(QueryKind::Query, &sql, &[])?.affected_rows)
    }

    /// Identity value generated by the most recent insert on this adapter.
    #[must_use]
    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    fn unique_keys(&mut self, table: &TableName) -> Result<Vec<Vec<String>>> {
        Ok(self
            .get_index_list(table)?
            .into_iter()
            .filter(|index| index.index_type.is_unique())
            .map(|index| index.columns)
            .collect())
    }

    fn identity_column(&mut self, table: &TableName) -> Result<Option<String>> {
        Ok(self
            .describe_table(table)?
            .into_iter()
            .find(|column| column.identity)
            .map(|column| column.name))
    }
}

fn resolves_conflicts(mode: &InsertMode) -> bool {
    matches!(mode, InsertMode::Update(_) | InsertMode::Replace)
}

fn owned(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|column| (*column).to_string()).collect()
}
