use std::sync::Arc;

use tracing::{error, info, warn};

use super::Adapter;
use crate::{
    AlterOp, CachedMetadata, ColumnDefinition, ColumnDescription, ConfigError, ForeignKeyAction,
    ForeignKeyDefinition, ForeignKeyDescription, IndexColumn, IndexDefinition, IndexDescription,
    IndexType, MetadataKind, NotFoundError, QueryKind, Result, Statement, TableDefinition,
    TableName, TransactionError, column_from_description,
};

impl Adapter {
    // --- tables ----------------------------------------------------------

    pub fn create_table(&mut self, table: &TableDefinition) -> Result<()> {
        self.ensure_ddl_allowed("create table")?;
        let statements = self.dialect.create_table(table, false)?;
        info!(dialect = self.dialect.name(), table = %table.table_name(), "creating table");
        self.run_ddl(&table.table_name(), statements)
    }

    /// Temporary tables are session-local and never implicitly commit.
    pub fn create_temporary_table(&mut self, table: &TableDefinition) -> Result<()> {
        let statements = self.dialect.create_table(table, true)?;
        self.run_ddl(&table.table_name(), statements)
    }

    /// Drops the table if it exists.
    pub fn drop_table(&mut self, table: impl Into<TableName>) -> Result<()> {
        let table = table.into();
        self.ensure_ddl_allowed("drop table")?;
        let statements = self.dialect.drop_table(&table, false);
        self.run_ddl(&table, statements)
    }

    pub fn drop_temporary_table(&mut self, table: impl Into<TableName>) -> Result<()> {
        let table = table.into();
        let statements = self.dialect.drop_table(&table, true);
        self.run_ddl(&table, statements)
    }

    pub fn truncate_table(&mut self, table: impl Into<TableName>) -> Result<()> {
        let table = table.into();
        self.alter(&table, &AlterOp::Truncate, "truncate table")
    }

    pub fn rename_table(
        &mut self,
        table: impl Into<TableName>,
        new_name: impl Into<TableName>,
    ) -> Result<()> {
        let table = table.into();
        let new_name = new_name.into();
        self.alter(&table, &AlterOp::Rename(new_name.clone()), "rename table")?;
        self.cache.invalidate(&new_name);
        Ok(())
    }

    pub fn change_table_comment(
        &mut self,
        table: impl Into<TableName>,
        comment: impl Into<String>,
    ) -> Result<()> {
        let table = table.into();
        self.alter(&table, &AlterOp::SetComment(comment.into()), "change table comment")
    }

    /// Creates `new_table` with the structure of `table`. Index and foreign key
    /// names are regenerated for the new table.
    pub fn create_table_like(
        &mut self,
        table: impl Into<TableName>,
        new_table: impl Into<TableName>,
    ) -> Result<()> {
        let table = table.into();
        let new_table = new_table.into();
        let mut definition = self.introspect_as_definition(&table)?;
        let names = self.dialect.names();
        definition.name = new_table.name.clone();
        definition.schema = new_table.schema.clone();
        if definition.comment.is_none() {
            definition.comment = Some(new_table.name.clone());
        }
        for index in &mut definition.indexes {
            index.name = match index.index_type {
                IndexType::Primary => names.primary_key_name(&new_table.name),
                index_type => {
                    let columns = index.column_names().collect::<Vec<_>>();
                    names.index_name(&new_table.name, &columns, index_type)
                }
            };
        }
        for foreign_key in &mut definition.foreign_keys {
            foreign_key.name = names.foreign_key_name(
                &new_table.name,
                &foreign_key.column,
                &foreign_key.ref_table,
                &foreign_key.ref_column,
            );
        }
        self.create_table(&definition)
    }

    // --- columns ---------------------------------------------------------

    /// `Ok(false)` when the column already exists.
    pub fn add_column(
        &mut self,
        table: impl Into<TableName>,
        column: ColumnDefinition,
    ) -> Result<bool> {
        let table = table.into();
        let current = self.introspect_as_definition(&table)?;
        if current.column(&column.name).is_some() {
            return Ok(false);
        }
        self.alter_definition(&current, &AlterOp::AddColumn(column), "add column")?;
        Ok(true)
    }

    /// `Ok(false)` when the column does not exist.
    pub fn drop_column(&mut self, table: impl Into<TableName>, column: &str) -> Result<bool> {
        let table = table.into();
        let current = self.introspect_as_definition(&table)?;
        if current.column(column).is_none() {
            return Ok(false);
        }
        let op = AlterOp::DropColumn(column.to_string());
        self.alter_definition(&current, &op, "drop column")?;
        Ok(true)
    }

    /// Renames `old_name` to `column.name` and redefines it.
    pub fn change_column(
        &mut self,
        table: impl Into<TableName>,
        old_name: &str,
        column: ColumnDefinition,
    ) -> Result<()> {
        let table = table.into();
        let current = self.introspect_as_definition(&table)?;
        let existing = require_column(&current, &table, old_name)?;
        let op = if existing.name == column.name {
            AlterOp::ModifyColumn(column)
        } else {
            AlterOp::ChangeColumn {
                from: existing.name.clone(),
                column,
            }
        };
        self.alter_definition(&current, &op, "change column")
    }

    pub fn modify_column(
        &mut self,
        table: impl Into<TableName>,
        column: ColumnDefinition,
    ) -> Result<()> {
        let table = table.into();
        let current = self.introspect_as_definition(&table)?;
        require_column(&current, &table, &column.name)?;
        self.alter_definition(&current, &AlterOp::ModifyColumn(column), "modify column")
    }

    /// Replaces only the comment, keeping the rest of the column definition.
    pub fn change_column_comment(
        &mut self,
        table: impl Into<TableName>,
        column: &str,
        comment: impl Into<String>,
    ) -> Result<()> {
        let table = table.into();
        let current = self.introspect_as_definition(&table)?;
        let mut definition = require_column(&current, &table, column)?.clone();
        definition.comment = Some(comment.into());
        let op = AlterOp::ModifyColumn(definition);
        self.alter_definition(&current, &op, "change column comment")
    }

    pub fn table_column_exists(
        &mut self,
        table: impl Into<TableName>,
        column: &str,
    ) -> Result<bool> {
        match self.describe_table(table) {
            Ok(columns) => Ok(columns
                .iter()
                .any(|description| description.name.eq_ignore_ascii_case(column))),
            Err(error) if error.is_not_found() => Ok(false),
            Err(error) => Err(error),
        }
    }

    // --- indexes and foreign keys ----------------------------------------

    /// Adds the index, replacing one with the same name. An empty name is
    /// derived from the table and columns. Returns the name used.
    pub fn add_index(
        &mut self,
        table: impl Into<TableName>,
        mut index: IndexDefinition,
    ) -> Result<String> {
        let table = table.into();
        if index.columns.is_empty() {
            return Err(ConfigError::EmptyIndex {
                table: table.to_string(),
                index: index.name,
            }
            .into());
        }
        if index.name.is_empty() {
            let names = self.dialect.names();
            index.name = match index.index_type {
                IndexType::Primary => names.primary_key_name(&table.name),
                index_type => {
                    let columns = index.column_names().collect::<Vec<_>>();
                    names.index_name(&table.name, &columns, index_type)
                }
            };
        }
        let name = index.name.clone();
        self.drop_index(&table, &name)?;

        let current = self.introspect_as_definition(&table)?;
        for column in index.column_names() {
            if current.column(column).is_none() {
                return Err(ConfigError::UnknownIndexColumn {
                    table: table.to_string(),
                    index: name,
                    column: column.to_string(),
                }
                .into());
            }
        }
        self.alter_definition(&current, &AlterOp::AddIndex(index), "add index")?;
        Ok(name)
    }

    /// `Ok(false)` when no index with that name exists.
    pub fn drop_index(&mut self, table: impl Into<TableName>, name: &str) -> Result<bool> {
        let table = table.into();
        let current = self.introspect_as_definition(&table)?;
        let Some(existing) = current
            .indexes
            .iter()
            .find(|index| index.name.eq_ignore_ascii_case(name))
        else {
            return Ok(false);
        };
        let op = AlterOp::DropIndex(existing.name.clone());
        self.alter_definition(&current, &op, "drop index")?;
        Ok(true)
    }

    /// Adds the foreign key, replacing one with the same name. An empty name is
    /// derived from both ends of the reference. Returns the name used.
    pub fn add_foreign_key(
        &mut self,
        table: impl Into<TableName>,
        mut foreign_key: ForeignKeyDefinition,
    ) -> Result<String> {
        let table = table.into();
        if foreign_key.name.is_empty() {
            foreign_key.name = self.dialect.names().foreign_key_name(
                &table.name,
                &foreign_key.column,
                &foreign_key.ref_table,
                &foreign_key.ref_column,
            );
        }
        let name = foreign_key.name.clone();
        self.drop_foreign_key(&table, &name)?;

        let current = self.introspect_as_definition(&table)?;
        let column = require_column(&current, &table, &foreign_key.column)?;
        if foreign_key.on_delete == ForeignKeyAction::SetNull && !column.nullable {
            return Err(ConfigError::SetNullOnNotNullColumn {
                name,
                column: column.name.clone(),
            }
            .into());
        }
        let op = AlterOp::AddForeignKey(foreign_key);
        self.alter_definition(&current, &op, "add foreign key")?;
        Ok(name)
    }

    /// `Ok(false)` when no foreign key with that name exists.
    pub fn drop_foreign_key(&mut self, table: impl Into<TableName>, name: &str) -> Result<bool> {
        let table = table.into();
        let current = self.introspect_as_definition(&table)?;
        let Some(existing) = current
            .foreign_keys
            .iter()
            .find(|foreign_key| foreign_key.name.eq_ignore_ascii_case(name))
        else {
            return Ok(false);
        };
        let op = AlterOp::DropForeignKey(existing.name.clone());
        self.alter_definition(&current, &op, "drop foreign key")?;
        Ok(true)
    }

    // --- introspection ---------------------------------------------------

    pub fn list_tables(&mut self, schema: Option<&str>) -> Result<Vec<String>> {
        let dialect = Arc::clone(&self.dialect);
        dialect.list_tables(self, schema)
    }

    pub fn is_table_exists(&mut self, table: impl Into<TableName>) -> Result<bool> {
        let table = table.into();
        if self.cache.get(&table, MetadataKind::Describe).is_some() {
            return Ok(true);
        }
        let dialect = Arc::clone(&self.dialect);
        dialect.table_exists(self, &table)
    }

    /// Columns in ordinal order, served from the metadata cache when possible.
    pub fn describe_table(
        &mut self,
        table: impl Into<TableName>,
    ) -> Result<Vec<ColumnDescription>> {
        let table = table.into();
        if let Some(CachedMetadata::Describe(columns)) =
            self.cache.get(&table, MetadataKind::Describe)
        {
            return Ok(columns);
        }
        let dialect = Arc::clone(&self.dialect);
        let columns = dialect.describe_table(self, &table)?;
        if columns.is_empty() {
            return Err(NotFoundError::Table(table).into());
        }
        self.cache
            .put(&table, CachedMetadata::Describe(columns.clone()));
        Ok(columns)
    }

    pub fn get_index_list(&mut self, table: impl Into<TableName>) -> Result<Vec<IndexDescription>> {
        let table = table.into();
        if let Some(CachedMetadata::Indexes(indexes)) =
            self.cache.get(&table, MetadataKind::Indexes)
        {
            return Ok(indexes);
        }
        self.describe_table(&table)?;
        let dialect = Arc::clone(&self.dialect);
        let indexes = dialect.index_list(self, &table)?;
        self.cache
            .put(&table, CachedMetadata::Indexes(indexes.clone()));
        Ok(indexes)
    }

    pub fn get_foreign_keys(
        &mut self,
        table: impl Into<TableName>,
    ) -> Result<Vec<ForeignKeyDescription>> {
        let table = table.into();
        if let Some(CachedMetadata::ForeignKeys(foreign_keys)) =
            self.cache.get(&table, MetadataKind::ForeignKeys)
        {
            return Ok(foreign_keys);
        }
        self.describe_table(&table)?;
        let dialect = Arc::clone(&self.dialect);
        let foreign_keys = dialect.foreign_keys(self, &table)?;
        self.cache
            .put(&table, CachedMetadata::ForeignKeys(foreign_keys.clone()));
        Ok(foreign_keys)
    }

    /// DDL that recreates the table: the backend's own text when it has one,
    /// otherwise rendered from the introspected definition.
    pub fn get_create_table(&mut self, table: impl Into<TableName>) -> Result<String> {
        let table = table.into();
        if let Some(CachedMetadata::CreateDdl(sql)) =
            self.cache.get(&table, MetadataKind::CreateDdl)
        {
            return Ok(sql);
        }
        let dialect = Arc::clone(&self.dialect);
        let sql = match dialect.show_create_table(self, &table)? {
            Some(sql) => sql,
            None => {
                let mut definition = self.introspect_as_definition(&table)?;
                if definition.comment.is_none() {
                    definition.comment = Some(table.name.clone());
                }
                dialect
                    .create_table(&definition, false)?
                    .into_iter()
                    .map(|statement| statement.sql)
                    .collect::<Vec<_>>()
                    .join(";\n")
            }
        };
        self.cache.put(&table, CachedMetadata::CreateDdl(sql.clone()));
        Ok(sql)
    }

    /// Primary key columns in key order; empty when the table has none.
    pub fn get_primary_key_columns(&mut self, table: impl Into<TableName>) -> Result<Vec<String>> {
        let table = table.into();
        let indexes = self.get_index_list(&table)?;
        if let Some(primary) = indexes
            .into_iter()
            .find(|index| index.index_type == IndexType::Primary)
        {
            return Ok(primary.columns);
        }
        let mut flagged = self
            .describe_table(&table)?
            .into_iter()
            .filter(|column| column.primary)
            .map(|column| {
                let position = column.primary_position.unwrap_or(u32::MAX);
                (position, column.position, column.name)
            })
            .collect::<Vec<_>>();
        flagged.sort();
        Ok(flagged.into_iter().map(|(_, _, name)| name).collect())
    }

    /// Rebuilds an abstract definition of an existing table from the catalog.
    pub fn introspect_as_definition(
        &mut self,
        table: impl Into<TableName>,
    ) -> Result<TableDefinition> {
        let table = table.into();
        let columns = self.describe_table(&table)?;
        let indexes = self.get_index_list(&table)?;
        let foreign_keys = self.get_foreign_keys(&table)?;
        let dialect = Arc::clone(&self.dialect);
        let comment = dialect.table_comment(self, &table)?;

        let mut definition = TableDefinition::new(table.name.clone());
        definition.schema = table.schema.clone();
        definition.comment = comment.filter(|comment| !comment.is_empty());
        definition.columns = columns
            .iter()
            .map(|column| column_from_description(dialect.as_ref(), column))
            .collect();
        definition.indexes = indexes
            .into_iter()
            .map(|index| IndexDefinition {
                name: index.name,
                index_type: index.index_type,
                columns: index.columns.into_iter().map(IndexColumn::new).collect(),
            })
            .collect();
        definition.foreign_keys = foreign_keys
            .into_iter()
            .map(|foreign_key| ForeignKeyDefinition {
                name: foreign_key.name,
                column: foreign_key.column,
                ref_table: foreign_key.ref_table,
                ref_column: foreign_key.ref_column,
                on_delete: foreign_key.on_delete,
                on_update: foreign_key.on_update,
            })
            .collect();
        Ok(definition)
    }

    // --- setup mode and cache --------------------------------------------

    /// Relaxes constraint checks for a batch of schema changes. Also applied
    /// to connections opened while setup mode is active.
    pub fn start_setup(&mut self) -> Result<()> {
        for sql in self.dialect.start_setup_sql() {
            self.run(QueryKind::Query, &sql, &[])?;
        }
        self.setup_active = true;
        Ok(())
    }

    /// Restores constraint checks and forgets all cached metadata.
    pub fn end_setup(&mut self) -> Result<()> {
        for sql in self.dialect.end_setup_sql() {
            self.run(QueryKind::Query, &sql, &[])?;
        }
        self.setup_active = false;
        self.cache.reset();
        Ok(())
    }

    #[must_use]
    pub fn is_setup_active(&self) -> bool {
        self.setup_active
    }

    /// Forgets cached metadata for one table, or for all of them.
    pub fn reset_ddl_cache(&mut self, table: Option<&TableName>) {
        match table {
            Some(table) => self.cache.invalidate(table),
            None => self.cache.reset(),
        }
    }

    pub fn allow_ddl_cache(&mut self) {
        self.cache.set_enabled(true);
    }

    /// Disables and clears the cache.
    pub fn disallow_ddl_cache(&mut self) {
        self.cache.set_enabled(false);
        self.cache.reset();
    }

    // --- execution -------------------------------------------------------

    fn ensure_ddl_allowed(&self, operation: &'static str) -> Result<()> {
        if self.is_in_transaction() && !self.dialect.transactional_ddl() {
            return Err(TransactionError::DdlInTransaction {
                dialect: self.dialect.name(),
                operation,
            }
            .into());
        }
        Ok(())
    }

    fn alter(&mut self, table: &TableName, op: &AlterOp, operation: &'static str) -> Result<()> {
        let current = self.introspect_as_definition(table)?;
        self.alter_definition(&current, op, operation)
    }

    fn alter_definition(
        &mut self,
        current: &TableDefinition,
        op: &AlterOp,
        operation: &'static str,
    ) -> Result<()> {
        self.ensure_ddl_allowed(operation)?;
        let statements = self.dialect.alter_table(current, op)?;
        self.run_ddl(&current.table_name(), statements)
    }

    /// Runs generated DDL and invalidates the table's cached metadata, even
    /// when a statement fails part way.
    pub(crate) fn run_ddl(&mut self, table: &TableName, statements: Vec<Statement>) -> Result<()> {
        let outcome = if statements.iter().any(Statement::is_rebuild_step) {
            self.run_rebuild(table, &statements)
        } else {
            self.run_statements(&statements)
        };
        self.cache.invalidate(table);
        outcome
    }

    fn run_statements(&mut self, statements: &[Statement]) -> Result<()> {
        for statement in statements {
            self.run(QueryKind::Query, &statement.sql, &[])?;
        }
        Ok(())
    }

    /// Shadow-table rebuilds run in their own transaction with foreign key
    /// enforcement suspended. Enforcement cannot be switched off inside an
    /// open transaction, where dropping the old table would fire
    /// `ON DELETE` actions on child rows, so rebuilds are refused there.
    fn run_rebuild(&mut self, table: &TableName, statements: &[Statement]) -> Result<()> {
        if self.is_in_transaction() {
            return Err(TransactionError::DdlInTransaction {
                dialect: self.dialect.name(),
                operation: "table rebuild",
            }
            .into());
        }
        let suspend = !self.setup_active;
        if suspend {
            for sql in self.dialect.suspend_foreign_keys_sql() {
                self.run(QueryKind::Query, &sql, &[])?;
            }
        }

        info!(
            dialect = self.dialect.name(),
            table = %table,
            steps = statements.len(),
            "rebuilding table"
        );
        let mut outcome = self.rebuild_in_transaction(statements);
        if let Err(rebuild_error) = &outcome {
            warn!(table = %table, %rebuild_error, "table rebuild failed, rolling back");
            if self.is_in_transaction()
                && let Err(rollback_error) = self.rollback()
            {
                error!(table = %table, %rollback_error, "rollback of table rebuild failed");
            }
            self.collapsed_levels = 0;
        }

        if suspend {
            for sql in self.dialect.restore_foreign_keys_sql() {
                if let Err(restore_error) = self.run(QueryKind::Query, &sql, &[]) {
                    error!(table = %table, %restore_error, "failed to restore foreign keys");
                    if outcome.is_ok() {
                        outcome = Err(restore_error);
                    }
                }
            }
        }
        outcome
    }

    fn rebuild_in_transaction(&mut self, statements: &[Statement]) -> Result<()> {
        self.begin()?;
        self.run_statements(statements)?;
        self.commit()
    }
}

fn require_column<'a>(
    definition: &'a TableDefinition,
    table: &TableName,
    column: &str,
) -> Result<&'a ColumnDefinition> {
    definition.column(column).ok_or_else(|| {
        NotFoundError::Column {
            table: table.clone(),
            column: column.to_string(),
        }
        .into()
    })
}
