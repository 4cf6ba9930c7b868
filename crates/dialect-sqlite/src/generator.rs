use std::fmt::Write as _;

use sqlbridge_core::{
    AlterOp, ColumnDefault, ColumnDefinition, ConfigError, ForeignKeyDefinition, IndexDefinition,
    IndexType, NameBuilder, Quoting, RebuildStep, Result, Statement, StatementContext,
    TableDefinition, TableName, Value,
};

use crate::types;

const DIALECT_NAME: &str = "sqlite";
const SHADOW_TABLE_PREFIX: &str = "__sqlbridge_rebuild_";

/// DDL rendering for the embedded backend. Anything `ALTER TABLE` cannot
/// express natively becomes a shadow-table rebuild.
pub(crate) struct Generator<'a> {
    quoting: &'a Quoting,
    names: NameBuilder,
}

impl<'a> Generator<'a> {
    pub(crate) fn new(quoting: &'a Quoting, names: NameBuilder) -> Self {
        Self { quoting, names }
    }

    pub(crate) fn create_table(
        &self,
        table: &TableDefinition,
        temporary: bool,
    ) -> Result<Vec<Statement>> {
        table.validate()?;
        let table = table.normalized();
        check_identity(&table)?;

        let mut name = table.table_name();
        if temporary {
            name.schema = None;
        }
        let keyword = if temporary {
            "CREATE TEMP TABLE"
        } else {
            "CREATE TABLE"
        };
        let mut statements = vec![Statement::sql(format!(
            "{keyword} {} ({})",
            self.table_ident(&name),
            self.table_body(&table)
        ))];
        statements.extend(
            self.index_statements(&table, &name)
                .into_iter()
                .map(Statement::sql),
        );
        statements.extend(
            self.trigger_statements(&table, &name, temporary)
                .into_iter()
                .map(Statement::sql),
        );
        Ok(statements)
    }

    pub(crate) fn alter_table(
        &self,
        current: &TableDefinition,
        op: &AlterOp,
    ) -> Result<Vec<Statement>> {
        let name = current.table_name();
        let table = self.table_ident(&name);
        match op {
            AlterOp::AddColumn(column) => {
                column.validate()?;
                if appendable(column) {
                    return Ok(vec![Statement::sql(format!(
                        "ALTER TABLE {table} ADD COLUMN {}",
                        self.column_definition(column)
                    ))]);
                }
                let mut desired = current.clone();
                desired.columns.push(column.clone());
                self.rebuild(current, &desired, None)
            }
            AlterOp::DropColumn(column) => {
                let mut desired = current.clone();
                desired
                    .columns
                    .retain(|existing| !existing.name.eq_ignore_ascii_case(column));
                desired.indexes.retain(|index| {
                    !index
                        .column_names()
                        .any(|name| name.eq_ignore_ascii_case(column))
                });
                desired
                    .foreign_keys
                    .retain(|foreign_key| !foreign_key.column.eq_ignore_ascii_case(column));
                if desired.columns.is_empty() {
                    return Err(ConfigError::EmptyTable {
                        table: current.name.clone(),
                    }
                    .into());
                }
                self.rebuild(current, &desired, None)
            }
            AlterOp::ChangeColumn { from, column } => {
                column.validate()?;
                let mut desired = current.clone();
                replace_column(&mut desired, from, column.clone());
                self.rebuild(current, &desired, Some((column.name.as_str(), from.as_str())))
            }
            AlterOp::ModifyColumn(column) => {
                column.validate()?;
                let mut desired = current.clone();
                replace_column(&mut desired, &column.name, column.clone());
                self.rebuild(current, &desired, None)
            }
            AlterOp::AddIndex(index) if index.index_type == IndexType::Primary => {
                let mut desired = without_primary_key(current);
                if let (Some(identity), [only]) =
                    (current.identity_column(), index.columns.as_slice())
                    && identity.name.eq_ignore_ascii_case(&only.name)
                    && let Some(column) = desired
                        .columns
                        .iter_mut()
                        .find(|column| column.name.eq_ignore_ascii_case(&only.name))
                {
                    column.identity = true;
                }
                desired.indexes.insert(0, index.clone());
                self.rebuild(current, &desired, None)
            }
            AlterOp::AddIndex(index) => Ok(vec![Statement::sql(self.create_index(&name, index))]),
            AlterOp::DropIndex(index) => {
                let primary = index.eq_ignore_ascii_case("PRIMARY")
                    || current
                        .primary_index()
                        .is_some_and(|primary| primary.name.eq_ignore_ascii_case(index));
                if primary {
                    let desired = without_primary_key(current);
                    return self.rebuild(current, &desired, None);
                }
                Ok(vec![Statement::sql(format!(
                    "DROP INDEX {}",
                    self.index_ident(&name, index)
                ))])
            }
            AlterOp::AddForeignKey(foreign_key) => {
                let mut desired = current.clone();
                desired
                    .foreign_keys
                    .retain(|existing| !existing.name.eq_ignore_ascii_case(&foreign_key.name));
                desired.foreign_keys.push(foreign_key.clone());
                self.rebuild(current, &desired, None)
            }
            AlterOp::DropForeignKey(foreign_key) => {
                let mut desired = current.clone();
                desired
                    .foreign_keys
                    .retain(|existing| !existing.name.eq_ignore_ascii_case(foreign_key));
                self.rebuild(current, &desired, None)
            }
            AlterOp::SetComment(_) => Ok(Vec::new()),
            AlterOp::Truncate => {
                let mut statements = vec![Statement::sql(format!("DELETE FROM {table}"))];
                if current.identity_column().is_some() {
                    let sequence = match &name.schema {
                        Some(schema) => {
                            format!("{}.sqlite_sequence", self.quoting.quote_segment(schema))
                        }
                        None => "sqlite_sequence".to_string(),
                    };
                    statements.push(Statement::sql(format!(
                        "DELETE FROM {sequence} WHERE name = {}",
                        self.quoting.quote_string(&name.name)
                    )));
                }
                Ok(statements)
            }
            AlterOp::Rename(new_name) => {
                let on_update = on_update_columns(current);
                let renamed = TableName {
                    schema: name.schema.clone(),
                    name: new_name.name.clone(),
                };
                let mut statements = on_update
                    .iter()
                    .map(|column| {
                        let trigger = self.names.on_update_trigger_name(&name.name, column);
                        Statement::sql(format!(
                            "DROP TRIGGER IF EXISTS {}",
                            self.index_ident(&name, &trigger)
                        ))
                    })
                    .collect::<Vec<_>>();
                statements.push(Statement::sql(format!(
                    "ALTER TABLE {table} RENAME TO {}",
                    self.quoting.quote_segment(&new_name.name)
                )));
                statements.extend(on_update.iter().map(|column| {
                    Statement::sql(self.on_update_trigger(&renamed, column, false))
                }));
                Ok(statements)
            }
        }
    }

    /// Copies the table into a shadow table with the desired layout, then
    /// swaps it in and recreates what the drop took with it. `renamed` maps a
    /// new column name to the column it is copied from.
    fn rebuild(
        &self,
        current: &TableDefinition,
        desired: &TableDefinition,
        renamed: Option<(&str, &str)>,
    ) -> Result<Vec<Statement>> {
        let desired = desired.normalized();
        check_identity(&desired)?;
        let name = current.table_name();
        let shadow = TableName {
            schema: name.schema.clone(),
            name: format!("{SHADOW_TABLE_PREFIX}{}", name.name),
        };
        let step = |sql: String, step: RebuildStep| {
            Statement::sql(sql).with_context(StatementContext::TableRebuild {
                table: name.clone(),
                step,
            })
        };

        let mut statements = vec![step(
            format!(
                "CREATE TABLE {} ({})",
                self.table_ident(&shadow),
                self.table_body(&desired)
            ),
            RebuildStep::CreateShadowTable,
        )];

        let mut targets = Vec::new();
        let mut projections = Vec::new();
        for column in &desired.columns {
            let source_name = match renamed {
                Some((new, from)) if new.eq_ignore_ascii_case(&column.name) => from,
                _ => column.name.as_str(),
            };
            let Some(source) = current.column(source_name) else {
                continue;
            };
            let source_ident = self.quoting.quote_segment(&source.name);
            let target_type = types::column_type_sql(column);
            targets.push(self.quoting.quote_segment(&column.name));
            projections.push(if types::column_type_sql(source) == target_type {
                source_ident
            } else {
                format!("CAST({source_ident} AS {target_type})")
            });
        }
        if !targets.is_empty() {
            statements.push(step(
                format!(
                    "INSERT INTO {} ({}) SELECT {} FROM {}",
                    self.table_ident(&shadow),
                    targets.join(", "),
                    projections.join(", "),
                    self.table_ident(&name)
                ),
                RebuildStep::CopyData,
            ));
        }

        statements.push(step(
            format!("DROP TABLE {}", self.table_ident(&name)),
            RebuildStep::DropOldTable,
        ));
        statements.push(step(
            format!(
                "ALTER TABLE {} RENAME TO {}",
                self.table_ident(&shadow),
                self.quoting.quote_segment(&name.name)
            ),
            RebuildStep::RenameShadowTable,
        ));
        for sql in self.index_statements(&desired, &name) {
            statements.push(step(sql, RebuildStep::RecreateIndexes));
        }
        for sql in self.trigger_statements(&desired, &name, false) {
            statements.push(step(sql, RebuildStep::RecreateTriggers));
        }
        Ok(statements)
    }

    fn table_body(&self, table: &TableDefinition) -> String {
        let mut parts = table
            .columns
            .iter()
            .map(|column| self.column_definition(column))
            .collect::<Vec<_>>();
        let primary = table.primary_key_columns();
        if !primary.is_empty() && table.identity_column().is_none() {
            parts.push(format!("PRIMARY KEY ({})", self.column_list(&primary)));
        }
        for foreign_key in &table.foreign_keys {
            parts.push(self.foreign_key_clause(&table.name, foreign_key));
        }
        parts.join(", ")
    }

    /// Identity columns become rowid aliases; the declared type has to be
    /// exactly `INTEGER` for that.
    pub(crate) fn column_definition(&self, column: &ColumnDefinition) -> String {
        let name = self.quoting.quote_segment(&column.name);
        if column.identity {
            return format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT");
        }
        let mut sql = format!("{name} {}", types::column_type_sql(column));
        let nullable = column.effective_nullable();
        if !nullable {
            sql.push_str(" NOT NULL");
        }
        match column.effective_default() {
            None => {}
            Some(ColumnDefault::Null) => {
                if nullable {
                    sql.push_str(" DEFAULT NULL");
                }
            }
            Some(ColumnDefault::Literal(Value::Expr(expr))) => {
                write!(sql, " DEFAULT ({expr})").expect("writing to String should not fail");
            }
            Some(ColumnDefault::Literal(value)) => {
                let literal = self.quoting.quote_value(value, Some(column.column_type));
                write!(sql, " DEFAULT {literal}").expect("writing to String should not fail");
            }
            Some(ColumnDefault::Now | ColumnDefault::NowOnUpdate) => {
                sql.push_str(" DEFAULT CURRENT_TIMESTAMP");
            }
        }
        sql
    }

    fn foreign_key_clause(&self, table: &str, foreign_key: &ForeignKeyDefinition) -> String {
        // Referenced tables cannot be schema-qualified.
        let ref_table = foreign_key
            .ref_table
            .rsplit('.')
            .next()
            .unwrap_or(&foreign_key.ref_table);
        let name = if foreign_key.name.is_empty() {
            self.names.foreign_key_name(
                table,
                &foreign_key.column,
                ref_table,
                &foreign_key.ref_column,
            )
        } else {
            foreign_key.name.clone()
        };
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quoting.quote_segment(&name),
            self.quoting.quote_segment(&foreign_key.column),
            self.quoting.quote_segment(ref_table),
            self.quoting.quote_segment(&foreign_key.ref_column),
            foreign_key.on_delete.as_sql(),
            foreign_key.on_update.as_sql()
        )
    }

    fn index_statements(&self, table: &TableDefinition, name: &TableName) -> Vec<String> {
        table
            .indexes
            .iter()
            .filter(|index| index.index_type != IndexType::Primary)
            .map(|index| self.create_index(name, index))
            .collect()
    }

    /// Full-text indexes degrade to plain indexes; prefix lengths are dropped.
    fn create_index(&self, table: &TableName, index: &IndexDefinition) -> String {
        let columns = index.column_names().collect::<Vec<_>>();
        let name = if index.name.is_empty() {
            self.names
                .index_name(&table.name, &columns, index.index_type)
        } else {
            index.name.clone()
        };
        let unique = if index.index_type == IndexType::Unique {
            "UNIQUE "
        } else {
            ""
        };
        format!(
            "CREATE {unique}INDEX {} ON {} ({})",
            self.index_ident(table, &name),
            self.quoting.quote_segment(&table.name),
            self.column_list(&columns)
        )
    }

    fn trigger_statements(
        &self,
        table: &TableDefinition,
        name: &TableName,
        temporary: bool,
    ) -> Vec<String> {
        on_update_columns(table)
            .iter()
            .map(|column| self.on_update_trigger(name, column, temporary))
            .collect()
    }

    /// Emulates `ON UPDATE CURRENT_TIMESTAMP`: refreshes the column unless the
    /// update set it explicitly.
    fn on_update_trigger(&self, table: &TableName, column: &str, temporary: bool) -> String {
        let trigger = self.names.on_update_trigger_name(&table.name, column);
        let keyword = if temporary {
            "CREATE TEMP TRIGGER"
        } else {
            "CREATE TRIGGER"
        };
        let target = self.quoting.quote_segment(&table.name);
        let column = self.quoting.quote_segment(column);
        format!(
            "{keyword} {} AFTER UPDATE ON {target} FOR EACH ROW \
             WHEN NEW.{column} IS OLD.{column} \
             BEGIN UPDATE {target} SET {column} = CURRENT_TIMESTAMP \
             WHERE rowid = NEW.rowid; END",
            self.index_ident(table, &trigger)
        )
    }

    fn table_ident(&self, table: &TableName) -> String {
        self.quoting.quote_identifier(table.path())
    }

    /// Indexes and triggers are qualified by the schema, not by the table.
    fn index_ident(&self, table: &TableName, name: &str) -> String {
        match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quoting.quote_segment(schema),
                self.quoting.quote_segment(name)
            ),
            None => self.quoting.quote_segment(name),
        }
    }

    fn column_list<S: AsRef<str>>(&self, columns: &[S]) -> String {
        columns
            .iter()
            .map(|column| self.quoting.quote_segment(column.as_ref()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// An identity column is its table's rowid, so it must be the whole key.
fn check_identity(table: &TableDefinition) -> Result<()> {
    let Some(identity) = table.identity_column() else {
        return Ok(());
    };
    let primary = table.primary_key_columns();
    let sole_key = match primary.as_slice() {
        [] => true,
        [only] => only.eq_ignore_ascii_case(&identity.name),
        _ => false,
    };
    if sole_key {
        return Ok(());
    }
    Err(ConfigError::IdentityRequiresSinglePrimaryKey {
        column: identity.name.clone(),
        dialect: DIALECT_NAME,
    }
    .into())
}

/// Whether `ALTER TABLE ... ADD COLUMN` accepts the column as is.
fn appendable(column: &ColumnDefinition) -> bool {
    if column.identity || column.primary {
        return false;
    }
    match column.effective_default() {
        Some(ColumnDefault::Now | ColumnDefault::NowOnUpdate) => false,
        Some(ColumnDefault::Literal(Value::Expr(_))) => false,
        Some(ColumnDefault::Literal(value)) => !value.is_null() || column.effective_nullable(),
        Some(ColumnDefault::Null) | None => column.effective_nullable(),
    }
}

fn on_update_columns(table: &TableDefinition) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|column| column.effective_default() == Some(&ColumnDefault::NowOnUpdate))
        .map(|column| column.name.clone())
        .collect()
}

/// Swaps `from` for `column`, keeping key membership and renaming references
/// in indexes and foreign keys.
fn replace_column(table: &mut TableDefinition, from: &str, mut column: ColumnDefinition) {
    let Some(position) = table
        .columns
        .iter()
        .position(|existing| existing.name.eq_ignore_ascii_case(from))
    else {
        table.columns.push(column);
        return;
    };
    let previous = &table.columns[position];
    if previous.primary && !column.primary {
        column.primary = true;
        column.primary_position = previous.primary_position;
        column.nullable = false;
    }
    let renamed = column.name.clone();
    table.columns[position] = column;
    for index in &mut table.indexes {
        for indexed in &mut index.columns {
            if indexed.name.eq_ignore_ascii_case(from) {
                indexed.name = renamed.clone();
            }
        }
    }
    for foreign_key in &mut table.foreign_keys {
        if foreign_key.column.eq_ignore_ascii_case(from) {
            foreign_key.column = renamed.clone();
        }
    }
}

fn without_primary_key(table: &TableDefinition) -> TableDefinition {
    let mut desired = table.clone();
    desired
        .indexes
        .retain(|index| index.index_type != IndexType::Primary);
    for column in &mut desired.columns {
        column.primary = false;
        column.primary_position = None;
        column.identity = false;
    }
    desired
}
