use std::fmt::Write as _;

use sqlbridge_core::{
    AlterOp, ColumnDefault, ColumnDefinition, ColumnType, ForeignKeyDefinition, IndexColumn,
    IndexDefinition, IndexType, NameBuilder, Quoting, Result, Statement, TableDefinition,
    TableName, Value,
};

use crate::types;

/// Text search configuration for full-text indexes.
const FULLTEXT_CONFIG: &str = "simple";

/// DDL rendering for the object-relational backend. Column changes split
/// into one `ALTER COLUMN` statement per attribute; comments, secondary
/// indexes and on-update triggers are statements of their own.
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
        let mut name = table.table_name();
        if temporary {
            name.schema = None;
        }

        let mut parts = table
            .columns
            .iter()
            .map(|column| self.column_definition(column))
            .collect::<Vec<_>>();
        if let Some(primary) = table.primary_index() {
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                self.quoting
                    .quote_segment(&self.primary_key_name(&name, primary)),
                self.index_columns(&primary.columns)
            ));
        }
        for foreign_key in &table.foreign_keys {
            parts.push(self.foreign_key_clause(&name.name, foreign_key));
        }

        let keyword = if temporary {
            "CREATE TEMPORARY TABLE"
        } else {
            "CREATE TABLE"
        };
        let mut sql = format!("{keyword} {} ({})", self.table_ident(&name), parts.join(", "));
        if let Some(tablespace) = option(&table, "tablespace") {
            write!(sql, " TABLESPACE {}", self.quoting.quote_segment(tablespace))
                .expect("writing to String should not fail");
        }

        let mut statements = vec![Statement::sql(sql)];
        for index in &table.indexes {
            if index.index_type != IndexType::Primary {
                statements.push(Statement::sql(self.create_index(&name, index)));
            }
        }
        if let Some(comment) = &table.comment {
            statements.push(self.table_comment(&name, comment));
        }
        for column in &table.columns {
            if let Some(comment) = &column.comment {
                statements.push(self.column_comment(&name, &column.name, Some(comment.as_str())));
            }
        }
        for column in on_update_columns(&table) {
            statements.extend(self.create_on_update_trigger(&name, &column));
        }
        Ok(statements)
    }

    pub(crate) fn alter_table(
        &self,
        current: &TableDefinition,
        op: &AlterOp,
    ) -> Result<Vec<Statement>> {
        let current = &current.normalized();
        let name = current.table_name();
        let table = self.table_ident(&name);
        let statements = match op {
            AlterOp::AddColumn(column) => {
                column.validate()?;
                let mut definition = self.column_definition(column);
                if column.primary && current.primary_key_columns().is_empty() {
                    definition.push_str(" PRIMARY KEY");
                }
                let mut statements = vec![Statement::sql(format!(
                    "ALTER TABLE {table} ADD COLUMN {definition}"
                ))];
                if let Some(comment) = column.comment.as_deref() {
                    statements.push(self.column_comment(&name, &column.name, Some(comment)));
                }
                if refreshed_on_update(column) {
                    statements.extend(self.create_on_update_trigger(&name, &column.name));
                }
                statements
            }
            AlterOp::DropColumn(column) => {
                let mut statements = Vec::new();
                if current.column(column).is_some_and(refreshed_on_update) {
                    statements.extend(self.drop_on_update_trigger(&name, column));
                }
                statements.push(Statement::sql(format!(
                    "ALTER TABLE {table} DROP COLUMN {}",
                    self.quoting.quote_segment(column)
                )));
                statements
            }
            AlterOp::ChangeColumn { from, column } => {
                column.validate()?;
                let mut statements = Vec::new();
                let previous = current.column(from);
                if !from.eq_ignore_ascii_case(&column.name) {
                    if previous.is_some_and(refreshed_on_update) {
                        statements.extend(self.drop_on_update_trigger(&name, from));
                    }
                    statements.push(Statement::sql(format!(
                        "ALTER TABLE {table} RENAME COLUMN {} TO {}",
                        self.quoting.quote_segment(from),
                        self.quoting.quote_segment(&column.name)
                    )));
                    let mut renamed = previous.cloned();
                    if let Some(renamed) = renamed.as_mut() {
                        renamed.name = column.name.clone();
                        if refreshed_on_update(renamed) {
                            renamed.default = Some(ColumnDefault::Now);
                        }
                    }
                    statements.extend(self.redefine_column(current, renamed.as_ref(), column));
                } else {
                    statements.extend(self.redefine_column(current, previous, column));
                }
                statements
            }
            AlterOp::ModifyColumn(column) => {
                column.validate()?;
                self.redefine_column(current, current.column(&column.name), column)
            }
            AlterOp::AddIndex(index) if index.index_type == IndexType::Primary => {
                vec![Statement::sql(format!(
                    "ALTER TABLE {table} ADD CONSTRAINT {} PRIMARY KEY ({})",
                    self.quoting
                        .quote_segment(&self.primary_key_name(&name, index)),
                    self.index_columns(&index.columns)
                ))]
            }
            AlterOp::AddIndex(index) => vec![Statement::sql(self.create_index(&name, index))],
            AlterOp::DropIndex(index) => {
                let primary = current.primary_index().filter(|primary| {
                    index.eq_ignore_ascii_case("PRIMARY")
                        || primary.name.eq_ignore_ascii_case(index)
                });
                match primary {
                    Some(primary) => vec![Statement::sql(format!(
                        "ALTER TABLE {table} DROP CONSTRAINT {}",
                        self.quoting
                            .quote_segment(&self.primary_key_name(&name, primary))
                    ))],
                    None => vec![Statement::sql(format!(
                        "DROP INDEX {}",
                        self.schema_ident(&name, index)
                    ))],
                }
            }
            AlterOp::AddForeignKey(foreign_key) => vec![Statement::sql(format!(
                "ALTER TABLE {table} ADD {}",
                self.foreign_key_clause(&name.name, foreign_key)
            ))],
            AlterOp::DropForeignKey(foreign_key) => vec![Statement::sql(format!(
                "ALTER TABLE {table} DROP CONSTRAINT {}",
                self.quoting.quote_segment(foreign_key)
            ))],
            AlterOp::SetComment(comment) => vec![self.table_comment(&name, comment)],
            AlterOp::Truncate => vec![Statement::sql(format!(
                "TRUNCATE TABLE {table} RESTART IDENTITY"
            ))],
            AlterOp::Rename(new_name) => {
                let mut statements = vec![Statement::sql(format!(
                    "ALTER TABLE {table} RENAME TO {}",
                    self.quoting.quote_segment(&new_name.name)
                ))];
                let renamed = TableName {
                    schema: name.schema.clone(),
                    name: new_name.name.clone(),
                };
                for column in on_update_columns(current) {
                    let old = self.names.on_update_trigger_name(&name.name, &column);
                    let new = self.quoting.quote_segment(
                        &self.names.on_update_trigger_name(&renamed.name, &column),
                    );
                    statements.push(Statement::sql(format!(
                        "ALTER TRIGGER {} ON {} RENAME TO {new}",
                        self.quoting.quote_segment(&old),
                        self.table_ident(&renamed)
                    )));
                    statements.push(Statement::sql(format!(
                        "ALTER FUNCTION {}() RENAME TO {new}",
                        self.schema_ident(&name, &old)
                    )));
                }
                statements
            }
        };
        Ok(statements)
    }

    /// Moves `previous` to `column` one attribute at a time. Primary key
    /// columns stay `NOT NULL`.
    fn redefine_column(
        &self,
        current: &TableDefinition,
        previous: Option<&ColumnDefinition>,
        column: &ColumnDefinition,
    ) -> Vec<Statement> {
        let name = current.table_name();
        let table = self.table_ident(&name);
        let target = self.quoting.quote_segment(&column.name);
        let alter = |clause: String| Statement::sql(format!("ALTER TABLE {table} {clause}"));
        let in_primary_key = current
            .primary_key_columns()
            .iter()
            .any(|primary| primary.eq_ignore_ascii_case(&column.name));
        let was_identity = previous.is_some_and(|previous| previous.identity);

        let type_sql = types::column_type_sql(column);
        let mut statements = vec![alter(format!(
            "ALTER COLUMN {target} TYPE {type_sql} USING {target}::{type_sql}"
        ))];
        if column.effective_nullable() && !in_primary_key {
            statements.push(alter(format!("ALTER COLUMN {target} DROP NOT NULL")));
        } else {
            statements.push(alter(format!("ALTER COLUMN {target} SET NOT NULL")));
        }
        match (was_identity, column.identity) {
            (false, true) => statements.push(alter(format!(
                "ALTER COLUMN {target} ADD GENERATED BY DEFAULT AS IDENTITY"
            ))),
            (true, false) => statements.push(alter(format!(
                "ALTER COLUMN {target} DROP IDENTITY IF EXISTS"
            ))),
            _ => {}
        }
        if !column.identity {
            statements.push(match self.default_clause(column) {
                Some(default) => alter(format!("ALTER COLUMN {target} SET{default}")),
                None => alter(format!("ALTER COLUMN {target} DROP DEFAULT")),
            });
        }

        let previous_comment = previous.and_then(|previous| previous.comment.as_deref());
        if column.comment.as_deref() != previous_comment {
            statements.push(self.column_comment(&name, &column.name, column.comment.as_deref()));
        }

        match (previous.is_some_and(refreshed_on_update), refreshed_on_update(column)) {
            (false, true) => {
                statements.extend(self.create_on_update_trigger(&name, &column.name));
            }
            (true, false) => statements.extend(self.drop_on_update_trigger(&name, &column.name)),
            _ => {}
        }
        statements
    }

    pub(crate) fn column_definition(&self, column: &ColumnDefinition) -> String {
        let mut sql = format!(
            "{} {}",
            self.quoting.quote_segment(&column.name),
            types::column_type_sql(column)
        );
        if column.identity {
            sql.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        }
        if !column.effective_nullable() {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default_clause(column) {
            sql.push_str(&default);
        }
        sql
    }

    /// ` DEFAULT ...`, or `None` when the column has no default to render.
    fn default_clause(&self, column: &ColumnDefinition) -> Option<String> {
        match column.effective_default()? {
            ColumnDefault::Null if column.effective_nullable() => {
                Some(" DEFAULT NULL".to_string())
            }
            ColumnDefault::Null => None,
            ColumnDefault::Literal(Value::Expr(expr)) => Some(format!(" DEFAULT ({expr})")),
            ColumnDefault::Literal(value) => {
                let value = match (column.column_type, value) {
                    (ColumnType::Boolean, Value::Int(flag)) => Value::Bool(*flag != 0),
                    (_, value) => value.clone(),
                };
                Some(format!(
                    " DEFAULT {}",
                    self.quoting.quote_value(&value, Some(column.column_type))
                ))
            }
            ColumnDefault::Now | ColumnDefault::NowOnUpdate => {
                Some(" DEFAULT CURRENT_TIMESTAMP".to_string())
            }
        }
    }

    /// Secondary indexes live in the table's schema. Full-text indexes are
    /// GIN indexes over `to_tsvector`; prefix lengths are dropped.
    fn create_index(&self, table: &TableName, index: &IndexDefinition) -> String {
        let columns = index.column_names().collect::<Vec<_>>();
        let name = if index.name.is_empty() {
            self.names
                .index_name(&table.name, &columns, index.index_type)
        } else {
            index.name.clone()
        };
        let target = self.table_ident(table);
        let name = self.quoting.quote_segment(&name);
        match index.index_type {
            IndexType::Fulltext => {
                let vectors = columns
                    .iter()
                    .map(|column| {
                        format!(
                            "to_tsvector({}, {})",
                            self.quoting.quote_string(FULLTEXT_CONFIG),
                            self.quoting.quote_segment(column)
                        )
                    })
                    .collect::<Vec<_>>();
                format!(
                    "CREATE INDEX {name} ON {target} USING gin ({})",
                    vectors.join(", ")
                )
            }
            IndexType::Unique => format!(
                "CREATE UNIQUE INDEX {name} ON {target} ({})",
                self.index_columns(&index.columns)
            ),
            IndexType::Index | IndexType::Primary => format!(
                "CREATE INDEX {name} ON {target} ({})",
                self.index_columns(&index.columns)
            ),
        }
    }

    fn index_columns(&self, columns: &[IndexColumn]) -> String {
        columns
            .iter()
            .map(|column| self.quoting.quote_segment(&column.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn primary_key_name(&self, table: &TableName, primary: &IndexDefinition) -> String {
        if primary.name.is_empty() || primary.name.eq_ignore_ascii_case("PRIMARY") {
            self.names.primary_key_name(&table.name)
        } else {
            primary.name.clone()
        }
    }

    fn foreign_key_clause(&self, table: &str, foreign_key: &ForeignKeyDefinition) -> String {
        let name = if foreign_key.name.is_empty() {
            let ref_table = foreign_key
                .ref_table
                .rsplit('.')
                .next()
                .unwrap_or(&foreign_key.ref_table);
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
            self.quoting.quote_identifier(foreign_key.ref_table.as_str()),
            self.quoting.quote_segment(&foreign_key.ref_column),
            foreign_key.on_delete.as_sql(),
            foreign_key.on_update.as_sql()
        )
    }

    fn table_comment(&self, table: &TableName, comment: &str) -> Statement {
        Statement::sql(format!(
            "COMMENT ON TABLE {} IS {}",
            self.table_ident(table),
            self.quoting.quote_string(comment)
        ))
    }

    fn column_comment(&self, table: &TableName, column: &str, comment: Option<&str>) -> Statement {
        let mut path = table.path();
        path.push(column.to_string());
        let comment = comment.map_or_else(|| "NULL".to_string(), |comment| {
            self.quoting.quote_string(comment)
        });
        Statement::sql(format!(
            "COMMENT ON COLUMN {} IS {comment}",
            self.quoting.quote_identifier(path)
        ))
    }

    /// Emulates `ON UPDATE CURRENT_TIMESTAMP` with a row trigger that
    /// refreshes the column unless the update set it explicitly. Trigger and
    /// function share a name.
    fn create_on_update_trigger(&self, table: &TableName, column: &str) -> Vec<Statement> {
        let trigger = self.names.on_update_trigger_name(&table.name, column);
        let function = self.schema_ident(table, &trigger);
        let column = self.quoting.quote_segment(column);
        vec![
            Statement::sql(format!(
                "CREATE OR REPLACE FUNCTION {function}() RETURNS trigger AS $$ \
                 BEGIN IF NEW.{column} IS NOT DISTINCT FROM OLD.{column} THEN \
                 NEW.{column} := CURRENT_TIMESTAMP; END IF; RETURN NEW; END; \
                 $$ LANGUAGE plpgsql"
            )),
            Statement::sql(format!(
                "CREATE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW EXECUTE FUNCTION {function}()",
                self.quoting.quote_segment(&trigger),
                self.table_ident(table)
            )),
        ]
    }

    fn drop_on_update_trigger(&self, table: &TableName, column: &str) -> Vec<Statement> {
        let trigger = self.names.on_update_trigger_name(&table.name, column);
        vec![
            Statement::sql(format!(
                "DROP TRIGGER IF EXISTS {} ON {}",
                self.quoting.quote_segment(&trigger),
                self.table_ident(table)
            )),
            Statement::sql(format!(
                "DROP FUNCTION IF EXISTS {}()",
                self.schema_ident(table, &trigger)
            )),
        ]
    }

    fn table_ident(&self, table: &TableName) -> String {
        self.quoting.quote_identifier(table.path())
    }

    /// Indexes and functions are qualified by the schema, not by the table.
    fn schema_ident(&self, table: &TableName, name: &str) -> String {
        match &table.schema {
            Some(schema) => self.quoting.quote_identifier([schema.as_str(), name]),
            None => self.quoting.quote_segment(name),
        }
    }
}

fn option<'t>(table: &'t TableDefinition, key: &str) -> Option<&'t str> {
    table
        .options
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value.as_str())
}

fn refreshed_on_update(column: &ColumnDefinition) -> bool {
    column.effective_default() == Some(&ColumnDefault::NowOnUpdate)
}

fn on_update_columns(table: &TableDefinition) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|column| refreshed_on_update(column))
        .map(|column| column.name.clone())
        .collect()
}
