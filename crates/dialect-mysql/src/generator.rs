use std::fmt::Write as _;

use sqlbridge_core::{
    AlterOp, ColumnDefault, ColumnDefinition, ConfigError, ForeignKeyDefinition, IndexColumn,
    IndexDefinition, IndexType, NameBuilder, Quoting, Result, Statement, TableDefinition,
    TableName, Value,
};
use tracing::warn;

use crate::types;

const DIALECT_NAME: &str = "mysql";
const DEFAULT_ENGINE: &str = "InnoDB";
const DEFAULT_CHARSET: &str = "utf8mb4";

/// DDL rendering for the row-store backend. Every change is a single
/// `ALTER TABLE` statement.
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

        let mut parts = table
            .columns
            .iter()
            .map(|column| self.column_definition(column))
            .collect::<Vec<_>>();
        for index in &table.indexes {
            parts.push(self.index_clause(&table.name, index));
        }
        for foreign_key in &table.foreign_keys {
            parts.push(self.foreign_key_clause(&table.name, foreign_key));
        }

        let keyword = if temporary {
            "CREATE TEMPORARY TABLE"
        } else {
            "CREATE TABLE"
        };
        let mut sql = format!(
            "{keyword} {} ({})",
            self.quoting.quote_identifier(table.table_name().path()),
            parts.join(", ")
        );
        sql.push_str(&self.table_options(&table));
        Ok(vec![Statement::sql(sql)])
    }

    pub(crate) fn alter_table(
        &self,
        current: &TableDefinition,
        op: &AlterOp,
    ) -> Result<Vec<Statement>> {
        let name = current.table_name();
        let table = self.quoting.quote_identifier(name.path());
        let sql = match op {
            AlterOp::AddColumn(column) => {
                column.validate()?;
                let mut definition = self.column_definition(column);
                if column.primary && current.primary_key_columns().is_empty() {
                    definition.push_str(" PRIMARY KEY");
                }
                format!("ALTER TABLE {table} ADD COLUMN {definition}")
            }
            AlterOp::DropColumn(column) => format!(
                "ALTER TABLE {table} DROP COLUMN {}",
                self.quoting.quote_segment(column)
            ),
            AlterOp::ChangeColumn { from, column } => {
                column.validate()?;
                let column = keep_key_membership(current, from, column);
                format!(
                    "ALTER TABLE {table} CHANGE COLUMN {} {}",
                    self.quoting.quote_segment(from),
                    self.column_definition(&column)
                )
            }
            AlterOp::ModifyColumn(column) => {
                column.validate()?;
                let column = keep_key_membership(current, &column.name, column);
                format!(
                    "ALTER TABLE {table} MODIFY COLUMN {}",
                    self.column_definition(&column)
                )
            }
            AlterOp::AddIndex(index) => {
                format!(
                    "ALTER TABLE {table} ADD {}",
                    self.index_clause(&name.name, index)
                )
            }
            AlterOp::DropIndex(index) if index.eq_ignore_ascii_case("PRIMARY") => {
                format!("ALTER TABLE {table} DROP PRIMARY KEY")
            }
            AlterOp::DropIndex(index) => format!(
                "ALTER TABLE {table} DROP INDEX {}",
                self.quoting.quote_segment(index)
            ),
            AlterOp::AddForeignKey(foreign_key) => format!(
                "ALTER TABLE {table} ADD {}",
                self.foreign_key_clause(&name.name, foreign_key)
            ),
            AlterOp::DropForeignKey(foreign_key) => format!(
                "ALTER TABLE {table} DROP FOREIGN KEY {}",
                self.quoting.quote_segment(foreign_key)
            ),
            AlterOp::SetComment(comment) => format!(
                "ALTER TABLE {table} COMMENT = {}",
                self.quoting.quote_string(comment)
            ),
            AlterOp::Truncate => format!("TRUNCATE TABLE {table}"),
            AlterOp::Rename(new_name) => {
                let renamed = TableName {
                    schema: new_name.schema.clone().or_else(|| name.schema.clone()),
                    name: new_name.name.clone(),
                };
                format!(
                    "RENAME TABLE {table} TO {}",
                    self.quoting.quote_identifier(renamed.path())
                )
            }
        };
        Ok(vec![Statement::sql(sql)])
    }

    pub(crate) fn column_definition(&self, column: &ColumnDefinition) -> String {
        let mut sql = format!(
            "{} {}",
            self.quoting.quote_segment(&column.name),
            types::column_type_sql(column)
        );
        let nullable = column.effective_nullable();
        sql.push_str(if nullable { " NULL" } else { " NOT NULL" });
        match column.effective_default() {
            None => {}
            Some(ColumnDefault::Null) => {
                if nullable {
                    sql.push_str(" DEFAULT NULL");
                }
            }
            Some(ColumnDefault::Literal(_)) if column.column_type.is_large_object() => {
                warn!(
                    column = %column.name,
                    column_type = %column.column_type,
                    "large object columns cannot carry a literal default, skipping it"
                );
            }
            Some(ColumnDefault::Literal(Value::Expr(expr))) => {
                write!(sql, " DEFAULT ({expr})").expect("writing to String should not fail");
            }
            Some(ColumnDefault::Literal(value)) => {
                let literal = self.quoting.quote_value(value, Some(column.column_type));
                write!(sql, " DEFAULT {literal}").expect("writing to String should not fail");
            }
            Some(ColumnDefault::Now) => sql.push_str(" DEFAULT CURRENT_TIMESTAMP"),
            Some(ColumnDefault::NowOnUpdate) => {
                sql.push_str(" DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP");
            }
        }
        if column.identity {
            sql.push_str(" AUTO_INCREMENT");
        }
        if let Some(comment) = &column.comment {
            write!(sql, " COMMENT {}", self.quoting.quote_string(comment))
                .expect("writing to String should not fail");
        }
        sql
    }

    fn index_clause(&self, table: &str, index: &IndexDefinition) -> String {
        let columns = self.index_columns(&index.columns);
        if index.index_type == IndexType::Primary {
            return format!("PRIMARY KEY ({columns})");
        }
        let name = if index.name.is_empty() {
            let names = index.column_names().collect::<Vec<_>>();
            self.names.index_name(table, &names, index.index_type)
        } else {
            index.name.clone()
        };
        let keyword = match index.index_type {
            IndexType::Unique => "UNIQUE INDEX",
            IndexType::Fulltext => "FULLTEXT INDEX",
            IndexType::Index | IndexType::Primary => "INDEX",
        };
        format!("{keyword} {} ({columns})", self.quoting.quote_segment(&name))
    }

    fn index_columns(&self, columns: &[IndexColumn]) -> String {
        columns
            .iter()
            .map(|column| match column.prefix_length {
                Some(length) => format!("{}({length})", self.quoting.quote_segment(&column.name)),
                None => self.quoting.quote_segment(&column.name),
            })
            .collect::<Vec<_>>()
            .join(", ")
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

    /// ` ENGINE=... DEFAULT CHARSET=... COMMENT='...'` from the table options.
    fn table_options(&self, table: &TableDefinition) -> String {
        let option = |key: &str| {
            table
                .options
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .map(|(_, value)| value.as_str())
        };
        let mut sql = format!(
            " ENGINE={} DEFAULT CHARSET={}",
            option("engine").unwrap_or(DEFAULT_ENGINE),
            option("charset").unwrap_or(DEFAULT_CHARSET)
        );
        if let Some(collate) = option("collate") {
            write!(sql, " COLLATE={collate}").expect("writing to String should not fail");
        }
        if let Some(row_format) = option("row_format") {
            write!(sql, " ROW_FORMAT={row_format}").expect("writing to String should not fail");
        }
        if let Some(comment) = &table.comment {
            write!(sql, " COMMENT={}", self.quoting.quote_string(comment))
                .expect("writing to String should not fail");
        }
        sql
    }
}

/// `AUTO_INCREMENT` has to lead the primary key.
fn check_identity(table: &TableDefinition) -> Result<()> {
    let Some(identity) = table.identity_column() else {
        return Ok(());
    };
    let leads_key = table
        .primary_key_columns()
        .first()
        .is_some_and(|first| first.eq_ignore_ascii_case(&identity.name));
    if leads_key {
        return Ok(());
    }
    Err(ConfigError::IdentityRequiresSinglePrimaryKey {
        column: identity.name.clone(),
        dialect: DIALECT_NAME,
    }
    .into())
}

/// A redefined primary key column stays `NOT NULL`; the key itself is not
/// touched by `MODIFY`/`CHANGE`.
fn keep_key_membership(
    current: &TableDefinition,
    from: &str,
    column: &ColumnDefinition,
) -> ColumnDefinition {
    let mut column = column.clone();
    let primary = current
        .primary_key_columns()
        .iter()
        .any(|name| name.eq_ignore_ascii_case(from));
    if primary {
        column.nullable = false;
    }
    column
}
