use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{ColumnDefinition, ForeignKeyAction, ForeignKeyDefinition, IndexDefinition, IndexType};
use crate::{ConfigError, Result, TableName};

/// A table as the caller wants it to exist. Nothing is checked until
/// [`TableDefinition::validate`] runs at submission time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub schema: Option<String>,
    pub comment: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    pub indexes: Vec<IndexDefinition>,
    pub foreign_keys: Vec<ForeignKeyDefinition>,
    /// Storage options such as `engine` or `charset`; dialects ignore keys they
    /// do not understand.
    pub options: BTreeMap<String, String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn add_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn add_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    #[must_use]
    pub fn add_foreign_key(mut self, foreign_key: ForeignKeyDefinition) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    #[must_use]
    pub fn set_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    #[must_use]
    pub fn set_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn table_name(&self) -> TableName {
        TableName {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDefinition> {
        self.columns
            .iter_mut()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn primary_index(&self) -> Option<&IndexDefinition> {
        self.indexes
            .iter()
            .find(|index| index.index_type == IndexType::Primary)
    }

    /// Primary key columns in key order, preferring an explicit primary index
    /// over column flags.
    #[must_use]
    pub fn primary_key_columns(&self) -> Vec<String> {
        match self.primary_index() {
            Some(index) => index.column_names().map(str::to_string).collect(),
            None => self.flagged_primary_columns(),
        }
    }

    fn flagged_primary_columns(&self) -> Vec<String> {
        let mut flagged = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.primary)
            .map(|(ordinal, column)| {
                (
                    column.primary_position.unwrap_or(u32::MAX),
                    ordinal,
                    column.name.clone(),
                )
            })
            .collect::<Vec<_>>();
        flagged.sort();
        flagged.into_iter().map(|(_, _, name)| name).collect()
    }

    #[must_use]
    pub fn identity_column(&self) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.identity)
    }

    /// Checks cross-field consistency before any SQL is generated.
    pub fn validate(&self) -> Result<()> {
        let table = self.name.clone();
        if self.comment.as_deref().is_none_or(|comment| comment.trim().is_empty()) {
            return Err(ConfigError::MissingTableComment { table }.into());
        }
        if self.columns.is_empty() {
            return Err(ConfigError::EmptyTable { table }.into());
        }

        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.to_ascii_lowercase()) {
                return Err(ConfigError::DuplicateColumn {
                    table,
                    column: column.name.clone(),
                }
                .into());
            }
            column.validate()?;
        }

        let primary_indexes = self
            .indexes
            .iter()
            .filter(|index| index.index_type == IndexType::Primary)
            .count();
        if primary_indexes > 1 {
            return Err(ConfigError::MultiplePrimaryIndexes { table }.into());
        }

        for index in &self.indexes {
            if index.columns.is_empty() {
                return Err(ConfigError::EmptyIndex {
                    table,
                    index: index.name.clone(),
                }
                .into());
            }
            if let Some(missing) = index.column_names().find(|name| self.column(name).is_none()) {
                return Err(ConfigError::UnknownIndexColumn {
                    table,
                    index: index.name.clone(),
                    column: missing.to_string(),
                }
                .into());
            }
        }

        if let Some(index) = self.primary_index() {
            let flags = self.flagged_primary_columns();
            let declared = index.column_names().map(str::to_string).collect::<Vec<_>>();
            let agrees = flags.is_empty()
                || (flags.len() == declared.len()
                    && flags
                        .iter()
                        .zip(&declared)
                        .all(|(flag, name)| flag.eq_ignore_ascii_case(name)));
            if !agrees {
                return Err(ConfigError::PrimaryKeyMismatch {
                    table,
                    index: declared,
                    flags,
                }
                .into());
            }
        }

        for foreign_key in &self.foreign_keys {
            let Some(column) = self.column(&foreign_key.column) else {
                return Err(ConfigError::UnknownForeignKeyColumn {
                    table,
                    name: foreign_key.name.clone(),
                    column: foreign_key.column.clone(),
                }
                .into());
            };
            let sets_null = foreign_key.on_delete == ForeignKeyAction::SetNull
                || foreign_key.on_update == ForeignKeyAction::SetNull;
            if sets_null && !column.effective_nullable() {
                return Err(ConfigError::SetNullOnNotNullColumn {
                    name: foreign_key.name.clone(),
                    column: column.name.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Copy of the definition with primary flags and the primary index made
    /// consistent, so generators can rely on either.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut normalized = self.clone();
        let primary = self.primary_key_columns();
        for (position, name) in primary.iter().enumerate() {
            if let Some(column) = normalized.column_mut(name) {
                column.primary = true;
                column.primary_position = Some(position as u32 + 1);
                column.nullable = false;
            }
        }
        if normalized.primary_index().is_none() && !primary.is_empty() {
            normalized.indexes.insert(
                0,
                IndexDefinition::new("PRIMARY", IndexType::Primary, primary),
            );
        }
        normalized
    }
}
