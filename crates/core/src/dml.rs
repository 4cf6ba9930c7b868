use crate::{BoundQuery, ConfigError, Quoting, Result, TableName, Value};

/// How an insert treats rows that collide with a unique key.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertMode {
    Plain,
    Ignore,
    Replace,
    /// Update the listed fields of the existing row; an empty list updates
    /// every inserted column.
    Update(Vec<UpdateField>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateValue {
    /// The value the insert attempted for the named column.
    Inserted(String),
    /// A literal, or raw SQL when given a `Value::Expr`.
    Value(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateField {
    pub column: String,
    pub value: UpdateValue,
}

impl UpdateField {
    pub fn column(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            value: UpdateValue::Inserted(column.clone()),
            column,
        }
    }

    pub fn inserted_from(column: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: UpdateValue::Inserted(source.into()),
        }
    }

    pub fn set(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: UpdateValue::Value(value.into()),
        }
    }
}

impl From<&str> for UpdateField {
    fn from(column: &str) -> Self {
        Self::column(column)
    }
}

impl From<String> for UpdateField {
    fn from(column: String) -> Self {
        Self::column(column)
    }
}

/// A multi-row insert ready for a dialect to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: TableName,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub mode: InsertMode,
    /// Unique key column sets of the table, primary key included, in catalog
    /// order. Needed by dialects whose upsert names a conflict target.
    pub unique_keys: Vec<Vec<String>>,
    /// Column to hand back from the statement itself.
    pub returning: Option<String>,
}

impl Insert {
    pub fn new(table: impl Into<TableName>, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            table: table.into(),
            columns,
            rows,
            mode: InsertMode::Plain,
            unique_keys: Vec::new(),
            returning: None,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: InsertMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn unique_keys(mut self, unique_keys: Vec<Vec<String>>) -> Self {
        self.unique_keys = unique_keys;
        self
    }

    #[must_use]
    pub fn returning(mut self, column: Option<String>) -> Self {
        self.returning = column;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() || self.rows.is_empty() {
            return Err(ConfigError::EmptyInsert {
                table: self.table.to_string(),
            }
            .into());
        }
        for (row, values) in self.rows.iter().enumerate() {
            if values.len() != self.columns.len() {
                return Err(ConfigError::RaggedInsertRow {
                    table: self.table.to_string(),
                    row,
                    expected: self.columns.len(),
                    given: values.len(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Update fields with the empty-list shorthand expanded.
    #[must_use]
    pub fn update_fields(&self) -> Vec<UpdateField> {
        match &self.mode {
            InsertMode::Update(fields) if !fields.is_empty() => fields.clone(),
            InsertMode::Update(_) | InsertMode::Replace => self
                .columns
                .iter()
                .map(|column| UpdateField::column(column.as_str()))
                .collect(),
            InsertMode::Plain | InsertMode::Ignore => Vec::new(),
        }
    }

    /// `INSERT INTO t (a, b) VALUES (?, ?), (?, ?)` without any conflict
    /// clause. Raw expressions are inlined; everything else is bound.
    #[must_use]
    pub fn render_values(&self, verb: &str, quoting: &Quoting) -> BoundQuery {
        let columns = self
            .columns
            .iter()
            .map(|column| quoting.quote_identifier(column.as_str()))
            .collect::<Vec<_>>();
        let mut params = Vec::new();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let values = row
                    .iter()
                    .map(|value| match value {
                        Value::Expr(expr) => expr.as_str().to_string(),
                        other => {
                            params.push(other.clone());
                            "?".to_string()
                        }
                    })
                    .collect::<Vec<_>>();
                format!("({})", values.join(", "))
            })
            .collect::<Vec<_>>();
        BoundQuery::new(
            format!(
                "{verb} {} ({}) VALUES {}",
                quoting.quote_identifier(self.table.path()),
                columns.join(", "),
                rows.join(", ")
            ),
            params,
        )
    }
}

/// Picks the conflict target for an upsert: among unique keys fully covered by
/// the inserted columns, the one sharing the fewest columns with the update
/// set, then the one with the fewest columns; first in catalog order wins ties.
pub fn infer_conflict_columns(
    table: &TableName,
    inserted: &[String],
    updated: &[String],
    unique_keys: &[Vec<String>],
) -> Result<Vec<String>> {
    let contains =
        |set: &[String], name: &str| set.iter().any(|item| item.eq_ignore_ascii_case(name));
    unique_keys
        .iter()
        .filter(|key| !key.is_empty() && key.iter().all(|column| contains(inserted, column)))
        .map(|key| {
            let overlap = key.iter().filter(|column| contains(updated, column)).count();
            (overlap, key.len(), key)
        })
        .min_by_key(|(overlap, width, _)| (*overlap, *width))
        .map(|(_, _, key)| key.clone())
        .ok_or_else(|| {
            ConfigError::NoConflictTarget {
                table: table.to_string(),
                columns: inserted.to_vec(),
            }
            .into()
        })
}

/// `ON CONFLICT (...) DO UPDATE SET ...` against the inferred unique key, for
/// dialects that name the proposed row `excluded` (in either case). Literal
/// values are bound when `params` is given and inlined otherwise.
pub fn upsert_clause(
    quoting: &Quoting,
    table: &TableName,
    columns: &[String],
    fields: &[UpdateField],
    unique_keys: &[Vec<String>],
    excluded: &str,
    mut params: Option<&mut Vec<Value>>,
) -> Result<String> {
    let updated = fields
        .iter()
        .map(|field| field.column.clone())
        .collect::<Vec<_>>();
    let conflict = infer_conflict_columns(table, columns, &updated, unique_keys)?
        .iter()
        .map(|column| quoting.quote_segment(column))
        .collect::<Vec<_>>();
    let assignments = fields
        .iter()
        .map(|field| {
            let target = quoting.quote_segment(&field.column);
            match &field.value {
                UpdateValue::Inserted(source) => {
                    format!("{target} = {excluded}.{}", quoting.quote_segment(source))
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
    Ok(format!(
        " ON CONFLICT ({}) DO UPDATE SET {}",
        conflict.join(", "),
        assignments.join(", ")
    ))
}

/// Renders `a = ?, b = NOW()` for an update, binding plain values.
pub(crate) fn render_assignments(
    assignments: &[(String, Value)],
    quoting: &Quoting,
    params: &mut Vec<Value>,
) -> String {
    assignments
        .iter()
        .map(|(column, value)| {
            let target = quoting.quote_identifier(column.as_str());
            match value {
                Value::Expr(expr) => format!("{target} = {expr}"),
                other => {
                    params.push(other.clone());
                    format!("{target} = ?")
                }
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
