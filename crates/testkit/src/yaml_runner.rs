use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use sqlbridge_core::{
    AlterOp, ColumnDefinition, ColumnType, Dialect, ForeignKeyAction, ForeignKeyDefinition,
    IndexColumn, IndexDefinition, IndexType, Statement, TableDefinition, TableName,
    parse_default_literal,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaseError {
    #[error("failed to read case file `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse yaml cases: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Dialect(#[from] sqlbridge_core::Error),
    #[error("{0}")]
    Assertion(String),
}

/// One DDL generation case. Without `op` the case renders `CREATE TABLE`;
/// with it, the alteration is rendered against `table`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestCase {
    pub table: CaseTable,
    pub op: Option<CaseOp>,
    pub temporary: bool,
    /// Dialect name, or `!name` to run everywhere else.
    pub flavor: Option<String>,
    /// Statements separated by `;` and newlines.
    pub expected: Option<String>,
    /// Substring of the expected error message.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaseTable {
    pub name: String,
    pub schema: Option<String>,
    pub comment: Option<String>,
    pub columns: Vec<CaseColumn>,
    pub indexes: Vec<CaseIndex>,
    pub foreign_keys: Vec<CaseForeignKey>,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub scale: Option<u32>,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub unsigned: bool,
    #[serde(default)]
    pub identity: bool,
    /// Position in the primary key.
    #[serde(default)]
    pub primary: Option<u32>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Catalog-style default text such as `'abc'`, `0` or `CURRENT_TIMESTAMP`.
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub on_update: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseIndex {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub index_type: IndexType,
    /// `name` or `name(prefix)`.
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseForeignKey {
    #[serde(default)]
    pub name: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
    #[serde(default)]
    pub on_delete: Option<ForeignKeyAction>,
    #[serde(default)]
    pub on_update: Option<ForeignKeyAction>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseOp {
    AddColumn(CaseColumn),
    DropColumn(String),
    ChangeColumn { from: String, column: CaseColumn },
    ModifyColumn(CaseColumn),
    AddIndex(CaseIndex),
    DropIndex(String),
    AddForeignKey(CaseForeignKey),
    DropForeignKey(String),
    SetComment(String),
    Truncate,
    Rename(String),
}

impl From<&CaseColumn> for ColumnDefinition {
    fn from(case: &CaseColumn) -> Self {
        let mut column = ColumnDefinition::new(case.name.as_str(), case.column_type);
        column.length = case.length;
        column.precision = case.precision;
        column.scale = case.scale;
        column.nullable = !case.not_null;
        column.unsigned = case.unsigned;
        column.comment = case.comment.clone();
        column.default = parse_default_literal(case.default.as_deref(), case.on_update);
        if case.identity {
            column = column.identity();
        }
        if let Some(position) = case.primary {
            column = column.primary(position);
        }
        column
    }
}

impl From<&CaseIndex> for IndexDefinition {
    fn from(case: &CaseIndex) -> Self {
        let columns = case.columns.iter().map(|raw| {
            let prefix = raw
                .split_once('(')
                .and_then(|(name, rest)| Some((name, rest.strip_suffix(')')?.parse().ok()?)));
            match prefix {
                Some((name, length)) => IndexColumn::new(name.trim()).prefix(length),
                None => IndexColumn::new(raw.trim()),
            }
        });
        IndexDefinition::new(case.name.as_str(), case.index_type, columns)
    }
}

impl From<&CaseForeignKey> for ForeignKeyDefinition {
    fn from(case: &CaseForeignKey) -> Self {
        let mut foreign_key = ForeignKeyDefinition::new(
            case.name.as_str(),
            case.column.as_str(),
            case.ref_table.as_str(),
            case.ref_column.as_str(),
        );
        if let Some(action) = case.on_delete {
            foreign_key = foreign_key.on_delete(action);
        }
        if let Some(action) = case.on_update {
            foreign_key = foreign_key.on_update(action);
        }
        foreign_key
    }
}

impl From<&CaseTable> for TableDefinition {
    fn from(case: &CaseTable) -> Self {
        let mut table = TableDefinition::new(case.name.as_str());
        table.schema = case.schema.clone();
        table.comment = case.comment.clone();
        table.options = case.options.clone();
        table.columns = case.columns.iter().map(Into::into).collect();
        table.indexes = case.indexes.iter().map(Into::into).collect();
        table.foreign_keys = case.foreign_keys.iter().map(Into::into).collect();
        table
    }
}

impl From<&CaseOp> for AlterOp {
    fn from(case: &CaseOp) -> Self {
        match case {
            CaseOp::AddColumn(column) => Self::AddColumn(column.into()),
            CaseOp::DropColumn(column) => Self::DropColumn(column.clone()),
            CaseOp::ChangeColumn { from, column } => Self::ChangeColumn {
                from: from.clone(),
                column: column.into(),
            },
            CaseOp::ModifyColumn(column) => Self::ModifyColumn(column.into()),
            CaseOp::AddIndex(index) => Self::AddIndex(index.into()),
            CaseOp::DropIndex(index) => Self::DropIndex(index.clone()),
            CaseOp::AddForeignKey(foreign_key) => Self::AddForeignKey(foreign_key.into()),
            CaseOp::DropForeignKey(name) => Self::DropForeignKey(name.clone()),
            CaseOp::SetComment(comment) => Self::SetComment(comment.clone()),
            CaseOp::Truncate => Self::Truncate,
            CaseOp::Rename(name) => Self::Rename(TableName::from(name.as_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestResult {
    Passed,
    Skipped(String),
    Failed(String),
}

pub fn load_test_cases_from_str(yaml: &str) -> Result<BTreeMap<String, TestCase>, CaseError> {
    Ok(serde_yaml::from_str(yaml)?)
}

pub fn load_test_cases_from_path(path: &Path) -> Result<BTreeMap<String, TestCase>, CaseError> {
    let yaml = std::fs::read_to_string(path).map_err(|source| CaseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_test_cases_from_str(&yaml)
}

pub fn matches_flavor(requirement: Option<&str>, current_flavor: &str) -> bool {
    let Some(requirement) = requirement.map(str::trim).filter(|value| !value.is_empty()) else {
        return true;
    };

    if let Some(excluded_flavor) = requirement.strip_prefix('!') {
        return excluded_flavor != current_flavor;
    }

    requirement == current_flavor
}

/// Renders the case on `dialect` and compares it with the expectation.
/// Cases for another flavor are skipped.
pub fn run_test(dialect: &dyn Dialect, test: &TestCase) -> TestResult {
    if !matches_flavor(test.flavor.as_deref(), dialect.name()) {
        return TestResult::Skipped(format!(
            "requires flavor '{}', running on '{}'",
            test.flavor.as_deref().unwrap_or_default(),
            dialect.name()
        ));
    }
    match evaluate_expected_error(test, run_test_flow(dialect, test)) {
        Ok(()) => TestResult::Passed,
        Err(error) => TestResult::Failed(error.to_string()),
    }
}

/// Runs every case and collects the failures as `name: reason`.
pub fn run_all(dialect: &dyn Dialect, cases: &BTreeMap<String, TestCase>) -> Vec<String> {
    cases
        .iter()
        .filter_map(|(name, test)| match run_test(dialect, test) {
            TestResult::Failed(reason) => Some(format!("{name}: {reason}")),
            TestResult::Passed | TestResult::Skipped(_) => None,
        })
        .collect()
}

fn run_test_flow(dialect: &dyn Dialect, test: &TestCase) -> Result<(), CaseError> {
    let table = TableDefinition::from(&test.table);
    let statements = match &test.op {
        None => dialect.create_table(&table, test.temporary)?,
        Some(op) => dialect.alter_table(&table, &AlterOp::from(op))?,
    };
    assert_expected_sql(test.expected.as_deref(), &statements)
}

fn evaluate_expected_error(
    test: &TestCase,
    execution_result: Result<(), CaseError>,
) -> Result<(), CaseError> {
    let Some(expected_error) = test.error.as_deref() else {
        return execution_result;
    };

    match execution_result {
        Ok(()) => Err(CaseError::Assertion(format!(
            "expected error: {expected_error}, but got no error"
        ))),
        Err(actual_error) => {
            let actual_error = actual_error.to_string();
            if actual_error.contains(expected_error) {
                Ok(())
            } else {
                Err(CaseError::Assertion(format!(
                    "expected error: {expected_error}, but got: {actual_error}"
                )))
            }
        }
    }
}

/// One statement per line, each terminated by `;`.
#[must_use]
pub fn render_statements(statements: &[Statement]) -> String {
    statements
        .iter()
        .map(|statement| format!("{};\n", statement.sql))
        .collect()
}

fn assert_expected_sql(expected: Option<&str>, statements: &[Statement]) -> Result<(), CaseError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let actual = render_statements(statements);
    if normalize_sql(expected) == normalize_sql(&actual) {
        return Ok(());
    }

    Err(CaseError::Assertion(format!(
        "SQL mismatch; expected:\n{}\nactual:\n{}",
        expected.trim(),
        actual.trim()
    )))
}

/// Folds the line breaks YAML block scalars leave inside long statements.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
