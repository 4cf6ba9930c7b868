use crate::TableName;

/// One generated DDL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub context: Option<StatementContext>,
}

impl Statement {
    pub fn sql(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: StatementContext) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn is_rebuild_step(&self) -> bool {
        matches!(self.context, Some(StatementContext::TableRebuild { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementContext {
    TableRebuild { table: TableName, step: RebuildStep },
}

/// Ordered phases of a shadow-table rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RebuildStep {
    CreateShadowTable,
    CopyData,
    DropOldTable,
    RenameShadowTable,
    RecreateIndexes,
    RecreateTriggers,
}
