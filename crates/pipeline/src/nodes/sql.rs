//! SQL over the node's input tables, delegated to an injected engine.

use vigil_core::PipelineResult;

use crate::error::{PipelineError, Result};
use crate::operator::{input_tables, Operator, OperatorContext, OperatorInputs};

pub const DEFAULT_DIALECT: &str = "default";
pub const CALCITE_DIALECT: &str = "calcite";

/// Runs `params.sql` with each input table registered under its input key.
pub struct SqlExecutionOperator {
    dialect: &'static str,
}

impl SqlExecutionOperator {
    pub fn default_dialect() -> Self {
        Self { dialect: DEFAULT_DIALECT }
    }

    pub fn calcite() -> Self {
        Self { dialect: CALCITE_DIALECT }
    }

    pub fn dialect(&self) -> &str {
        self.dialect
    }
}

#[async_trait::async_trait]
impl Operator for SqlExecutionOperator {
    async fn execute(&self, ctx: &OperatorContext, inputs: OperatorInputs) -> Result<PipelineResult> {
        let sql = ctx.require_str("sql")?;
        let engine = ctx
            .app()
            .sql_engine(self.dialect)
            .ok_or_else(|| PipelineError::MissingCollaborator(format!("sql engine '{}'", self.dialect)))?;

        let tables = input_tables(&inputs)?;
        let table = engine.execute(sql, &tables).await?;
        tracing::debug!(
            node = %ctx.node_name(),
            dialect = self.dialect,
            rows = table.len(),
            "sql executed"
        );
        Ok(PipelineResult::TimeSeries(table))
    }
}
