//! Streams input rows through a stateful event trigger.

use vigil_core::PipelineResult;

use crate::error::{PipelineError, Result};
use crate::operator::{input_tables, Operator, OperatorContext, OperatorInputs};

pub struct EventTriggerOperator;

#[async_trait::async_trait]
impl Operator for EventTriggerOperator {
    async fn execute(&self, ctx: &OperatorContext, inputs: OperatorInputs) -> Result<PipelineResult> {
        let trigger_type = ctx.require_str("type")?;
        let factory = ctx
            .app()
            .trigger(trigger_type)
            .ok_or_else(|| PipelineError::MissingCollaborator(format!("event trigger '{trigger_type}'")))?;

        let tables = input_tables(&inputs)?;
        let mut trigger = factory.build(ctx.params(), ctx.window())?;
        let mut fed = 0usize;
        // Inputs keep declaration order.
        for key in inputs.keys() {
            let Some(table) = tables.get(key) else { continue };
            for row in &table.rows {
                trigger.trigger(&table.columns, row)?;
                fed += 1;
            }
        }
        let events = trigger.close()?;

        tracing::debug!(node = %ctx.node_name(), rows = fed, events = events.len(), "trigger closed");
        Ok(PipelineResult::Events(events))
    }
}
