use vigil_core::PipelineResult;
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::operator::{Operator, OperatorContext, OperatorInputs};

/// Emits `params.value`; without one, passes its input through (several
/// inputs are collected in order); without inputs, emits the enumeration
/// item's name.
pub struct EchoOperator;

#[async_trait::async_trait]
impl Operator for EchoOperator {
    async fn execute(&self, ctx: &OperatorContext, inputs: OperatorInputs) -> Result<PipelineResult> {
        if let Some(value) = ctx.param("value") {
            return Ok(PipelineResult::Opaque(value.clone()));
        }
        match inputs.len() {
            0 => ctx
                .item()
                .map(|item| PipelineResult::Opaque(Value::String(item.name.clone())))
                .ok_or_else(|| {
                    PipelineError::invalid_param("value", "echo needs a value, an input or an enumeration item")
                }),
            1 => Ok(inputs.into_values().next().unwrap_or(PipelineResult::Opaque(Value::Null))),
            _ => Ok(PipelineResult::Combined(inputs.into_values().collect())),
        }
    }
}
