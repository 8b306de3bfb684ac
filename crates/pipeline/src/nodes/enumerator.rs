use serde_json::Value;
use vigil_core::{EnumerationItem, PipelineResult};

use crate::error::{PipelineError, Result};
use crate::operator::{Operator, OperatorContext, OperatorInputs};

/// Emits the static `items` list as an enumeration.
///
/// Each entry is either a plain string (the item name) or an object with
/// optional `id`, `name` and `params`. Unnamed items are named after their
/// params, e.g. `country=US,device=mobile`.
pub struct EnumeratorOperator;

#[async_trait::async_trait]
impl Operator for EnumeratorOperator {
    async fn execute(&self, ctx: &OperatorContext, _inputs: OperatorInputs) -> Result<PipelineResult> {
        let raw = ctx
            .param("items")
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::invalid_param("items", "expected a list"))?;

        let items = raw
            .iter()
            .enumerate()
            .map(|(idx, entry)| parse_item(idx, entry))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(node = %ctx.node_name(), items = items.len(), "enumerated items");
        Ok(PipelineResult::Enumeration(items))
    }
}

fn parse_item(idx: usize, entry: &Value) -> Result<EnumerationItem> {
    match entry {
        Value::String(name) => Ok(EnumerationItem::named(name.clone())),
        Value::Object(_) => {
            let mut item: EnumerationItem = serde_json::from_value(entry.clone())
                .map_err(|e| PipelineError::invalid_param("items", format!("entry {idx}: {e}")))?;
            if item.name.is_empty() {
                item.name = item
                    .params
                    .iter()
                    .map(|(k, v)| match v {
                        Value::String(s) => format!("{k}={s}"),
                        other => format!("{k}={other}"),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
            }
            Ok(item)
        }
        _ => Err(PipelineError::invalid_param(
            "items",
            format!("entry {idx} must be a string or an object"),
        )),
    }
}
