use serde_json::Value;
use vigil_core::{DataTable, PipelineResult};

use crate::error::{PipelineError, Result};
use crate::operator::{Operator, OperatorContext, OperatorInputs};

/// Reduces its inputs, in input order, into one result.
///
/// `mode: concat` (default) concatenates same-kind inputs: anomaly and event
/// lists, enumeration items, time-series rows, and opaque values (arrays are
/// flattened). Mixed kinds, and `mode: collect`, yield `Combined` instead.
pub struct CombinerOperator;

#[async_trait::async_trait]
impl Operator for CombinerOperator {
    async fn execute(&self, ctx: &OperatorContext, inputs: OperatorInputs) -> Result<PipelineResult> {
        let parts: Vec<PipelineResult> = inputs.into_values().collect();
        match ctx.str_param("mode").unwrap_or("concat") {
            "concat" => concat(parts),
            "collect" => Ok(PipelineResult::Combined(parts)),
            other => Err(PipelineError::invalid_param(
                "mode",
                format!("unknown combine mode '{other}' (expected concat or collect)"),
            )),
        }
    }
}

fn concat(parts: Vec<PipelineResult>) -> Result<PipelineResult> {
    let kind = match parts.first() {
        Some(first) => first.kind(),
        None => return Ok(PipelineResult::Combined(parts)),
    };
    if parts.iter().any(|p| p.kind() != kind) {
        return Ok(PipelineResult::Combined(parts));
    }

    let combined = match kind {
        "anomalies" => PipelineResult::Anomalies(
            parts
                .into_iter()
                .flat_map(|p| match p {
                    PipelineResult::Anomalies(list) => list,
                    _ => Vec::new(),
                })
                .collect(),
        ),
        "events" => PipelineResult::Events(
            parts
                .into_iter()
                .flat_map(|p| match p {
                    PipelineResult::Events(list) => list,
                    _ => Vec::new(),
                })
                .collect(),
        ),
        "enumeration" => PipelineResult::Enumeration(
            parts
                .into_iter()
                .flat_map(|p| match p {
                    PipelineResult::Enumeration(list) => list,
                    _ => Vec::new(),
                })
                .collect(),
        ),
        "timeSeries" => {
            let mut table = DataTable::default();
            for part in parts {
                if let PipelineResult::TimeSeries(t) = part {
                    table.append(t)?;
                }
            }
            PipelineResult::TimeSeries(table)
        }
        "opaque" => {
            let mut values = Vec::new();
            for part in parts {
                match part {
                    PipelineResult::Opaque(Value::Array(items)) => values.extend(items),
                    PipelineResult::Opaque(v) => values.push(v),
                    _ => {}
                }
            }
            PipelineResult::Opaque(Value::Array(values))
        }
        _ => PipelineResult::Combined(parts),
    };
    Ok(combined)
}
