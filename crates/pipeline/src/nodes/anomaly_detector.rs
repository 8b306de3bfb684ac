//! Runs a pluggable detector over input tables and turns flagged rows into
//! anomaly intervals.
//!
//! The detector is looked up by `params.type` among the factories registered
//! on the [`ApplicationContext`]. Each anomalous row inside the node window
//! becomes one interval ending at the next row's timestamp, or at
//! `start + monitoringGranularity` for the last row.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};
use vigil_core::{AnomalyInterval, DataTable, PipelineResult, Severity};

use crate::context::{ApplicationContext, DetectionRow, Detector, DetectorFactory};
use crate::error::{PipelineError, Result};
use crate::operator::{input_tables, Operator, OperatorContext, OperatorInputs};

/// Property naming the node that produced an anomaly.
pub const DETECTOR_COMPONENT_NAME: &str = "detectorComponentName";

pub struct AnomalyDetectorOperator;

#[async_trait::async_trait]
impl Operator for AnomalyDetectorOperator {
    async fn execute(&self, ctx: &OperatorContext, inputs: OperatorInputs) -> Result<PipelineResult> {
        let detector_type = ctx.require_str("type")?;
        let factory = ctx
            .app()
            .detector(detector_type)
            .ok_or_else(|| PipelineError::MissingCollaborator(format!("detector '{detector_type}'")))?;

        let tables = input_tables(&inputs)?;
        let detector = factory.build(ctx.params())?;
        let mut rows = detector.detect(&tables)?;
        rows.sort_by_key(|r| r.timestamp);

        let granularity = match ctx.period_param_ms("monitoringGranularity")? {
            Some(ms) => Some(ms),
            None => infer_granularity(&rows),
        };

        let template = anomaly_template(ctx)?;
        let window = ctx.window();
        let mut anomalies = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            if !row.anomaly || !window.contains(row.timestamp) {
                continue;
            }
            let end = match rows.get(idx + 1) {
                Some(next) => next.timestamp,
                None => {
                    let step = granularity.ok_or_else(|| {
                        PipelineError::invalid_param(
                            "monitoringGranularity",
                            "required to close an anomaly on the last row",
                        )
                    })?;
                    row.timestamp + step
                }
            };
            let mut anomaly = template.clone();
            anomaly.start_time = row.timestamp;
            anomaly.end_time = end;
            anomaly.avg_current_value = row.current;
            anomaly.avg_baseline_value = row.baseline;
            anomalies.push(anomaly);
        }

        tracing::debug!(
            node = %ctx.node_name(),
            detector = detector_type,
            rows = rows.len(),
            anomalies = anomalies.len(),
            "detection finished"
        );
        Ok(PipelineResult::Anomalies(anomalies))
    }
}

fn infer_granularity(rows: &[DetectionRow]) -> Option<i64> {
    match rows {
        [.., a, b] if b.timestamp > a.timestamp => Some(b.timestamp - a.timestamp),
        _ => None,
    }
}

/// Interval metadata shared by every anomaly this node emits, read from
/// `anomaly.*` params and the enumeration item.
fn anomaly_template(ctx: &OperatorContext) -> Result<AnomalyInterval> {
    let mut a = AnomalyInterval::new(0, 0);
    a.metric = ctx.str_param("anomaly.metric").map(str::to_string);
    a.dataset = ctx.str_param("anomaly.dataset").map(str::to_string);
    a.source = Some(
        ctx.str_param("anomaly.source")
            .unwrap_or(ctx.node_name())
            .to_string(),
    );
    if let Some(t) = ctx.str_param("anomaly.type") {
        a.anomaly_type = t.to_string();
    }
    if let Some(sev) = ctx.param("anomaly.severity") {
        a.severity = serde_json::from_value::<Severity>(sev.clone())
            .map_err(|e| PipelineError::invalid_param("anomaly.severity", e.to_string()))?;
    }
    if let Some(dims) = ctx.param("anomaly.dimensions") {
        a.dimensions = serde_json::from_value::<BTreeMap<String, String>>(dims.clone())
            .map_err(|e| PipelineError::invalid_param("anomaly.dimensions", e.to_string()))?;
    }
    a.properties
        .insert(DETECTOR_COMPONENT_NAME.to_string(), ctx.node_name().to_string());
    a.alert_id = ctx.alert_id();
    if let Some(item) = ctx.item() {
        a.enumeration_item_id = item.id;
    }
    Ok(a)
}

// ── Built-in threshold detector ──────────────────────────────

/// Flags rows whose value falls outside `[min, max]`.
///
/// Reads the `current` input (or the only input) using `timeColumn`
/// (default `ts`) and `valueColumn` (default `value`).
pub struct ThresholdDetector {
    min: Option<f64>,
    max: Option<f64>,
    time_column: String,
    value_column: String,
}

impl ThresholdDetector {
    fn pick_table<'a>(&self, inputs: &'a HashMap<String, DataTable>) -> anyhow::Result<&'a DataTable> {
        if let Some(t) = inputs.get("current") {
            return Ok(t);
        }
        let mut tables = inputs.values();
        match (tables.next(), tables.next()) {
            (Some(t), None) => Ok(t),
            (None, _) => anyhow::bail!("threshold detector needs one input table"),
            _ => anyhow::bail!("threshold detector with several inputs needs one keyed 'current'"),
        }
    }
}

impl Detector for ThresholdDetector {
    fn detect(&self, inputs: &HashMap<String, DataTable>) -> anyhow::Result<Vec<DetectionRow>> {
        let table = self.pick_table(inputs)?;
        let ts_col = table.require_column(&self.time_column)?;
        let value_col = table.require_column(&self.value_column)?;

        let mut rows = Vec::with_capacity(table.len());
        for idx in 0..table.len() {
            let Some(timestamp) = table.i64_at(idx, ts_col) else {
                continue;
            };
            let current = table.f64_at(idx, value_col);
            let anomaly = current.is_some_and(|v| {
                self.min.is_some_and(|min| v < min) || self.max.is_some_and(|max| v > max)
            });
            rows.push(DetectionRow {
                timestamp,
                current,
                baseline: None,
                upper_bound: self.max,
                lower_bound: self.min,
                anomaly,
            });
        }
        Ok(rows)
    }
}

pub struct ThresholdDetectorFactory;

impl DetectorFactory for ThresholdDetectorFactory {
    fn build(&self, params: &Map<String, Value>) -> anyhow::Result<Box<dyn Detector>> {
        let number = |key: &str| -> anyhow::Result<Option<f64>> {
            match params.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => v
                    .as_f64()
                    .map(Some)
                    .ok_or_else(|| anyhow::anyhow!("threshold param '{key}' must be a number")),
            }
        };
        let min = number("min")?;
        let max = number("max")?;
        if min.is_none() && max.is_none() {
            anyhow::bail!("threshold detector needs 'min' and/or 'max'");
        }
        let text = |key: &str, default: &str| {
            params
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };
        Ok(Box::new(ThresholdDetector {
            min,
            max,
            time_column: text("timeColumn", "ts"),
            value_column: text("valueColumn", "value"),
        }))
    }
}

pub(crate) fn register_builtin_detectors(ctx: &mut ApplicationContext) {
    ctx.add_detector("THRESHOLD", Arc::new(ThresholdDetectorFactory));
}
