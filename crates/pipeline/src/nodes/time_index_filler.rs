//! Regenerates a complete, evenly spaced time index and fills the gaps.
//!
//! The index runs from the inferred min time (rounded up to the granularity)
//! to the last granularity step before the inferred, exclusive max time. Input
//! rows are left-joined on the time column; missing rows become nulls which
//! are then replaced with the configured method, separately before and after
//! the window start.

use std::collections::HashMap;
use std::str::FromStr;

use serde_json::Value;
use vigil_core::time::{ceil_to, floor_to};
use vigil_core::{DataTable, PipelineResult};

use crate::error::{PipelineError, Result};
use crate::operator::{Operator, OperatorContext, OperatorInputs};

const DEFAULT_TIME_COLUMN: &str = "ts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLimitInference {
    FromData,
    FromDetectionTime,
    FromDetectionTimeWithLookback,
}

impl FromStr for TimeLimitInference {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FROM_DATA" => Ok(Self::FromData),
            "FROM_DETECTION_TIME" => Ok(Self::FromDetectionTime),
            "FROM_DETECTION_TIME_WITH_LOOKBACK" => Ok(Self::FromDetectionTimeWithLookback),
            other => Err(PipelineError::invalid_param(
                "timeInference",
                format!("unknown strategy '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillNullMethod {
    KeepNull,
    FillWithZeroes,
    FillForward,
    FillBackward,
}

impl FromStr for FillNullMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "KEEP_NULL" => Ok(Self::KeepNull),
            "FILL_WITH_ZEROES" => Ok(Self::FillWithZeroes),
            "FILL_FORWARD" => Ok(Self::FillForward),
            "FILL_BACKWARD" => Ok(Self::FillBackward),
            other => Err(PipelineError::invalid_param(
                "fillNullMethod",
                format!("unknown method '{other}'"),
            )),
        }
    }
}

impl FillNullMethod {
    /// Replace nulls in every non-time column of `rows`.
    fn apply(self, rows: &mut [Vec<Value>], time_col: usize) {
        let Some(width) = rows.first().map(Vec::len) else {
            return;
        };
        for col in (0..width).filter(|c| *c != time_col) {
            match self {
                Self::KeepNull => {}
                Self::FillWithZeroes => {
                    for row in rows.iter_mut() {
                        if row[col].is_null() {
                            row[col] = Value::from(0.0);
                        }
                    }
                }
                Self::FillForward => {
                    let mut last: Option<Value> = None;
                    for row in rows.iter_mut() {
                        match (&row[col], &last) {
                            (Value::Null, Some(prev)) => row[col] = prev.clone(),
                            (Value::Null, None) => {}
                            (v, _) => last = Some(v.clone()),
                        }
                    }
                }
                Self::FillBackward => {
                    let mut next: Option<Value> = None;
                    for row in rows.iter_mut().rev() {
                        match (&row[col], &next) {
                            (Value::Null, Some(n)) => row[col] = n.clone(),
                            (Value::Null, None) => {}
                            (v, _) => next = Some(v.clone()),
                        }
                    }
                }
            }
        }
    }
}

pub struct TimeIndexFillerOperator;

#[async_trait::async_trait]
impl Operator for TimeIndexFillerOperator {
    async fn execute(&self, ctx: &OperatorContext, inputs: OperatorInputs) -> Result<PipelineResult> {
        let table = single_table(inputs)?;
        let time_column = ctx
            .str_param("timestamp")
            .or_else(|| ctx.str_param("timeColumn"))
            .or_else(|| table.properties.get("timeColumn").map(String::as_str))
            .unwrap_or(DEFAULT_TIME_COLUMN)
            .to_string();

        let granularity = match ctx.period_param_ms("monitoringGranularity")? {
            Some(ms) => ms,
            None => table
                .properties
                .get("granularity")
                .and_then(|g| g.parse::<i64>().ok())
                .ok_or_else(|| {
                    PipelineError::invalid_param(
                        "monitoringGranularity",
                        "missing from params and input properties",
                    )
                })?,
        };
        if granularity <= 0 {
            return Err(PipelineError::invalid_param("monitoringGranularity", "must be positive"));
        }

        let fill = match ctx.str_param("fillNullMethod") {
            Some(m) => m.parse()?,
            None => FillNullMethod::FillWithZeroes,
        };
        let limits = TimeLimits {
            min: parse_inference(ctx, "minTimeInference", TimeLimitInference::FromData)?,
            max: parse_inference(ctx, "maxTimeInference", TimeLimitInference::FromDetectionTime)?,
            lookback_ms: ctx.period_param_ms("lookback")?.unwrap_or(0),
            custom: ["lookback", "minTimeInference", "maxTimeInference"]
                .iter()
                .any(|k| ctx.param(k).is_some()),
        };

        let filled = fill_index(table, &time_column, granularity, fill, &limits, ctx.window())?;
        tracing::debug!(node = %ctx.node_name(), rows = filled.len(), granularity, "time index filled");
        Ok(PipelineResult::TimeSeries(filled))
    }
}

fn single_table(inputs: OperatorInputs) -> Result<DataTable> {
    let mut iter = inputs.into_values();
    match (iter.next(), iter.next()) {
        (Some(PipelineResult::TimeSeries(t)), None) => Ok(t),
        (Some(other), None) => Err(PipelineError::ShapeMismatch {
            expected: "timeSeries",
            actual: other.kind(),
        }),
        _ => Err(PipelineError::MissingInput(
            "time index filler expects exactly one input".to_string(),
        )),
    }
}

fn parse_inference(
    ctx: &OperatorContext,
    key: &str,
    default: TimeLimitInference,
) -> Result<TimeLimitInference> {
    match ctx.str_param(key) {
        Some(s) => s
            .parse()
            .map_err(|_| PipelineError::invalid_param(key, format!("unknown strategy '{s}'"))),
        None => Ok(default),
    }
}

struct TimeLimits {
    min: TimeLimitInference,
    max: TimeLimitInference,
    lookback_ms: i64,
    /// Any of the limit params was set explicitly.
    custom: bool,
}

impl TimeLimits {
    fn validate(&self) -> Result<()> {
        for (key, strategy) in [("minTimeInference", self.min), ("maxTimeInference", self.max)] {
            if strategy == TimeLimitInference::FromDetectionTimeWithLookback && self.lookback_ms == 0 {
                return Err(PipelineError::invalid_param(key, "lookback strategy requires `lookback`"));
            }
        }
        Ok(())
    }

    fn infer(&self, strategy: TimeLimitInference, detection: i64, from_data: Option<i64>) -> Result<i64> {
        match strategy {
            TimeLimitInference::FromData => from_data.ok_or_else(|| {
                PipelineError::invalid_param("timeInference", "FROM_DATA needs at least one input row")
            }),
            TimeLimitInference::FromDetectionTime => Ok(detection),
            TimeLimitInference::FromDetectionTimeWithLookback => Ok(detection - self.lookback_ms),
        }
    }
}

/// Min and max (exclusive) bounds of the regenerated index.
fn resolve_limits(
    table: &DataTable,
    time_col: usize,
    limits: &TimeLimits,
    window: vigil_core::TimeRange,
) -> Result<(i64, i64)> {
    let prop = |key: &str| table.properties.get(key).and_then(|v| v.parse::<i64>().ok());
    if let (Some(min), Some(max), false) = (prop("minTimeMillis"), prop("maxTimeMillis"), limits.custom) {
        return Ok((min, max));
    }
    limits.validate()?;
    let first = table.rows.first().and_then(|_| table.i64_at(0, time_col));
    let last = table
        .len()
        .checked_sub(1)
        .and_then(|idx| table.i64_at(idx, time_col))
        .map(|ts| ts + 1);
    Ok((
        limits.infer(limits.min, window.start, first)?,
        limits.infer(limits.max, window.end, last)?,
    ))
}

fn fill_index(
    table: DataTable,
    time_column: &str,
    granularity: i64,
    fill: FillNullMethod,
    limits: &TimeLimits,
    window: vigil_core::TimeRange,
) -> Result<DataTable> {
    let time_col = table.require_column(time_column)?;
    let mut table = table;
    table.sort_by_column(time_col);
    let (min, max) = resolve_limits(&table, time_col, limits, window)?;

    let width = table.columns.len();
    let by_time: HashMap<i64, Vec<Value>> = table
        .rows
        .drain(..)
        .filter_map(|row| row.get(time_col).and_then(Value::as_i64).map(|ts| (ts, row)))
        .collect();

    let mut before = Vec::new();
    let mut after = Vec::new();
    let first = ceil_to(min, granularity);
    let last = floor_to(max - 1, granularity);
    let mut ts = first;
    while ts <= last {
        let row = by_time.get(&ts).cloned().unwrap_or_else(|| {
            let mut empty = vec![Value::Null; width];
            empty[time_col] = Value::from(ts);
            empty
        });
        if ts < window.start {
            before.push(row);
        } else {
            after.push(row);
        }
        ts += granularity;
    }

    fill.apply(&mut before, time_col);
    fill.apply(&mut after, time_col);
    before.append(&mut after);
    table.rows = before;
    table
        .properties
        .insert("granularity".to_string(), granularity.to_string());
    table
        .properties
        .insert("timeColumn".to_string(), time_column.to_string());
    Ok(table)
}
