//! The executable contract behind every node type.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tokio::time::Instant;
use vigil_core::config::EngineConfig;
use vigil_core::time::parse_timestamp;
use vigil_core::{parse_period, DataTable, EnumerationItem, PipelineResult, TimeRange};

use crate::context::ApplicationContext;
use crate::error::{PipelineError, Result};
use crate::executor::PlanExecutor;
use crate::plan::PlanGraph;

/// Resolved inputs keyed by local input key, in declaration order.
pub type OperatorInputs = IndexMap<String, PipelineResult>;

/// Runtime behavior of a node.
///
/// Operators receive already-computed inputs and return exactly one result.
/// They check input shapes themselves; the executor does not.
#[async_trait::async_trait]
pub trait Operator: Send + Sync {
    async fn execute(&self, ctx: &OperatorContext, inputs: OperatorInputs) -> Result<PipelineResult>;
}

/// Shared cancellation flag with an optional deadline.
///
/// Cloning shares the flag, so cancelling any clone stops the whole run
/// before its next node.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Everything an operator may look at besides its inputs.
pub struct OperatorContext {
    pub(crate) node_name: String,
    pub(crate) params: Map<String, Value>,
    pub(crate) window: TimeRange,
    pub(crate) item: Option<EnumerationItem>,
    pub(crate) depth: usize,
    pub(crate) graph: Arc<PlanGraph>,
    pub(crate) executor: PlanExecutor,
}

impl OperatorContext {
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// The node's effective window (graph window with param overrides applied).
    pub fn window(&self) -> TimeRange {
        self.window
    }

    /// The enumeration item when running inside a ForkJoin sub-pipeline.
    pub fn item(&self) -> Option<&EnumerationItem> {
        self.item.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn graph(&self) -> &PlanGraph {
        &self.graph
    }

    pub fn executor(&self) -> &PlanExecutor {
        &self.executor
    }

    pub fn app(&self) -> &ApplicationContext {
        self.executor.app()
    }

    pub fn settings(&self) -> &EngineConfig {
        self.executor.settings()
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        self.executor.cancel_signal()
    }

    pub fn alert_id(&self) -> Option<i64> {
        self.executor.alert_id()
    }

    // ── Param helpers ──────────────────────────────────────────

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.str_param(key)
            .ok_or_else(|| PipelineError::invalid_param(key, "required string param is missing"))
    }

    pub fn f64_param(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(|v| match v {
            Value::String(s) => s.parse().ok(),
            other => other.as_f64(),
        })
    }

    pub fn usize_param(&self, key: &str) -> Option<usize> {
        self.params
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
    }

    /// A period param given as a period string (`PT1H`, `1h`) or as millis.
    pub fn period_param_ms(&self, key: &str) -> Result<Option<i64>> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| PipelineError::invalid_param(key, "expected integer millis")),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => parse_period(s)
                .map(|d| Some(d.num_milliseconds()))
                .map_err(|e| PipelineError::invalid_param(key, e.to_string())),
            Some(_) => Err(PipelineError::invalid_param(key, "expected a period")),
        }
    }
}

/// Apply `startTime`/`endTime` (with optional `timeFormat`) overrides.
pub fn effective_window(window: TimeRange, params: &Map<String, Value>) -> Result<TimeRange> {
    let format = params.get("timeFormat").and_then(Value::as_str);
    let start = match params.get("startTime") {
        Some(v) if !v.is_null() => parse_timestamp(v, format)?,
        _ => window.start,
    };
    let end = match params.get("endTime") {
        Some(v) if !v.is_null() => parse_timestamp(v, format)?,
        _ => window.end,
    };
    if end < start {
        return Err(PipelineError::invalid_param(
            "endTime",
            format!("window end {end} precedes start {start}"),
        ));
    }
    Ok(TimeRange::new(start, end))
}

/// Require every input to be a time-series table.
pub fn input_tables(inputs: &OperatorInputs) -> Result<HashMap<String, DataTable>> {
    inputs
        .iter()
        .map(|(key, result)| match result {
            PipelineResult::TimeSeries(table) => Ok((key.clone(), table.clone())),
            other => Err(PipelineError::ShapeMismatch {
                expected: "timeSeries",
                actual: other.kind(),
            }),
        })
        .collect()
}
