//! External collaborators reached by built-in nodes.
//!
//! The engine never talks to a datastore, a SQL engine or a trigger system
//! directly. Each is injected through [`ApplicationContext`] behind a narrow
//! async trait, so the same plan can run against production connectors or
//! in-memory fakes.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use vigil_core::{DataTable, Event, TimeRange};

/// Request for one sub-range of a metric time series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRequest {
    pub dataset: Option<String>,
    pub metric: Option<String>,
    pub query: Option<String>,
    /// Bucket size in millis, when the plan sets one.
    pub granularity_ms: Option<i64>,
    pub range: TimeRange,
    /// Remaining node params, passed through untouched.
    pub params: Map<String, Value>,
}

/// Source of time-series rows (Pinot, CSV, mock, ...).
#[async_trait::async_trait]
pub trait TimeSeriesSource: Send + Sync {
    async fn fetch(&self, request: &TimeSeriesRequest) -> anyhow::Result<DataTable>;
}

/// Per-row verdict produced by a detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRow {
    pub timestamp: i64,
    pub current: Option<f64>,
    pub baseline: Option<f64>,
    pub upper_bound: Option<f64>,
    pub lower_bound: Option<f64>,
    pub anomaly: bool,
}

/// A configured statistical detector. The numerical method is out of scope
/// for the engine; it only consumes the per-row verdicts.
pub trait Detector: Send + Sync {
    fn detect(&self, inputs: &HashMap<String, DataTable>) -> anyhow::Result<Vec<DetectionRow>>;
}

/// Builds a detector from its node params.
pub trait DetectorFactory: Send + Sync {
    fn build(&self, params: &Map<String, Value>) -> anyhow::Result<Box<dyn Detector>>;
}

/// SQL engine used by the SqlExecution node kinds.
#[async_trait::async_trait]
pub trait SqlEngine: Send + Sync {
    async fn execute(&self, sql: &str, tables: &HashMap<String, DataTable>) -> anyhow::Result<DataTable>;
}

/// A stateful event trigger fed row by row.
pub trait EventTrigger: Send {
    fn trigger(&mut self, columns: &[String], row: &[Value]) -> anyhow::Result<()>;
    fn close(self: Box<Self>) -> anyhow::Result<Vec<Event>>;
}

pub trait EventTriggerFactory: Send + Sync {
    fn build(&self, params: &Map<String, Value>, window: TimeRange) -> anyhow::Result<Box<dyn EventTrigger>>;
}

/// Collaborators shared by every node of an evaluation.
#[derive(Clone, Default)]
pub struct ApplicationContext {
    time_series: Option<Arc<dyn TimeSeriesSource>>,
    detectors: HashMap<String, Arc<dyn DetectorFactory>>,
    sql_engines: HashMap<String, Arc<dyn SqlEngine>>,
    triggers: HashMap<String, Arc<dyn EventTriggerFactory>>,
}

impl ApplicationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with the built-in detectors registered.
    pub fn with_builtin_detectors() -> Self {
        let mut ctx = Self::default();
        crate::nodes::anomaly_detector::register_builtin_detectors(&mut ctx);
        ctx
    }

    pub fn with_time_series(mut self, source: Arc<dyn TimeSeriesSource>) -> Self {
        self.time_series = Some(source);
        self
    }

    pub fn with_detector(mut self, name: impl Into<String>, factory: Arc<dyn DetectorFactory>) -> Self {
        self.add_detector(name, factory);
        self
    }

    pub fn add_detector(&mut self, name: impl Into<String>, factory: Arc<dyn DetectorFactory>) {
        self.detectors.insert(name.into().to_uppercase(), factory);
    }

    pub fn with_sql_engine(mut self, dialect: impl Into<String>, engine: Arc<dyn SqlEngine>) -> Self {
        self.sql_engines.insert(dialect.into(), engine);
        self
    }

    pub fn with_trigger(mut self, name: impl Into<String>, factory: Arc<dyn EventTriggerFactory>) -> Self {
        self.triggers.insert(name.into().to_uppercase(), factory);
        self
    }

    pub fn time_series(&self) -> Option<&Arc<dyn TimeSeriesSource>> {
        self.time_series.as_ref()
    }

    pub fn detector(&self, name: &str) -> Option<&Arc<dyn DetectorFactory>> {
        self.detectors.get(&name.to_uppercase())
    }

    pub fn sql_engine(&self, dialect: &str) -> Option<&Arc<dyn SqlEngine>> {
        self.sql_engines.get(dialect)
    }

    pub fn trigger(&self, name: &str) -> Option<&Arc<dyn EventTriggerFactory>> {
        self.triggers.get(&name.to_uppercase())
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("time_series", &self.time_series.is_some())
            .field("detectors", &self.detectors.keys().collect::<Vec<_>>())
            .field("sql_engines", &self.sql_engines.keys().collect::<Vec<_>>())
            .field("triggers", &self.triggers.keys().collect::<Vec<_>>())
            .finish()
    }
}
