use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::anomaly::AnomalyInterval;
use crate::table::DataTable;

/// One entity a ForkJoin fans out over, typically a dimension-value combination.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnumerationItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl EnumerationItem {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            params: Map::new(),
        }
    }
}

/// A non-anomaly occurrence emitted by trigger nodes (holidays, deploys, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub event_type: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// The output of one operator.
///
/// The executor never inspects the variant; operators check shapes themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum PipelineResult {
    TimeSeries(DataTable),
    Anomalies(Vec<AnomalyInterval>),
    Events(Vec<Event>),
    Enumeration(Vec<EnumerationItem>),
    /// Item-ordered results collected without reduction.
    Combined(Vec<PipelineResult>),
    Opaque(Value),
}

impl PipelineResult {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineResult::TimeSeries(_) => "timeSeries",
            PipelineResult::Anomalies(_) => "anomalies",
            PipelineResult::Events(_) => "events",
            PipelineResult::Enumeration(_) => "enumeration",
            PipelineResult::Combined(_) => "combined",
            PipelineResult::Opaque(_) => "opaque",
        }
    }

    pub fn as_table(&self) -> Option<&DataTable> {
        match self {
            PipelineResult::TimeSeries(t) => Some(t),
            _ => None,
        }
    }

    /// Every anomaly in this result, descending into combined results.
    pub fn collect_anomalies(&self) -> Vec<AnomalyInterval> {
        match self {
            PipelineResult::Anomalies(list) => list.clone(),
            PipelineResult::Combined(parts) => {
                parts.iter().flat_map(PipelineResult::collect_anomalies).collect()
            }
            _ => Vec::new(),
        }
    }
}
