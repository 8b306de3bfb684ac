use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Anomaly severity. Ordering is by explicit rank, lower rank = more severe,
/// independent of declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    #[default]
    Low,
}

impl Severity {
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }

    /// The more severe of the two (lower rank). Ties keep `self`.
    pub fn most_severe(self, other: Severity) -> Severity {
        if other.rank() < self.rank() { other } else { self }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
        }
    }
}

/// A label attached to an anomaly by post-processing (holiday, cold start, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyLabel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub ignore: bool,
}

fn default_anomaly_type() -> String {
    "DEVIATION".to_string()
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A detected anomalous time range `[start_time, end_time)`.
///
/// Fresh intervals carry no `id`; persisted ones do. Once merged, a parent
/// owns its `children` exclusively, and each stored child is flagged `is_child`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyInterval {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    #[serde(default = "default_anomaly_type", rename = "type")]
    pub anomaly_type: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub avg_baseline_value: Option<f64>,
    #[serde(default)]
    pub avg_current_value: Option<f64>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<AnomalyLabel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AnomalyInterval>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_child: bool,
    /// Ids of stored parents folded into this one. The store retires them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub absorbed_ids: Vec<i64>,
    #[serde(default)]
    pub alert_id: Option<i64>,
    #[serde(default)]
    pub enumeration_item_id: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
}

impl AnomalyInterval {
    /// A fresh, unpersisted interval with default metadata.
    pub fn new(start_time: i64, end_time: i64) -> Self {
        Self {
            id: None,
            start_time,
            end_time,
            metric: None,
            dataset: None,
            dimensions: BTreeMap::new(),
            anomaly_type: default_anomaly_type(),
            severity: Severity::default(),
            avg_baseline_value: None,
            avg_current_value: None,
            score: 0.0,
            weight: 0.0,
            properties: BTreeMap::new(),
            labels: Vec::new(),
            children: Vec::new(),
            is_child: false,
            absorbed_ids: Vec::new(),
            alert_id: None,
            enumeration_item_id: None,
            source: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_metric(mut self, metric: impl Into<String>, dataset: impl Into<String>) -> Self {
        self.metric = Some(metric.into());
        self.dataset = Some(dataset.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_dimension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(key.into(), value.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_labels(mut self, labels: Vec<AnomalyLabel>) -> Self {
        self.labels = labels;
        self
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_time.saturating_sub(self.start_time)
    }

    /// True if any attached label asks for the anomaly to be ignored.
    pub fn is_ignored(&self) -> bool {
        self.labels.iter().any(|l| l.ignore)
    }

    /// Copy of the descriptive fields, without identity or children.
    ///
    /// Used to record a parent's pre-merge state as its first child.
    pub fn snapshot(&self) -> Self {
        Self {
            id: None,
            children: Vec::new(),
            is_child: false,
            absorbed_ids: Vec::new(),
            ..self.clone()
        }
    }
}
