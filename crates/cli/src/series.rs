//! Time series served from a local JSON file.
//!
//! The file holds a list of series:
//!
//! ```json
//! [
//!   {"metric": "revenue", "dataset": "orders", "params": {"country": "US"},
//!    "columns": ["ts", "value"], "rows": [[0, 10.5], [3600000, 12.0]]}
//! ]
//! ```
//!
//! A request matches the first series whose `metric`, `dataset` and every
//! `params` entry agree with it. Rows are filtered to the requested range on
//! the first column.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde_json::{Map, Value};
use vigil_core::DataTable;
use vigil_pipeline::{TimeSeriesRequest, TimeSeriesSource};

fn default_columns() -> Vec<String> {
    vec!["ts".to_string(), "value".to_string()]
}

#[derive(Debug, Deserialize)]
struct SeriesEntry {
    #[serde(default)]
    metric: Option<String>,
    #[serde(default)]
    dataset: Option<String>,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default = "default_columns")]
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl SeriesEntry {
    fn matches(&self, request: &TimeSeriesRequest) -> bool {
        let field = |want: &Option<String>, got: &Option<String>| want.is_none() || want == got;
        field(&self.metric, &request.metric)
            && field(&self.dataset, &request.dataset)
            && self
                .params
                .iter()
                .all(|(k, v)| request.params.get(k) == Some(v))
    }
}

pub struct JsonFileSource {
    entries: Vec<SeriesEntry>,
}

impl JsonFileSource {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read series file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid series file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let entries: Vec<SeriesEntry> = serde_json::from_str(raw)?;
        Ok(Self { entries })
    }
}

#[async_trait::async_trait]
impl TimeSeriesSource for JsonFileSource {
    async fn fetch(&self, request: &TimeSeriesRequest) -> anyhow::Result<DataTable> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.matches(request))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no series for metric={:?} dataset={:?}",
                    request.metric,
                    request.dataset
                )
            })?;

        let mut table = DataTable::new(entry.columns.iter().cloned());
        for row in &entry.rows {
            let Some(ts) = row.first().and_then(Value::as_i64) else {
                continue;
            };
            if request.range.contains(ts) {
                table.push_row(row.clone())?;
            }
        }
        Ok(table)
    }
}
