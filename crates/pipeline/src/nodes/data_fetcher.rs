//! Time-series retrieval through the [`TimeSeriesSource`] collaborator.
//!
//! The node window is split into sub-ranges of `chunk` (whole window when
//! unset) which are fetched concurrently. A sub-range that fails or exceeds
//! `timeout` is logged and its rows are omitted; the node itself only fails
//! when no source is configured.

use std::time::Duration;

use futures::{stream, StreamExt};
use tracing::{debug, warn};
use vigil_core::{DataTable, PipelineResult, TimeRange};

use crate::context::TimeSeriesRequest;
use crate::error::{PipelineError, Result};
use crate::operator::{Operator, OperatorContext, OperatorInputs};

const DEFAULT_TIME_COLUMN: &str = "ts";

/// Params consumed here; everything else is passed to the source.
const OWN_PARAMS: [&str; 9] = [
    "dataset",
    "metric",
    "query",
    "granularity",
    "chunk",
    "timeout",
    "timeColumn",
    "startTime",
    "endTime",
];

pub struct DataFetcherOperator;

#[async_trait::async_trait]
impl Operator for DataFetcherOperator {
    async fn execute(&self, ctx: &OperatorContext, _inputs: OperatorInputs) -> Result<PipelineResult> {
        let source = ctx
            .app()
            .time_series()
            .cloned()
            .ok_or_else(|| PipelineError::MissingCollaborator("time-series source".to_string()))?;

        let window = ctx.window();
        let chunk_ms = ctx.period_param_ms("chunk")?.unwrap_or(0);
        let timeout = ctx
            .period_param_ms("timeout")?
            .filter(|ms| *ms > 0)
            .map(|ms| Duration::from_millis(ms as u64));
        let time_column = ctx.str_param("timeColumn").unwrap_or(DEFAULT_TIME_COLUMN).to_string();

        let base = TimeSeriesRequest {
            dataset: ctx.str_param("dataset").map(str::to_string),
            metric: ctx.str_param("metric").map(str::to_string),
            query: ctx.str_param("query").map(str::to_string),
            granularity_ms: ctx.period_param_ms("granularity")?,
            range: window,
            params: ctx
                .params()
                .iter()
                .filter(|(k, _)| !OWN_PARAMS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };

        let ranges = window.split(chunk_ms);
        let total = ranges.len();
        let parallelism = ctx.settings().fetch_parallelism.max(1);

        let fetched: Vec<(TimeRange, Result<DataTable>)> = stream::iter(ranges.into_iter().map(|range| {
            let request = TimeSeriesRequest {
                range,
                ..base.clone()
            };
            let source = source.clone();
            async move {
                let call = source.fetch(&request);
                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, call).await {
                        Ok(res) => res.map_err(PipelineError::from),
                        Err(_) => Err(PipelineError::Operator(format!(
                            "timed out after {}ms",
                            limit.as_millis()
                        ))),
                    },
                    None => call.await.map_err(PipelineError::from),
                };
                (range, outcome)
            }
        }))
        .buffered(parallelism)
        .collect()
        .await;

        let mut merged = DataTable::default();
        let mut failed = 0usize;
        for (range, outcome) in fetched {
            match outcome.and_then(|table| merged.append(table).map_err(PipelineError::from)) {
                Ok(()) => {}
                Err(e) => {
                    failed += 1;
                    warn!(
                        node = %ctx.node_name(),
                        range = %range,
                        error = %e,
                        "sub-range fetch failed, omitting its rows"
                    );
                }
            }
        }

        if let Some(idx) = merged.column_index(&time_column) {
            merged.sort_by_column(idx);
        }
        if !merged.columns.is_empty() {
            merged.properties.insert("timeColumn".to_string(), time_column);
        }
        if let Some(granularity) = base.granularity_ms {
            merged
                .properties
                .insert("granularity".to_string(), granularity.to_string());
        }

        debug!(
            node = %ctx.node_name(),
            sub_ranges = total,
            failed,
            rows = merged.len(),
            "time series fetched"
        );
        Ok(PipelineResult::TimeSeries(merged))
    }
}
