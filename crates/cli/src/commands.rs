//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{info, warn};
use vigil_core::time::parse_timestamp;
use vigil_core::{parse_period, AnomalyInterval, Config, TimeRange};
use vigil_merge::{AnomalyMerger, InMemoryAnomalyStore, MergePolicy};
use vigil_pipeline::loader::load_file;
use vigil_pipeline::{
    ApplicationContext, CancelSignal, LoadStatus, NodeRegistry, PipelineError, PlanDocument,
    PlanExecutor, PlanLoader, RunResults,
};

use crate::series::JsonFileSource;

// ── validate ─────────────────────────────────────────────────

/// One plan that passed validation.
#[derive(Debug)]
pub struct PlanSummary {
    pub name: String,
    pub order: Vec<String>,
    pub embedded: Vec<String>,
}

/// Build every plan under `path` and check its node types are registered.
pub fn validate(path: &Path, registry: &NodeRegistry) -> Result<Vec<PlanSummary>> {
    let mut docs: Vec<PlanDocument> = Vec::new();
    let mut failures = 0usize;

    if path.is_file() {
        docs.push(load_file(path)?);
    } else {
        let mut loader = PlanLoader::new(path);
        for result in loader.load_all()? {
            match result.status {
                LoadStatus::Failed { error } => {
                    failures += 1;
                    println!("FAIL  {}: {error}", result.path.display());
                }
                LoadStatus::Skipped { reason } => {
                    info!(path = %result.path.display(), reason, "skipped");
                }
                LoadStatus::Loaded { .. } => {}
            }
        }
        docs.extend(loader.plans().cloned());
    }

    let mut summaries = Vec::with_capacity(docs.len());
    for doc in docs {
        match summarize(&doc, registry) {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                failures += 1;
                println!("FAIL  {}: {e}", doc.metadata.name);
            }
        }
    }

    if failures > 0 {
        bail!("{failures} plan(s) failed validation");
    }
    Ok(summaries)
}

fn summarize(
    doc: &PlanDocument,
    registry: &NodeRegistry,
) -> std::result::Result<PlanSummary, PipelineError> {
    let graph = doc.graph(TimeRange::new(0, 0))?;
    for node in graph.nodes() {
        if !registry.contains(&node.node_type) {
            return Err(PipelineError::UnknownNodeType(node.node_type.clone()));
        }
    }
    graph.output_node()?;

    let order = graph.execution_order().to_vec();
    let embedded = order.iter().filter(|n| graph.is_embedded(n)).cloned().collect();
    Ok(PlanSummary {
        name: doc.metadata.name.clone(),
        order,
        embedded,
    })
}

// ── run ──────────────────────────────────────────────────────

pub struct RunOptions {
    pub plan: PathBuf,
    pub start: String,
    pub end: String,
    pub series: Option<PathBuf>,
    pub timeout: Option<String>,
}

pub enum RunReport {
    /// Every top-level node result.
    Nodes(RunResults),
    /// Output anomalies after merging.
    Merged(Vec<AnomalyInterval>),
}

fn parse_window(start: &str, end: &str) -> Result<TimeRange> {
    let start = parse_timestamp(&Value::String(start.to_string()), None).context("invalid --start")?;
    let end = parse_timestamp(&Value::String(end.to_string()), None).context("invalid --end")?;
    if end < start {
        bail!("--end precedes --start");
    }
    Ok(TimeRange::new(start, end))
}

pub async fn run(config: &Config, opts: RunOptions, all_nodes: bool) -> Result<RunReport> {
    let doc = load_file(&opts.plan)
        .with_context(|| format!("failed to load plan {}", opts.plan.display()))?;
    let window = parse_window(&opts.start, &opts.end)?;
    let graph = doc.graph(window)?;

    let mut app = ApplicationContext::with_builtin_detectors();
    if let Some(series) = &opts.series {
        app = app.with_time_series(Arc::new(JsonFileSource::load(series)?));
    }
    let cancel = match &opts.timeout {
        Some(t) => CancelSignal::with_timeout(parse_period(t)?.to_std()?),
        None => CancelSignal::new(),
    };
    let executor = PlanExecutor::new(Arc::new(NodeRegistry::with_builtins()), Arc::new(app))
        .with_settings(config.engine.clone())
        .with_cancel_signal(cancel)
        .with_alert_id(doc.metadata.id);

    info!(plan = %doc.metadata.name, window = %window, "evaluating plan");
    if all_nodes {
        return Ok(RunReport::Nodes(executor.run(&graph).await?));
    }

    let output = executor.run_output(&graph).await?;
    let anomalies = output.collect_anomalies();
    if anomalies.is_empty() {
        warn!(plan = %doc.metadata.name, kind = output.kind(), "output produced no anomalies");
    }

    let policy = MergePolicy::resolve(
        doc.metadata.merge_max_gap.as_deref(),
        doc.metadata.merge_max_duration.as_deref(),
        &config.merge,
    )?;
    let merger = AnomalyMerger::new(Arc::new(InMemoryAnomalyStore::new()));
    let outcome = merger
        .merge_and_save(doc.metadata.id, &policy, anomalies)
        .await?;
    Ok(RunReport::Merged(outcome.merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PLAN: &str = r#"
apiVersion: v1
kind: Alert
metadata:
  id: 1
  name: revenue
  mergeMaxGap: PT1H
nodes:
  - name: fetch
    type: DataFetcher
    params: {metric: revenue}
  - name: root
    type: AnomalyDetector
    params: {type: THRESHOLD, max: 100, monitoringGranularity: PT1H}
    inputs:
      - {sourcePlanNode: fetch, targetProperty: current}
"#;

    const SERIES: &str = r#"[
        {"metric": "revenue", "rows": [[0, 500], [3600000, 400], [7200000, 10], [10800000, 900]]}
    ]"#;

    #[test]
    fn validate_reports_order_and_unknown_types() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok.yml"), PLAN).unwrap();
        let registry = NodeRegistry::with_builtins();

        let summaries = validate(dir.path(), &registry).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].order, vec!["fetch", "root"]);

        fs::write(
            dir.path().join("bad.yml"),
            PLAN.replace("name: revenue", "name: other").replace("DataFetcher", "Pinot"),
        )
        .unwrap();
        assert!(validate(dir.path(), &registry).is_err());
    }

    #[tokio::test]
    async fn run_merges_adjacent_anomalies() {
        let dir = TempDir::new().unwrap();
        let plan = dir.path().join("plan.yml");
        let series = dir.path().join("series.json");
        fs::write(&plan, PLAN).unwrap();
        fs::write(&series, SERIES).unwrap();

        let opts = RunOptions {
            plan,
            start: "0".into(),
            end: "14400000".into(),
            series: Some(series),
            timeout: None,
        };
        let report = run(&Config::default(), opts, false).await.unwrap();

        let RunReport::Merged(merged) = report else {
            panic!("expected merged anomalies");
        };
        // [0,1h) and [1h,2h) merge; [3h,4h) is 1h after, not under the 1h gap.
        let spans: Vec<(i64, i64)> = merged.iter().map(|a| (a.start_time, a.end_time)).collect();
        assert_eq!(spans, vec![(0, 7_200_000), (10_800_000, 14_400_000)]);
        assert!(merged.iter().all(|a| a.id.is_some()));
    }
}
