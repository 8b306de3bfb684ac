//! End-to-end evaluation of a per-country alert plan parsed from YAML.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use vigil_core::{DataTable, PipelineResult, TimeRange};
use vigil_pipeline::{
    ApplicationContext, NodeRegistry, PipelineError, PlanDocument, PlanExecutor, TimeSeriesRequest,
    TimeSeriesSource,
};

const HOUR: i64 = 3_600_000;

const PLAN: &str = r#"
apiVersion: v1
kind: Alert
metadata:
  id: 7
  name: revenue-by-country
nodes:
  - name: countries
    type: Enumerator
    params:
      items:
        - id: 1
          name: US
          params: {country: US}
        - id: 2
          name: FR
          params: {country: FR}
  - name: fetch
    type: DataFetcher
    params:
      dataset: orders
      metric: revenue
      granularity: PT1H
      country: ${country}
  - name: detect
    type: AnomalyDetector
    params:
      type: THRESHOLD
      max: 100
      monitoringGranularity: PT1H
      anomaly.metric: revenue
      anomaly.dataset: orders
      anomaly.dimensions:
        country: ${country}
    inputs:
      - sourcePlanNode: fetch
        targetProperty: current
  - name: combine
    type: Combiner
  - name: root
    type: ForkJoin
    params:
      enumerator: countries
      root: detect
      combiner: combine
      parallelism: 2
"#;

/// Hourly values per country, keyed by the `country` pass-through param.
struct CountrySource {
    series: HashMap<&'static str, Vec<f64>>,
}

#[async_trait::async_trait]
impl TimeSeriesSource for CountrySource {
    async fn fetch(&self, request: &TimeSeriesRequest) -> anyhow::Result<DataTable> {
        let country = request
            .params
            .get("country")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("country not substituted"))?;
        let values = self
            .series
            .get(country)
            .ok_or_else(|| anyhow::anyhow!("unknown country {country}"))?;

        let mut table = DataTable::new(["ts", "value"]);
        for (idx, value) in values.iter().enumerate() {
            let ts = idx as i64 * HOUR;
            if request.range.contains(ts) {
                table.push_row(vec![json!(ts), json!(value)])?;
            }
        }
        Ok(table)
    }
}

fn executor() -> PlanExecutor {
    let source = CountrySource {
        series: HashMap::from([
            ("US", vec![10.0, 150.0, 20.0, 30.0]),
            ("FR", vec![10.0, 10.0, 10.0, 500.0]),
        ]),
    };
    let app = ApplicationContext::with_builtin_detectors().with_time_series(Arc::new(source));
    PlanExecutor::new(Arc::new(NodeRegistry::with_builtins()), Arc::new(app))
}

#[tokio::test]
async fn per_country_anomalies_in_item_order() {
    let doc = PlanDocument::from_yaml(PLAN).unwrap();
    let graph = doc.graph(TimeRange::new(0, 4 * HOUR)).unwrap();

    let output = executor()
        .with_alert_id(doc.metadata.id)
        .run_output(&graph)
        .await
        .unwrap();

    let PipelineResult::Anomalies(anomalies) = output else {
        panic!("expected anomalies, got {}", output.kind());
    };
    assert_eq!(anomalies.len(), 2);

    let us = &anomalies[0];
    assert_eq!(us.dimensions.get("country").map(String::as_str), Some("US"));
    assert_eq!((us.start_time, us.end_time), (HOUR, 2 * HOUR));
    assert_eq!(us.avg_current_value, Some(150.0));
    assert_eq!(us.enumeration_item_id, Some(1));
    assert_eq!(us.alert_id, Some(7));
    assert_eq!(us.metric.as_deref(), Some("revenue"));
    assert_eq!(
        us.properties.get("detectorComponentName").map(String::as_str),
        Some("detect")
    );

    let fr = &anomalies[1];
    assert_eq!(fr.dimensions.get("country").map(String::as_str), Some("FR"));
    // Last row: closed by the monitoring granularity.
    assert_eq!((fr.start_time, fr.end_time), (3 * HOUR, 4 * HOUR));
    assert_eq!(fr.enumeration_item_id, Some(2));
    assert_eq!(fr.alert_id, Some(7));
}

#[tokio::test]
async fn anomalies_carry_no_alert_id_without_one() {
    let doc = PlanDocument::from_yaml(PLAN).unwrap();
    let graph = doc.graph(TimeRange::new(0, 4 * HOUR)).unwrap();

    let output = executor().run_output(&graph).await.unwrap();
    assert!(output.collect_anomalies().iter().all(|a| a.alert_id.is_none()));
}

#[tokio::test]
async fn only_the_fork_join_runs_at_top_level() {
    let doc = PlanDocument::from_yaml(PLAN).unwrap();
    let graph = doc.graph(TimeRange::new(0, 4 * HOUR)).unwrap();

    let results = executor().run(&graph).await.unwrap();
    assert_eq!(results.keys().collect::<Vec<_>>(), vec!["root"]);
}

#[tokio::test]
async fn missing_detector_fails_the_whole_plan() {
    let yaml = PLAN.replace("type: THRESHOLD", "type: HOLT_WINTERS");
    let doc = PlanDocument::from_yaml(&yaml).unwrap();
    let graph = doc.graph(TimeRange::new(0, 4 * HOUR)).unwrap();

    let err = executor().run(&graph).await.unwrap_err();
    assert!(matches!(&err, PipelineError::OperatorFailure { node, .. } if node == "root"));
    assert!(matches!(err.root_cause(), PipelineError::MissingCollaborator(_)));
}
