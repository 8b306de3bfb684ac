use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use vigil_core::config::EngineConfig;
use vigil_core::{DataTable, PipelineResult, TimeRange};

use super::PlanExecutor;
use crate::context::{ApplicationContext, TimeSeriesRequest, TimeSeriesSource};
use crate::error::PipelineError;
use crate::operator::{Operator, OperatorContext, OperatorInputs};
use crate::plan::{InputRef, NodeConfig, PlanGraph};
use crate::registry::NodeRegistry;

const HOUR: i64 = 3_600_000;
const WINDOW: TimeRange = TimeRange { start: 0, end: 3 * HOUR };

type Log = Arc<Mutex<Vec<String>>>;

/// Records `name:input,input` on start and returns the node name.
struct Recorder {
    log: Log,
}

#[async_trait::async_trait]
impl Operator for Recorder {
    async fn execute(&self, ctx: &OperatorContext, inputs: OperatorInputs) -> crate::Result<PipelineResult> {
        let keys: Vec<&str> = inputs.keys().map(String::as_str).collect();
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", ctx.node_name(), keys.join(",")));
        Ok(PipelineResult::Opaque(Value::String(ctx.node_name().to_string())))
    }
}

struct Failing;

#[async_trait::async_trait]
impl Operator for Failing {
    async fn execute(&self, _ctx: &OperatorContext, _inputs: OperatorInputs) -> crate::Result<PipelineResult> {
        Err(PipelineError::Operator("boom".into()))
    }
}

/// Sleeps `delayMs`, logs completion, and returns `value`.
struct Sleepy {
    log: Log,
}

#[async_trait::async_trait]
impl Operator for Sleepy {
    async fn execute(&self, ctx: &OperatorContext, _inputs: OperatorInputs) -> crate::Result<PipelineResult> {
        let delay = ctx.param("delayMs").and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let value = ctx.str_param("value").unwrap_or_default().to_string();
        if value == "FAIL" {
            return Err(PipelineError::Operator("item failed".into()));
        }
        self.log.lock().unwrap().push(value.clone());
        Ok(PipelineResult::Opaque(Value::String(value)))
    }
}

struct CancelNext;

#[async_trait::async_trait]
impl Operator for CancelNext {
    async fn execute(&self, ctx: &OperatorContext, _inputs: OperatorInputs) -> crate::Result<PipelineResult> {
        ctx.cancel_signal().cancel();
        Ok(PipelineResult::Opaque(Value::Null))
    }
}

fn registry(log: &Log) -> NodeRegistry {
    let mut registry = NodeRegistry::with_builtins();
    let recorder_log = log.clone();
    registry
        .register("Record", move || {
            Box::new(Recorder { log: recorder_log.clone() }) as Box<dyn Operator>
        })
        .unwrap();
    let sleepy_log = log.clone();
    registry
        .register("Sleepy", move || {
            Box::new(Sleepy { log: sleepy_log.clone() }) as Box<dyn Operator>
        })
        .unwrap();
    registry
        .register("Fail", || Box::new(Failing) as Box<dyn Operator>)
        .unwrap();
    registry
        .register("CancelNext", || Box::new(CancelNext) as Box<dyn Operator>)
        .unwrap();
    registry
}

fn executor(log: &Log) -> PlanExecutor {
    PlanExecutor::new(
        Arc::new(registry(log)),
        Arc::new(ApplicationContext::with_builtin_detectors()),
    )
}

fn record(name: &str, inputs: &[&str]) -> NodeConfig {
    inputs
        .iter()
        .fold(NodeConfig::new(name, "Record"), |n, i| n.input(InputRef::new(*i)))
}

fn fork_join_plan(items: Value, parallelism: usize) -> Vec<NodeConfig> {
    vec![
        NodeConfig::new("items", "Enumerator").param("items", items),
        NodeConfig::new("per_item", "Sleepy")
            .param("value", "${country}")
            .param("delayMs", "${delay}"),
        NodeConfig::new("combine", "Combiner"),
        NodeConfig::new("root", "ForkJoin")
            .param("enumerator", "items")
            .param("root", "per_item")
            .param("combiner", "combine")
            .param("parallelism", parallelism),
    ]
}

fn countries() -> Value {
    json!([
        {"name": "US", "params": {"country": "US", "delay": 50}},
        {"name": "FR", "params": {"country": "FR", "delay": 5}}
    ])
}

#[tokio::test]
async fn inputs_are_computed_before_their_consumers() {
    let log = Log::default();
    let graph = PlanGraph::build(
        vec![
            record("d", &["b", "c"]),
            record("b", &["a"]),
            record("c", &["a"]),
            record("a", &[]),
        ],
        WINDOW,
    )
    .unwrap();

    let results = executor(&log).run(&graph).await.unwrap();

    assert_eq!(results.len(), 4);
    let entries = log.lock().unwrap().clone();
    assert_eq!(entries, vec!["a:", "b:a", "c:a", "d:b,c"]);
}

#[tokio::test]
async fn local_keys_rename_inputs() {
    let log = Log::default();
    let graph = PlanGraph::build(
        vec![
            record("fetch", &[]),
            NodeConfig::new("detect", "Record").input(InputRef::new("fetch").as_key("current")),
        ],
        WINDOW,
    )
    .unwrap();

    executor(&log).run(&graph).await.unwrap();
    assert_eq!(log.lock().unwrap().last().unwrap(), "detect:current");
}

#[tokio::test]
async fn failure_names_the_node_and_stops_the_run() {
    let log = Log::default();
    let graph = PlanGraph::build(
        vec![
            record("a", &[]),
            NodeConfig::new("b", "Fail").input(InputRef::new("a")),
            record("c", &["b"]),
        ],
        WINDOW,
    )
    .unwrap();

    let err = executor(&log).run(&graph).await.unwrap_err();
    assert!(matches!(&err, PipelineError::OperatorFailure { node, .. } if node == "b"));
    assert!(matches!(err.root_cause(), PipelineError::Operator(m) if m == "boom"));
    assert_eq!(log.lock().unwrap().clone(), vec!["a:"]);
}

#[tokio::test]
async fn unknown_type_fails_before_anything_runs() {
    let log = Log::default();
    let graph = PlanGraph::build(
        vec![record("a", &[]), NodeConfig::new("b", "Holtwinters").input(InputRef::new("a"))],
        WINDOW,
    )
    .unwrap();

    let err = executor(&log).run(&graph).await.unwrap_err();
    assert!(matches!(err, PipelineError::UnknownNodeType(t) if t == "Holtwinters"));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_stops_before_the_next_node() {
    let log = Log::default();
    let graph = PlanGraph::build(
        vec![
            NodeConfig::new("a", "CancelNext"),
            record("b", &["a"]),
        ],
        WINDOW,
    )
    .unwrap();

    let err = executor(&log).run(&graph).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { node } if node == "b"));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn expired_deadline_cancels_immediately() {
    let log = Log::default();
    let graph = PlanGraph::build(vec![record("a", &[])], WINDOW).unwrap();
    let exec = executor(&log).with_cancel_signal(crate::CancelSignal::with_timeout(Duration::ZERO));

    let err = exec.run(&graph).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { .. }));
}

#[tokio::test]
async fn fork_join_keeps_item_order_under_parallelism() {
    let log = Log::default();
    let graph = PlanGraph::build(fork_join_plan(countries(), 2), WINDOW).unwrap();

    let output = executor(&log).run_output(&graph).await.unwrap();

    assert_eq!(output, PipelineResult::Opaque(json!(["US", "FR"])));
    // FR sleeps less, so it finished first.
    assert_eq!(log.lock().unwrap().clone(), vec!["FR", "US"]);
}

#[tokio::test]
async fn fork_join_sequential_by_default() {
    let log = Log::default();
    let mut plan = fork_join_plan(countries(), 1);
    plan[3].params.remove("parallelism");
    let graph = PlanGraph::build(plan, WINDOW).unwrap();

    let output = executor(&log).run_output(&graph).await.unwrap();

    assert_eq!(output, PipelineResult::Opaque(json!(["US", "FR"])));
    assert_eq!(log.lock().unwrap().clone(), vec!["US", "FR"]);
}

#[tokio::test]
async fn fork_join_item_failure_fails_the_node() {
    let log = Log::default();
    let items = json!([
        {"name": "US", "params": {"country": "US", "delay": 0}},
        {"name": "XX", "params": {"country": "FAIL", "delay": 0}}
    ]);
    let graph = PlanGraph::build(fork_join_plan(items, 1), WINDOW).unwrap();

    let err = executor(&log).run(&graph).await.unwrap_err();
    assert!(matches!(&err, PipelineError::OperatorFailure { node, .. } if node == "root"));
    assert!(matches!(err.root_cause(), PipelineError::Operator(m) if m == "item failed"));
}

#[tokio::test]
async fn fork_join_with_no_items_yields_empty_combination() {
    let log = Log::default();
    let graph = PlanGraph::build(fork_join_plan(json!([]), 1), WINDOW).unwrap();

    let output = executor(&log).run_output(&graph).await.unwrap();
    assert_eq!(output, PipelineResult::Combined(Vec::new()));
}

#[tokio::test]
async fn fork_join_echoes_item_labels_in_enumerator_order() {
    let log = Log::default();
    let graph = PlanGraph::build(
        vec![
            NodeConfig::new("countries", "Enumerator").param("items", json!(["US", "FR"])),
            NodeConfig::new("label", "Echo"),
            NodeConfig::new("concat", "Combiner"),
            NodeConfig::new("root", "ForkJoin")
                .param("enumerator", "countries")
                .param("root", "label")
                .param("combiner", "concat")
                .param("parallelism", 2),
        ],
        WINDOW,
    )
    .unwrap();

    let output = executor(&log).run_output(&graph).await.unwrap();
    assert_eq!(output, PipelineResult::Opaque(json!(["US", "FR"])));
}

#[tokio::test]
async fn echo_passes_value_or_single_input_through() {
    let log = Log::default();
    let graph = PlanGraph::build(
        vec![
            NodeConfig::new("constant", "Echo").param("value", json!({"threshold": 3})),
            NodeConfig::new("root", "Echo").input(InputRef::new("constant")),
        ],
        WINDOW,
    )
    .unwrap();

    let output = executor(&log).run_output(&graph).await.unwrap();
    assert_eq!(output, PipelineResult::Opaque(json!({"threshold": 3})));

    let lonely = PlanGraph::build(vec![NodeConfig::new("root", "Echo")], WINDOW).unwrap();
    let err = executor(&log).run(&lonely).await.unwrap_err();
    assert!(matches!(err.root_cause(), PipelineError::InvalidParam { param, .. } if param == "value"));
}

#[tokio::test]
async fn embedded_nodes_only_run_per_item() {
    let log = Log::default();
    let graph = PlanGraph::build(
        vec![
            NodeConfig::new("items", "Enumerator").param("items", json!(["a", "b", "c"])),
            record("per_item", &[]),
            NodeConfig::new("combine", "Combiner"),
            NodeConfig::new("root", "ForkJoin")
                .param("enumerator", "items")
                .param("root", "per_item")
                .param("combiner", "combine"),
        ],
        WINDOW,
    )
    .unwrap();

    let results = executor(&log).run(&graph).await.unwrap();

    assert_eq!(results.keys().collect::<Vec<_>>(), vec!["root"]);
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn nesting_beyond_max_depth_is_refused() {
    let log = Log::default();
    let graph = PlanGraph::build(fork_join_plan(countries(), 1), WINDOW).unwrap();
    let exec = executor(&log).with_settings(EngineConfig {
        max_plan_depth: 0,
        ..EngineConfig::default()
    });

    let err = exec.run(&graph).await.unwrap_err();
    assert!(matches!(
        err.root_cause(),
        PipelineError::MaxDepthExceeded { depth: 1, max: 0 }
    ));
}

#[tokio::test]
async fn run_output_requires_a_single_output() {
    let log = Log::default();
    let mut a = record("a", &[]);
    a.output = true;
    let mut b = record("b", &[]);
    b.output = true;
    let graph = PlanGraph::build(vec![a, b], WINDOW).unwrap();

    let err = executor(&log).run_output(&graph).await.unwrap_err();
    assert!(matches!(err, PipelineError::OutputSelection(_)));
}

// ── DataFetcher against a flaky source ───────────────────────

/// Fails the sub-range starting at `fail_at`, otherwise returns one row per range.
struct FlakySource {
    fail_at: i64,
}

#[async_trait::async_trait]
impl TimeSeriesSource for FlakySource {
    async fn fetch(&self, request: &TimeSeriesRequest) -> anyhow::Result<DataTable> {
        if request.range.start == self.fail_at {
            anyhow::bail!("upstream timeout");
        }
        let mut table = DataTable::new(["ts", "value"]);
        table.push_row(vec![json!(request.range.start), json!(1.0)])?;
        Ok(table)
    }
}

#[tokio::test]
async fn data_fetcher_omits_failed_sub_ranges() {
    let log = Log::default();
    let app = ApplicationContext::new().with_time_series(Arc::new(FlakySource { fail_at: HOUR }));
    let exec = PlanExecutor::new(Arc::new(registry(&log)), Arc::new(app));
    let graph = PlanGraph::build(
        vec![NodeConfig::new("root", "DataFetcher")
            .param("metric", "views")
            .param("chunk", "PT1H")],
        WINDOW,
    )
    .unwrap();

    let output = exec.run_output(&graph).await.unwrap();

    let PipelineResult::TimeSeries(table) = output else {
        panic!("expected a time series, got {}", output.kind());
    };
    let ts: Vec<i64> = (0..table.len()).map(|r| table.i64_at(r, 0).unwrap()).collect();
    assert_eq!(ts, vec![0, 2 * HOUR]);
}

#[tokio::test]
async fn data_fetcher_without_source_fails() {
    let log = Log::default();
    let graph = PlanGraph::build(vec![NodeConfig::new("root", "DataFetcher")], WINDOW).unwrap();

    let err = executor(&log).run(&graph).await.unwrap_err();
    assert!(matches!(err.root_cause(), PipelineError::MissingCollaborator(_)));
}
