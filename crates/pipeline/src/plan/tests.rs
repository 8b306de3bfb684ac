use serde_json::json;
use vigil_core::{EnumerationItem, TimeRange};

use super::{InputRef, NodeConfig, PlanDocument, PlanGraph};
use crate::error::PipelineError;

const WINDOW: TimeRange = TimeRange { start: 0, end: 3_600_000 };

fn node(name: &str, inputs: &[&str]) -> NodeConfig {
    inputs
        .iter()
        .fold(NodeConfig::new(name, "Echo"), |n, i| n.input(InputRef::new(*i)))
}

fn pos(order: &[String], name: &str) -> usize {
    order.iter().position(|s| s == name).unwrap()
}

#[test]
fn parse_plan_document() {
    let yaml = r#"
apiVersion: v1
kind: Alert
metadata:
  id: 42
  name: page-views
  mergeMaxGap: PT1H
nodes:
  - name: fetch
    type: DataFetcher
    params:
      dataset: web
      metric: views
  - name: root
    type: AnomalyDetector
    params:
      type: THRESHOLD
      max: 100
    inputs:
      - sourcePlanNode: fetch
        sourceProperty: output
        targetProperty: current
"#;
    let doc = PlanDocument::from_yaml(yaml).unwrap();
    assert_eq!(doc.metadata.id, Some(42));
    assert_eq!(doc.metadata.merge_max_gap.as_deref(), Some("PT1H"));
    assert_eq!(doc.nodes.len(), 2);
    let input = &doc.nodes[1].inputs[0];
    assert_eq!(input.source_node, "fetch");
    assert_eq!(input.source_output_key.as_deref(), Some("output"));
    assert_eq!(input.local_key(), "current");
}

#[test]
fn input_ref_accepts_short_form() {
    let input: InputRef = serde_yaml::from_str("{name: fetch, outputKey: out}").unwrap();
    assert_eq!(input.source_node, "fetch");
    assert_eq!(input.local_key(), "fetch");
}

#[test]
fn reject_unknown_document_fields() {
    let yaml = r#"
apiVersion: v1
kind: Alert
metadata: { name: x }
nodes: [{ name: a, type: Echo }]
schedule: hourly
"#;
    assert!(matches!(
        PlanDocument::from_yaml(yaml),
        Err(PipelineError::InvalidPlan(_))
    ));
}

#[test]
fn linear_order() {
    let graph = PlanGraph::build(
        vec![node("c", &["b"]), node("b", &["a"]), node("a", &[])],
        WINDOW,
    )
    .unwrap();
    assert_eq!(graph.execution_order(), ["a", "b", "c"]);
}

#[test]
fn diamond_order() {
    let graph = PlanGraph::build(
        vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b", "c"]),
        ],
        WINDOW,
    )
    .unwrap();
    let order = graph.execution_order();
    assert_eq!(pos(order, "a"), 0);
    assert!(pos(order, "b") < pos(order, "d"));
    assert!(pos(order, "c") < pos(order, "d"));
}

#[test]
fn every_input_precedes_its_consumer() {
    let configs = vec![
        node("report", &["merge", "fetch_b"]),
        node("merge", &["detect_a", "detect_b"]),
        node("detect_a", &["fetch_a"]),
        node("detect_b", &["fetch_b"]),
        node("fetch_a", &[]),
        node("fetch_b", &[]),
    ];
    let graph = PlanGraph::build(configs.clone(), WINDOW).unwrap();
    let order = graph.execution_order();
    for config in &configs {
        for input in &config.inputs {
            assert!(pos(order, &input.source_node) < pos(order, &config.name));
        }
    }
}

#[test]
fn detect_cycle() {
    let err = PlanGraph::build(
        vec![node("a", &["c"]), node("b", &["a"]), node("c", &["b"]), node("d", &[])],
        WINDOW,
    )
    .unwrap_err();
    match err {
        PipelineError::CyclicDependency(msg) => {
            assert!(msg.contains('a') && msg.contains('b') && msg.contains('c'));
            assert!(!msg.contains('d'));
        }
        other => panic!("expected CyclicDependency, got {other:?}"),
    }
}

#[test]
fn self_reference_is_a_cycle() {
    let err = PlanGraph::build(vec![node("a", &["a"])], WINDOW).unwrap_err();
    assert!(matches!(err, PipelineError::CyclicDependency(_)));
}

#[test]
fn duplicate_node_name() {
    let err = PlanGraph::build(vec![node("a", &[]), node("a", &[])], WINDOW).unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateNodeName(n) if n == "a"));
}

#[test]
fn unresolved_reference() {
    let err = PlanGraph::build(vec![node("a", &["ghost"])], WINDOW).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::UnresolvedReference { node, reference } if node == "a" && reference == "ghost"
    ));
}

fn fork_join_configs() -> Vec<NodeConfig> {
    vec![
        NodeConfig::new("enumerate", "Enumerator").param("items", json!([{"name": "US"}])),
        NodeConfig::new("fetch", "DataFetcher").param("query", "country = '${country}'"),
        node("item_root", &["fetch"]),
        NodeConfig::new("combine", "Combiner"),
        NodeConfig::new("root", "ForkJoin")
            .param("enumerator", "enumerate")
            .param("root", "item_root")
            .param("combiner", "combine"),
    ]
}

#[test]
fn fork_join_refs_are_dependencies() {
    let graph = PlanGraph::build(fork_join_configs(), WINDOW).unwrap();
    let order = graph.execution_order();
    assert!(pos(order, "enumerate") < pos(order, "root"));
    assert!(pos(order, "item_root") < pos(order, "root"));
    assert!(pos(order, "combine") < pos(order, "root"));

    let missing = vec![NodeConfig::new("root", "ForkJoin")
        .param("enumerator", "e")
        .param("root", "r")
        .param("combiner", "c")];
    assert!(matches!(
        PlanGraph::build(missing, WINDOW),
        Err(PipelineError::UnresolvedReference { .. })
    ));
}

#[test]
fn fork_join_members_are_embedded() {
    let mut configs = fork_join_configs();
    configs.push(node("report", &["root", "fetch_total"]));
    configs.push(node("fetch_total", &[]));
    let graph = PlanGraph::build(configs, WINDOW).unwrap();
    for name in ["enumerate", "fetch", "item_root", "combine"] {
        assert!(graph.is_embedded(name), "{name} should be embedded");
    }
    for name in ["root", "report", "fetch_total"] {
        assert!(!graph.is_embedded(name), "{name} should run at top level");
    }
}

#[test]
fn shared_input_stays_top_level() {
    let mut configs = fork_join_configs();
    configs.push(node("audit", &["fetch"]));
    let graph = PlanGraph::build(configs, WINDOW).unwrap();
    assert!(!graph.is_embedded("fetch"));
    assert!(graph.is_embedded("item_root"));
}

#[test]
fn subgraph_substitutes_item_params() {
    let graph = PlanGraph::build(fork_join_configs(), WINDOW).unwrap();
    let mut item = EnumerationItem::named("FR");
    item.params.insert("country".into(), json!("FR"));

    let sub = graph.subgraph("item_root", Some(&item)).unwrap();
    assert_eq!(sub.len(), 2);
    assert_eq!(sub.execution_order(), ["fetch", "item_root"]);
    assert_eq!(
        sub.node("fetch").unwrap().params["query"],
        json!("country = 'FR'")
    );
    // The parent graph is untouched.
    assert_eq!(
        graph.node("fetch").unwrap().params["query"],
        json!("country = '${country}'")
    );
}

#[test]
fn output_selection() {
    let graph = PlanGraph::build(fork_join_configs(), WINDOW).unwrap();
    assert_eq!(graph.output_node().unwrap(), "root");

    let mut flagged = node("final", &[]);
    flagged.output = true;
    let graph = PlanGraph::build(vec![node("a", &[]), flagged], WINDOW).unwrap();
    assert_eq!(graph.output_node().unwrap(), "final");

    let graph = PlanGraph::build(vec![node("a", &[])], WINDOW).unwrap();
    assert!(matches!(graph.output_node(), Err(PipelineError::OutputSelection(_))));

    let mut x = node("x", &[]);
    x.output = true;
    let mut y = node("y", &[]);
    y.output = true;
    let graph = PlanGraph::build(vec![x, y], WINDOW).unwrap();
    assert!(matches!(graph.output_node(), Err(PipelineError::OutputSelection(_))));
}
