//! Sequential, topologically ordered plan evaluation.
//!
//! A run instantiates every node up front (so an unknown type fails before any
//! node executes), then evaluates top-level nodes one at a time in the graph's
//! execution order. Each node sees the results of its declared inputs, keyed by
//! local input key. The first operator failure aborts the run, wrapped with
//! the failing node's name. The cancel signal is checked before every node.
//!
//! ForkJoin sub-evaluations re-enter the executor through
//! [`PlanExecutor::evaluate_node`] with an increased depth.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, info};
use vigil_core::config::EngineConfig;
use vigil_core::{EnumerationItem, PipelineResult};

use crate::context::ApplicationContext;
use crate::error::{PipelineError, Result};
use crate::operator::{CancelSignal, OperatorContext, OperatorInputs};
use crate::plan::PlanGraph;
use crate::registry::{NodeRegistry, PlanNode};

/// Results of one evaluation, keyed by node name in execution order.
pub type RunResults = IndexMap<String, PipelineResult>;

/// Evaluates plan graphs against a registry and a set of collaborators.
///
/// Cheap to clone; clones share the registry, collaborators and cancel signal.
#[derive(Clone)]
pub struct PlanExecutor {
    registry: Arc<NodeRegistry>,
    app: Arc<ApplicationContext>,
    settings: EngineConfig,
    cancel: CancelSignal,
    alert_id: Option<i64>,
}

impl PlanExecutor {
    pub fn new(registry: Arc<NodeRegistry>, app: Arc<ApplicationContext>) -> Self {
        Self {
            registry,
            app,
            settings: EngineConfig::default(),
            cancel: CancelSignal::new(),
            alert_id: None,
        }
    }

    pub fn with_settings(mut self, settings: EngineConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Persisted id of the alert this plan belongs to, stamped on anomalies.
    pub fn with_alert_id(mut self, alert_id: Option<i64>) -> Self {
        self.alert_id = alert_id;
        self
    }

    pub fn alert_id(&self) -> Option<i64> {
        self.alert_id
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn app(&self) -> &ApplicationContext {
        &self.app
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Evaluate every top-level node of `graph`.
    pub async fn run(&self, graph: &PlanGraph) -> Result<RunResults> {
        let started = Instant::now();
        let results = self
            .run_graph(Arc::new(graph.clone()), None, 0, None)
            .await?;
        info!(
            nodes = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "plan evaluated"
        );
        Ok(results)
    }

    /// Evaluate `graph` and return the result of its designated output node.
    pub async fn run_output(&self, graph: &PlanGraph) -> Result<PipelineResult> {
        let output = graph.output_node()?.to_string();
        let mut results = self.run(graph).await?;
        results.swap_remove(&output).ok_or_else(|| {
            PipelineError::OutputSelection(format!("output node '{output}' is not a top-level node"))
        })
    }

    /// Evaluate `target` and its dependency closure as a nested run.
    ///
    /// `item` is substituted into the closure's params and exposed to each
    /// operator. `extra` inputs are appended after the target's declared ones.
    pub async fn evaluate_node(
        &self,
        graph: &PlanGraph,
        target: &str,
        item: Option<&EnumerationItem>,
        depth: usize,
        extra: OperatorInputs,
    ) -> Result<PipelineResult> {
        if depth > self.settings.max_plan_depth {
            return Err(PipelineError::MaxDepthExceeded {
                depth,
                max: self.settings.max_plan_depth,
            });
        }
        let sub = Arc::new(graph.subgraph(target, item)?);
        let mut results = self
            .run_graph(sub, item.cloned(), depth, Some((target, extra)))
            .await?;
        results
            .swap_remove(target)
            .ok_or_else(|| PipelineError::MissingInput(target.to_string()))
    }

    async fn run_graph(
        &self,
        graph: Arc<PlanGraph>,
        item: Option<EnumerationItem>,
        depth: usize,
        mut extra: Option<(&str, OperatorInputs)>,
    ) -> Result<RunResults> {
        let planned = self.instantiate(&graph)?;
        let mut results = RunResults::with_capacity(planned.len());

        for node in planned {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    node: node.name().to_string(),
                });
            }

            let mut inputs = OperatorInputs::with_capacity(node.inputs().len());
            for input in node.inputs() {
                let result = results
                    .get(&input.source_node)
                    .cloned()
                    .ok_or_else(|| PipelineError::MissingInput(input.source_node.clone()))?;
                inputs.insert(input.local_key().to_string(), result);
            }
            if extra.as_ref().is_some_and(|(target, _)| *target == node.name()) {
                if let Some((_, more)) = extra.take() {
                    inputs.extend(more);
                }
            }

            let ctx = OperatorContext {
                node_name: node.name().to_string(),
                params: node.params().clone(),
                window: node.window(),
                item: item.clone(),
                depth,
                graph: Arc::clone(&graph),
                executor: self.clone(),
            };

            debug!(node = %node.name(), node_type = %node.node_type(), depth, "evaluating node");
            let started = Instant::now();
            let result = node
                .operator()
                .execute(&ctx, inputs)
                .await
                .map_err(|e| attach_node(node.name(), e))?;
            debug!(
                node = %node.name(),
                kind = result.kind(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "node finished"
            );

            results.insert(node.name().to_string(), result);
        }

        Ok(results)
    }

    /// Bind every node to its constructor; returns top-level nodes in order.
    fn instantiate(&self, graph: &PlanGraph) -> Result<Vec<PlanNode>> {
        let mut planned = Vec::with_capacity(graph.len());
        for name in graph.execution_order() {
            let config = graph
                .node(name)
                .ok_or_else(|| PipelineError::MissingInput(name.clone()))?;
            let node = self.registry.create(config, graph.window())?;
            if !graph.is_embedded(name) {
                planned.push(node);
            }
        }
        Ok(planned)
    }
}

fn attach_node(node: &str, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::Cancelled { .. } => err,
        other => PipelineError::OperatorFailure {
            node: node.to_string(),
            source: Box::new(other),
        },
    }
}

#[cfg(test)]
mod tests;
