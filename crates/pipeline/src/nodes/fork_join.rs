//! Fan-out/fan-in composite.
//!
//! 1. Evaluates the `enumerator` node to get an ordered list of items.
//! 2. Evaluates the `root` sub-pipeline once per item, with the item's values
//!    substituted into the sub-pipeline's params. Up to `parallelism` items run
//!    concurrently; results are kept in item order regardless of completion
//!    order.
//! 3. Evaluates the `combiner` node with the per-item results as inputs keyed
//!    `"0"`, `"1"`, ... after any inputs it declares itself.
//!
//! Any failure (enumerator, one item, or combiner) fails the whole node.

use futures::{stream, StreamExt, TryStreamExt};
use tracing::{info, warn};
use vigil_core::PipelineResult;

use crate::error::{PipelineError, Result};
use crate::operator::{Operator, OperatorContext, OperatorInputs};

pub struct ForkJoinOperator;

#[async_trait::async_trait]
impl Operator for ForkJoinOperator {
    async fn execute(&self, ctx: &OperatorContext, _inputs: OperatorInputs) -> Result<PipelineResult> {
        let enumerator = ctx.require_str("enumerator")?;
        let root = ctx.require_str("root")?;
        let combiner = ctx.require_str("combiner")?;

        let executor = ctx.executor();
        let graph = ctx.graph();
        let depth = ctx.depth() + 1;

        let items = match executor
            .evaluate_node(graph, enumerator, ctx.item(), depth, OperatorInputs::new())
            .await?
        {
            PipelineResult::Enumeration(items) => items,
            other => {
                return Err(PipelineError::ShapeMismatch {
                    expected: "enumeration",
                    actual: other.kind(),
                })
            }
        };

        let parallelism = ctx
            .usize_param("parallelism")
            .unwrap_or(ctx.settings().fork_join_parallelism)
            .max(1);
        info!(
            node = %ctx.node_name(),
            items = items.len(),
            parallelism,
            depth,
            "fork-join fan-out"
        );

        let item_futures: Vec<_> = items
            .iter()
            .map(|item| async move {
                executor
                    .evaluate_node(graph, root, Some(item), depth, OperatorInputs::new())
                    .await
                    .inspect_err(|e| {
                        warn!(node = %ctx.node_name(), item = %item.name, error = %e, "fork-join item failed");
                    })
            })
            .collect();
        let results: Vec<PipelineResult> = stream::iter(item_futures)
        .buffered(parallelism)
        .try_collect()
        .await?;

        let per_item: OperatorInputs = results
            .into_iter()
            .enumerate()
            .map(|(idx, result)| (idx.to_string(), result))
            .collect();

        executor
            .evaluate_node(graph, combiner, ctx.item(), depth, per_item)
            .await
    }
}
