use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use vigil_core::{EnumerationItem, TimeRange};

use super::config::{NodeConfig, DEFAULT_OUTPUT_NODE, FORK_JOIN_REFS};
use super::template::apply_item;
use crate::error::{PipelineError, Result};

/// The validated node set of one alert plan, with its execution order.
///
/// Building a graph never runs a node. Nodes referenced only through a
/// ForkJoin's `enumerator`/`root`/`combiner` params (and their input
/// closures) are *embedded*: they run inside the ForkJoin, not at top level.
#[derive(Debug, Clone)]
pub struct PlanGraph {
    nodes: IndexMap<String, NodeConfig>,
    order: Vec<String>,
    embedded: HashSet<String>,
    window: TimeRange,
}

impl PlanGraph {
    /// Validate `configs` and compute the topological execution order.
    ///
    /// Fails with `DuplicateNodeName`, `UnresolvedReference` or
    /// `CyclicDependency`.
    pub fn build(configs: Vec<NodeConfig>, window: TimeRange) -> Result<Self> {
        let mut nodes: IndexMap<String, NodeConfig> = IndexMap::with_capacity(configs.len());
        for config in configs {
            if nodes.contains_key(&config.name) {
                return Err(PipelineError::DuplicateNodeName(config.name));
            }
            nodes.insert(config.name.clone(), config);
        }

        validate_references(&nodes)?;
        let order = topological_sort(&nodes)?;
        let embedded = embedded_nodes(&nodes);

        Ok(Self {
            nodes,
            order,
            embedded,
            window,
        })
    }

    pub fn window(&self) -> TimeRange {
        self.window
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&NodeConfig> {
        self.nodes.get(name)
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeConfig> {
        self.nodes.values()
    }

    /// Node names in dependency order.
    pub fn execution_order(&self) -> &[String] {
        &self.order
    }

    pub fn is_embedded(&self, name: &str) -> bool {
        self.embedded.contains(name)
    }

    /// `target` plus everything it transitively depends on, in declaration order.
    pub fn closure(&self, target: &str) -> Result<Vec<&NodeConfig>> {
        if !self.nodes.contains_key(target) {
            return Err(PipelineError::UnresolvedReference {
                node: target.to_string(),
                reference: target.to_string(),
            });
        }
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack = vec![target];
        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(node) = self.nodes.get(name) {
                stack.extend(node.dependencies());
            }
        }
        Ok(self
            .nodes
            .values()
            .filter(|n| seen.contains(n.name.as_str()))
            .collect())
    }

    /// A standalone graph of `target`'s closure, with `item` values
    /// substituted into every node's params.
    pub fn subgraph(&self, target: &str, item: Option<&EnumerationItem>) -> Result<PlanGraph> {
        let configs = self
            .closure(target)?
            .into_iter()
            .map(|node| {
                let mut node = node.clone();
                if let Some(item) = item {
                    node.params = apply_item(&node.params, item);
                }
                node
            })
            .collect();
        PlanGraph::build(configs, self.window)
    }

    /// The designated output node: the one flagged `output: true`, else the
    /// node named `root`. Anything other than exactly one is an error.
    pub fn output_node(&self) -> Result<&str> {
        let flagged: Vec<&str> = self
            .nodes
            .values()
            .filter(|n| n.output)
            .map(|n| n.name.as_str())
            .collect();
        match flagged.as_slice() {
            [single] => Ok(single),
            [] => match self.nodes.get(DEFAULT_OUTPUT_NODE) {
                Some(node) => Ok(node.name.as_str()),
                None => Err(PipelineError::OutputSelection("none".to_string())),
            },
            many => Err(PipelineError::OutputSelection(format!(
                "{} ({})",
                many.len(),
                many.join(", ")
            ))),
        }
    }
}

fn validate_references(nodes: &IndexMap<String, NodeConfig>) -> Result<()> {
    for node in nodes.values() {
        if node.is_fork_join() {
            for key in FORK_JOIN_REFS {
                if node.str_param(key).is_none() {
                    return Err(PipelineError::InvalidPlan(format!(
                        "ForkJoin node '{}' is missing string param '{}'",
                        node.name, key
                    )));
                }
            }
        }
        for dep in node.dependencies() {
            if !nodes.contains_key(dep) {
                return Err(PipelineError::UnresolvedReference {
                    node: node.name.clone(),
                    reference: dep.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Topological sort using Kahn's algorithm.
///
/// Ties are broken by declaration order so the result is deterministic.
fn topological_sort(nodes: &IndexMap<String, NodeConfig>) -> Result<Vec<String>> {
    let mut in_degree: IndexMap<&str, usize> = IndexMap::with_capacity(nodes.len());
    let mut dependents: IndexMap<&str, Vec<&str>> = IndexMap::with_capacity(nodes.len());

    for name in nodes.keys() {
        in_degree.insert(name.as_str(), 0);
        dependents.insert(name.as_str(), Vec::new());
    }

    for (name, node) in nodes {
        for dep in node.dependencies() {
            if let Some(list) = dependents.get_mut(dep) {
                list.push(name.as_str());
            }
            if let Some(deg) = in_degree.get_mut(name.as_str()) {
                *deg += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&name, _)| name)
        .collect();

    let mut sorted = Vec::with_capacity(nodes.len());

    while let Some(node) = queue.pop_front() {
        sorted.push(node.to_string());
        if let Some(deps) = dependents.get(node) {
            for &dep in deps {
                if let Some(deg) = in_degree.get_mut(dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dep);
                    }
                }
            }
        }
    }

    if sorted.len() != nodes.len() {
        let in_cycle: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg > 0)
            .map(|(&name, _)| name)
            .collect();
        return Err(PipelineError::CyclicDependency(in_cycle.join(", ")));
    }

    Ok(sorted)
}

/// Nodes reachable from ForkJoin refs that no top-level node needs as input.
fn embedded_nodes(nodes: &IndexMap<String, NodeConfig>) -> HashSet<String> {
    let mut candidates: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = nodes.values().flat_map(|n| n.fork_join_refs()).collect();
    while let Some(name) = stack.pop() {
        if !candidates.insert(name) {
            continue;
        }
        if let Some(node) = nodes.get(name) {
            stack.extend(node.dependencies());
        }
    }

    if candidates.is_empty() {
        return HashSet::new();
    }

    // Anything feeding a top-level node through `inputs` must run at top level.
    let mut top: HashSet<&str> = nodes
        .keys()
        .map(String::as_str)
        .filter(|n| !candidates.contains(n))
        .collect();
    let mut stack: Vec<&str> = top.iter().copied().collect();
    while let Some(name) = stack.pop() {
        if let Some(node) = nodes.get(name) {
            for input in &node.inputs {
                if top.insert(input.source_node.as_str()) {
                    stack.push(input.source_node.as_str());
                }
            }
        }
    }

    candidates
        .into_iter()
        .filter(|n| !top.contains(n))
        .map(str::to_string)
        .collect()
}
