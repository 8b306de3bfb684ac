//! Plan document schema: the alert envelope and per-node descriptors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vigil_core::TimeRange;

use super::PlanGraph;
use crate::error::{PipelineError, Result};

/// Node type of the fan-out/fan-in composite.
pub const FORK_JOIN_TYPE: &str = "ForkJoin";

/// ForkJoin params naming sibling nodes. These count as dependency edges.
pub const FORK_JOIN_REFS: [&str; 3] = ["enumerator", "root", "combiner"];

/// Name of the node used as output when no node sets `output: true`.
pub const DEFAULT_OUTPUT_NODE: &str = "root";

/// A reference from one node to the result of another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRef {
    #[serde(alias = "name", alias = "sourcePlanNode")]
    pub source_node: String,
    /// Carried for compatibility; each node produces a single result.
    #[serde(default, alias = "outputKey", alias = "sourceProperty", skip_serializing_if = "Option::is_none")]
    pub source_output_key: Option<String>,
    #[serde(default, alias = "targetProperty", skip_serializing_if = "Option::is_none")]
    pub local_key: Option<String>,
}

impl InputRef {
    pub fn new(source_node: impl Into<String>) -> Self {
        Self {
            source_node: source_node.into(),
            source_output_key: None,
            local_key: None,
        }
    }

    pub fn as_key(mut self, local_key: impl Into<String>) -> Self {
        self.local_key = Some(local_key.into());
        self
    }

    /// Key under which the operator sees this input.
    pub fn local_key(&self) -> &str {
        self.local_key.as_deref().unwrap_or(&self.source_node)
    }
}

/// Immutable configuration of one plan node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub inputs: Vec<InputRef>,
    /// Marks the pipeline's output node.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub output: bool,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            params: Map::new(),
            inputs: Vec::new(),
            output: false,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn input(mut self, input: InputRef) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn is_fork_join(&self) -> bool {
        self.node_type == FORK_JOIN_TYPE
    }

    /// Sibling names referenced by a ForkJoin's params, in `FORK_JOIN_REFS` order.
    pub fn fork_join_refs(&self) -> Vec<&str> {
        if !self.is_fork_join() {
            return Vec::new();
        }
        FORK_JOIN_REFS
            .iter()
            .filter_map(|k| self.params.get(*k).and_then(Value::as_str))
            .collect()
    }

    /// Every node this one depends on: declared inputs, then ForkJoin refs.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = self.inputs.iter().map(|i| i.source_node.as_str()).collect();
        deps.extend(self.fork_join_refs());
        deps
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

// ── Document envelope ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanKind {
    Alert,
}

/// Alert-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlanMetadata {
    /// Persisted alert id. Required before anomalies can be merged.
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub merge_max_gap: Option<String>,
    #[serde(default)]
    pub merge_max_duration: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// A full alert plan document as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlanDocument {
    pub api_version: String,
    pub kind: PlanKind,
    pub metadata: PlanMetadata,
    pub nodes: Vec<NodeConfig>,
}

impl PlanDocument {
    /// Parse a YAML (or JSON) plan document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let doc: PlanDocument = serde_yaml::from_str(contents)
            .map_err(|e| PipelineError::InvalidPlan(e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    /// Build the validated execution graph for one evaluation window.
    pub fn graph(&self, window: TimeRange) -> Result<PlanGraph> {
        PlanGraph::build(self.nodes.clone(), window)
    }

    fn validate(&self) -> Result<()> {
        if self.metadata.name.trim().is_empty() {
            return Err(PipelineError::InvalidPlan("metadata.name must not be empty".into()));
        }
        if self.nodes.is_empty() {
            return Err(PipelineError::InvalidPlan(format!(
                "plan '{}' declares no nodes",
                self.metadata.name
            )));
        }
        for node in &self.nodes {
            if node.name.is_empty() || node.node_type.is_empty() {
                return Err(PipelineError::InvalidPlan(format!(
                    "plan '{}' has a node without name or type",
                    self.metadata.name
                )));
            }
        }
        Ok(())
    }
}
