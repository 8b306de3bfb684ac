//! Static mapping from node type names to operator constructors.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use vigil_core::TimeRange;

use crate::error::{PipelineError, Result};
use crate::operator::{effective_window, Operator};
use crate::plan::{InputRef, NodeConfig};

/// Constructor for a node type's operator.
pub type OperatorFactory = Arc<dyn Fn() -> Box<dyn Operator> + Send + Sync>;

/// A configured node bound to its type's constructor.
pub struct PlanNode {
    config: NodeConfig,
    window: TimeRange,
    factory: OperatorFactory,
}

impl PlanNode {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn node_type(&self) -> &str {
        &self.config.node_type
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.config.params
    }

    pub fn inputs(&self) -> &[InputRef] {
        &self.config.inputs
    }

    /// Effective window after `startTime`/`endTime` overrides.
    pub fn window(&self) -> TimeRange {
        self.window
    }

    /// A fresh operator instance.
    pub fn operator(&self) -> Box<dyn Operator> {
        (self.factory)()
    }
}

impl std::fmt::Debug for PlanNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanNode")
            .field("name", &self.config.name)
            .field("type", &self.config.node_type)
            .field("window", &self.window)
            .finish()
    }
}

/// Registry of node types. Populated once at startup with explicit
/// `register` calls; there is no runtime discovery.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: HashMap<String, OperatorFactory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in node type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::nodes::register_builtins(&mut registry);
        registry
    }

    /// Register a node type. Returns error if the type is already registered.
    pub fn register<F>(&mut self, node_type: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Operator> + Send + Sync + 'static,
    {
        let node_type = node_type.into();
        if self.factories.contains_key(&node_type) {
            return Err(PipelineError::DuplicateNodeType(node_type));
        }
        self.factories.insert(node_type, Arc::new(factory));
        Ok(())
    }

    /// Bind `config` to its type's constructor.
    pub fn create(&self, config: &NodeConfig, window: TimeRange) -> Result<PlanNode> {
        let factory = self
            .factories
            .get(&config.node_type)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownNodeType(config.node_type.clone()))?;
        Ok(PlanNode {
            window: effective_window(window, &config.params)?,
            config: config.clone(),
            factory,
        })
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
