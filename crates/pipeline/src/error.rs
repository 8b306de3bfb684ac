//! Error taxonomy for graph building and plan evaluation.

use vigil_core::VigilError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    // ── Graph build ──────────────────────────────────────────
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("node type '{0}' is already registered")]
    DuplicateNodeType(String),

    #[error("duplicate node name '{0}'")]
    DuplicateNodeName(String),

    #[error("node '{node}' references unknown node '{reference}'")]
    UnresolvedReference { node: String, reference: String },

    #[error("cyclic dependency among nodes: {0}")]
    CyclicDependency(String),

    #[error("plan must have exactly one output node, found {0}")]
    OutputSelection(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    // ── Evaluation ───────────────────────────────────────────
    #[error("node '{node}' failed: {source}")]
    OperatorFailure {
        node: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("evaluation cancelled before node '{node}'")]
    Cancelled { node: String },

    #[error("plan nesting depth {depth} exceeds maximum {max}")]
    MaxDepthExceeded { depth: usize, max: usize },

    #[error("missing input '{0}'")]
    MissingInput(String),

    #[error("invalid parameter '{param}': {reason}")]
    InvalidParam { param: String, reason: String },

    #[error("unexpected result shape: expected {expected}, got {actual}")]
    ShapeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("no {0} configured")]
    MissingCollaborator(String),

    #[error(transparent)]
    Core(#[from] VigilError),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),

    #[error("{0}")]
    Operator(String),
}

impl PipelineError {
    pub fn invalid_param(param: &str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidParam {
            param: param.to_string(),
            reason: reason.into(),
        }
    }

    /// The innermost error beneath any `OperatorFailure` wrappers.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::OperatorFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Node names from the outermost failing node down to the innermost.
    pub fn failure_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        let mut cur = self;
        while let PipelineError::OperatorFailure { node, source } = cur {
            path.push(node.as_str());
            cur = source;
        }
        path
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
