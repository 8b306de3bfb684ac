//! Plan evaluation engine: plan documents, the node registry, the executor
//! and the built-in node types.

pub mod context;
pub mod error;
pub mod executor;
pub mod loader;
pub mod nodes;
pub mod operator;
pub mod plan;
pub mod registry;

pub use context::{
    ApplicationContext, DetectionRow, Detector, DetectorFactory, EventTrigger, EventTriggerFactory,
    SqlEngine, TimeSeriesRequest, TimeSeriesSource,
};
pub use error::{PipelineError, Result};
pub use executor::{PlanExecutor, RunResults};
pub use loader::{LoadResult, LoadStatus, PlanLoader};
pub use operator::{CancelSignal, Operator, OperatorContext, OperatorInputs};
pub use plan::{InputRef, NodeConfig, PlanDocument, PlanGraph, PlanMetadata};
pub use registry::{NodeRegistry, PlanNode};
