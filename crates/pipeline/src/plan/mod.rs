//! Plan documents and the validated execution graph built from them.

mod config;
mod graph;
pub mod template;

pub use config::{
    InputRef, NodeConfig, PlanDocument, PlanKind, PlanMetadata, DEFAULT_OUTPUT_NODE,
    FORK_JOIN_REFS, FORK_JOIN_TYPE,
};
pub use graph::PlanGraph;

#[cfg(test)]
mod tests;
