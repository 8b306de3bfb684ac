//! Folds freshly detected anomaly intervals into previously stored ones.
//!
//! - [`merger`]: the pure, single-pass merge over a sorted interval list
//! - [`AnomalyStore`]: storage collaborator (overlap query + persist)
//! - [`AnomalyMerger`]: per-alert orchestration, serialized per alert id

pub mod error;
pub mod key;
pub mod merger;
pub mod policy;
pub mod service;
pub mod store;

pub use error::{MergeError, Result};
pub use key::AnomalyKey;
pub use merger::{combine_and_sort, merge};
pub use policy::MergePolicy;
pub use service::{AnomalyMerger, MergeOutcome};
pub use store::{AnomalyStore, InMemoryAnomalyStore};
