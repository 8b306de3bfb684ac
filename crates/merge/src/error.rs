use vigil_core::VigilError;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("alert must be persisted before its anomalies can be merged")]
    MissingAlertIdentity,

    #[error("invalid merge policy: {0}")]
    InvalidPolicy(String),

    #[error("anomaly store query failed: {0:#}")]
    Store(anyhow::Error),

    #[error(transparent)]
    Core(#[from] VigilError),
}

pub type Result<T> = std::result::Result<T, MergeError>;
