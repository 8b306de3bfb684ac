use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Invalid period '{0}'")]
    InvalidPeriod(String),

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Table shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for VigilError {
    fn from(e: serde_json::Error) -> Self {
        VigilError::Serialize(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VigilError>;
