use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetasightError {
    #[error("LLM provider failed: {0}")]
    LlmProvider(String),
    #[error("Parsing failed on output '{output}': {reason}")]
    ParseFailed { output: String, reason: String },
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Operation was cancelled")]
    Cancelled,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

impl MetasightError {
    /// Failures an external collaborator may recover from if asked again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MetasightError::LlmProvider(_) | MetasightError::Timeout(_)
        )
    }
}
