use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{InputRef, Value};

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CapabilityError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CapabilityError::Transient(_))
    }
}

/// Per-invocation context handed to a capability by the executor.
#[derive(Clone, Debug)]
pub struct CapabilityContext {
    pub run_id: String,
    pub call_id: String,
    pub step_id: u32,
    pub input: Arc<InputRef>,
    pub timeout: Duration,
    pub cancellation: CancellationToken,
}

/// An invocable extraction behavior, registered by name.
///
/// `validate_arguments` is consulted before `execute`; a capability is never
/// executed with arguments it rejected.
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn validate_arguments(&self, args: &Value) -> bool;
    async fn execute(&self, args: Value, ctx: &CapabilityContext)
        -> Result<Value, CapabilityError>;
}
