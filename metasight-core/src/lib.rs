mod capability;
mod error;
mod input;
mod llm;
mod retry;
mod value;

pub use capability::{Capability, CapabilityContext, CapabilityError};
pub use error::MetasightError;
pub use input::{DocumentRef, ImageRef, InputKind, InputRef};
pub use llm::{LlmRequest, LlmResponse, Message, Role, ToolCall, ToolCallingLlm, ToolSpec};
pub use retry::{retry_with_backoff, BackoffConfig};
pub use tokio_util::sync::CancellationToken;
pub use value::{value_kind, Value};
