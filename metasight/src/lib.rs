//! Product metadata extraction with a reasoning loop that only returns
//! answers every field of which is traceable to gathered evidence.
//!
//! ```no_run
//! # async fn demo(reasoner: impl metasight::Reasoner + 'static) -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use metasight::{ExtractionAgent, InputRef};
//!
//! let registry = metasight::capabilities::standard_capabilities()?.build()?;
//! let agent = ExtractionAgent::builder()
//!     .reasoner(reasoner)
//!     .registry(Arc::new(registry))
//!     .build()?;
//!
//! let validated = agent.run(InputRef::text("Red cotton t-shirt, size M")).await?;
//! println!("{}", validated.metadata.title);
//! # Ok(())
//! # }
//! ```

pub use metasight_agent::*;
pub use metasight_core::{
    retry_with_backoff, value_kind, BackoffConfig, Capability, DocumentRef, ImageRef, InputKind,
    LlmRequest, LlmResponse, Message, MetasightError, Role, ToolCall, ToolCallingLlm, ToolSpec,
    Value,
};

#[cfg(feature = "capabilities")]
pub use metasight_capabilities as capabilities;

pub mod prelude {
    pub use metasight_agent::{
        CancellationToken, ExtractionAgent, ExtractionConfig, ExtractionFailure, InputRef,
        LlmReasoner, Reasoner, ValidatedMetadata,
    };
    pub use metasight_core::ToolCallingLlm;
}
