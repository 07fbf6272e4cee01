//! Orchestration loop for product metadata extraction.
//!
//! An [`ExtractionAgent`] alternates between a [`Reasoner`] and registered
//! capabilities, then gates every proposed answer through the
//! [`SchemaValidator`] and the [`CriticGate`] before returning it.

mod config;
mod critic;
mod error;
mod executor;
mod metadata;
mod observer;
mod policy;
mod reasoning;
mod registry;
mod runtime;
mod schema;
mod state;
mod validation;

pub use config::{ExtractionConfig, ExtractionOptions};
pub use critic::{placeholder_phrase, CriticGate, CriticReview};
pub use error::{
    AgentBuildError, CapabilityFailure, ExtractionFailure, ReasoningError, RegistryBuildError,
};
pub use executor::CapabilityExecutor;
pub use metadata::{
    confidence_score, Draft, FieldName, ProductMetadata, Proposal, Provenance, UnknownField,
    ValidatedMetadata,
};
pub use observer::{ExtractionObserver, NoopObserver};
pub use policy::{BoundedReformulation, FailFast, PolicyDecision, PolicyEngine, RepromptStrategy};
pub use reasoning::{parse_response, LlmReasoner, Reasoner, ReasoningContext};
pub use registry::{CapabilityRegistry, CapabilityRegistryBuilder, TypedCapability};
pub use runtime::{AuditedRun, ExtractionAgent, ExtractionAgentBuilder};
pub use schema::SchemaValidator;
pub use state::{
    CapabilityInvocation, Correction, CriticVerdict, ExtractionState, FailureReason, Observation,
    ReasoningStep, RunStatus, SchemaReport, StepAction, Turn, TurnKind, Violation, ViolationKind,
    USER_INPUT_CAPABILITY,
};
pub use validation::validate_reasoning_step;

pub use metasight_core::{CancellationToken, CapabilityContext, CapabilityError, InputRef};
