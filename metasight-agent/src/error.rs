use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metadata::Draft;
use crate::state::Violation;

/// Why a capability invocation produced no result. Recorded in the history
/// as part of an observation; never terminates a run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityFailure {
    #[error("timeout")]
    Timeout { after_ms: u64 },
    #[error("unknown capability")]
    UnknownCapability { name: String },
    #[error("invalid arguments: {detail}")]
    InvalidArguments { detail: String },
    #[error("invocation failed: {detail}")]
    Invocation { detail: String },
}

/// An unusable reply from the reasoning component.
#[derive(Debug, Clone, PartialEq, Eq, Error, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReasoningError {
    #[error("reasoning returned an empty step")]
    Empty,
    #[error("reasoning returned a malformed step: {detail}")]
    Malformed { detail: String },
    #[error("reasoning transport failed: {detail}")]
    Transport { detail: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionFailure {
    #[error(
        "extraction did not converge after {iterations} iterations ({count} outstanding violations)",
        count = .violations.len()
    )]
    NotConverged {
        iterations: u32,
        last_draft: Draft,
        violations: Vec<Violation>,
    },
    #[error("reasoning unavailable after {attempts} consecutive unusable replies: {last_error}")]
    ReasoningUnavailable {
        attempts: u32,
        iterations: u32,
        last_error: ReasoningError,
    },
    #[error("extraction cancelled after {iterations} iterations")]
    Cancelled { iterations: u32, last_draft: Draft },
    #[error("invalid extraction config: {detail}")]
    InvalidConfig { detail: String },
}

impl ExtractionFailure {
    pub fn iterations(&self) -> u32 {
        match self {
            ExtractionFailure::NotConverged { iterations, .. }
            | ExtractionFailure::ReasoningUnavailable { iterations, .. }
            | ExtractionFailure::Cancelled { iterations, .. } => *iterations,
            ExtractionFailure::InvalidConfig { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentBuildError {
    #[error("extraction agent requires a reasoner")]
    MissingReasoner,
    #[error("invalid extraction config: {0}")]
    InvalidConfig(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistryBuildError {
    #[error("capability name must not be empty or whitespace: {name:?}")]
    InvalidName { name: String },
    #[error("capability name is reserved: {name}")]
    ReservedName { name: String },
    #[error("duplicate capability name: {name}")]
    DuplicateName { name: String },
}
