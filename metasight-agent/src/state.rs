use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metasight_core::{InputRef, Value};
use serde::{Deserialize, Serialize};

use crate::error::CapabilityFailure;
use crate::metadata::{Draft, Proposal};

/// Capability name under which user-supplied text is seeded as evidence.
pub const USER_INPUT_CAPABILITY: &str = "user_input";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Missing,
    Unsupported,
    TypeMismatch,
    OutOfSchema,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViolationKind::Missing => "missing",
            ViolationKind::Unsupported => "unsupported",
            ViolationKind::TypeMismatch => "type mismatch",
            ViolationKind::OutOfSchema => "out of schema",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Violation {
    /// Raw key as proposed; may name a field outside the schema.
    pub field: String,
    pub kind: ViolationKind,
    pub detail: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.field, self.kind, self.detail)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CapabilityInvocation {
    pub call_id: String,
    pub capability_name: String,
    pub arguments: Value,
}

impl CapabilityInvocation {
    pub fn new(
        call_id: impl Into<String>,
        capability_name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            capability_name: capability_name.into(),
            arguments,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StepAction {
    /// Executed sequentially, in this order.
    Invoke(Vec<CapabilityInvocation>),
    Propose(Proposal),
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ReasoningStep {
    pub rationale: String,
    pub action: StepAction,
}

impl ReasoningStep {
    pub fn invoke(rationale: impl Into<String>, invocations: Vec<CapabilityInvocation>) -> Self {
        Self {
            rationale: rationale.into(),
            action: StepAction::Invoke(invocations),
        }
    }

    pub fn propose(rationale: impl Into<String>, proposal: Proposal) -> Self {
        Self {
            rationale: rationale.into(),
            action: StepAction::Propose(proposal),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Observation {
    /// `None` for evidence the run seeded itself.
    pub call_id: Option<String>,
    pub capability_name: String,
    pub arguments: Value,
    pub result: Result<Value, CapabilityFailure>,
}

impl Observation {
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&CapabilityFailure> {
        self.result.as_ref().err()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SchemaReport {
    pub valid: bool,
    pub violations: Vec<Violation>,
}

/// A whitespace canonicalization the critic applies on approval.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Correction {
    pub field: String,
    pub from: String,
    pub to: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CriticVerdict {
    pub approved: bool,
    pub violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<Correction>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "turn", rename_all = "snake_case")]
pub enum TurnKind {
    Reasoning(ReasoningStep),
    Observation(Observation),
    SchemaCheck(SchemaReport),
    CriticVerdict(CriticVerdict),
    Reformulation { detail: String },
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Turn {
    pub recorded_at: DateTime<Utc>,
    pub kind: TurnKind,
}

impl Turn {
    pub fn new(kind: TurnKind) -> Self {
        Self {
            recorded_at: Utc::now(),
            kind,
        }
    }

    pub fn observation(&self) -> Option<&Observation> {
        match &self.kind {
            TurnKind::Observation(observation) => Some(observation),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NotConverged,
    ReasoningUnavailable,
    Cancelled,
    InvalidConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed(FailureReason),
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// The single record threaded through one run. Owned by exactly one loop.
#[derive(Clone, Debug, Serialize)]
pub struct ExtractionState {
    run_id: String,
    input: Arc<InputRef>,
    history: Vec<Turn>,
    draft: Draft,
    iteration_count: u32,
    status: RunStatus,
}

impl ExtractionState {
    /// Text and inline-document inputs are seeded as the first observation
    /// so the critic can trace values back to them.
    pub fn new(run_id: impl Into<String>, input: InputRef) -> Self {
        let mut state = Self {
            run_id: run_id.into(),
            input: Arc::new(input),
            history: Vec::new(),
            draft: Draft::new(),
            iteration_count: 0,
            status: RunStatus::Running,
        };

        if let Some(text) = state.input.inline_text().map(str::to_string) {
            state.push(TurnKind::Observation(Observation {
                call_id: None,
                capability_name: USER_INPUT_CAPABILITY.to_string(),
                arguments: Value::Null,
                result: Ok(Value::String(text)),
            }));
        }

        state
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn input(&self) -> &InputRef {
        &self.input
    }

    pub(crate) fn shared_input(&self) -> Arc<InputRef> {
        Arc::clone(&self.input)
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn observations(&self) -> impl Iterator<Item = (usize, &Observation)> {
        self.history
            .iter()
            .enumerate()
            .filter_map(|(index, turn)| turn.observation().map(|obs| (index, obs)))
    }

    pub(crate) fn push(&mut self, kind: TurnKind) -> usize {
        self.history.push(Turn::new(kind));
        self.history.len() - 1
    }

    pub(crate) fn begin_iteration(&mut self) -> u32 {
        self.iteration_count += 1;
        self.iteration_count
    }

    pub(crate) fn accept_draft(&mut self, draft: Draft) {
        self.draft = draft;
    }

    /// Moves out of `Running`. Returns `false`, leaving the status untouched,
    /// when the run already terminated.
    pub(crate) fn finish(&mut self, status: RunStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}
