use crate::error::ReasoningError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Fail,
    Retry {
        consume_budget: bool,
    },
    Reprompt {
        strategy: RepromptStrategy,
        consume_budget: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepromptStrategy {
    /// Tell the reasoner why its reply was unusable.
    WithFeedback,
    /// As above, and list the capabilities it may call.
    WithCapabilityCatalog,
}

impl PolicyDecision {
    pub fn retry() -> Self {
        Self::Retry {
            consume_budget: false,
        }
    }

    pub fn reprompt(strategy: RepromptStrategy) -> Self {
        Self::Reprompt {
            strategy,
            consume_budget: false,
        }
    }
}

/// Decides how the loop reacts to an unusable reasoning reply.
/// `consecutive_failures` counts this failure, so it starts at 1.
pub trait PolicyEngine: Send + Sync {
    fn on_reasoning_error(&self, error: &ReasoningError, consecutive_failures: u32)
        -> PolicyDecision;
}

/// Tolerates up to `max_attempts - 1` unusable replies in a row, then fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedReformulation {
    max_attempts: u32,
}

impl BoundedReformulation {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for BoundedReformulation {
    fn default() -> Self {
        Self::new(3)
    }
}

impl PolicyEngine for BoundedReformulation {
    fn on_reasoning_error(
        &self,
        error: &ReasoningError,
        consecutive_failures: u32,
    ) -> PolicyDecision {
        if consecutive_failures >= self.max_attempts {
            return PolicyDecision::Fail;
        }

        match error {
            ReasoningError::Transport { .. } => PolicyDecision::retry(),
            ReasoningError::Empty => {
                PolicyDecision::reprompt(RepromptStrategy::WithCapabilityCatalog)
            }
            ReasoningError::Malformed { .. } => {
                PolicyDecision::reprompt(RepromptStrategy::WithFeedback)
            }
        }
    }
}

/// Gives up on the first unusable reply.
pub struct FailFast;

impl PolicyEngine for FailFast {
    fn on_reasoning_error(&self, _error: &ReasoningError, _consecutive: u32) -> PolicyDecision {
        PolicyDecision::Fail
    }
}
