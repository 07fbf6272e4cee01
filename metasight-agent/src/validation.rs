use std::collections::HashSet;

use crate::error::ReasoningError;
use crate::state::{ReasoningStep, StepAction};

/// Shape check for a step coming from the untrusted reasoning component.
///
/// Unknown capability names pass here on purpose: they are recorded as
/// failed observations by the executor instead of rejecting the step.
/// Missing call ids are filled in as `call-{step_id}-{index}`.
pub fn validate_reasoning_step(
    step_id: u32,
    mut step: ReasoningStep,
) -> Result<ReasoningStep, ReasoningError> {
    match &mut step.action {
        StepAction::Invoke(invocations) => {
            if invocations.is_empty() {
                return Err(ReasoningError::Empty);
            }

            let mut seen = HashSet::new();
            for (index, invocation) in invocations.iter_mut().enumerate() {
                if invocation.capability_name.trim().is_empty() {
                    return Err(ReasoningError::Malformed {
                        detail: format!("invocation #{index} names no capability"),
                    });
                }
                if invocation.call_id.trim().is_empty() {
                    invocation.call_id = format!("call-{step_id}-{index}");
                }
                if !seen.insert(invocation.call_id.clone()) {
                    return Err(ReasoningError::Malformed {
                        detail: format!("duplicate call id {:?}", invocation.call_id),
                    });
                }
            }
        }
        StepAction::Propose(proposal) => {
            if proposal.fields.is_empty() {
                return Err(ReasoningError::Empty);
            }
        }
    }

    Ok(step)
}
