use std::sync::Arc;

use metasight_core::{retry_with_backoff, BackoffConfig, CapabilityContext, CapabilityError, Value};
use tracing::Instrument;

use crate::error::CapabilityFailure;
use crate::registry::CapabilityRegistry;
use crate::state::{CapabilityInvocation, Observation};

/// Invokes registered capabilities with bounded exponential backoff under a
/// single per-invocation deadline that covers every attempt and the delays
/// between them. Every failure comes back as a typed [`CapabilityFailure`];
/// nothing escapes into the loop.
#[derive(Clone, Debug)]
pub struct CapabilityExecutor {
    registry: Arc<CapabilityRegistry>,
    backoff: BackoffConfig,
}

impl CapabilityExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, backoff: BackoffConfig) -> Self {
        Self { registry, backoff }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: &Value,
        ctx: &CapabilityContext,
    ) -> Result<Value, CapabilityFailure> {
        let Some(capability) = self.registry.get(name) else {
            tracing::warn!(capability = name, "reasoning requested an unknown capability");
            return Err(CapabilityFailure::UnknownCapability {
                name: name.to_string(),
            });
        };

        if !capability.validate_arguments(arguments) {
            tracing::warn!(capability = name, arguments = %arguments, "rejected capability arguments");
            return Err(CapabilityFailure::InvalidArguments {
                detail: format!("arguments do not satisfy the input contract of {name}"),
            });
        }

        let timeout = ctx.timeout;
        let span = tracing::info_span!(
            "capability_invoke",
            capability = name,
            call_id = %ctx.call_id,
            step_id = ctx.step_id,
        );

        let attempts = retry_with_backoff(
            &self.backoff,
            |error: &CapabilityError| !ctx.cancellation.is_cancelled() && error.is_retryable(),
            |attempt| {
                let args = arguments.clone();
                async move {
                    tracing::debug!(attempt = attempt, "invoking capability");
                    capability.execute(args, ctx).await
                }
            },
        )
        .instrument(span);

        match tokio::time::timeout(timeout, attempts).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CapabilityError::InvalidArguments(detail))) => {
                Err(CapabilityFailure::InvalidArguments { detail })
            }
            Ok(Err(error)) => Err(CapabilityFailure::Invocation {
                detail: error.to_string(),
            }),
            Err(_) => Err(CapabilityFailure::Timeout {
                after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Runs one invocation and wraps whatever happened as an observation.
    pub async fn observe(
        &self,
        invocation: &CapabilityInvocation,
        ctx: &CapabilityContext,
    ) -> Observation {
        let result = self
            .invoke(&invocation.capability_name, &invocation.arguments, ctx)
            .await;

        if let Err(failure) = &result {
            tracing::warn!(
                capability = %invocation.capability_name,
                call_id = %invocation.call_id,
                failure = %failure,
                "capability invocation failed"
            );
        }

        Observation {
            call_id: Some(invocation.call_id.clone()),
            capability_name: invocation.capability_name.clone(),
            arguments: invocation.arguments.clone(),
            result,
        }
    }
}
