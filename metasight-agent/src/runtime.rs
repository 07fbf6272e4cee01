use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use metasight_core::{CancellationToken, CapabilityContext, InputRef, ToolSpec};
use tracing::Instrument;

use crate::config::{ExtractionConfig, ExtractionOptions};
use crate::critic::CriticGate;
use crate::error::{AgentBuildError, ExtractionFailure, ReasoningError};
use crate::executor::CapabilityExecutor;
use crate::metadata::{
    confidence_score, Draft, FieldName, ProductMetadata, Proposal, Provenance, ValidatedMetadata,
};
use crate::observer::{ExtractionObserver, NoopObserver};
use crate::policy::{BoundedReformulation, PolicyDecision, PolicyEngine, RepromptStrategy};
use crate::reasoning::{Reasoner, ReasoningContext};
use crate::registry::CapabilityRegistry;
use crate::schema::SchemaValidator;
use crate::state::{
    CapabilityInvocation, ExtractionState, FailureReason, RunStatus, StepAction, TurnKind,
    Violation,
};
use crate::validation::validate_reasoning_step;

/// A finished run together with its full, append-only record.
#[derive(Debug)]
pub struct AuditedRun {
    pub state: ExtractionState,
    pub result: Result<ValidatedMetadata, ExtractionFailure>,
}

enum Phase {
    Reasoning,
    Acting(Vec<CapabilityInvocation>),
    Validating(Proposal),
    Critiquing {
        draft: Draft,
        inferred: BTreeSet<FieldName>,
    },
}

/// Drives one input through reasoning, capability calls, schema validation
/// and the critic until the answer is approved or a bound is hit.
///
/// The agent holds no per-run state; one instance can serve any number of
/// concurrent runs.
pub struct ExtractionAgent {
    reasoner: Arc<dyn Reasoner>,
    registry: Arc<CapabilityRegistry>,
    config: ExtractionConfig,
    critic: CriticGate,
    policy: Option<Arc<dyn PolicyEngine>>,
    observer: Arc<dyn ExtractionObserver>,
}

#[derive(Default)]
pub struct ExtractionAgentBuilder {
    reasoner: Option<Arc<dyn Reasoner>>,
    registry: Option<Arc<CapabilityRegistry>>,
    config: ExtractionConfig,
    policy: Option<Arc<dyn PolicyEngine>>,
    observer: Option<Arc<dyn ExtractionObserver>>,
}

impl ExtractionAgentBuilder {
    pub fn reasoner<R>(mut self, reasoner: R) -> Self
    where
        R: Reasoner + 'static,
    {
        self.reasoner = Some(Arc::new(reasoner));
        self
    }

    pub fn shared_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn registry(mut self, registry: Arc<CapabilityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default `BoundedReformulation(max_reformulations)`.
    pub fn policy<P>(mut self, policy: P) -> Self
    where
        P: PolicyEngine + 'static,
    {
        self.policy = Some(Arc::new(policy));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ExtractionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Result<ExtractionAgent, AgentBuildError> {
        let reasoner = self.reasoner.ok_or(AgentBuildError::MissingReasoner)?;
        self.config.validate().map_err(AgentBuildError::InvalidConfig)?;
        let critic = CriticGate::new(
            self.config.high_value_fields.clone(),
            self.config.inferable_fields.clone(),
        )
        .map_err(|err| AgentBuildError::InvalidConfig(err.to_string()))?;

        Ok(ExtractionAgent {
            reasoner,
            registry: self.registry.unwrap_or_default(),
            config: self.config,
            critic,
            policy: self.policy,
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
        })
    }
}

/// Per-run collaborators derived from the agent and the merged config.
struct RunContext<'a> {
    config: ExtractionConfig,
    schema: SchemaValidator,
    critic: CriticGate,
    policy: Arc<dyn PolicyEngine>,
    executor: CapabilityExecutor,
    capabilities: Vec<ToolSpec>,
    cancellation: &'a CancellationToken,
}

impl ExtractionAgent {
    pub fn builder() -> ExtractionAgentBuilder {
        ExtractionAgentBuilder::default()
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub async fn run(&self, input: InputRef) -> Result<ValidatedMetadata, ExtractionFailure> {
        self.run_with_cancellation(input, &CancellationToken::new())
            .await
    }

    pub async fn run_with_cancellation(
        &self,
        input: InputRef,
        cancellation: &CancellationToken,
    ) -> Result<ValidatedMetadata, ExtractionFailure> {
        self.run_audited(input, &ExtractionOptions::default(), cancellation)
            .await
            .result
    }

    pub async fn run_audited(
        &self,
        input: InputRef,
        options: &ExtractionOptions,
        cancellation: &CancellationToken,
    ) -> AuditedRun {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "extraction_run",
            run_id = %run_id,
            input_kind = %input.kind(),
        );

        let mut state = ExtractionState::new(run_id, input);
        let result = self
            .drive(&mut state, options, cancellation)
            .instrument(span)
            .await;

        AuditedRun { state, result }
    }

    /// Merges per-run overrides and checks the result the same way `build`
    /// checks the base config.
    fn prepare<'a>(
        &self,
        options: &ExtractionOptions,
        cancellation: &'a CancellationToken,
    ) -> Result<RunContext<'a>, String> {
        let config = self.config.merge(options);
        config.validate()?;
        let policy = self.policy.clone().unwrap_or_else(|| {
            Arc::new(BoundedReformulation::new(config.max_reformulations)) as Arc<dyn PolicyEngine>
        });

        Ok(RunContext {
            schema: SchemaValidator::new(config.required_fields.clone(), config.min_title_len),
            critic: self
                .critic
                .clone()
                .with_inferable_fields(config.inferable_fields.clone()),
            policy,
            executor: CapabilityExecutor::new(Arc::clone(&self.registry), config.backoff.clone()),
            capabilities: self.registry.specs(),
            cancellation,
            config,
        })
    }

    async fn drive(
        &self,
        state: &mut ExtractionState,
        options: &ExtractionOptions,
        cancellation: &CancellationToken,
    ) -> Result<ValidatedMetadata, ExtractionFailure> {
        let run = match self.prepare(options, cancellation) {
            Ok(run) => run,
            Err(detail) => {
                let failure = ExtractionFailure::InvalidConfig { detail };
                return Err(self.failed(state, FailureReason::InvalidConfig, failure));
            }
        };
        let mut phase = Phase::Reasoning;
        let mut consecutive_failures = 0u32;
        let mut outstanding: Vec<Violation> = Vec::new();

        loop {
            if run.cancellation.is_cancelled() {
                return self.cancelled(state);
            }

            phase = match phase {
                Phase::Reasoning => {
                    if state.iteration_count() >= run.config.max_iterations {
                        return self.not_converged(state, &run, outstanding);
                    }

                    let step_id = state.iteration_count() + 1;
                    let reply = self
                        .reasoner
                        .reason(ReasoningContext {
                            run_id: state.run_id(),
                            iteration: step_id,
                            input: state.input(),
                            history: state.history(),
                            draft: state.draft(),
                            capabilities: &run.capabilities,
                            outstanding: &outstanding,
                        })
                        .await
                        .and_then(|step| validate_reasoning_step(step_id, step));

                    // a reply that lands after cancellation is discarded
                    if run.cancellation.is_cancelled() {
                        return self.cancelled(state);
                    }

                    match reply {
                        Ok(step) => {
                            consecutive_failures = 0;
                            let iteration = state.begin_iteration();
                            tracing::debug!(iteration = iteration, "reasoning step accepted");
                            self.observer
                                .on_reasoning_step(state.run_id(), iteration, &step);
                            let next = match &step.action {
                                StepAction::Invoke(invocations) => {
                                    Phase::Acting(invocations.clone())
                                }
                                StepAction::Propose(proposal) => {
                                    Phase::Validating(proposal.clone())
                                }
                            };
                            state.push(TurnKind::Reasoning(step));
                            next
                        }
                        Err(error) => {
                            consecutive_failures += 1;
                            self.on_reasoning_error(state, &run, error, consecutive_failures)?
                        }
                    }
                }
                Phase::Acting(invocations) => {
                    for invocation in &invocations {
                        if run.cancellation.is_cancelled() {
                            return self.cancelled(state);
                        }

                        let ctx = CapabilityContext {
                            run_id: state.run_id().to_string(),
                            call_id: invocation.call_id.clone(),
                            step_id: state.iteration_count(),
                            input: state.shared_input(),
                            timeout: run.config.capability_timeout(),
                            cancellation: run.cancellation.clone(),
                        };
                        let observation = run.executor.observe(invocation, &ctx).await;

                        if run.cancellation.is_cancelled() {
                            tracing::debug!(
                                call_id = %invocation.call_id,
                                "discarding observation that completed after cancellation"
                            );
                            return self.cancelled(state);
                        }

                        self.observer.on_observation(state.run_id(), &observation);
                        state.push(TurnKind::Observation(observation));
                    }
                    Phase::Reasoning
                }
                Phase::Validating(proposal) => {
                    let report = run.schema.validate(&proposal.fields);
                    self.observer.on_schema_check(state.run_id(), &report);
                    state.push(TurnKind::SchemaCheck(report.clone()));

                    if report.valid {
                        let draft = Draft::from_proposal(&proposal);
                        state.accept_draft(draft.clone());
                        Phase::Critiquing {
                            draft,
                            inferred: proposal.inferred_fields(),
                        }
                    } else {
                        tracing::debug!(
                            violations = report.violations.len(),
                            "proposal failed schema validation"
                        );
                        outstanding = report.violations;
                        Phase::Reasoning
                    }
                }
                Phase::Critiquing { draft, inferred } => {
                    let review = run.critic.review(&draft, &inferred, state.history());
                    self.observer.on_verdict(state.run_id(), &review.verdict);
                    state.push(TurnKind::CriticVerdict(review.verdict.clone()));

                    if !review.verdict.approved {
                        tracing::debug!(
                            violations = review.verdict.violations.len(),
                            "critic rejected proposal"
                        );
                        outstanding = review.verdict.violations;
                        Phase::Reasoning
                    } else {
                        let mut corrected = draft;
                        for correction in &review.verdict.corrections {
                            if let Ok(field) = correction.field.parse::<FieldName>() {
                                corrected.set(field, correction.to.clone());
                            }
                        }

                        let recheck = run.schema.validate(&corrected.to_fields());
                        let metadata = if recheck.valid {
                            ProductMetadata::from_draft(&corrected)
                        } else {
                            None
                        };

                        match metadata {
                            Some(metadata) => {
                                state.accept_draft(corrected);
                                return Ok(self.succeeded(state, metadata, review.provenance));
                            }
                            None => {
                                outstanding = recheck.violations.clone();
                                state.push(TurnKind::SchemaCheck(recheck));
                                Phase::Reasoning
                            }
                        }
                    }
                }
            };
        }
    }

    fn on_reasoning_error(
        &self,
        state: &mut ExtractionState,
        run: &RunContext<'_>,
        error: ReasoningError,
        consecutive_failures: u32,
    ) -> Result<Phase, ExtractionFailure> {
        tracing::warn!(
            error = %error,
            consecutive_failures = consecutive_failures,
            "unusable reasoning reply"
        );

        let consume_budget = match run.policy.on_reasoning_error(&error, consecutive_failures) {
            PolicyDecision::Fail => {
                let failure = ExtractionFailure::ReasoningUnavailable {
                    attempts: consecutive_failures,
                    iterations: state.iteration_count(),
                    last_error: error,
                };
                return Err(self.failed(state, FailureReason::ReasoningUnavailable, failure));
            }
            PolicyDecision::Retry { consume_budget } => consume_budget,
            PolicyDecision::Reprompt {
                strategy,
                consume_budget,
            } => {
                state.push(TurnKind::Reformulation {
                    detail: reformulation_prompt(strategy, &error, &run.capabilities),
                });
                consume_budget
            }
        };

        if consume_budget {
            state.begin_iteration();
        }
        Ok(Phase::Reasoning)
    }

    fn succeeded(
        &self,
        state: &mut ExtractionState,
        metadata: ProductMetadata,
        provenance: BTreeMap<FieldName, Provenance>,
    ) -> ValidatedMetadata {
        let validated = ValidatedMetadata {
            run_id: state.run_id().to_string(),
            confidence_score: confidence_score(state.draft()),
            metadata,
            provenance,
            iterations: state.iteration_count(),
        };

        state.finish(RunStatus::Succeeded);
        tracing::info!(
            iterations = validated.iterations,
            confidence = validated.confidence_score,
            "extraction succeeded"
        );
        self.observer.on_finished(state.run_id(), state.status());
        validated
    }

    fn not_converged(
        &self,
        state: &mut ExtractionState,
        run: &RunContext<'_>,
        outstanding: Vec<Violation>,
    ) -> Result<ValidatedMetadata, ExtractionFailure> {
        // no proposal ever got far enough to be judged
        let violations = if outstanding.is_empty() {
            run.schema.validate(&state.draft().to_fields()).violations
        } else {
            outstanding
        };

        let failure = ExtractionFailure::NotConverged {
            iterations: state.iteration_count(),
            last_draft: state.draft().clone(),
            violations,
        };
        Err(self.failed(state, FailureReason::NotConverged, failure))
    }

    fn cancelled(&self, state: &mut ExtractionState) -> Result<ValidatedMetadata, ExtractionFailure> {
        let failure = ExtractionFailure::Cancelled {
            iterations: state.iteration_count(),
            last_draft: state.draft().clone(),
        };
        Err(self.failed(state, FailureReason::Cancelled, failure))
    }

    fn failed(
        &self,
        state: &mut ExtractionState,
        reason: FailureReason,
        failure: ExtractionFailure,
    ) -> ExtractionFailure {
        state.finish(RunStatus::Failed(reason));
        tracing::info!(
            iterations = state.iteration_count(),
            error = %failure,
            "extraction failed"
        );
        self.observer.on_finished(state.run_id(), state.status());
        failure
    }
}

fn reformulation_prompt(
    strategy: RepromptStrategy,
    error: &ReasoningError,
    capabilities: &[ToolSpec],
) -> String {
    let mut prompt = format!(
        "Your last reply could not be used ({error}). Reply with tool calls, or with a single JSON object holding the product metadata."
    );

    if strategy == RepromptStrategy::WithCapabilityCatalog && !capabilities.is_empty() {
        prompt.push_str("\nAvailable capabilities:");
        for capability in capabilities {
            prompt.push_str(&format!("\n- {}: {}", capability.name, capability.description));
        }
    }

    prompt
}
