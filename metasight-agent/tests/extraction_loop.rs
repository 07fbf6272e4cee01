use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metasight_agent::{
    BoundedReformulation, CancellationToken, CapabilityContext, CapabilityError,
    CapabilityFailure, CapabilityInvocation, CapabilityRegistry, CriticGate, ExtractionAgent,
    ExtractionConfig, ExtractionFailure, ExtractionOptions, FailFast, FailureReason, FieldName,
    InputRef, Proposal, Provenance, Reasoner, ReasoningContext, ReasoningError, ReasoningStep,
    RunStatus, SchemaValidator, Turn, TurnKind, Violation, ViolationKind,
};
use metasight_core::{BackoffConfig, Capability, Value};
use serde_json::json;

type Reply = Result<ReasoningStep, ReasoningError>;

struct ScriptedReasoner {
    replies: Mutex<VecDeque<Reply>>,
    seen: Mutex<Vec<(Vec<Turn>, Vec<Violation>)>>,
}

impl ScriptedReasoner {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn outstanding_at(&self, call: usize) -> Vec<Violation> {
        self.seen.lock().unwrap()[call].1.clone()
    }

    fn histories(&self) -> Vec<Vec<Turn>> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(history, _)| history.clone())
            .collect()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn reason(&self, ctx: ReasoningContext<'_>) -> Result<ReasoningStep, ReasoningError> {
        self.seen
            .lock()
            .unwrap()
            .push((ctx.history.to_vec(), ctx.outstanding.to_vec()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ReasoningError::Empty))
    }
}

struct StaticCapability {
    name: &'static str,
    output: Value,
}

#[async_trait]
impl Capability for StaticCapability {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "returns a fixed value"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn validate_arguments(&self, args: &Value) -> bool {
        args.is_object()
    }

    async fn execute(&self, _args: Value, _ctx: &CapabilityContext) -> Result<Value, CapabilityError> {
        Ok(self.output.clone())
    }
}

struct SlowCapability;

#[async_trait]
impl Capability for SlowCapability {
    fn name(&self) -> &str {
        "vision_extractor"
    }

    fn description(&self) -> &str {
        "never answers in time"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn validate_arguments(&self, _args: &Value) -> bool {
        true
    }

    async fn execute(&self, _args: Value, _ctx: &CapabilityContext) -> Result<Value, CapabilityError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(json!({"title": "too late"}))
    }
}

/// Cancels the run from inside an in-flight invocation, then completes.
struct CancellingCapability;

#[async_trait]
impl Capability for CancellingCapability {
    fn name(&self) -> &str {
        "html_scraper"
    }

    fn description(&self) -> &str {
        "cancels the run"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn validate_arguments(&self, _args: &Value) -> bool {
        true
    }

    async fn execute(&self, _args: Value, ctx: &CapabilityContext) -> Result<Value, CapabilityError> {
        ctx.cancellation.cancel();
        Ok(json!({"title": "Desk Lamp"}))
    }
}

fn propose(fields: Value) -> Reply {
    Ok(ReasoningStep::propose(
        "answer",
        Proposal::new(fields.as_object().cloned().unwrap()),
    ))
}

fn invoke(name: &str, args: Value) -> Reply {
    Ok(ReasoningStep::invoke(
        "gather evidence",
        vec![CapabilityInvocation::new("", name, args)],
    ))
}

fn registry(capabilities: Vec<Arc<dyn Capability>>) -> Arc<CapabilityRegistry> {
    let builder = capabilities
        .into_iter()
        .fold(CapabilityRegistry::builder(), |builder, capability| {
            builder.register(capability)
        });
    Arc::new(builder.build().unwrap())
}

fn normalizer() -> Arc<dyn Capability> {
    Arc::new(StaticCapability {
        name: "normalizer",
        output: json!({"color": "red", "material": "cotton"}),
    })
}

fn agent(reasoner: Arc<ScriptedReasoner>, registry: Arc<CapabilityRegistry>) -> ExtractionAgent {
    ExtractionAgent::builder()
        .reasoner(reasoner)
        .registry(registry)
        .build()
        .unwrap()
}

#[tokio::test]
async fn normalized_evidence_supports_the_exact_draft() {
    let reasoner = ScriptedReasoner::new(vec![
        invoke("normalizer", json!({"fields": {"color": "Red", "material": "cotton"}})),
        propose(json!({"title": "T-shirt", "color": "red", "material": "cotton"})),
    ]);
    let agent = agent(reasoner.clone(), registry(vec![normalizer()]));

    let run = agent
        .run_audited(
            InputRef::text("Red cotton t-shirt, size M"),
            &ExtractionOptions::default(),
            &CancellationToken::new(),
        )
        .await;
    let validated = run.result.unwrap();

    assert_eq!(validated.metadata.title, "T-shirt");
    assert_eq!(validated.metadata.color.as_deref(), Some("red"));
    assert_eq!(validated.metadata.material.as_deref(), Some("cotton"));
    assert_eq!(validated.metadata.brand, None);
    assert_eq!(validated.iterations, 2);
    assert!((validated.confidence_score - 0.4).abs() < f64::EPSILON);
    assert_eq!(
        validated.provenance.get(&FieldName::Title),
        Some(&Provenance::Observed { turn: 0 })
    );
    assert_eq!(run.state.status(), RunStatus::Succeeded);
    assert_eq!(run.state.draft().get(FieldName::Title), Some("T-shirt"));
}

#[tokio::test]
async fn unsupported_brand_is_rejected_then_dropped() {
    let reasoner = ScriptedReasoner::new(vec![
        propose(json!({"title": "Shoe", "brand": "Nike"})),
        propose(json!({"title": "Shoe"})),
    ]);
    let agent = agent(reasoner.clone(), registry(vec![normalizer()]));

    let run = agent
        .run_audited(
            InputRef::text("Running shoe with a mesh upper"),
            &ExtractionOptions::default(),
            &CancellationToken::new(),
        )
        .await;
    let validated = run.result.unwrap();

    assert_eq!(validated.metadata.title, "Shoe");
    assert_eq!(validated.metadata.brand, None);
    assert_eq!(validated.iterations, 2);

    let feedback = reasoner.outstanding_at(1);
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].field, "brand");
    assert_eq!(feedback[0].kind, ViolationKind::Unsupported);

    let verdicts: Vec<bool> = run
        .state
        .history()
        .iter()
        .filter_map(|turn| match &turn.kind {
            TurnKind::CriticVerdict(verdict) => Some(verdict.approved),
            _ => None,
        })
        .collect();
    assert_eq!(verdicts, vec![false, true]);
}

#[tokio::test]
async fn timed_out_capability_is_observed_and_run_does_not_converge() {
    let reasoner = ScriptedReasoner::new(vec![
        invoke("vision_extractor", json!({})),
        invoke("vision_extractor", json!({})),
        invoke("vision_extractor", json!({})),
    ]);
    let config = ExtractionConfig::default()
        .with_max_iterations(3)
        .with_capability_timeout(Duration::from_millis(20))
        .with_backoff(BackoffConfig::none());
    let agent = ExtractionAgent::builder()
        .reasoner(reasoner.clone())
        .registry(registry(vec![Arc::new(SlowCapability)]))
        .config(config)
        .build()
        .unwrap();

    let run = agent
        .run_audited(
            InputRef::image_uri("https://cdn.example/shoe.png"),
            &ExtractionOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    let failures: Vec<String> = run
        .state
        .observations()
        .filter_map(|(_, observation)| observation.failure().map(ToString::to_string))
        .collect();
    assert_eq!(failures, vec!["timeout"; 3]);
    assert!(run
        .state
        .observations()
        .all(|(_, observation)| matches!(
            observation.failure(),
            Some(CapabilityFailure::Timeout { after_ms: 20 })
        )));

    match run.result {
        Err(ExtractionFailure::NotConverged {
            iterations,
            last_draft,
            violations,
        }) => {
            assert_eq!(iterations, 3);
            assert!(last_draft.is_empty());
            assert!(violations
                .iter()
                .any(|violation| violation.field == "title" && violation.kind == ViolationKind::Missing));
        }
        other => panic!("expected NotConverged, got {other:?}"),
    }
    assert_eq!(run.state.status(), RunStatus::Failed(FailureReason::NotConverged));
    assert_eq!(reasoner.calls(), 3);
}

#[tokio::test]
async fn three_empty_steps_make_reasoning_unavailable() {
    let reasoner = ScriptedReasoner::new(vec![
        Ok(ReasoningStep::invoke("", Vec::new())),
        Ok(ReasoningStep::invoke("", Vec::new())),
        Ok(ReasoningStep::invoke("", Vec::new())),
        propose(json!({"title": "never reached"})),
    ]);
    let agent = agent(reasoner.clone(), registry(vec![normalizer()]));

    let run = agent
        .run_audited(
            InputRef::text("lamp"),
            &ExtractionOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(
        run.result,
        Err(ExtractionFailure::ReasoningUnavailable {
            attempts: 3,
            iterations: 0,
            last_error: ReasoningError::Empty,
        })
    );
    let reformulations = run
        .state
        .history()
        .iter()
        .filter(|turn| matches!(turn.kind, TurnKind::Reformulation { .. }))
        .count();
    assert_eq!(reformulations, 2);
    assert_eq!(reasoner.calls(), 3);
}

#[tokio::test]
async fn malformed_reply_is_reprompted_and_recovers() {
    let reasoner = ScriptedReasoner::new(vec![
        Err(ReasoningError::Malformed {
            detail: "not json".to_string(),
        }),
        propose(json!({"title": "Walnut desk lamp"})),
    ]);
    let agent = agent(reasoner.clone(), registry(vec![normalizer()]));

    let validated = agent
        .run(InputRef::text("Walnut desk lamp with linen shade"))
        .await
        .unwrap();

    assert_eq!(validated.metadata.title, "Walnut desk lamp");
    assert_eq!(validated.iterations, 1);
    let second_history = &reasoner.histories()[1];
    assert!(matches!(
        &second_history.last().unwrap().kind,
        TurnKind::Reformulation { detail } if detail.contains("not json")
    ));
}

#[tokio::test]
async fn transport_errors_retry_without_reprompt() {
    let reasoner = ScriptedReasoner::new(vec![
        Err(ReasoningError::Transport {
            detail: "503".to_string(),
        }),
        propose(json!({"title": "Lamp"})),
    ]);
    let agent = agent(reasoner.clone(), registry(vec![normalizer()]));

    let run = agent
        .run_audited(
            InputRef::text("Lamp"),
            &ExtractionOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(run.result.is_ok());
    assert!(!run
        .state
        .history()
        .iter()
        .any(|turn| matches!(turn.kind, TurnKind::Reformulation { .. })));
}

#[tokio::test]
async fn fail_fast_policy_gives_up_on_first_unusable_reply() {
    let reasoner = ScriptedReasoner::new(vec![Err(ReasoningError::Empty)]);
    let agent = ExtractionAgent::builder()
        .reasoner(reasoner)
        .registry(registry(vec![normalizer()]))
        .policy(FailFast)
        .build()
        .unwrap();

    let err = agent.run(InputRef::text("lamp")).await.unwrap_err();
    assert!(matches!(
        err,
        ExtractionFailure::ReasoningUnavailable { attempts: 1, .. }
    ));
}

#[tokio::test]
async fn custom_bounded_policy_extends_tolerance() {
    let reasoner = ScriptedReasoner::new(vec![
        Err(ReasoningError::Empty),
        Err(ReasoningError::Empty),
        Err(ReasoningError::Empty),
        propose(json!({"title": "Lamp"})),
    ]);
    let agent = ExtractionAgent::builder()
        .reasoner(reasoner)
        .registry(registry(vec![normalizer()]))
        .policy(BoundedReformulation::new(5))
        .build()
        .unwrap();

    assert!(agent.run(InputRef::text("Lamp")).await.is_ok());
}

#[tokio::test]
async fn always_rejected_answers_stop_at_the_iteration_budget() {
    let replies = (0..10)
        .map(|_| propose(json!({"title": "Phantom speaker"})))
        .collect();
    let reasoner = ScriptedReasoner::new(replies);
    let agent = ExtractionAgent::builder()
        .reasoner(reasoner.clone())
        .registry(registry(vec![normalizer()]))
        .config(ExtractionConfig::default().with_max_iterations(4))
        .build()
        .unwrap();

    let err = agent.run(InputRef::text("lamp")).await.unwrap_err();

    match err {
        ExtractionFailure::NotConverged {
            iterations,
            last_draft,
            violations,
        } => {
            assert_eq!(iterations, 4);
            assert_eq!(last_draft.get(FieldName::Title), Some("Phantom speaker"));
            assert_eq!(violations[0].kind, ViolationKind::Unsupported);
        }
        other => panic!("expected NotConverged, got {other:?}"),
    }
    assert_eq!(reasoner.calls(), 4);
}

#[tokio::test]
async fn unknown_capability_is_recorded_and_the_loop_continues() {
    let reasoner = ScriptedReasoner::new(vec![
        invoke("teleporter", json!({})),
        propose(json!({"title": "Lamp"})),
    ]);
    let agent = agent(reasoner, registry(vec![normalizer()]));

    let run = agent
        .run_audited(
            InputRef::text("Lamp"),
            &ExtractionOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(run.result.is_ok());
    let (_, observation) = run
        .state
        .observations()
        .find(|(_, observation)| observation.capability_name == "teleporter")
        .unwrap();
    assert_eq!(
        observation.failure(),
        Some(&CapabilityFailure::UnknownCapability {
            name: "teleporter".to_string()
        })
    );
    assert_eq!(observation.call_id.as_deref(), Some("call-1-0"));
}

#[tokio::test]
async fn invocations_in_one_step_are_observed_in_order() {
    let reasoner = ScriptedReasoner::new(vec![
        Ok(ReasoningStep::invoke(
            "",
            vec![
                CapabilityInvocation::new("first", "normalizer", json!({})),
                CapabilityInvocation::new("second", "teleporter", json!({})),
                CapabilityInvocation::new("third", "normalizer", json!({})),
            ],
        )),
        propose(json!({"title": "Lamp"})),
    ]);
    let agent = agent(reasoner, registry(vec![normalizer()]));

    let run = agent
        .run_audited(
            InputRef::text("Lamp"),
            &ExtractionOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    let call_ids: Vec<String> = run
        .state
        .observations()
        .filter_map(|(_, observation)| observation.call_id.clone())
        .collect();
    assert_eq!(call_ids, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn cancelled_before_start_reports_cancelled() {
    let reasoner = ScriptedReasoner::new(vec![propose(json!({"title": "Lamp"}))]);
    let agent = agent(reasoner.clone(), registry(vec![normalizer()]));
    let token = CancellationToken::new();
    token.cancel();

    let run = agent
        .run_audited(InputRef::text("Lamp"), &ExtractionOptions::default(), &token)
        .await;

    assert_eq!(
        run.result,
        Err(ExtractionFailure::Cancelled {
            iterations: 0,
            last_draft: Default::default(),
        })
    );
    assert_eq!(run.state.status(), RunStatus::Failed(FailureReason::Cancelled));
    assert_eq!(reasoner.calls(), 0);
}

#[tokio::test]
async fn observation_finishing_after_cancellation_is_discarded() {
    let reasoner = ScriptedReasoner::new(vec![
        Ok(ReasoningStep::invoke(
            "",
            vec![CapabilityInvocation::new("scrape", "html_scraper", json!({}))],
        )),
        propose(json!({"title": "Desk Lamp"})),
    ]);
    let agent = agent(reasoner.clone(), registry(vec![Arc::new(CancellingCapability)]));

    let run = agent
        .run_audited(
            InputRef::url("https://shop.example/lamp"),
            &ExtractionOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        run.result,
        Err(ExtractionFailure::Cancelled { iterations: 1, .. })
    ));
    assert!(!run
        .state
        .observations()
        .any(|(_, observation)| observation.capability_name == "html_scraper"));
    assert_eq!(reasoner.calls(), 1);
}

#[tokio::test]
async fn url_slug_is_not_evidence() {
    let reasoner = ScriptedReasoner::new(vec![propose(
        json!({"title": "Air Max 90", "brand": "Nike"}),
    )]);
    let agent = agent(reasoner, registry(vec![normalizer()]));

    let run = agent
        .run_audited(
            InputRef::url("https://shop.example/nike-air-max-90"),
            &ExtractionOptions {
                max_iterations: Some(1),
                ..ExtractionOptions::default()
            },
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(run.state.observations().count(), 0);
    let Err(ExtractionFailure::NotConverged { violations, .. }) = run.result else {
        panic!("expected NotConverged");
    };
    let unsupported: Vec<&str> = violations
        .iter()
        .filter(|violation| violation.kind == ViolationKind::Unsupported)
        .map(|violation| violation.field.as_str())
        .collect();
    assert_eq!(unsupported, vec!["title", "brand"]);
}

#[tokio::test]
async fn history_only_ever_grows() {
    let reasoner = ScriptedReasoner::new(vec![
        invoke("normalizer", json!({})),
        propose(json!({"title": "Shoe", "brand": "Nike"})),
        Err(ReasoningError::Empty),
        propose(json!({"title": "Shoe"})),
    ]);
    let agent = agent(reasoner.clone(), registry(vec![normalizer()]));

    let run = agent
        .run_audited(
            InputRef::text("Shoe"),
            &ExtractionOptions::default(),
            &CancellationToken::new(),
        )
        .await;
    assert!(run.result.is_ok());

    let mut snapshots = reasoner.histories();
    snapshots.push(run.state.history().to_vec());
    for pair in snapshots.windows(2) {
        assert!(pair[0].len() <= pair[1].len());
        assert_eq!(pair[0][..], pair[1][..pair[0].len()]);
    }
}

#[tokio::test]
async fn succeeded_draft_passes_both_gates_again() {
    let reasoner = ScriptedReasoner::new(vec![
        invoke("normalizer", json!({})),
        propose(json!({"title": "  Cotton   T-shirt ", "color": "red"})),
    ]);
    let agent = agent(reasoner, registry(vec![normalizer()]));

    let run = agent
        .run_audited(
            InputRef::text("Red cotton t-shirt, size M"),
            &ExtractionOptions::default(),
            &CancellationToken::new(),
        )
        .await;
    let validated = run.result.unwrap();
    assert_eq!(validated.metadata.title, "Cotton T-shirt");

    let draft = run.state.draft();
    let schema = SchemaValidator::new(BTreeSet::new(), 3);
    assert!(schema.validate(&draft.to_fields()).valid);
    assert!(schema.validate(&draft.to_fields()).violations.is_empty());

    let critic = CriticGate::new(
        BTreeSet::from([FieldName::Title, FieldName::Category]),
        BTreeSet::from([FieldName::Description]),
    )
    .unwrap();
    let review = critic.review(draft, &BTreeSet::new(), run.state.history());
    assert!(review.verdict.approved);
    assert!(review.verdict.corrections.is_empty());
}

#[tokio::test]
async fn approved_inference_is_reported_with_its_provenance() {
    let reasoner = ScriptedReasoner::new(vec![Ok(ReasoningStep::propose(
        "",
        Proposal::new(
            json!({"title": "Linen shirt", "description": "A breathable summer shirt"})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .with_inferred(["description"]),
    ))]);
    let agent = agent(reasoner, registry(vec![normalizer()]));

    let validated = agent
        .run(InputRef::text("Linen shirt, short sleeves"))
        .await
        .unwrap();

    assert_eq!(
        validated.provenance.get(&FieldName::Description),
        Some(&Provenance::Inferred)
    );
    assert_eq!(
        validated.inferred_fields(),
        BTreeSet::from([FieldName::Description])
    );
}

#[tokio::test]
async fn per_run_options_override_the_agent_config() {
    let reasoner = ScriptedReasoner::new(vec![
        invoke("normalizer", json!({})),
        invoke("normalizer", json!({})),
        propose(json!({"title": "Lamp"})),
    ]);
    let agent = agent(reasoner, registry(vec![normalizer()]));

    let run = agent
        .run_audited(
            InputRef::text("Lamp"),
            &ExtractionOptions {
                max_iterations: Some(2),
                ..ExtractionOptions::default()
            },
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        run.result,
        Err(ExtractionFailure::NotConverged { iterations: 2, .. })
    ));
}

#[tokio::test]
async fn required_brand_override_is_enforced() {
    let reasoner = ScriptedReasoner::new(vec![
        propose(json!({"title": "Trail shoe"})),
        propose(json!({"title": "Trail shoe", "brand": "Salomon"})),
    ]);
    let agent = agent(reasoner.clone(), registry(vec![normalizer()]));

    let run = agent
        .run_audited(
            InputRef::text("Salomon trail shoe"),
            &ExtractionOptions {
                required_fields: Some(BTreeSet::from([FieldName::Title, FieldName::Brand])),
                ..ExtractionOptions::default()
            },
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(run.result.unwrap().metadata.brand.as_deref(), Some("Salomon"));
    let feedback = reasoner.outstanding_at(1);
    assert_eq!(feedback[0].field, "brand");
    assert_eq!(feedback[0].kind, ViolationKind::Missing);
}

#[tokio::test]
async fn invalid_per_run_options_fail_before_any_reasoning() {
    let reasoner = ScriptedReasoner::new(vec![propose(json!({"title": "Lamp"}))]);
    let agent = agent(reasoner.clone(), registry(vec![normalizer()]));

    for options in [
        ExtractionOptions {
            max_iterations: Some(0),
            ..ExtractionOptions::default()
        },
        ExtractionOptions {
            capability_timeout_ms: Some(0),
            ..ExtractionOptions::default()
        },
    ] {
        let run = agent
            .run_audited(InputRef::text("Lamp"), &options, &CancellationToken::new())
            .await;

        assert!(matches!(
            &run.result,
            Err(ExtractionFailure::InvalidConfig { detail }) if !detail.is_empty()
        ));
        assert_eq!(
            run.state.status(),
            RunStatus::Failed(FailureReason::InvalidConfig)
        );
        assert_eq!(run.state.iteration_count(), 0);
    }
    assert_eq!(reasoner.calls(), 0);
}

#[tokio::test]
async fn concurrent_runs_do_not_share_state() {
    struct EchoReasoner;

    #[async_trait]
    impl Reasoner for EchoReasoner {
        async fn reason(&self, ctx: ReasoningContext<'_>) -> Result<ReasoningStep, ReasoningError> {
            tokio::task::yield_now().await;
            let title = match ctx.input {
                InputRef::Text(text) => text.clone(),
                _ => return Err(ReasoningError::Empty),
            };
            Ok(ReasoningStep::propose(
                "",
                Proposal::new(json!({"title": title}).as_object().cloned().unwrap()),
            ))
        }
    }

    let agent = Arc::new(
        ExtractionAgent::builder()
            .reasoner(EchoReasoner)
            .registry(registry(vec![normalizer()]))
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|index| {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move {
                agent
                    .run(InputRef::text(format!("Product number {index}")))
                    .await
            })
        })
        .collect();

    let mut run_ids = BTreeSet::new();
    for (index, handle) in handles.into_iter().enumerate() {
        let validated = handle.await.unwrap().unwrap();
        assert_eq!(validated.metadata.title, format!("Product number {index}"));
        assert_eq!(validated.iterations, 1);
        run_ids.insert(validated.run_id);
    }
    assert_eq!(run_ids.len(), 8);
}

#[test]
fn agent_requires_a_reasoner_and_a_sane_config() {
    assert!(matches!(
        ExtractionAgent::builder().build(),
        Err(metasight_agent::AgentBuildError::MissingReasoner)
    ));

    let reasoner = ScriptedReasoner::new(Vec::new());
    assert!(matches!(
        ExtractionAgent::builder()
            .reasoner(reasoner)
            .config(ExtractionConfig::default().with_max_iterations(0))
            .build(),
        Err(metasight_agent::AgentBuildError::InvalidConfig(_))
    ));
}
