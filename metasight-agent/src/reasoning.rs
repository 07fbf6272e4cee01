use std::sync::Arc;

use metasight_core::{
    DocumentRef, ImageRef, InputRef, LlmRequest, LlmResponse, Message, ToolCall, ToolCallingLlm,
    ToolSpec, Value,
};

use crate::error::{CapabilityFailure, ReasoningError};
use crate::metadata::{Draft, Proposal};
use crate::state::{
    CapabilityInvocation, ReasoningStep, StepAction, Turn, TurnKind, Violation,
};

/// Everything the reasoning component may look at before its next step.
#[derive(Clone, Copy, Debug)]
pub struct ReasoningContext<'a> {
    pub run_id: &'a str,
    /// 1-based number of the step being requested.
    pub iteration: u32,
    pub input: &'a InputRef,
    pub history: &'a [Turn],
    pub draft: &'a Draft,
    pub capabilities: &'a [ToolSpec],
    /// Violations from the most recent rejected proposal.
    pub outstanding: &'a [Violation],
}

/// The opaque reasoning oracle. Its output is untrusted; the loop checks the
/// shape of every step before acting on it.
#[async_trait::async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, ctx: ReasoningContext<'_>) -> Result<ReasoningStep, ReasoningError>;
}

#[async_trait::async_trait]
impl<R> Reasoner for Arc<R>
where
    R: Reasoner + ?Sized,
{
    async fn reason(&self, ctx: ReasoningContext<'_>) -> Result<ReasoningStep, ReasoningError> {
        (**self).reason(ctx).await
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You extract structured product metadata from images, web pages, documents and free text.

Call the available tools to gather evidence before answering. When you have enough evidence, reply with a single JSON object and no tool calls. Allowed keys: title (required), brand, category, color, material, dimensions, description. Every value is plain text.

Rules:
- Only state what the tool results or the user's input support. Leave a key out when you do not know it; never write placeholders such as \"unknown\" or \"n/a\".
- Use the normalizer tool to clean colors, materials and dimensions.
- A description may paraphrase the evidence. If you write one, wrap the answer as {\"metadata\": {...}, \"inferred_fields\": [\"description\"]}.
- If your answer is rejected, fix exactly the listed problems and answer again.";

/// Reasoning over any tool-calling chat model.
pub struct LlmReasoner<L> {
    llm: L,
    model: String,
    system_prompt: String,
}

impl<L> LlmReasoner<L>
where
    L: ToolCallingLlm,
{
    pub fn new(llm: L, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn build_messages(&self, ctx: &ReasoningContext<'_>) -> Vec<Message> {
        let mut messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(describe_input(ctx.input)),
        ];

        for turn in ctx.history {
            match &turn.kind {
                TurnKind::Reasoning(step) => match &step.action {
                    StepAction::Invoke(invocations) => {
                        let calls = invocations
                            .iter()
                            .map(|invocation| ToolCall {
                                id: invocation.call_id.clone(),
                                name: invocation.capability_name.clone(),
                                args: invocation.arguments.clone(),
                            })
                            .collect();
                        messages.push(Message::assistant_tool_calls(step.rationale.clone(), calls));
                    }
                    StepAction::Propose(proposal) => {
                        messages.push(Message::assistant(render_proposal(proposal)));
                    }
                },
                TurnKind::Observation(observation) => {
                    // seeded evidence is already part of the user message
                    let Some(call_id) = &observation.call_id else {
                        continue;
                    };
                    let content = match &observation.result {
                        Ok(value) => render_value(value),
                        Err(failure) => render_failure(&observation.capability_name, failure),
                    };
                    messages.push(Message::tool_result(call_id.clone(), content));
                }
                TurnKind::SchemaCheck(report) if !report.valid => {
                    messages.push(Message::user(render_violations(
                        "The answer does not match the metadata schema:",
                        &report.violations,
                    )));
                }
                TurnKind::CriticVerdict(verdict) if !verdict.approved => {
                    messages.push(Message::user(render_violations(
                        "The answer was rejected in review:",
                        &verdict.violations,
                    )));
                }
                TurnKind::Reformulation { detail } => {
                    messages.push(Message::user(detail.clone()));
                }
                TurnKind::SchemaCheck(_) | TurnKind::CriticVerdict(_) => {}
            }
        }

        messages
    }
}

#[async_trait::async_trait]
impl<L> Reasoner for LlmReasoner<L>
where
    L: ToolCallingLlm,
{
    async fn reason(&self, ctx: ReasoningContext<'_>) -> Result<ReasoningStep, ReasoningError> {
        let request = LlmRequest {
            model: self.model.clone(),
            messages: self.build_messages(&ctx),
            tools: ctx.capabilities.to_vec(),
        };

        let response = self
            .llm
            .invoke(request)
            .await
            .map_err(|err| ReasoningError::Transport {
                detail: err.to_string(),
            })?;

        parse_response(response)
    }
}

/// Turns a raw model reply into a reasoning step: tool calls become
/// invocations, otherwise the first JSON object in the text is the proposal.
pub fn parse_response(response: LlmResponse) -> Result<ReasoningStep, ReasoningError> {
    let LlmResponse {
        content,
        tool_calls,
    } = response;

    if !tool_calls.is_empty() {
        let invocations = tool_calls
            .into_iter()
            .map(|call| {
                CapabilityInvocation::new(call.id, call.name, decode_arguments(call.args))
            })
            .collect();
        return Ok(ReasoningStep::invoke(content, invocations));
    }

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ReasoningError::Empty);
    }

    let Some((start, object)) = extract_json_object(trimmed) else {
        return Err(ReasoningError::Malformed {
            detail: "reply contains neither tool calls nor a JSON object".to_string(),
        });
    };

    let rationale = trimmed[..start]
        .trim()
        .trim_end_matches("```json")
        .trim()
        .to_string();
    Ok(ReasoningStep::propose(rationale, proposal_from_object(object)))
}

fn proposal_from_object(mut object: serde_json::Map<String, Value>) -> Proposal {
    let inferred = take_string_list(&mut object, "inferred_fields");

    let mut fields = match object.remove("metadata") {
        Some(Value::Object(inner)) => inner,
        Some(other) => {
            object.insert("metadata".to_string(), other);
            object
        }
        None => object,
    };

    fields.remove("confidence_score");
    fields.retain(|_, value| !value.is_null());

    Proposal::new(fields).with_inferred(inferred)
}

fn take_string_list(object: &mut serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    match object.remove(key) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(other) => {
            object.insert(key.to_string(), other);
            Vec::new()
        }
        None => Vec::new(),
    }
}

/// Some providers hand tool arguments over as a JSON-encoded string.
fn decode_arguments(args: Value) -> Value {
    match args {
        Value::String(raw) => serde_json::from_str::<Value>(&raw)
            .ok()
            .filter(Value::is_object)
            .unwrap_or(Value::String(raw)),
        other => other,
    }
}

/// Finds the first balanced `{...}` span that parses as a JSON object.
fn extract_json_object(text: &str) -> Option<(usize, serde_json::Map<String, Value>)> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(bytes, start) {
            if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Some((start, object));
            }
        }
        search_from = start + 1;
    }

    None
}

fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }

    None
}

fn describe_input(input: &InputRef) -> String {
    match input {
        InputRef::Image(ImageRef::Location { uri }) => {
            format!("Extract product metadata from the provided image: {uri}")
        }
        InputRef::Image(ImageRef::Bytes { mime_type, .. }) => {
            format!("Extract product metadata from the provided image ({mime_type}).")
        }
        InputRef::Url(url) => format!("Extract product metadata from this URL: {url}"),
        InputRef::Text(text) => format!("Extract product metadata from this text: {text}"),
        InputRef::Document(DocumentRef::Inline {
            media_type,
            content,
        }) => format!("Extract product metadata from this {media_type} document:\n{content}"),
        InputRef::Document(DocumentRef::Path { path }) => format!(
            "Extract product metadata from the document at {}.",
            path.display()
        ),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn render_failure(capability: &str, failure: &CapabilityFailure) -> String {
    format!("[CAPABILITY ERROR] {capability}: {failure}")
}

fn render_proposal(proposal: &Proposal) -> String {
    let fields = Value::Object(proposal.fields.clone());
    if proposal.inferred.is_empty() {
        return fields.to_string();
    }
    serde_json::json!({
        "metadata": fields,
        "inferred_fields": proposal.inferred,
    })
    .to_string()
}

fn render_violations(heading: &str, violations: &[Violation]) -> String {
    let mut text = heading.to_string();
    for violation in violations {
        text.push_str("\n- ");
        text.push_str(&violation.to_string());
    }
    text
}
