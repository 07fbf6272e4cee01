use crate::state::{CriticVerdict, Observation, ReasoningStep, RunStatus, SchemaReport};

/// Progress hooks for one run. All methods default to no-ops.
pub trait ExtractionObserver: Send + Sync {
    fn on_reasoning_step(&self, _run_id: &str, _iteration: u32, _step: &ReasoningStep) {}
    fn on_observation(&self, _run_id: &str, _observation: &Observation) {}
    fn on_schema_check(&self, _run_id: &str, _report: &SchemaReport) {}
    fn on_verdict(&self, _run_id: &str, _verdict: &CriticVerdict) {}
    fn on_finished(&self, _run_id: &str, _status: RunStatus) {}
}

pub struct NoopObserver;

impl ExtractionObserver for NoopObserver {}
