use std::collections::BTreeSet;
use std::time::Duration;

use metasight_core::BackoffConfig;
use serde::{Deserialize, Serialize};

use crate::metadata::FieldName;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub max_iterations: u32,
    pub required_fields: BTreeSet<FieldName>,
    pub capability_timeout_ms: u64,
    pub max_reformulations: u32,
    pub min_title_len: usize,
    pub high_value_fields: BTreeSet<FieldName>,
    pub inferable_fields: BTreeSet<FieldName>,
    pub backoff: BackoffConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            required_fields: BTreeSet::from([FieldName::Title]),
            capability_timeout_ms: 30_000,
            max_reformulations: 3,
            min_title_len: 3,
            high_value_fields: BTreeSet::from([FieldName::Title, FieldName::Category]),
            inferable_fields: BTreeSet::from([FieldName::Description]),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_millis(self.capability_timeout_ms)
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn merge(&self, overrides: &ExtractionOptions) -> Self {
        Self {
            max_iterations: overrides.max_iterations.unwrap_or(self.max_iterations),
            required_fields: overrides
                .required_fields
                .clone()
                .unwrap_or_else(|| self.required_fields.clone()),
            capability_timeout_ms: overrides
                .capability_timeout_ms
                .unwrap_or(self.capability_timeout_ms),
            max_reformulations: overrides
                .max_reformulations
                .unwrap_or(self.max_reformulations),
            min_title_len: self.min_title_len,
            high_value_fields: self.high_value_fields.clone(),
            inferable_fields: overrides
                .inferable_fields
                .clone()
                .unwrap_or_else(|| self.inferable_fields.clone()),
            backoff: overrides.backoff.clone().unwrap_or_else(|| self.backoff.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("max_iterations must be at least 1".to_string());
        }
        if self.max_reformulations == 0 {
            return Err("max_reformulations must be at least 1".to_string());
        }
        if self.backoff.max_attempts == 0 {
            return Err("backoff.max_attempts must be at least 1".to_string());
        }
        if self.capability_timeout_ms == 0 {
            return Err("capability_timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}

/// Per-run overrides layered onto an agent's base config.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionOptions {
    pub max_iterations: Option<u32>,
    pub required_fields: Option<BTreeSet<FieldName>>,
    pub capability_timeout_ms: Option<u64>,
    pub max_reformulations: Option<u32>,
    pub inferable_fields: Option<BTreeSet<FieldName>>,
    pub backoff: Option<BackoffConfig>,
}
