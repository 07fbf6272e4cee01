use std::collections::BTreeMap;

use metasight_agent::{
    placeholder_phrase, ExtractionConfig, FieldName, SchemaReport, SchemaValidator,
    TypedCapability, Violation, ViolationKind,
};
use metasight_core::{CapabilityContext, CapabilityError, Value};
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SchemaCheckArgs {
    /// Candidate product metadata, keyed by field name.
    pub metadata: BTreeMap<String, Value>,
}

/// Lets the reasoner check a candidate answer before proposing it. Applies
/// the same schema rules as the loop, and also flags placeholder values the
/// critic would reject.
pub struct MetadataValidator {
    schema: SchemaValidator,
}

impl Default for MetadataValidator {
    fn default() -> Self {
        let config = ExtractionConfig::default();
        Self::new(SchemaValidator::new(
            config.required_fields,
            config.min_title_len,
        ))
    }
}

impl MetadataValidator {
    pub fn new(schema: SchemaValidator) -> Self {
        Self { schema }
    }

    pub fn check(&self, metadata: &serde_json::Map<String, Value>) -> SchemaReport {
        let mut report = self.schema.validate(metadata);

        for (key, value) in metadata {
            if key.parse::<FieldName>().is_err() {
                continue;
            }
            let Some(phrase) = value.as_str().and_then(placeholder_phrase) else {
                continue;
            };
            report.violations.push(Violation::new(
                key.clone(),
                ViolationKind::Unsupported,
                format!("placeholder value ({phrase:?}); omit the field instead"),
            ));
        }

        report.valid = report.violations.is_empty();
        report
    }
}

#[async_trait::async_trait]
impl TypedCapability for MetadataValidator {
    type Args = SchemaCheckArgs;
    type Output = SchemaReport;

    const NAME: &'static str = "schema_validator";
    const DESCRIPTION: &'static str =
        "Check candidate product metadata against the output schema before answering.";

    async fn run(
        &self,
        args: Self::Args,
        _ctx: &CapabilityContext,
    ) -> Result<Self::Output, CapabilityError> {
        let metadata: serde_json::Map<String, Value> = args.metadata.into_iter().collect();
        Ok(self.check(&metadata))
    }
}
