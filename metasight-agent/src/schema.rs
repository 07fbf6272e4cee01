use std::collections::BTreeSet;

use metasight_core::{value_kind, Value};

use crate::metadata::FieldName;
use crate::state::{SchemaReport, Violation, ViolationKind};

/// Structural check of a proposed answer. Pure: never mutates its input.
#[derive(Clone, Debug)]
pub struct SchemaValidator {
    required: BTreeSet<FieldName>,
    min_title_len: usize,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new(BTreeSet::new(), 3)
    }
}

impl SchemaValidator {
    /// `title` is required regardless of `required`.
    pub fn new(required: BTreeSet<FieldName>, min_title_len: usize) -> Self {
        let mut required = required;
        required.insert(FieldName::Title);
        Self {
            required,
            min_title_len,
        }
    }

    pub fn required_fields(&self) -> &BTreeSet<FieldName> {
        &self.required
    }

    pub fn validate(&self, fields: &serde_json::Map<String, Value>) -> SchemaReport {
        let mut violations = Vec::new();

        for (key, value) in fields {
            let Ok(field) = key.parse::<FieldName>() else {
                violations.push(Violation::new(
                    key.clone(),
                    ViolationKind::OutOfSchema,
                    "key is not part of the product metadata schema",
                ));
                continue;
            };

            let Some(text) = value.as_str() else {
                let detail = if value.is_null() {
                    "null is not a value; omit the field when it is unknown".to_string()
                } else {
                    format!("expected text, found {}", value_kind(value))
                };
                violations.push(Violation::new(key.clone(), ViolationKind::TypeMismatch, detail));
                continue;
            };

            let canonical_len = canonical_char_count(text);
            if canonical_len == 0 {
                if self.required.contains(&field) {
                    violations.push(Violation::new(
                        key.clone(),
                        ViolationKind::Missing,
                        "required field is empty",
                    ));
                } else {
                    violations.push(Violation::new(
                        key.clone(),
                        ViolationKind::TypeMismatch,
                        "empty text; omit the field instead",
                    ));
                }
                continue;
            }

            if field == FieldName::Title && canonical_len < self.min_title_len {
                violations.push(Violation::new(
                    key.clone(),
                    ViolationKind::TypeMismatch,
                    format!(
                        "title shorter than {} characters: {text:?}",
                        self.min_title_len
                    ),
                ));
            }
        }

        for field in &self.required {
            if !fields.contains_key(field.as_str()) {
                violations.push(Violation::new(
                    field.as_str(),
                    ViolationKind::Missing,
                    "required field is absent",
                ));
            }
        }

        SchemaReport {
            valid: violations.is_empty(),
            violations,
        }
    }
}

/// Length after trimming and collapsing whitespace runs to one space.
fn canonical_char_count(text: &str) -> usize {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0;
    }
    words.iter().map(|word| word.chars().count()).sum::<usize>() + words.len() - 1
}
