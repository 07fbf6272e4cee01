//! Hallucination gate for final answers.
//!
//! Two independent checks run over every proposal that passed the schema:
//! traceability (each present value must be supported by a successful
//! observation, or be an approved low-confidence inference) and completeness
//! (a high-value field left absent while an observation plainly states it is
//! flagged as missing). Any violation rejects the proposal.

use std::collections::{BTreeMap, BTreeSet};

use metasight_core::Value;
use regex::Regex;

use crate::metadata::{Draft, FieldName, Provenance};
use crate::state::{Correction, CriticVerdict, Turn, Violation, ViolationKind};

const PLACEHOLDER_PHRASES: [&str; 6] = [
    "not visible",
    "cannot determine",
    "unclear",
    "not specified",
    "unknown",
    "n/a",
];

#[derive(Clone, Debug)]
pub struct CriticGate {
    high_value_fields: BTreeSet<FieldName>,
    inferable_fields: BTreeSet<FieldName>,
    field_patterns: Vec<(FieldName, Regex)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CriticReview {
    pub verdict: CriticVerdict,
    pub provenance: BTreeMap<FieldName, Provenance>,
}

impl CriticGate {
    pub fn new(
        high_value_fields: BTreeSet<FieldName>,
        inferable_fields: BTreeSet<FieldName>,
    ) -> Result<Self, regex::Error> {
        let field_patterns = high_value_fields
            .iter()
            .map(|field| {
                let pattern = format!(
                    r"(?im)^[\s\-\*]*(?:product\s+)?{}\s*[:=]\s*(\S.*?)\s*$",
                    regex::escape(field.as_str())
                );
                Regex::new(&pattern).map(|regex| (*field, regex))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            high_value_fields,
            inferable_fields,
            field_patterns,
        })
    }

    pub fn with_inferable_fields(mut self, inferable_fields: BTreeSet<FieldName>) -> Self {
        self.inferable_fields = inferable_fields;
        self
    }

    pub fn review(
        &self,
        draft: &Draft,
        inferred: &BTreeSet<FieldName>,
        history: &[Turn],
    ) -> CriticReview {
        let evidence = collect_evidence(history);
        let mut violations = Vec::new();
        let mut corrections = Vec::new();
        let mut provenance = BTreeMap::new();

        for (field, value) in draft.iter() {
            let canonical = canonical_whitespace(value);
            if canonical != value {
                corrections.push(Correction {
                    field: field.as_str().to_string(),
                    from: value.to_string(),
                    to: canonical.clone(),
                });
            }

            let normalized = canonical.to_lowercase();
            if let Some(phrase) = placeholder_phrase(&normalized) {
                violations.push(Violation::new(
                    field.as_str(),
                    ViolationKind::Unsupported,
                    format!("placeholder value ({phrase:?}); omit the field instead"),
                ));
                continue;
            }

            if let Some(turn) = find_support(&normalized, &evidence) {
                provenance.insert(field, Provenance::Observed { turn });
            } else if inferred.contains(&field) && self.inferable_fields.contains(&field) {
                provenance.insert(field, Provenance::Inferred);
            } else if inferred.contains(&field) {
                violations.push(Violation::new(
                    field.as_str(),
                    ViolationKind::Unsupported,
                    format!("{field} may not be inferred and no observation supports {canonical:?}"),
                ));
            } else {
                violations.push(Violation::new(
                    field.as_str(),
                    ViolationKind::Unsupported,
                    format!("no observation supports {canonical:?}"),
                ));
            }
        }

        for field in &self.high_value_fields {
            if draft.contains(*field) {
                continue;
            }
            if let Some((turn, candidate)) = self.evidence_for(*field, &evidence) {
                violations.push(Violation::new(
                    field.as_str(),
                    ViolationKind::Missing,
                    format!("observation #{turn} suggests {candidate:?}"),
                ));
            }
        }

        CriticReview {
            verdict: CriticVerdict {
                approved: violations.is_empty(),
                violations,
                corrections,
            },
            provenance,
        }
    }

    fn evidence_for(&self, field: FieldName, evidence: &[Evidence]) -> Option<(usize, String)> {
        let pattern = self
            .field_patterns
            .iter()
            .find(|(candidate, _)| *candidate == field)
            .map(|(_, regex)| regex);

        evidence.iter().find_map(|item| {
            let from_pairs = item.pairs.iter().find_map(|(key, value)| {
                (key.eq_ignore_ascii_case(field.as_str()) && is_usable(value))
                    .then(|| value.clone())
            });
            let from_text = || {
                let regex = pattern?;
                item.texts.iter().find_map(|text| {
                    regex
                        .captures_iter(text)
                        .filter_map(|caps| caps.get(1))
                        .map(|found| found.as_str().to_string())
                        .find(|value| is_usable(value))
                })
            };
            from_pairs.or_else(from_text).map(|value| (item.turn, value))
        })
    }
}

/// Text gathered from one successful observation.
struct Evidence {
    turn: usize,
    texts: Vec<String>,
    normalized: Vec<String>,
    tokens: BTreeSet<String>,
    pairs: Vec<(String, String)>,
}

fn collect_evidence(history: &[Turn]) -> Vec<Evidence> {
    history
        .iter()
        .enumerate()
        .filter_map(|(turn, entry)| {
            let value = entry.observation()?.result()?;
            let mut texts = Vec::new();
            let mut pairs = Vec::new();
            flatten(value, None, &mut texts, &mut pairs);
            let normalized: Vec<String> = texts
                .iter()
                .map(|text| canonical_whitespace(text).to_lowercase())
                .collect();
            let tokens = normalized.iter().flat_map(|text| tokenize(text)).collect();
            Some(Evidence {
                turn,
                texts,
                normalized,
                tokens,
                pairs,
            })
        })
        .collect()
}

fn flatten(
    value: &Value,
    key: Option<&str>,
    texts: &mut Vec<String>,
    pairs: &mut Vec<(String, String)>,
) {
    match value {
        Value::String(text) => {
            if let Some(key) = key {
                pairs.push((key.to_string(), text.clone()));
            }
            texts.push(text.clone());
        }
        Value::Number(number) => texts.push(number.to_string()),
        Value::Array(items) => {
            for item in items {
                flatten(item, key, texts, pairs);
            }
        }
        Value::Object(map) => {
            for (child_key, child) in map {
                flatten(child, Some(child_key), texts, pairs);
            }
        }
        Value::Null | Value::Bool(_) => {}
    }
}

/// Index of the first observation that supports `normalized`: either the
/// whole phrase appears on word boundaries, or every token of it appears in
/// the same observation.
fn find_support(normalized: &str, evidence: &[Evidence]) -> Option<usize> {
    let wanted = tokenize(normalized);
    evidence
        .iter()
        .find(|item| {
            item.normalized
                .iter()
                .any(|text| contains_phrase(text, normalized))
                || (!wanted.is_empty() && wanted.iter().all(|token| item.tokens.contains(token)))
        })
        .map(|item| item.turn)
}

/// The uncertainty phrase `value` contains, if any ("unknown", "n/a", ...).
/// Such a value stands in for an absent field.
pub fn placeholder_phrase(value: &str) -> Option<&'static str> {
    let normalized = canonical_whitespace(value).to_lowercase();
    PLACEHOLDER_PHRASES
        .into_iter()
        .find(|phrase| contains_phrase(&normalized, phrase))
}

fn is_usable(value: &str) -> bool {
    !value.trim().is_empty() && placeholder_phrase(value).is_none()
}

fn canonical_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `needle` occurs in `haystack` without alphanumeric characters touching
/// either end of the match.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, matched)| {
        let end = start + matched.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
