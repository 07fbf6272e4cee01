use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use metasight_core::Value;
use serde::{Deserialize, Serialize};

/// The closed set of keys the output schema permits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Title,
    Brand,
    Category,
    Color,
    Material,
    Dimensions,
    Description,
}

impl FieldName {
    pub const ALL: [FieldName; 7] = [
        FieldName::Title,
        FieldName::Brand,
        FieldName::Category,
        FieldName::Color,
        FieldName::Material,
        FieldName::Dimensions,
        FieldName::Description,
    ];

    /// Optional fields that count toward the confidence score.
    pub const SCORED: [FieldName; 5] = [
        FieldName::Brand,
        FieldName::Category,
        FieldName::Color,
        FieldName::Material,
        FieldName::Dimensions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::Title => "title",
            FieldName::Brand => "brand",
            FieldName::Category => "category",
            FieldName::Color => "color",
            FieldName::Material => "material",
            FieldName::Dimensions => "dimensions",
            FieldName::Description => "description",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metadata field: {0}")]
pub struct UnknownField(pub String);

impl FromStr for FieldName {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldName::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

/// A final-answer proposal exactly as the reasoning component produced it.
///
/// `fields` is untrusted: it may hold unknown keys or non-text values until
/// the schema validator has passed it.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Proposal {
    pub fields: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub inferred: BTreeSet<String>,
}

impl Proposal {
    pub fn new(fields: serde_json::Map<String, Value>) -> Self {
        Self {
            fields,
            inferred: BTreeSet::new(),
        }
    }

    pub fn with_inferred<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inferred.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn inferred_fields(&self) -> BTreeSet<FieldName> {
        self.inferred
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect()
    }
}

/// Current best-guess answer. A field that was never set is absent, never
/// an empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Draft {
    fields: BTreeMap<FieldName, String>,
}

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a draft from a proposal that already passed schema validation.
    /// Entries that are not schema text fields are skipped.
    pub fn from_proposal(proposal: &Proposal) -> Self {
        let fields = proposal
            .fields
            .iter()
            .filter_map(|(key, value)| {
                let field = key.parse::<FieldName>().ok()?;
                let text = value.as_str()?;
                Some((field, text.to_string()))
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, field: FieldName) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn set(&mut self, field: FieldName, value: impl Into<String>) {
        self.fields.insert(field, value.into());
    }

    pub fn contains(&self, field: FieldName) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &str)> {
        self.fields.iter().map(|(field, value)| (*field, value.as_str()))
    }

    /// Wire form of the draft, for re-validation.
    pub fn to_fields(&self) -> serde_json::Map<String, Value> {
        self.fields
            .iter()
            .map(|(field, value)| (field.as_str().to_string(), Value::String(value.clone())))
            .collect()
    }
}

/// Output schema wire contract.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProductMetadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProductMetadata {
    /// `None` when the draft has no title.
    pub fn from_draft(draft: &Draft) -> Option<Self> {
        let owned = |field| draft.get(field).map(str::to_string);
        Some(Self {
            title: owned(FieldName::Title)?,
            brand: owned(FieldName::Brand),
            category: owned(FieldName::Category),
            color: owned(FieldName::Color),
            material: owned(FieldName::Material),
            dimensions: owned(FieldName::Dimensions),
            description: owned(FieldName::Description),
        })
    }

    pub fn get(&self, field: FieldName) -> Option<&str> {
        match field {
            FieldName::Title => Some(self.title.as_str()),
            FieldName::Brand => self.brand.as_deref(),
            FieldName::Category => self.category.as_deref(),
            FieldName::Color => self.color.as_deref(),
            FieldName::Material => self.material.as_deref(),
            FieldName::Dimensions => self.dimensions.as_deref(),
            FieldName::Description => self.description.as_deref(),
        }
    }
}

/// Where a returned value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    /// Supported by the observation at this index of the run history.
    Observed { turn: usize },
    /// Critic-approved low-confidence inference.
    Inferred,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidatedMetadata {
    pub run_id: String,
    pub metadata: ProductMetadata,
    pub confidence_score: f64,
    pub provenance: BTreeMap<FieldName, Provenance>,
    pub iterations: u32,
}

impl ValidatedMetadata {
    pub fn inferred_fields(&self) -> BTreeSet<FieldName> {
        self.provenance
            .iter()
            .filter(|(_, provenance)| matches!(provenance, Provenance::Inferred))
            .map(|(field, _)| *field)
            .collect()
    }
}

/// 0.2 per scored optional field present; title and description do not count.
pub fn confidence_score(draft: &Draft) -> f64 {
    let filled = FieldName::SCORED
        .iter()
        .filter(|field| draft.contains(**field))
        .count();
    filled as f64 / FieldName::SCORED.len() as f64
}
