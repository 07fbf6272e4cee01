use std::collections::BTreeMap;

use metasight_agent::TypedCapability;
use metasight_core::{CapabilityContext, CapabilityError};
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;

const COLOR_ALIASES: [(&str, &str); 5] = [
    ("blk", "black"),
    ("wht", "white"),
    ("red", "red"),
    ("blu", "blue"),
    ("grn", "green"),
];

const MATERIALS: [(&str, &str); 5] = [
    ("cotton", "Cotton"),
    ("polyester", "Polyester"),
    ("wool", "Wool"),
    ("silk", "Silk"),
    ("leather", "Leather"),
];

const UNITS: [(&str, &str); 3] = [
    ("inches", "in"),
    ("centimeters", "cm"),
    ("millimeters", "mm"),
];

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NormalizeArgs {
    /// Raw values keyed by field name (`color`, `material`, `dimensions`, ...).
    pub fields: BTreeMap<String, String>,
}

/// Cleans raw attribute values: expands color abbreviations, capitalizes
/// known materials, shortens dimension units and collapses whitespace.
pub struct Normalizer {
    colors: Vec<(Regex, &'static str)>,
    materials: Vec<(Regex, &'static str)>,
    units: Vec<(Regex, &'static str)>,
}

fn compile(table: &[(&str, &'static str)]) -> Result<Vec<(Regex, &'static str)>, regex::Error> {
    table
        .iter()
        .map(|(word, replacement)| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word)))
                .map(|pattern| (pattern, *replacement))
        })
        .collect()
}

impl Normalizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            colors: compile(&COLOR_ALIASES)?,
            materials: compile(&MATERIALS)?,
            units: compile(&UNITS)?,
        })
    }

    pub fn normalize(&self, field: &str, value: &str) -> String {
        let rules = match field.trim().to_ascii_lowercase().as_str() {
            "color" | "colour" => self.colors.as_slice(),
            "material" => self.materials.as_slice(),
            "dimensions" | "size" => self.units.as_slice(),
            _ => &[],
        };

        let mut cleaned = value.trim().to_string();
        for (pattern, replacement) in rules {
            cleaned = pattern.replace_all(&cleaned, *replacement).into_owned();
        }
        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[async_trait::async_trait]
impl TypedCapability for Normalizer {
    type Args = NormalizeArgs;
    type Output = BTreeMap<String, String>;

    const NAME: &'static str = "normalizer";
    const DESCRIPTION: &'static str = "Normalize raw attribute values: color abbreviations (blk -> black), material names, dimension units (inches -> in) and whitespace.";

    async fn run(
        &self,
        args: Self::Args,
        _ctx: &CapabilityContext,
    ) -> Result<Self::Output, CapabilityError> {
        if args.fields.is_empty() {
            return Err(CapabilityError::InvalidArguments(
                "no fields to normalize".to_string(),
            ));
        }

        Ok(args
            .fields
            .iter()
            .map(|(field, value)| (field.clone(), self.normalize(field, value)))
            .collect())
    }
}
