//! Concrete capabilities for the extraction loop: page scraping, attribute
//! normalization, image analysis, document parsing and self-checks against
//! the output schema.

mod document;
mod html;
mod normalizer;
mod validator;
mod vision;

pub use document::{DocumentArgs, DocumentParser, ParsedDocument};
pub use html::{extract_page, HtmlScraper, ScrapeArgs, ScrapedPage, MAX_PAGE_TEXT_CHARS};
pub use normalizer::{NormalizeArgs, Normalizer};
pub use validator::{MetadataValidator, SchemaCheckArgs};
pub use vision::{VisionArgs, VisionExtractor, VisionModel, VisionReport};

use metasight_agent::CapabilityRegistryBuilder;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("http client setup failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("normalizer pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// A registry builder preloaded with the scraper, normalizer, document
/// parser and schema validator. Add a [`VisionExtractor`] with `register_typed` when a vision
/// model is available.
pub fn standard_capabilities() -> Result<CapabilityRegistryBuilder, SetupError> {
    Ok(metasight_agent::CapabilityRegistry::builder()
        .register_typed(HtmlScraper::new()?)
        .register_typed(Normalizer::new()?)
        .register_typed(DocumentParser::new())
        .register_typed(MetadataValidator::default()))
}
