use std::path::{Path, PathBuf};

use metasight_agent::TypedCapability;
use metasight_core::{CapabilityContext, CapabilityError, DocumentRef, InputRef};
use pulldown_cmark::{Event, Parser, TagEnd};
use schemars::JsonSchema;
use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::html::visible_text;

const DEFAULT_MAX_CHARS: usize = 20_000;

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct DocumentArgs {
    /// File to read. Defaults to the document the run was started with. Any
    /// other path must lie under the parser's root directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `text/plain`, `text/html` or `text/markdown`. Guessed from the file
    /// extension when omitted.
    #[serde(default)]
    pub media_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParsedDocument {
    pub source: String,
    pub media_type: String,
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Plain,
    Html,
    Markdown,
}

impl Format {
    fn from_media_type(media_type: &str) -> Self {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/html" | "application/xhtml+xml" | "html" => Format::Html,
            "text/markdown" | "text/x-markdown" | "markdown" => Format::Markdown,
            _ => Format::Plain,
        }
    }

    fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("html" | "htm" | "xhtml") => Format::Html,
            Some("md" | "markdown") => Format::Markdown,
            _ => Format::Plain,
        }
    }

    fn media_type(self) -> &'static str {
        match self {
            Format::Plain => "text/plain",
            Format::Html => "text/html",
            Format::Markdown => "text/markdown",
        }
    }
}

/// Extracts readable text from plain-text, HTML and Markdown documents.
///
/// Only the run's own document can be read unless a root directory is
/// configured with [`DocumentParser::with_root`].
pub struct DocumentParser {
    max_chars: usize,
    root: Option<PathBuf>,
}

impl Default for DocumentParser {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            root: None,
        }
    }
}

impl DocumentParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Allows requested paths anywhere below `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Checks a path the reasoner asked for. It must resolve to the run's
    /// own document or into the configured root.
    async fn authorize(&self, requested: &Path, input: &InputRef) -> Result<PathBuf, CapabilityError> {
        let denied = || {
            CapabilityError::UnsupportedInput(format!(
                "document path {} is outside the readable documents",
                requested.display()
            ))
        };
        let resolved = resolve(requested).await.ok_or_else(denied)?;

        if let InputRef::Document(DocumentRef::Path { path }) = input {
            if resolve(path).await.as_ref() == Some(&resolved) {
                return Ok(resolved);
            }
        }

        if let Some(root) = &self.root {
            if let Ok(root) = tokio::fs::canonicalize(root).await {
                if resolved.starts_with(&root) {
                    return Ok(resolved);
                }
            }
        }

        Err(denied())
    }

    pub fn parse(&self, content: &str, format_hint: &str) -> String {
        let text = match Format::from_media_type(format_hint) {
            Format::Plain => content.to_string(),
            Format::Html => visible_text(&Html::parse_document(content)),
            Format::Markdown => markdown_text(content),
        };
        text.chars().take(self.max_chars).collect()
    }
}

/// Canonical form of `path`. A file that does not exist yet resolves
/// through its parent directory, so reading it reports the I/O error.
async fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = tokio::fs::canonicalize(path).await {
        return Some(resolved);
    }
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let parent = tokio::fs::canonicalize(parent).await.ok()?;
    Some(parent.join(name))
}

fn markdown_text(content: &str) -> String {
    let mut out = String::new();

    for event in Parser::new(content) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::TableRow) => {
                out.push('\n')
            }
            Event::End(TagEnd::TableCell) => out.push(' '),
            _ => {}
        }
    }

    out.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait::async_trait]
impl TypedCapability for DocumentParser {
    type Args = DocumentArgs;
    type Output = ParsedDocument;

    const NAME: &'static str = "document_parser";
    const DESCRIPTION: &'static str =
        "Read a product document (plain text, HTML or Markdown) and return its text.";

    async fn run(
        &self,
        args: Self::Args,
        ctx: &CapabilityContext,
    ) -> Result<Self::Output, CapabilityError> {
        let requested = match (&args.path, ctx.input.as_ref()) {
            (Some(path), input) => Some(self.authorize(path, input).await?),
            (None, InputRef::Document(DocumentRef::Path { path })) => Some(path.clone()),
            (None, _) => None,
        };

        let (source, format, content) = match (requested, ctx.input.as_ref()) {
            (Some(path), _) => {
                let content = tokio::fs::read_to_string(&path).await?;
                let format = args
                    .media_type
                    .as_deref()
                    .map(Format::from_media_type)
                    .unwrap_or_else(|| Format::from_path(&path));
                (path.display().to_string(), format, content)
            }
            (None, InputRef::Document(DocumentRef::Inline { media_type, content })) => {
                let hint = args.media_type.as_deref().unwrap_or(media_type);
                ("inline".to_string(), Format::from_media_type(hint), content.clone())
            }
            (None, other) => {
                return Err(CapabilityError::UnsupportedInput(format!(
                    "document parsing needs a path or a document input, got {}",
                    other.kind()
                )))
            }
        };

        Ok(ParsedDocument {
            source,
            media_type: format.media_type().to_string(),
            text: self.parse(&content, format.media_type()),
        })
    }
}
