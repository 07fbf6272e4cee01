use std::fmt;
use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

/// The user-supplied thing to extract product metadata from.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InputRef {
    Image(ImageRef),
    Url(String),
    Text(String),
    Document(DocumentRef),
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ImageRef {
    Bytes { mime_type: String, data: Vec<u8> },
    Location { uri: String },
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DocumentRef {
    Path { path: PathBuf },
    Inline { media_type: String, content: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Image,
    Url,
    Text,
    Document,
}

impl InputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Image => "image",
            InputKind::Url => "url",
            InputKind::Text => "text",
            InputKind::Document => "document",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InputRef {
    pub fn text(text: impl Into<String>) -> Self {
        InputRef::Text(text.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        InputRef::Url(url.into())
    }

    pub fn image_bytes(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        InputRef::Image(ImageRef::Bytes {
            mime_type: mime_type.into(),
            data,
        })
    }

    pub fn image_uri(uri: impl Into<String>) -> Self {
        InputRef::Image(ImageRef::Location { uri: uri.into() })
    }

    pub fn document_path(path: impl Into<PathBuf>) -> Self {
        InputRef::Document(DocumentRef::Path { path: path.into() })
    }

    pub fn inline_document(media_type: impl Into<String>, content: impl Into<String>) -> Self {
        InputRef::Document(DocumentRef::Inline {
            media_type: media_type.into(),
            content: content.into(),
        })
    }

    pub fn kind(&self) -> InputKind {
        match self {
            InputRef::Image(_) => InputKind::Image,
            InputRef::Url(_) => InputKind::Url,
            InputRef::Text(_) => InputKind::Text,
            InputRef::Document(_) => InputKind::Document,
        }
    }

    /// Text the user handed over directly, if any. A URL only names where
    /// the product text lives; it, images and documents referenced by path
    /// carry none until a capability reads them.
    pub fn inline_text(&self) -> Option<&str> {
        match self {
            InputRef::Text(text) => Some(text),
            InputRef::Document(DocumentRef::Inline { content, .. }) => Some(content),
            InputRef::Url(_) | InputRef::Image(_) | InputRef::Document(DocumentRef::Path { .. }) => {
                None
            }
        }
    }
}

impl ImageRef {
    /// A URI a vision model can consume: either the stored location or a
    /// base64 `data:` URI built from raw bytes.
    pub fn to_uri(&self) -> String {
        match self {
            ImageRef::Bytes { mime_type, data } => {
                format!("data:{mime_type};base64,{}", BASE64.encode(data))
            }
            ImageRef::Location { uri } => uri.clone(),
        }
    }
}
