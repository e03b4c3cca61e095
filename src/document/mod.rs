//! Interchange document read from an export bundle.
//!
//! The document is a tree-shaped JSON value with three collections:
//! - `pages`: page records ordered by source tree path (parents first)
//! - `snippets`: model key -> flat field mappings, each with an `id`
//! - `images`: flat field mappings with an `id` and a `file` descriptor

pub mod bundle;

pub use bundle::{Bundle, CONTENT_FILE};

use crate::error::ImportError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Page identifier, shared by source and destination installations.
pub type PageId = i64;

/// A flat mapping of field name to value.
pub type Fields = serde_json::Map<String, Value>;

/// Model key of the base page model every page type extends.
pub const BASE_PAGE_MODEL: &str = "wagtailcore.page";

/// The parsed `content.json` of a bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub pages: Vec<PageRecord>,

    #[serde(default)]
    pub snippets: BTreeMap<String, Vec<Fields>>,

    #[serde(default)]
    pub images: Vec<Fields>,
}

/// One exported page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    #[serde(default)]
    pub app_label: String,

    #[serde(default)]
    pub model: String,

    /// Flat field mapping; always carries `pk` and `path`.
    #[serde(default)]
    pub content: Fields,
}

impl PageRecord {
    pub fn new(app_label: impl Into<String>, model: impl Into<String>, content: Fields) -> Self {
        Self {
            app_label: app_label.into(),
            model: model.into(),
            content,
        }
    }

    /// Fully-qualified, lower-cased model key (`app_label.model`).
    ///
    /// Records exported without model information are treated as base pages.
    pub fn model_key(&self) -> String {
        if self.app_label.is_empty() || self.model.is_empty() {
            BASE_PAGE_MODEL.to_string()
        } else {
            format!(
                "{}.{}",
                self.app_label.to_lowercase(),
                self.model.to_lowercase()
            )
        }
    }

    pub fn pk(&self) -> Option<PageId> {
        self.content.get("pk").and_then(parse_page_id)
    }

    pub fn path(&self) -> Option<&str> {
        self.content.get("path").and_then(Value::as_str)
    }

    pub fn title(&self) -> &str {
        self.content
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Copy of this record with `pk` replaced, keeping the original encoding.
    pub fn with_pk(&self, id: PageId) -> Self {
        let mut record = self.clone();
        let encoded = match self.content.get("pk") {
            Some(original) => encode_page_id_like(original, id),
            None => Value::from(id),
        };
        record.content.insert("pk".to_string(), encoded);
        record
    }
}

/// Read a page identifier encoded as a JSON integer or a numeric string.
pub fn parse_page_id(value: &Value) -> Option<PageId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Encode `id` the same way `original` was encoded (string stays string).
pub fn encode_page_id_like(original: &Value, id: PageId) -> Value {
    match original {
        Value::String(_) => Value::String(id.to_string()),
        _ => Value::from(id),
    }
}

impl Document {
    /// Parse a document from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ImportError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a document from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, ImportError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Load a document from a file (supports both plain JSON and gzip).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use std::fs::File;
        use std::io::{BufReader, Read};

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        // Check for gzip magic bytes
        let mut magic = [0u8; 2];
        let read = reader.read(&mut magic)?;

        // Reset to start
        drop(reader);
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let document = if read == 2 && magic == [0x1f, 0x8b] {
            let decoder = flate2::read::GzDecoder::new(reader);
            serde_json::from_reader(decoder).map_err(ImportError::from)?
        } else {
            serde_json::from_reader(reader).map_err(ImportError::from)?
        };
        Ok(document)
    }

    /// Number of snippet records across all models.
    pub fn snippet_count(&self) -> usize {
        self.snippets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.snippets.is_empty() && self.images.is_empty()
    }
}
