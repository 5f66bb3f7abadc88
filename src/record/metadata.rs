//! Provenance-specific metadata attached to each record.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Where a record was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// arXiv search API.
    Arxiv,
    /// Zotero library.
    Zotero,
}

impl SourceKind {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arxiv => "arxiv",
            Self::Zotero => "zotero",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arxiv" => Ok(Self::Arxiv),
            "zotero" => Ok(Self::Zotero),
            _ => Err(format!("invalid source kind: {s}")),
        }
    }
}

/// Extra fields recognized for arXiv records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArxivMetadata {
    /// Entry id as published by arXiv (e.g. `http://arxiv.org/abs/2401.01234v1`).
    pub external_id: Option<String>,
    /// Subject categories, primary first.
    pub categories: Vec<String>,
}

/// Extra fields recognized for Zotero records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoteroMetadata {
    /// Zotero item key.
    pub external_key: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    /// Plain tag labels.
    pub tags: Vec<String>,
}

/// Source metadata, one variant per [`SourceKind`].
///
/// The variant is the provenance: a record cannot carry keys of a source it
/// did not come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourceMetadata {
    Arxiv(ArxivMetadata),
    Zotero(ZoteroMetadata),
}

impl SourceMetadata {
    /// Empty metadata for a source kind.
    #[must_use]
    pub fn empty(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Arxiv => Self::Arxiv(ArxivMetadata::default()),
            SourceKind::Zotero => Self::Zotero(ZoteroMetadata::default()),
        }
    }

    /// Returns the provenance of this metadata.
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Arxiv(_) => SourceKind::Arxiv,
            Self::Zotero(_) => SourceKind::Zotero,
        }
    }

    /// Builds normalized metadata from an untyped map.
    ///
    /// Only the keys recognized for `kind` are read; everything else is dropped.
    /// Non-object input yields empty metadata.
    #[must_use]
    pub fn from_raw(kind: SourceKind, raw: &Value) -> Self {
        let Some(map) = raw.as_object() else {
            return Self::empty(kind);
        };

        match kind {
            SourceKind::Arxiv => Self::Arxiv(ArxivMetadata {
                external_id: string_field(map, "external_id"),
                categories: string_list(map, "categories"),
            }),
            SourceKind::Zotero => Self::Zotero(ZoteroMetadata {
                external_key: string_field(map, "external_key"),
                volume: string_field(map, "volume"),
                issue: string_field(map, "issue"),
                pages: string_field(map, "pages"),
                tags: string_list(map, "tags"),
            }),
        }
    }

    /// Restores metadata from its stored JSON text, normalizing on the way in.
    #[must_use]
    pub fn from_stored(kind: SourceKind, raw_json: &str) -> Self {
        match serde_json::from_str::<Value>(raw_json) {
            Ok(value) => Self::from_raw(kind, &value),
            Err(error) => {
                warn!(source = %kind, error = %error, "stored source metadata is not valid JSON");
                Self::empty(kind)
            }
        }
    }

    /// Serializes the variant payload (without the kind tag) for storage.
    #[must_use]
    pub fn to_stored(&self) -> String {
        let value = match self {
            Self::Arxiv(meta) => serde_json::to_value(meta),
            Self::Zotero(meta) => serde_json::to_value(meta),
        };
        value.map(|v| v.to_string()).unwrap_or_else(|_| "{}".to_string())
    }

    /// First subject category, for sources that have them.
    #[must_use]
    pub fn primary_category(&self) -> Option<&str> {
        match self {
            Self::Arxiv(meta) => meta.categories.first().map(String::as_str),
            Self::Zotero(_) => None,
        }
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a list of labels; accepts plain strings or Zotero-style `{"tag": "..."}` objects.
fn string_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    let Some(Value::Array(items)) = map.get(key) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(obj) => obj
                .get("tag")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}
