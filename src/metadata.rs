use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key for the originating document identifier.
pub const SOURCE_KEY: &str = "source";

/// Key for the chunk index within the originating document.
pub const CHUNK_ID_KEY: &str = "chunk_id";

/// A scalar metadata value.
///
/// Serialized untagged, so `metadata.json` holds plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for MetadataValue {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Per-record metadata: an ordered mapping from key to scalar.
///
/// # Examples
///
/// ```
/// use autoresearcher::metadata::Metadata;
///
/// let meta = Metadata::for_chunk("paper.txt", 3);
/// assert_eq!(meta.source(), Some("paper.txt"));
/// assert_eq!(meta.chunk_id(), Some(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata for a chunk of a source document.
    pub fn for_chunk(source: &str, chunk_id: usize) -> Self {
        Self::new()
            .with(SOURCE_KEY, source)
            .with(CHUNK_ID_KEY, chunk_id)
    }

    /// Builder-style insert.
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Option<MetadataValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    /// The `source` field, if present and textual.
    pub fn source(&self) -> Option<&str> {
        match self.get(SOURCE_KEY)? {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The `chunk_id` field, if present and integral.
    pub fn chunk_id(&self) -> Option<i64> {
        match self.get(CHUNK_ID_KEY)? {
            MetadataValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_holds_plain_scalars() {
        let meta = Metadata::for_chunk("a.txt", 2)
            .with("score", 0.5)
            .with("draft", true);
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(
            json,
            r#"{"chunk_id":2,"draft":true,"score":0.5,"source":"a.txt"}"#
        );

        let restored: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, meta);
    }

    #[test]
    fn whole_floats_stay_floats() {
        let meta = Metadata::new().with("weight", 1.0);
        let json = serde_json::to_string(&meta).unwrap();
        let restored: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.get("weight"), Some(&MetadataValue::Float(1.0)));
    }

    #[test]
    fn typed_accessors_ignore_wrong_types() {
        let meta = Metadata::new()
            .with(SOURCE_KEY, 7_i64)
            .with(CHUNK_ID_KEY, "seven");
        assert_eq!(meta.source(), None);
        assert_eq!(meta.chunk_id(), None);
    }

    #[test]
    fn non_scalar_json_is_rejected() {
        let parsed: Result<Metadata, _> =
            serde_json::from_str(r#"{"nested":{"a":1}}"#);
        assert!(parsed.is_err());
    }
}
