use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const SOURCE_KEY: &str = "source";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// A unit of loaded content plus provenance metadata.
///
/// Records are immutable once built: the only way to add metadata is the
/// consuming [`Record::with_metadata`] builder, and no API removes keys, so
/// `source` is present for the whole lifetime of the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    content: String,
    metadata: Metadata,
}

/// A record produced by a splitter from a parent record.
pub type Fragment = Record;

impl Record {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), MetadataValue::Text(source.into()));
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builds a record carrying `parent`'s metadata with new content.
    pub fn derived(parent: &Record, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: parent.metadata.clone(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .and_then(MetadataValue::as_str)
            .unwrap_or_default()
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_always_carries_source() {
        let record = Record::new("", "notes.txt");
        assert_eq!(record.content(), "");
        assert_eq!(record.source(), "notes.txt");
    }

    #[test]
    fn with_metadata_keeps_existing_keys() {
        let record = Record::new("body", "a.pdf")
            .with_metadata("page", 0usize)
            .with_metadata("title", "Intro");

        assert_eq!(record.get("page").and_then(MetadataValue::as_i64), Some(0));
        assert_eq!(record.get("title").and_then(MetadataValue::as_str), Some("Intro"));
        assert_eq!(record.source(), "a.pdf");
    }

    #[test]
    fn metadata_serializes_as_plain_scalars() -> Result<(), serde_json::Error> {
        let record = Record::new("x", "rows.csv").with_metadata("row", 3usize);
        let json = serde_json::to_value(&record)?;
        assert_eq!(json["metadata"]["row"], 3);
        assert_eq!(json["metadata"]["source"], "rows.csv");
        Ok(())
    }
}
