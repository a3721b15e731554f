use super::{read_source, source_label, Loader, RecordCursor};
use crate::error::IngestError;
use crate::models::Record;
use encoding_rs::{Encoding, UTF_8};
use std::path::Path;
use tracing::debug;

/// Reads a whole file as one record.
#[derive(Debug, Clone)]
pub struct TextLoader {
    encoding: &'static Encoding,
    fallbacks: Vec<&'static Encoding>,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            encoding: UTF_8,
            fallbacks: Vec::new(),
        }
    }
}

impl TextLoader {
    /// `label` is any WHATWG encoding label, e.g. `utf-8`, `latin1`, `utf-16le`.
    pub fn with_encoding(label: &str) -> Result<Self, IngestError> {
        Ok(Self {
            encoding: lookup_encoding(label)?,
            fallbacks: Vec::new(),
        })
    }

    /// Encodings tried in order when the primary one rejects the bytes.
    pub fn autodetect<I, S>(mut self, labels: I) -> Result<Self, IngestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fallbacks = labels
            .into_iter()
            .map(|label| lookup_encoding(label.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }

    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<String, IngestError> {
        for encoding in std::iter::once(self.encoding).chain(self.fallbacks.iter().copied()) {
            if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
                debug!(path = %path.display(), encoding = encoding.name(), "decoded text file");
                return Ok(text.into_owned());
            }
        }

        Err(IngestError::Decode {
            path: source_label(path),
            encoding: self.encoding.name().to_string(),
        })
    }
}

impl Loader for TextLoader {
    fn lazy_load<'a>(&'a self, source: &Path) -> Result<RecordCursor<'a>, IngestError> {
        let bytes = read_source(source)?;
        let content = self.decode(source, &bytes)?;
        let record = Record::new(content, source_label(source));
        Ok(Box::new(std::iter::once(Ok(record))))
    }
}

fn lookup_encoding(label: &str) -> Result<&'static Encoding, IngestError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| IngestError::InvalidConfig(format!("unknown text encoding: {label}")))
}
