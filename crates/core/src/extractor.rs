use crate::error::IngestError;
use lopdf::{Document, Object};
use std::collections::BTreeMap;
use std::path::Path;

const INFO_FIELDS: [(&[u8], &str); 4] = [
    (b"Title", "title"),
    (b"Author", "author"),
    (b"Creator", "creator"),
    (b"Producer", "producer"),
];

/// A parsed PDF whose page text is pulled one page at a time.
pub struct PdfDocument {
    document: Document,
    pages: Vec<u32>,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        if !path.exists() {
            return Err(IngestError::NotFound(path.to_path_buf()));
        }
        let document = Document::load(path).map_err(|error| {
            IngestError::PdfParse(format!("{}: {error}", path.display()))
        })?;
        Ok(Self::from_document(document))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;
        Ok(Self::from_document(document))
    }

    fn from_document(document: Document) -> Self {
        let pages = document.get_pages().keys().copied().collect();
        Self { document, pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Text of the page at zero-based `index`. Pages without text come back
    /// as an empty string rather than an error.
    pub fn page_text(&self, index: usize) -> Result<String, IngestError> {
        let page_no = *self.pages.get(index).ok_or_else(|| {
            IngestError::PdfParse(format!("page index {index} out of range"))
        })?;

        self.document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::PdfParse(format!("page {page_no}: {error}")))
    }

    /// Document info dictionary entries that decode to non-empty text.
    pub fn info(&self) -> BTreeMap<&'static str, String> {
        let mut fields = BTreeMap::new();
        let Some(info) = self
            .document
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|object| self.resolve(object))
            .and_then(|object| object.as_dict().ok())
        else {
            return fields;
        };

        for (pdf_key, metadata_key) in INFO_FIELDS {
            let value = info
                .get(pdf_key)
                .ok()
                .and_then(|object| self.resolve(object))
                .and_then(|object| object.as_str().ok())
                .map(decode_pdf_string)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());

            if let Some(value) = value {
                fields.insert(metadata_key, value);
            }
        }

        fields
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> Option<&'a Object> {
        match object {
            Object::Reference(id) => self.document.get_object(*id).ok(),
            other => Some(other),
        }
    }
}

/// PDF text strings are either UTF-16BE with a byte order mark or a
/// single-byte encoding; the latter is read as Latin-1.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }

    bytes.iter().map(|byte| char::from(*byte)).collect()
}
