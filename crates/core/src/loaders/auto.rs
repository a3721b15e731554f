use super::{CsvLoader, Loader, PdfLoader, RecordCursor, TextLoader};
use crate::error::IngestError;
use std::path::Path;

/// Picks a loader from the file extension: `pdf`, `csv`, anything else is
/// read as text.
#[derive(Debug, Clone, Default)]
pub struct AutoLoader {
    pub text: TextLoader,
    pub pdf: PdfLoader,
    pub csv: CsvLoader,
}

impl AutoLoader {
    pub fn loader_for(&self, path: &Path) -> &(dyn Loader + Send + Sync) {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("pdf") => &self.pdf,
            Some("csv") => &self.csv,
            _ => &self.text,
        }
    }
}

impl Loader for AutoLoader {
    fn lazy_load<'a>(&'a self, source: &Path) -> Result<RecordCursor<'a>, IngestError> {
        self.loader_for(source).lazy_load(source)
    }
}
