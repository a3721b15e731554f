use super::{source_label, Loader, RecordCursor};
use crate::error::IngestError;
use crate::extractor::PdfDocument;
use crate::models::Record;
use std::path::Path;
use tracing::debug;

/// One record per page. `page` is zero-based, `page_label` is the 1-based
/// number a reader would see.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

impl Loader for PdfLoader {
    fn lazy_load<'a>(&'a self, source: &Path) -> Result<RecordCursor<'a>, IngestError> {
        let document = PdfDocument::open(source)?;
        let total_pages = document.page_count();
        let info = document.info();
        let source = source_label(source);
        debug!(source = %source, total_pages, "opened pdf");

        let pages = (0..total_pages).map(move |index| {
            let text = document.page_text(index)?;
            let mut record = Record::new(text, source.clone())
                .with_metadata("page", index)
                .with_metadata("page_label", (index + 1).to_string())
                .with_metadata("total_pages", total_pages);
            for (key, value) in &info {
                record = record.with_metadata(*key, value.as_str());
            }
            Ok(record)
        });

        Ok(Box::new(pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::fixtures::pdf_with_pages;
    use crate::models::MetadataValue;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn one_record_per_page_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("curriculum.pdf");
        fs::write(
            &path,
            pdf_with_pages(&[Some("Neural networks"), Some("Backpropagation")], Some("DL")),
        )?;

        let records = PdfLoader.load(&path)?;

        assert_eq!(records.len(), 2);
        assert!(records[0].content().contains("Neural"));
        assert!(records[1].content().contains("Backpropagation"));
        assert_eq!(records[1].get("page").and_then(MetadataValue::as_i64), Some(1));
        assert_eq!(records[1].get("page_label").and_then(MetadataValue::as_str), Some("2"));
        assert_eq!(records[1].get("total_pages").and_then(MetadataValue::as_i64), Some(2));
        assert_eq!(records[1].get("title").and_then(MetadataValue::as_str), Some("DL"));
        assert_eq!(records[0].source(), path.to_string_lossy());
        Ok(())
    }

    #[test]
    fn blank_page_yields_empty_record() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("gap.pdf");
        fs::write(&path, pdf_with_pages(&[Some("Cover"), None, Some("Back")], None))?;

        let records = PdfLoader.load(&path)?;

        assert_eq!(records.len(), 3);
        assert!(records[1].content().trim().is_empty());
        assert!(records[2].content().contains("Back"));
        Ok(())
    }

    #[test]
    fn corrupt_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        assert!(matches!(PdfLoader.load(&path), Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn lazy_load_yields_pages_one_at_a_time() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("two.pdf");
        fs::write(&path, pdf_with_pages(&[Some("One"), Some("Two")], None))?;

        let mut cursor = PdfLoader.lazy_load(&path)?;
        assert!(cursor.next().transpose()?.is_some());
        assert!(cursor.next().transpose()?.is_some());
        assert!(cursor.next().is_none());
        Ok(())
    }
}
