use super::{open_source, source_label, Loader, RecordCursor};
use crate::error::IngestError;
use crate::models::Record;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsvStrictness {
    /// A row whose field count differs from the header is a format error.
    #[default]
    Strict,
    /// Short rows render missing values as empty, extra values are keyed by
    /// their zero-based column position.
    Lenient,
}

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub quote: u8,
    pub has_headers: bool,
    /// Replaces the header row (or names columns when there is none).
    pub column_names: Option<Vec<String>>,
    pub strictness: CsvStrictness,
    /// Column whose value becomes the record `source` instead of the path.
    pub source_column: Option<String>,
    /// Columns copied into metadata and left out of the content.
    pub metadata_columns: Vec<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            has_headers: true,
            column_names: None,
            strictness: CsvStrictness::Strict,
            source_column: None,
            metadata_columns: Vec::new(),
        }
    }
}

/// One record per data row, rendered as `column: value` lines.
#[derive(Debug, Clone, Default)]
pub struct CsvLoader {
    options: CsvOptions,
}

impl CsvLoader {
    pub fn new(options: CsvOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CsvOptions {
        &self.options
    }
}

impl Loader for CsvLoader {
    fn lazy_load<'a>(&'a self, source: &Path) -> Result<RecordCursor<'a>, IngestError> {
        let file = open_source(source)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(self.options.delimiter)
            .quote(self.options.quote)
            .has_headers(self.options.has_headers)
            .flexible(true)
            .trim(Trim::None)
            .from_reader(file);

        let file_headers = if self.options.has_headers {
            Some(reader.headers().map_err(format_error)?.clone())
        } else {
            None
        };
        let columns = match (&self.options.column_names, file_headers) {
            (Some(names), _) => names.clone(),
            (None, Some(headers)) => headers.iter().map(str::to_string).collect(),
            (None, None) => Vec::new(),
        };

        if let Some(column) = &self.options.source_column {
            if !columns.is_empty() && !columns.contains(column) {
                return Err(IngestError::InvalidConfig(format!(
                    "source column {column} is not one of {columns:?}"
                )));
            }
        }

        Ok(Box::new(RowCursor {
            options: &self.options,
            reader,
            columns,
            path: source_label(source),
            row: 0,
            done: false,
        }))
    }
}

struct RowCursor<'a> {
    options: &'a CsvOptions,
    reader: csv::Reader<File>,
    columns: Vec<String>,
    path: String,
    row: usize,
    done: bool,
}

impl RowCursor<'_> {
    fn render(&self, fields: &StringRecord) -> Result<Record, IngestError> {
        let expected = self.columns.len();
        if expected > 0
            && fields.len() != expected
            && self.options.strictness == CsvStrictness::Strict
        {
            return Err(IngestError::Format(format!(
                "{} row {}: expected {expected} fields, found {}",
                self.path,
                self.row,
                fields.len()
            )));
        }

        let width = fields.len().max(expected);
        let mut lines = Vec::with_capacity(width);
        let mut source = self.path.clone();
        let mut extra = Vec::new();

        for position in 0..width {
            let name = self
                .columns
                .get(position)
                .cloned()
                .unwrap_or_else(|| position.to_string());
            let value = fields.get(position).unwrap_or_default();

            if self.options.source_column.as_deref() == Some(name.as_str()) {
                source = value.to_string();
            }
            if self.options.metadata_columns.contains(&name) {
                extra.push((name, value.to_string()));
                continue;
            }
            lines.push(format!("{}: {}", name.trim(), value.trim()));
        }

        let mut record = Record::new(lines.join("\n"), source).with_metadata("row", self.row);
        for (key, value) in extra {
            record = record.with_metadata(key, value);
        }
        Ok(record)
    }
}

impl Iterator for RowCursor<'_> {
    type Item = Result<Record, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut fields = StringRecord::new();
        match self.reader.read_record(&mut fields) {
            Ok(true) => {}
            Ok(false) => {
                self.done = true;
                return None;
            }
            Err(error) => {
                self.done = true;
                return Some(Err(format_error(error)));
            }
        }

        // Headerless files without explicit names take their schema from the
        // first row; later rows are checked against it.
        if self.columns.is_empty() {
            self.columns = (0..fields.len()).map(|position| position.to_string()).collect();
        }

        let rendered = self.render(&fields);
        if rendered.is_err() {
            self.done = true;
        }
        self.row += 1;
        Some(rendered)
    }
}

fn format_error(error: csv::Error) -> IngestError {
    if error.is_io_error() {
        match error.into_kind() {
            csv::ErrorKind::Io(io) => IngestError::Io(io),
            other => IngestError::Format(format!("{other:?}")),
        }
    } else {
        IngestError::Format(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetadataValue;
    use std::fs;
    use tempfile::tempdir;

    fn write_csv(contents: &str) -> Result<(tempfile::TempDir, std::path::PathBuf), std::io::Error> {
        let dir = tempdir()?;
        let path = dir.path().join("rows.csv");
        fs::write(&path, contents)?;
        Ok((dir, path))
    }

    #[test]
    fn header_rows_become_column_value_lines() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = write_csv("a,b\n1,2\n3,4\n")?;

        let records = CsvLoader::default().load(&path)?;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content(), "a: 1\nb: 2");
        assert_eq!(records[1].content(), "a: 3\nb: 4");
        assert_eq!(records[0].get("row").and_then(MetadataValue::as_i64), Some(0));
        assert_eq!(records[1].get("row").and_then(MetadataValue::as_i64), Some(1));
        assert_eq!(records[0].source(), path.to_string_lossy());
        Ok(())
    }

    #[test]
    fn ragged_rows_fail_in_strict_mode() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = write_csv("a,b\n1,2\n3\n")?;

        let result = CsvLoader::default().load(&path);
        assert!(matches!(result, Err(IngestError::Format(_))));
        Ok(())
    }

    #[test]
    fn lenient_mode_fills_and_names_by_position() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = write_csv("a,b\n1\n3,4,5\n")?;
        let loader = CsvLoader::new(CsvOptions {
            strictness: CsvStrictness::Lenient,
            ..CsvOptions::default()
        });

        let records = loader.load(&path)?;

        assert_eq!(records[0].content(), "a: 1\nb: ");
        assert_eq!(records[1].content(), "a: 3\nb: 4\n2: 5");
        Ok(())
    }

    #[test]
    fn headerless_files_use_positions_or_given_names() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = write_csv("1;2\n3;4\n")?;
        let positional = CsvLoader::new(CsvOptions {
            delimiter: b';',
            has_headers: false,
            ..CsvOptions::default()
        });
        assert_eq!(positional.load(&path)?[0].content(), "0: 1\n1: 2");

        let named = CsvLoader::new(CsvOptions {
            delimiter: b';',
            has_headers: false,
            column_names: Some(vec!["x".to_string(), "y".to_string()]),
            ..CsvOptions::default()
        });
        assert_eq!(named.load(&path)?[1].content(), "x: 3\ny: 4");
        Ok(())
    }

    #[test]
    fn source_and_metadata_columns_move_out_of_content() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = write_csv("User ID,Age,Purchased\n15624510,19,0\n")?;
        let loader = CsvLoader::new(CsvOptions {
            source_column: Some("User ID".to_string()),
            metadata_columns: vec!["Purchased".to_string()],
            ..CsvOptions::default()
        });

        let records = loader.load(&path)?;

        assert_eq!(records[0].source(), "15624510");
        assert_eq!(records[0].content(), "User ID: 15624510\nAge: 19");
        assert_eq!(records[0].get("Purchased").and_then(MetadataValue::as_str), Some("0"));
        Ok(())
    }

    #[test]
    fn unknown_source_column_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = write_csv("a,b\n1,2\n")?;
        let loader = CsvLoader::new(CsvOptions {
            source_column: Some("missing".to_string()),
            ..CsvOptions::default()
        });

        assert!(matches!(loader.load(&path), Err(IngestError::InvalidConfig(_))));
        Ok(())
    }
}
