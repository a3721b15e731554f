//! Loaders turn source artifacts into ordered sequences of [`Record`]s.
//!
//! Every loader exposes a pull-based cursor through [`Loader::lazy_load`].
//! Cursors are single-pass: once drained they cannot be rewound, and calling
//! `lazy_load` again re-reads the source from scratch.

pub mod auto;
pub mod csv;
pub mod directory;
pub mod pdf;
pub mod text;

use crate::error::IngestError;
use crate::models::Record;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub use self::auto::AutoLoader;
pub use self::csv::{CsvLoader, CsvOptions, CsvStrictness};
pub use self::directory::{DirectoryLoader, DirectoryOptions};
pub use self::pdf::PdfLoader;
pub use self::text::TextLoader;

pub type RecordCursor<'a> = Box<dyn Iterator<Item = Result<Record, IngestError>> + Send + 'a>;

pub trait Loader {
    fn lazy_load<'a>(&'a self, source: &Path) -> Result<RecordCursor<'a>, IngestError>;

    fn load(&self, source: &Path) -> Result<Vec<Record>, IngestError> {
        self.lazy_load(source)?.collect()
    }
}

impl<T: Loader + ?Sized> Loader for Box<T> {
    fn lazy_load<'a>(&'a self, source: &Path) -> Result<RecordCursor<'a>, IngestError> {
        (**self).lazy_load(source)
    }
}

impl<T: Loader + ?Sized> Loader for Arc<T> {
    fn lazy_load<'a>(&'a self, source: &Path) -> Result<RecordCursor<'a>, IngestError> {
        (**self).lazy_load(source)
    }
}

pub(crate) fn open_source(path: &Path) -> Result<File, IngestError> {
    File::open(path).map_err(|error| IngestError::from_io(path, error))
}

pub(crate) fn read_source(path: &Path) -> Result<Vec<u8>, IngestError> {
    std::fs::read(path).map_err(|error| IngestError::from_io(path, error))
}

pub(crate) fn source_label(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
