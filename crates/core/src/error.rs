use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("could not decode {path} as {encoding}")]
    Decode { path: String, encoding: String },

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("tabular format error: {0}")]
    Format(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Maps an IO failure on `path` to `NotFound` when the path is missing.
    pub fn from_io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.into())
        } else {
            Self::Io(error)
        }
    }
}

impl From<regex::Error> for IngestError {
    fn from(value: regex::Error) -> Self {
        Self::InvalidConfig(format!("regex error: {value}"))
    }
}

impl From<glob::PatternError> for IngestError {
    fn from(value: glob::PatternError) -> Self {
        Self::InvalidConfig(format!("glob error: {value}"))
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
