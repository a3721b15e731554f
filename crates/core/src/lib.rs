pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod loaders;
pub mod models;
pub mod pipeline;
pub mod splitters;

pub use config::EmbeddingServiceConfig;
pub use embeddings::{
    cosine_similarity, CharacterNgramEmbedder, Embedder, GeminiEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, Result};
pub use extractor::PdfDocument;
pub use loaders::{
    AutoLoader, CsvLoader, CsvOptions, CsvStrictness, DirectoryLoader, DirectoryOptions, Loader,
    PdfLoader, RecordCursor, TextLoader,
};
pub use models::{Fragment, Metadata, MetadataValue, Record};
pub use pipeline::{FragmentStream, IngestPipeline, PipelineOutput};
pub use splitters::{
    BreakpointThreshold, CharacterTextSplitter, ChunkSizing, ChunkSpan, KeepSeparator,
    RecursiveCharacterTextSplitter, SemanticChunker, SemanticOptions, TextSplitter,
};
