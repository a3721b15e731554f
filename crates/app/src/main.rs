use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use docpipe_core::{
    AutoLoader, BreakpointThreshold, CharacterNgramEmbedder, CharacterTextSplitter, CsvLoader,
    CsvOptions, CsvStrictness, DirectoryLoader, DirectoryOptions, Embedder,
    EmbeddingServiceConfig, GeminiEmbedder, IngestPipeline, Loader, PdfLoader, Record,
    RecursiveCharacterTextSplitter, SemanticChunker, SemanticOptions, TextLoader, TextSplitter,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docpipe", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a file or directory and print the resulting records.
    Load {
        #[command(flatten)]
        source: SourceArgs,
        /// Pull records one at a time and print only their metadata.
        #[arg(long, default_value_t = false)]
        lazy: bool,
        /// Number of records to print.
        #[arg(long, default_value = "2")]
        limit: usize,
    },
    /// Load a file or directory, split the records and print fragments.
    Split {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        splitter: SplitterArgs,
        #[command(flatten)]
        embedding: EmbeddingArgs,
        /// Number of fragments to print.
        #[arg(long, default_value = "2")]
        limit: usize,
    },
    /// Split raw text without any metadata.
    SplitText {
        /// Text to split.
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        /// UTF-8 file whose contents are split.
        #[arg(long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        splitter: SplitterArgs,
        #[command(flatten)]
        embedding: EmbeddingArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Auto,
    Text,
    Pdf,
    Csv,
}

#[derive(Args)]
struct SourceArgs {
    /// File or directory to load.
    #[arg(long)]
    source: PathBuf,
    /// Loader used for the file, or for each file of a directory.
    #[arg(long, value_enum, default_value = "auto")]
    format: Format,
    /// Glob relative to a directory source, e.g. `*.pdf` or `**/*.txt`.
    #[arg(long, default_value = "**/*")]
    glob: String,
    /// Globs excluded from a directory source.
    #[arg(long)]
    exclude: Vec<String>,
    /// Skip files that fail to load instead of aborting.
    #[arg(long, default_value_t = false)]
    silent_errors: bool,
    /// Text encoding label.
    #[arg(long, default_value = "utf-8")]
    encoding: String,
    /// CSV field delimiter.
    #[arg(long, default_value = ",")]
    delimiter: char,
    /// Treat the first CSV row as data.
    #[arg(long, default_value_t = false)]
    no_headers: bool,
    /// Accept CSV rows whose field count differs from the header.
    #[arg(long, default_value_t = false)]
    lenient: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Fixed,
    Recursive,
    Semantic,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    Ngram,
    Gemini,
}

#[derive(Args)]
struct SplitterArgs {
    #[arg(long, value_enum, default_value = "recursive")]
    strategy: Strategy,
    /// Maximum characters per chunk (200 for fixed, 500 for recursive).
    #[arg(long)]
    chunk_size: Option<usize>,
    #[arg(long, default_value = "0")]
    chunk_overlap: usize,
    /// Separator for fixed splitting; empty splits at any character.
    #[arg(long, default_value = "")]
    separator: String,
    /// percentile, standard_deviation, interquartile or gradient.
    #[arg(long, default_value = "standard_deviation")]
    threshold_type: BreakpointThreshold,
    /// Defaults per type: 95 (percentile, gradient), 3 (standard_deviation),
    /// 1.5 (interquartile). `--threshold-type standard_deviation
    /// --threshold-amount 1` splits short texts at topic shifts.
    #[arg(long)]
    threshold_amount: Option<f64>,
    #[arg(long, value_enum, default_value = "ngram")]
    embedder: EmbedderKind,
}

/// Hosted embedding settings; each flag falls back to its environment
/// variable, which `.env` may also provide.
#[derive(Args)]
struct EmbeddingArgs {
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "EMBEDDING_MODEL")]
    embedding_model: Option<String>,
    #[arg(long, env = "EMBEDDING_ENDPOINT")]
    embedding_endpoint: Option<String>,
    #[arg(long, env = "EMBEDDING_TIMEOUT_SECS")]
    embedding_timeout_secs: Option<u64>,
    #[arg(long, env = "EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,
}

impl EmbeddingArgs {
    /// Serves the parsed flags under the variable names the core config reads.
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "GOOGLE_API_KEY" => self.api_key.clone(),
            "EMBEDDING_MODEL" => self.embedding_model.clone(),
            "EMBEDDING_ENDPOINT" => self.embedding_endpoint.clone(),
            "EMBEDDING_TIMEOUT_SECS" => self.embedding_timeout_secs.map(|secs| secs.to_string()),
            "EMBEDDING_DIMENSIONS" => self.embedding_dimensions.map(|dims| dims.to_string()),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            warn!(error = %error, "could not read .env");
        }
    }

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docpipe boot"
    );

    // Loaders, splitters and the blocking HTTP client all do synchronous IO.
    tokio::task::spawn_blocking(move || execute(cli.command)).await??;
    Ok(())
}

fn execute(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Load {
            source,
            lazy,
            limit,
        } => {
            let loader = build_loader(&source)?;
            if lazy {
                println!("Processing documents from {}:", source.source.display());
                for record in loader.lazy_load(&source.source)?.take(limit) {
                    println!("{}", serde_json::to_string(record?.metadata())?);
                }
                return Ok(());
            }

            let records = loader.load(&source.source)?;
            println!("Number of documents: {}", records.len());
            for (index, record) in records.iter().take(limit).enumerate() {
                print_record("document", index, record)?;
            }
        }
        Command::Split {
            source,
            splitter,
            embedding,
            limit,
        } => {
            let loader = build_loader(&source)?;
            let splitter = build_splitter(&splitter, &embedding)?;
            let pipeline = IngestPipeline::new(loader, splitter);
            let output = pipeline.run(&source.source)?;

            println!(
                "{} records split into {} fragments",
                output.records.len(),
                output.fragments.len()
            );
            for (index, fragment) in output.fragments.iter().take(limit).enumerate() {
                print_record("fragment", index, fragment)?;
            }
        }
        Command::SplitText {
            text,
            file,
            splitter,
            embedding,
        } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)?,
                (None, None) => anyhow::bail!("pass --text or --file"),
            };
            let splitter = build_splitter(&splitter, &embedding)?;
            let chunks = splitter.split_text(&text)?;

            println!("Number of chunks created: {}", chunks.len());
            for chunk in chunks {
                println!("{chunk:?}");
            }
        }
    }

    Ok(())
}

fn print_record(label: &str, index: usize, record: &Record) -> anyhow::Result<()> {
    println!("[{label} {index}] {}", serde_json::to_string(record.metadata())?);
    println!("{}", record.content());
    Ok(())
}

fn build_loader(args: &SourceArgs) -> anyhow::Result<Box<dyn Loader + Send + Sync>> {
    let text = TextLoader::with_encoding(&args.encoding)?;
    if !args.delimiter.is_ascii() {
        anyhow::bail!("csv delimiter must be a single ASCII character");
    }
    let csv = CsvLoader::new(CsvOptions {
        delimiter: args.delimiter as u8,
        has_headers: !args.no_headers,
        strictness: if args.lenient {
            CsvStrictness::Lenient
        } else {
            CsvStrictness::Strict
        },
        ..CsvOptions::default()
    });

    let file_loader: Arc<dyn Loader + Send + Sync> = match args.format {
        Format::Auto => Arc::new(AutoLoader {
            text,
            pdf: PdfLoader,
            csv,
        }),
        Format::Text => Arc::new(text),
        Format::Pdf => Arc::new(PdfLoader),
        Format::Csv => Arc::new(csv),
    };

    if !args.source.is_dir() {
        return Ok(Box::new(file_loader));
    }

    let directory = DirectoryLoader::new(
        file_loader,
        DirectoryOptions {
            glob: args.glob.clone(),
            exclude: args.exclude.clone(),
            silent_errors: args.silent_errors,
            load_hidden: false,
        },
    )?;
    Ok(Box::new(directory))
}

fn build_splitter(
    args: &SplitterArgs,
    overrides: &EmbeddingArgs,
) -> anyhow::Result<Box<dyn TextSplitter + Send + Sync>> {
    let splitter: Box<dyn TextSplitter + Send + Sync> = match args.strategy {
        Strategy::Fixed => Box::new(CharacterTextSplitter::new(
            args.chunk_size.unwrap_or(200),
            args.chunk_overlap,
            &args.separator,
        )?),
        Strategy::Recursive => Box::new(RecursiveCharacterTextSplitter::new(
            args.chunk_size.unwrap_or(500),
            args.chunk_overlap,
        )?),
        Strategy::Semantic => {
            let embedder = build_embedder(args.embedder, overrides)?;
            Box::new(SemanticChunker::new(
                embedder,
                SemanticOptions {
                    threshold: args.threshold_type,
                    threshold_amount: args.threshold_amount,
                    ..SemanticOptions::default()
                },
            )?)
        }
    };
    Ok(splitter)
}

fn build_embedder(
    kind: EmbedderKind,
    overrides: &EmbeddingArgs,
) -> anyhow::Result<Arc<dyn Embedder + Send + Sync>> {
    match kind {
        EmbedderKind::Ngram => Ok(Arc::new(CharacterNgramEmbedder::default())),
        EmbedderKind::Gemini => {
            let config = EmbeddingServiceConfig::from_lookup(|key| overrides.lookup(key))?;
            info!(model = %config.model, "using hosted embeddings");
            Ok(Arc::new(GeminiEmbedder::new(config)?))
        }
    }
}
