use crate::error::IngestError;
use std::time::Duration;
use url::Url;

pub const DEFAULT_EMBEDDING_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";
pub const DEFAULT_EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for the hosted embedding service.
///
/// Built once at process start and handed to the embedder explicitly; nothing
/// in this crate reads credentials from the environment on its own.
#[derive(Debug, Clone)]
pub struct EmbeddingServiceConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub output_dimensionality: Option<usize>,
}

impl Default for EmbeddingServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_EMBEDDING_ENDPOINT.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_key: None,
            timeout: DEFAULT_EMBEDDING_TIMEOUT,
            output_dimensionality: None,
        }
    }
}

impl EmbeddingServiceConfig {
    /// Reads `GOOGLE_API_KEY`, `EMBEDDING_ENDPOINT`, `EMBEDDING_MODEL`,
    /// `EMBEDDING_TIMEOUT_SECS` and `EMBEDDING_DIMENSIONS` through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(endpoint) = non_empty("EMBEDDING_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(model) = non_empty("EMBEDDING_MODEL") {
            config.model = model;
        }
        config.api_key = non_empty("GOOGLE_API_KEY");

        if let Some(raw) = non_empty("EMBEDDING_TIMEOUT_SECS") {
            let secs = raw.parse::<u64>().map_err(|_| {
                IngestError::InvalidConfig(format!("EMBEDDING_TIMEOUT_SECS is not a number: {raw}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = non_empty("EMBEDDING_DIMENSIONS") {
            let dims = raw.parse::<usize>().map_err(|_| {
                IngestError::InvalidConfig(format!("EMBEDDING_DIMENSIONS is not a number: {raw}"))
            })?;
            config.output_dimensionality = Some(dims);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        let endpoint = Url::parse(&self.endpoint).map_err(|error| {
            IngestError::InvalidConfig(format!("embedding endpoint {}: {error}", self.endpoint))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(IngestError::InvalidConfig(format!(
                "embedding endpoint must be http(s): {}",
                self.endpoint
            )));
        }
        if self.model.trim().is_empty() {
            return Err(IngestError::InvalidConfig("embedding model is empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(IngestError::InvalidConfig("embedding timeout must be positive".to_string()));
        }
        if self.output_dimensionality == Some(0) {
            return Err(IngestError::InvalidConfig(
                "embedding dimensionality must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// URL of the batch embedding call for the configured model.
    pub fn batch_embed_url(&self) -> Result<Url, IngestError> {
        let base = self.endpoint.trim_end_matches('/');
        Url::parse(&format!("{base}/models/{}:batchEmbedContents", self.model)).map_err(|error| {
            IngestError::InvalidConfig(format!("embedding endpoint {}: {error}", self.endpoint))
        })
    }
}
