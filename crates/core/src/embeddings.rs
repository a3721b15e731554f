use crate::config::EmbeddingServiceConfig;
use crate::error::IngestError;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT: usize = 128;
const GEMINI_EMBEDDING_DIMENSIONS: usize = 3_072;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

pub trait Embedder {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Offline embedder hashing character trigrams into a fixed number of
/// buckets. Deterministic, so useful for tests and dry runs.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return Ok(vector);
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

/// Cosine similarity; a zero vector is treated as unrelated to everything.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

/// Outcome of one attempt against the embedding service.
#[derive(Debug)]
enum Attempt<T> {
    Done(T),
    Transient(String),
    Fatal(String),
}

/// Runs `call` and retries it once when the first failure is transient.
fn with_single_retry<T>(mut call: impl FnMut() -> Attempt<T>) -> Result<T, IngestError> {
    match call() {
        Attempt::Done(value) => Ok(value),
        Attempt::Fatal(reason) => Err(IngestError::EmbeddingService(reason)),
        Attempt::Transient(reason) => {
            warn!(reason = %reason, "embedding request failed, retrying once");
            match call() {
                Attempt::Done(value) => Ok(value),
                Attempt::Transient(reason) | Attempt::Fatal(reason) => {
                    Err(IngestError::EmbeddingService(reason))
                }
            }
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Client for the Generative Language `batchEmbedContents` endpoint.
pub struct GeminiEmbedder {
    client: Client,
    config: EmbeddingServiceConfig,
}

impl GeminiEmbedder {
    pub fn new(config: EmbeddingServiceConfig) -> Result<Self, IngestError> {
        config.validate()?;
        if config.api_key.is_none() {
            return Err(IngestError::InvalidConfig(
                "an API key is required for the embedding service".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| IngestError::EmbeddingService(error.to_string()))?;

        Ok(Self { client, config })
    }

    fn request_body(&self, texts: &[String]) -> BatchEmbedRequest {
        let model = format!("models/{}", self.config.model);
        BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: model.clone(),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                    output_dimensionality: self.config.output_dimensionality,
                })
                .collect(),
        }
    }

    fn send(&self, url: &url::Url, body: &BatchEmbedRequest) -> Attempt<BatchEmbedResponse> {
        let mut request = self.client.post(url.clone()).json(body);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("x-goog-api-key", api_key);
        }

        let response = match request.send() {
            Ok(response) => response,
            Err(error) if error.is_timeout() || error.is_connect() => {
                return Attempt::Transient(error.to_string())
            }
            Err(error) => return Attempt::Fatal(error.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            let reason = format!("embedding request to {url} returned {status}");
            return if is_transient_status(status) {
                Attempt::Transient(reason)
            } else {
                Attempt::Fatal(reason)
            };
        }

        match response.json::<BatchEmbedResponse>() {
            Ok(payload) => Attempt::Done(payload),
            Err(error) => Attempt::Fatal(format!("invalid embedding response: {error}")),
        }
    }
}

impl Embedder for GeminiEmbedder {
    fn dimensions(&self) -> usize {
        self.config
            .output_dimensionality
            .unwrap_or(GEMINI_EMBEDDING_DIMENSIONS)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| IngestError::EmbeddingService("empty embedding response".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.config.batch_embed_url()?;
        let body = self.request_body(texts);
        debug!(count = texts.len(), model = %self.config.model, "requesting embeddings");

        let payload = with_single_retry(|| self.send(&url, &body))?;
        vectors_from_response(payload, texts.len())
    }
}

fn vectors_from_response(
    payload: BatchEmbedResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, IngestError> {
    if payload.embeddings.len() != expected {
        return Err(IngestError::EmbeddingService(format!(
            "expected {expected} embeddings, received {}",
            payload.embeddings.len()
        )));
    }
    if payload.embeddings.iter().any(|embedding| embedding.values.is_empty()) {
        return Err(IngestError::EmbeddingService(
            "embedding response contained an empty vector".to_string(),
        ));
    }

    Ok(payload
        .embeddings
        .into_iter()
        .map(|embedding| embedding.values)
        .collect())
}
