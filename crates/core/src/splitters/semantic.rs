use super::{char_len, ChunkSpan, TextSplitter};
use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::IngestError;
use regex::Regex;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_SENTENCE_SPLIT: &str = r"[.?!]\s+";

/// How the breakpoint threshold is derived from the distances between
/// consecutive sentence embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakpointThreshold {
    /// Break above the `amount`-th percentile of distances.
    #[default]
    Percentile,
    /// Break above `mean + amount * stddev`.
    StandardDeviation,
    /// Break above `mean + amount * (q3 - q1)`.
    Interquartile,
    /// Break where the distance gradient exceeds its `amount`-th percentile.
    Gradient,
}

impl BreakpointThreshold {
    pub fn default_amount(self) -> f64 {
        match self {
            Self::Percentile | Self::Gradient => 95.0,
            Self::StandardDeviation => 3.0,
            Self::Interquartile => 1.5,
        }
    }
}

impl std::str::FromStr for BreakpointThreshold {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "percentile" => Ok(Self::Percentile),
            "standard_deviation" => Ok(Self::StandardDeviation),
            "interquartile" => Ok(Self::Interquartile),
            "gradient" => Ok(Self::Gradient),
            other => Err(IngestError::InvalidConfig(format!(
                "unknown breakpoint threshold type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SemanticOptions {
    pub threshold: BreakpointThreshold,
    /// Overrides [`BreakpointThreshold::default_amount`].
    pub threshold_amount: Option<f64>,
    /// Derive the threshold so that roughly this many chunks come out.
    /// Takes precedence over `threshold`.
    pub number_of_chunks: Option<usize>,
    /// Neighbouring sentences embedded together with each sentence.
    pub buffer_size: usize,
    pub sentence_split_regex: String,
    /// Breakpoints that would close a chunk shorter than this many
    /// characters are ignored.
    pub min_chunk_size: Option<usize>,
}

impl Default for SemanticOptions {
    fn default() -> Self {
        Self {
            threshold: BreakpointThreshold::default(),
            threshold_amount: None,
            number_of_chunks: None,
            buffer_size: 1,
            sentence_split_regex: DEFAULT_SENTENCE_SPLIT.to_string(),
            min_chunk_size: None,
        }
    }
}

/// Splits where the meaning of consecutive sentences drifts apart.
///
/// Given the same embeddings the breakpoints are deterministic; the
/// embeddings themselves come from the provider and may change with it.
pub struct SemanticChunker {
    embedder: Arc<dyn Embedder + Send + Sync>,
    options: SemanticOptions,
    sentence_split: Regex,
}

impl SemanticChunker {
    pub fn new(
        embedder: Arc<dyn Embedder + Send + Sync>,
        options: SemanticOptions,
    ) -> Result<Self, IngestError> {
        if let Some(amount) = options.threshold_amount {
            if !amount.is_finite() {
                return Err(IngestError::InvalidConfig(
                    "breakpoint threshold amount must be finite".to_string(),
                ));
            }
        }
        let sentence_split = Regex::new(&options.sentence_split_regex)?;
        Ok(Self {
            embedder,
            options,
            sentence_split,
        })
    }

    fn sentences(&self, text: &str) -> Vec<Range<usize>> {
        let mut sentences = Vec::new();
        let mut cursor = 0;
        for found in self.sentence_split.find_iter(text) {
            if found.is_empty() {
                continue;
            }
            push_trimmed(text, cursor..found.end(), &mut sentences);
            cursor = found.end();
        }
        push_trimmed(text, cursor..text.len(), &mut sentences);
        sentences
    }

    fn combined_sentences(&self, text: &str, sentences: &[Range<usize>]) -> Vec<String> {
        let buffer = self.options.buffer_size;
        (0..sentences.len())
            .map(|index| {
                let from = index.saturating_sub(buffer);
                let to = (index + buffer).min(sentences.len() - 1);
                sentences[from..=to]
                    .iter()
                    .map(|range| &text[range.clone()])
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    /// Indices `i` such that a chunk ends after sentence `i`, with the
    /// distance that triggered the break.
    fn breakpoints(&self, distances: &[f64]) -> Vec<(usize, f64)> {
        let (threshold, signal) = match self.options.number_of_chunks {
            Some(chunks) => (threshold_from_chunk_count(distances, chunks), distances.to_vec()),
            None => {
                let kind = self.options.threshold;
                let amount = self.options.threshold_amount.unwrap_or(kind.default_amount());
                match kind {
                    BreakpointThreshold::Percentile => (percentile(distances, amount), distances.to_vec()),
                    BreakpointThreshold::StandardDeviation => {
                        (mean(distances) + amount * std_dev(distances), distances.to_vec())
                    }
                    BreakpointThreshold::Interquartile => {
                        let iqr = percentile(distances, 75.0) - percentile(distances, 25.0);
                        (mean(distances) + amount * iqr, distances.to_vec())
                    }
                    BreakpointThreshold::Gradient => {
                        let slope = gradient(distances);
                        (percentile(&slope, amount), slope)
                    }
                }
            }
        };

        signal
            .iter()
            .enumerate()
            .filter(|(_, value)| **value > threshold)
            .map(|(index, _)| (index, distances[index]))
            .collect()
    }
}

impl TextSplitter for SemanticChunker {
    fn chunk_spans(&self, text: &str) -> Result<Vec<ChunkSpan>, IngestError> {
        let sentences = self.sentences(text);
        if sentences.len() <= 1 {
            return Ok(sentences.into_iter().map(ChunkSpan::from).collect());
        }

        let combined = self.combined_sentences(text, &sentences);
        let embeddings = self.embedder.embed_batch(&combined)?;
        if embeddings.len() != sentences.len() {
            return Err(IngestError::EmbeddingService(format!(
                "expected {} embeddings, received {}",
                sentences.len(),
                embeddings.len()
            )));
        }

        let distances: Vec<f64> = embeddings
            .windows(2)
            .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
            .collect();

        let mut spans = Vec::new();
        let mut start = 0;
        for (index, distance) in self.breakpoints(&distances) {
            let range = sentences[start].start..sentences[index].end;
            if let Some(min) = self.options.min_chunk_size {
                if char_len(text, &range) < min {
                    continue;
                }
            }
            spans.push(ChunkSpan {
                range,
                breakpoint_distance: Some(distance),
            });
            start = index + 1;
        }
        if start < sentences.len() {
            spans.push(ChunkSpan::from(
                sentences[start].start..sentences[sentences.len() - 1].end,
            ));
        }

        debug!(sentences = sentences.len(), chunks = spans.len(), "semantic split");
        Ok(spans)
    }
}

fn push_trimmed(text: &str, range: Range<usize>, into: &mut Vec<Range<usize>>) {
    if let Some(trimmed) = super::trim_span(text, range) {
        into.push(trimmed);
    }
}

fn threshold_from_chunk_count(distances: &[f64], chunks: usize) -> f64 {
    let x1 = distances.len() as f64;
    let y1 = 0.0;
    let x2 = 0.0;
    let y2 = 100.0;
    let x = (chunks as f64).clamp(x2, x1);
    let y = if x1 == x2 {
        y2
    } else {
        y1 + ((y2 - y1) / (x2 - x1)) * (x - x1)
    };
    percentile(distances, y.clamp(0.0, 100.0))
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance =
        values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentile with linear interpolation between closest ranks.
pub(crate) fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Central differences inside, one-sided differences at the edges.
pub(crate) fn gradient(values: &[f64]) -> Vec<f64> {
    match values.len() {
        0 => Vec::new(),
        1 => vec![0.0],
        len => (0..len)
            .map(|index| {
                if index == 0 {
                    values[1] - values[0]
                } else if index == len - 1 {
                    values[len - 1] - values[len - 2]
                } else {
                    (values[index + 1] - values[index - 1]) / 2.0
                }
            })
            .collect(),
    }
}
