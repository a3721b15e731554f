use super::{
    char_len, finish_spans, merge_spans, ChunkSizing, ChunkSpan, KeepSeparator, Separator,
    TextSplitter,
};
use crate::error::IngestError;
use std::ops::Range;
use tracing::debug;

pub const DEFAULT_SEPARATORS: [&str; 7] = ["\n\n", "\n", ". ", "? ", "! ", " ", ""];

/// Structure-aware splitting: paragraphs first, then lines, sentences,
/// words and finally single characters.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterTextSplitter {
    sizing: ChunkSizing,
    separators: Vec<Separator>,
    keep_separator: KeepSeparator,
    strip_whitespace: bool,
}

impl RecursiveCharacterTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        Self::with_separators(chunk_size, chunk_overlap, &DEFAULT_SEPARATORS, false)
    }

    /// `separators` are tried in order, most structural first. Without a
    /// trailing empty separator an oversized word is emitted whole.
    pub fn with_separators<S: AsRef<str>>(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: &[S],
        is_separator_regex: bool,
    ) -> Result<Self, IngestError> {
        if separators.is_empty() {
            return Err(IngestError::InvalidConfig(
                "recursive splitter needs at least one separator".to_string(),
            ));
        }
        let separators = separators
            .iter()
            .map(|separator| Separator::new(separator.as_ref(), is_separator_regex))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            sizing: ChunkSizing::new(chunk_size, chunk_overlap)?,
            separators,
            keep_separator: KeepSeparator::default(),
            strip_whitespace: false,
        })
    }

    pub fn keep_separator(mut self, keep: KeepSeparator) -> Self {
        self.keep_separator = keep;
        self
    }

    pub fn strip_whitespace(mut self, strip: bool) -> Self {
        self.strip_whitespace = strip;
        self
    }

    fn split_range(
        &self,
        text: &str,
        range: Range<usize>,
        separators: &[Separator],
    ) -> Vec<Range<usize>> {
        let slice = &text[range.clone()];
        let chosen = separators
            .iter()
            .position(|separator| separator.occurs_in(slice))
            .unwrap_or(separators.len().saturating_sub(1));
        let Some(separator) = separators.get(chosen) else {
            return vec![range];
        };
        let remaining = &separators[chosen + 1..];

        let mut chunks = Vec::new();
        let mut fitting = Vec::new();
        for piece in separator.split(text, range, self.keep_separator) {
            if char_len(text, &piece) <= self.sizing.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(merge_spans(text, &fitting, self.sizing));
                fitting.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_range(text, piece, remaining));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(merge_spans(text, &fitting, self.sizing));
        }
        chunks
    }
}

impl TextSplitter for RecursiveCharacterTextSplitter {
    fn chunk_spans(&self, text: &str) -> Result<Vec<ChunkSpan>, IngestError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let ranges = self.split_range(text, 0..text.len(), &self.separators);
        debug!(chunks = ranges.len(), "recursive split");
        Ok(finish_spans(text, ranges, self.strip_whitespace))
    }
}
