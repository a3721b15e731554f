//! Splitters turn records into bounded-size fragments.
//!
//! Fixed-length and recursive splitting work on byte ranges of the parent
//! text, so every fragment is a contiguous substring and consecutive
//! fragments either touch or overlap. `start_index` in fragment metadata is
//! the character offset of the fragment inside its parent.

pub mod character;
pub mod recursive;
pub mod semantic;

use crate::error::IngestError;
use crate::models::{Fragment, Record};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::ops::Range;
use tracing::warn;

pub use self::character::CharacterTextSplitter;
pub use self::recursive::RecursiveCharacterTextSplitter;
pub use self::semantic::{BreakpointThreshold, SemanticChunker, SemanticOptions};

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpan {
    /// Byte range into the text that was split.
    pub range: Range<usize>,
    /// Distance at the semantic boundary that closed this chunk.
    pub breakpoint_distance: Option<f64>,
}

impl From<Range<usize>> for ChunkSpan {
    fn from(range: Range<usize>) -> Self {
        Self {
            range,
            breakpoint_distance: None,
        }
    }
}

pub trait TextSplitter {
    fn chunk_spans(&self, text: &str) -> Result<Vec<ChunkSpan>, IngestError>;

    fn split_text(&self, text: &str) -> Result<Vec<String>, IngestError> {
        Ok(self
            .chunk_spans(text)?
            .into_iter()
            .map(|span| text[span.range].to_string())
            .collect())
    }

    /// Splits each record, keeping its metadata and adding `chunk_index`,
    /// `start_index` and `chunk_id`.
    fn split_records(&self, records: &[Record]) -> Result<Vec<Fragment>, IngestError> {
        let mut fragments = Vec::new();
        for record in records {
            fragments.extend(fragments_for(record, self.chunk_spans(record.content())?));
        }
        Ok(fragments)
    }
}

impl<T: TextSplitter + ?Sized> TextSplitter for Box<T> {
    fn chunk_spans(&self, text: &str) -> Result<Vec<ChunkSpan>, IngestError> {
        (**self).chunk_spans(text)
    }
}

pub(crate) fn fragments_for(record: &Record, spans: Vec<ChunkSpan>) -> Vec<Fragment> {
    let text = record.content();
    let mut fragments = Vec::with_capacity(spans.len());
    let mut counted_bytes = 0;
    let mut counted_chars = 0;

    for (index, span) in spans.into_iter().enumerate() {
        // Spans arrive in ascending start order; overlap may move the start
        // back, so recount from the beginning when that happens.
        if span.range.start < counted_bytes {
            counted_bytes = 0;
            counted_chars = 0;
        }
        counted_chars += text[counted_bytes..span.range.start].chars().count();
        counted_bytes = span.range.start;

        let content = &text[span.range.clone()];
        let mut fragment = Fragment::derived(record, content)
            .with_metadata("chunk_index", index)
            .with_metadata("start_index", counted_chars)
            .with_metadata("chunk_id", make_chunk_id(record.source(), index, content));
        if let Some(distance) = span.breakpoint_distance {
            fragment = fragment.with_metadata("breakpoint_distance", distance);
        }
        fragments.push(fragment);
    }

    fragments
}

fn make_chunk_id(source: &str, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizing {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkSizing {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(IngestError::InvalidConfig(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

/// Which side of a split a matched separator stays on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeepSeparator {
    /// `"a. b"` on `". "` gives `"a. "` and `"b"`.
    #[default]
    End,
    /// `"a. b"` on `". "` gives `"a"` and `". b"`.
    Start,
}

#[derive(Debug, Clone)]
pub(crate) enum Separator {
    /// Split between every character.
    Chars,
    Pattern(Regex),
}

impl Separator {
    pub(crate) fn new(separator: &str, is_regex: bool) -> Result<Self, IngestError> {
        if separator.is_empty() {
            return Ok(Self::Chars);
        }
        let pattern = if is_regex {
            separator.to_string()
        } else {
            regex::escape(separator)
        };
        Ok(Self::Pattern(Regex::new(&pattern)?))
    }

    pub(crate) fn occurs_in(&self, text: &str) -> bool {
        match self {
            Self::Chars => true,
            Self::Pattern(regex) => regex.find_iter(text).any(|found| !found.is_empty()),
        }
    }

    /// Cuts `range` into non-empty pieces that tile it exactly.
    pub(crate) fn split(
        &self,
        text: &str,
        range: Range<usize>,
        keep: KeepSeparator,
    ) -> Vec<Range<usize>> {
        let base = range.start;
        let slice = &text[range.clone()];
        let mut pieces = Vec::new();

        match self {
            Self::Chars => {
                for (offset, ch) in slice.char_indices() {
                    let start = base + offset;
                    pieces.push(start..start + ch.len_utf8());
                }
            }
            Self::Pattern(regex) => {
                let mut cursor = base;
                for found in regex.find_iter(slice).filter(|found| !found.is_empty()) {
                    let cut = match keep {
                        KeepSeparator::End => base + found.end(),
                        KeepSeparator::Start => base + found.start(),
                    };
                    if cut > cursor {
                        pieces.push(cursor..cut);
                        cursor = cut;
                    }
                }
                if cursor < range.end {
                    pieces.push(cursor..range.end);
                }
            }
        }

        pieces
    }
}

pub(crate) fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

/// Greedily packs contiguous pieces into windows of at most `chunk_size`
/// characters. After a window is emitted the next one starts from the
/// trailing pieces that fit in `chunk_overlap`.
pub(crate) fn merge_spans(
    text: &str,
    pieces: &[Range<usize>],
    sizing: ChunkSizing,
) -> Vec<Range<usize>> {
    let mut merged = Vec::new();
    let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(text, piece);

        if total + len > sizing.chunk_size && !window.is_empty() {
            emit_window(&window, total, sizing, &mut merged);
            while total > sizing.chunk_overlap
                || (total + len > sizing.chunk_size && total > 0)
            {
                match window.pop_front() {
                    Some((_, popped)) => total -= popped,
                    None => break,
                }
            }
        }

        window.push_back((piece.clone(), len));
        total += len;
    }

    if !window.is_empty() {
        emit_window(&window, total, sizing, &mut merged);
    }

    merged
}

fn emit_window(
    window: &VecDeque<(Range<usize>, usize)>,
    total: usize,
    sizing: ChunkSizing,
    merged: &mut Vec<Range<usize>>,
) {
    let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) else {
        return;
    };
    if total > sizing.chunk_size {
        warn!(
            size = total,
            chunk_size = sizing.chunk_size,
            "created a chunk larger than chunk_size"
        );
    }
    merged.push(first.start..last.end);
}

/// Narrows `range` to exclude surrounding whitespace, or drops it when
/// nothing else is left.
pub(crate) fn trim_span(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    let slice = &text[range.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading == slice.len() {
        return None;
    }
    Some(range.start + leading..range.end - trailing)
}

pub(crate) fn finish_spans(
    text: &str,
    ranges: Vec<Range<usize>>,
    strip_whitespace: bool,
) -> Vec<ChunkSpan> {
    ranges
        .into_iter()
        .filter_map(|range| {
            if strip_whitespace {
                trim_span(text, range)
            } else {
                Some(range)
            }
        })
        .map(ChunkSpan::from)
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    /// Rebuilds the parent text from chunks and their char offsets by
    /// dropping whatever each chunk repeats from the one before it.
    pub fn reconstruct(chunks: &[(usize, String)]) -> String {
        let mut rebuilt: Vec<char> = Vec::new();
        for (start, chunk) in chunks {
            let chars: Vec<char> = chunk.chars().collect();
            let already = rebuilt.len().saturating_sub(*start);
            rebuilt.truncate(*start + already.min(chars.len()));
            rebuilt.extend(chars.into_iter().skip(already));
        }
        rebuilt.into_iter().collect()
    }
}
