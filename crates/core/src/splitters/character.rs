use super::{
    finish_spans, merge_spans, ChunkSizing, ChunkSpan, KeepSeparator, Separator, TextSplitter,
};
use crate::error::IngestError;
use tracing::debug;

/// Fixed-length splitting on a single separator.
///
/// With an empty separator every character is its own piece, so chunks are
/// exactly `chunk_size` characters and consecutive chunks share exactly
/// `chunk_overlap` characters.
#[derive(Debug, Clone)]
pub struct CharacterTextSplitter {
    sizing: ChunkSizing,
    separator: Separator,
    strip_whitespace: bool,
}

impl CharacterTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize, separator: &str) -> Result<Self, IngestError> {
        Ok(Self {
            sizing: ChunkSizing::new(chunk_size, chunk_overlap)?,
            separator: Separator::new(separator, false)?,
            strip_whitespace: false,
        })
    }

    pub fn with_regex_separator(
        chunk_size: usize,
        chunk_overlap: usize,
        pattern: &str,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            sizing: ChunkSizing::new(chunk_size, chunk_overlap)?,
            separator: Separator::new(pattern, true)?,
            strip_whitespace: false,
        })
    }

    /// Trims each chunk and drops blank ones. Fragments then no longer tile
    /// the parent text.
    pub fn strip_whitespace(mut self, strip: bool) -> Self {
        self.strip_whitespace = strip;
        self
    }

    pub fn sizing(&self) -> ChunkSizing {
        self.sizing
    }
}

impl TextSplitter for CharacterTextSplitter {
    fn chunk_spans(&self, text: &str) -> Result<Vec<ChunkSpan>, IngestError> {
        let pieces = self.separator.split(text, 0..text.len(), KeepSeparator::End);
        let merged = merge_spans(text, &pieces, self.sizing);
        debug!(pieces = pieces.len(), chunks = merged.len(), "character split");
        Ok(finish_spans(text, merged, self.strip_whitespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetadataValue, Record};
    use crate::splitters::testing::reconstruct;

    fn sample(len: usize) -> String {
        "The quick brown fox jumps over the lazy dog. "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[test]
    fn empty_separator_cuts_every_chunk_size_characters() -> Result<(), IngestError> {
        let splitter = CharacterTextSplitter::new(200, 0, "")?;
        let chunks = splitter.split_text(&sample(450))?;

        let lengths: Vec<usize> = chunks.iter().map(|chunk| chunk.chars().count()).collect();
        assert_eq!(lengths, vec![200, 200, 50]);
        Ok(())
    }

    #[test]
    fn overlapping_chunks_reconstruct_the_input() -> Result<(), IngestError> {
        let text = sample(1_000);
        for (size, overlap) in [(200, 0), (200, 50), (97, 13), (10, 9)] {
            let splitter = CharacterTextSplitter::new(size, overlap, "")?;
            let fragments = splitter.split_records(&[Record::new(text.clone(), "mem")])?;
            let chunks: Vec<(usize, String)> = fragments
                .iter()
                .map(|fragment| {
                    let start = fragment
                        .get("start_index")
                        .and_then(MetadataValue::as_i64)
                        .unwrap_or_default() as usize;
                    (start, fragment.content().to_string())
                })
                .collect();
            assert_eq!(reconstruct(&chunks), text, "size={size} overlap={overlap}");
        }
        Ok(())
    }

    #[test]
    fn separator_pieces_are_packed_greedily() -> Result<(), IngestError> {
        let splitter = CharacterTextSplitter::new(12, 0, " ")?;
        let chunks = splitter.split_text("alpha beta gamma delta")?;
        assert_eq!(chunks, vec!["alpha beta ", "gamma delta"]);
        Ok(())
    }

    #[test]
    fn undersized_text_is_a_single_chunk() -> Result<(), IngestError> {
        let splitter = CharacterTextSplitter::new(100, 10, "\n\n")?;
        let text = "short\n\ntext";
        assert_eq!(splitter.split_text(text)?, vec![text.to_string()]);
        Ok(())
    }

    #[test]
    fn empty_text_has_no_chunks() -> Result<(), IngestError> {
        let splitter = CharacterTextSplitter::new(10, 0, "")?;
        assert!(splitter.split_records(&[Record::new("", "blank")])?.is_empty());
        Ok(())
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        assert!(matches!(
            CharacterTextSplitter::new(100, 100, ""),
            Err(IngestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn fragments_keep_parent_metadata() -> Result<(), IngestError> {
        let parent = Record::new("a".repeat(25), "book.pdf").with_metadata("page", 4usize);
        let fragments = CharacterTextSplitter::new(10, 0, "")?.split_records(&[parent])?;

        assert_eq!(fragments.len(), 3);
        for (index, fragment) in fragments.iter().enumerate() {
            assert_eq!(fragment.source(), "book.pdf");
            assert_eq!(fragment.get("page").and_then(MetadataValue::as_i64), Some(4));
            assert_eq!(
                fragment.get("chunk_index").and_then(MetadataValue::as_i64),
                Some(index as i64)
            );
            assert!(fragment.get("chunk_id").is_some());
        }
        Ok(())
    }

    #[test]
    fn same_input_same_fragments() -> Result<(), IngestError> {
        let splitter = CharacterTextSplitter::new(50, 5, " ")?;
        let record = Record::new(sample(400), "mem");
        assert_eq!(
            splitter.split_records(&[record.clone()])?,
            splitter.split_records(&[record])?
        );
        Ok(())
    }

    #[test]
    fn strip_whitespace_trims_chunks() -> Result<(), IngestError> {
        let splitter = CharacterTextSplitter::new(12, 0, " ")?.strip_whitespace(true);
        let chunks = splitter.split_text("alpha beta gamma delta")?;
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
        Ok(())
    }
}
