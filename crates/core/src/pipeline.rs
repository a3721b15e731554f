use crate::error::IngestError;
use crate::loaders::{Loader, RecordCursor};
use crate::models::{Fragment, Record};
use crate::splitters::TextSplitter;
use std::collections::VecDeque;
use std::path::Path;
use tracing::info;

pub struct PipelineOutput {
    pub records: Vec<Record>,
    pub fragments: Vec<Fragment>,
}

/// Loader → splitter, one direction only. The splitter sees loader output,
/// never the source artifact.
pub struct IngestPipeline<L, S>
where
    L: Loader,
    S: TextSplitter,
{
    loader: L,
    splitter: S,
}

impl<L, S> IngestPipeline<L, S>
where
    L: Loader,
    S: TextSplitter,
{
    pub fn new(loader: L, splitter: S) -> Self {
        Self { loader, splitter }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn splitter(&self) -> &S {
        &self.splitter
    }

    pub fn run(&self, source: &Path) -> Result<PipelineOutput, IngestError> {
        let records = self.loader.load(source)?;
        let fragments = self.splitter.split_records(&records)?;
        info!(
            source = %source.display(),
            records = records.len(),
            fragments = fragments.len(),
            "pipeline finished"
        );
        Ok(PipelineOutput { records, fragments })
    }

    /// Splits records as the loader yields them. The first error ends the
    /// stream; fragments already handed out stay valid.
    pub fn stream<'a>(&'a self, source: &Path) -> Result<FragmentStream<'a, S>, IngestError> {
        Ok(FragmentStream {
            records: self.loader.lazy_load(source)?,
            splitter: &self.splitter,
            pending: VecDeque::new(),
            failed: false,
        })
    }
}

pub struct FragmentStream<'a, S: TextSplitter> {
    records: RecordCursor<'a>,
    splitter: &'a S,
    pending: VecDeque<Fragment>,
    failed: bool,
}

impl<S: TextSplitter> Iterator for FragmentStream<'_, S> {
    type Item = Result<Fragment, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Some(Ok(fragment));
            }
            if self.failed {
                return None;
            }

            let record = match self.records.next()? {
                Ok(record) => record,
                Err(error) => {
                    self.failed = true;
                    return Some(Err(error));
                }
            };
            match self.splitter.split_records(std::slice::from_ref(&record)) {
                Ok(fragments) => self.pending.extend(fragments),
                Err(error) => {
                    self.failed = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::{DirectoryLoader, DirectoryOptions, TextLoader};
    use crate::splitters::CharacterTextSplitter;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn run_loads_then_splits() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("long.txt");
        fs::write(&path, "x".repeat(450))?;

        let pipeline = IngestPipeline::new(TextLoader::default(), CharacterTextSplitter::new(200, 0, "")?);
        let output = pipeline.run(&path)?;

        assert_eq!(output.records.len(), 1);
        assert_eq!(output.fragments.len(), 3);
        assert!(output.fragments.iter().all(|fragment| fragment.source() == output.records[0].source()));
        Ok(())
    }

    #[test]
    fn stream_yields_fragments_before_a_later_failure() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), "abcdefghij")?;
        fs::write(dir.path().join("b.txt"), [0xFF, 0xFE, 0xFD])?;

        let loader = DirectoryLoader::new(
            Arc::new(TextLoader::default()),
            DirectoryOptions {
                glob: "*.txt".to_string(),
                ..DirectoryOptions::default()
            },
        )?;
        let pipeline = IngestPipeline::new(loader, CharacterTextSplitter::new(5, 0, "")?);

        let mut stream = pipeline.stream(dir.path())?;
        assert_eq!(stream.next().transpose()?.map(Record::into_content).as_deref(), Some("abcde"));
        assert_eq!(stream.next().transpose()?.map(Record::into_content).as_deref(), Some("fghij"));
        assert!(matches!(stream.next(), Some(Err(IngestError::Decode { .. }))));
        assert!(stream.next().is_none());
        Ok(())
    }
}
