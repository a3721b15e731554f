use super::{Loader, RecordCursor};
use crate::error::IngestError;
use crate::models::Record;
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    /// Matched against each file path relative to the root. `*.pdf` only
    /// sees top-level files, `**/*.pdf` descends.
    pub glob: String,
    pub exclude: Vec<String>,
    /// Skip files the inner loader rejects instead of failing the batch.
    pub silent_errors: bool,
    pub load_hidden: bool,
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            glob: "**/*".to_string(),
            exclude: Vec::new(),
            silent_errors: false,
            load_hidden: false,
        }
    }
}

/// Runs a shared inner loader over every matching file under a root.
///
/// Files are visited sorted by name within each directory, so one run is
/// reproducible on a given filesystem. Nothing is promised across platforms.
pub struct DirectoryLoader {
    inner: Arc<dyn Loader + Send + Sync>,
    glob: Pattern,
    exclude: Vec<Pattern>,
    silent_errors: bool,
    load_hidden: bool,
}

impl DirectoryLoader {
    pub fn new(
        inner: Arc<dyn Loader + Send + Sync>,
        options: DirectoryOptions,
    ) -> Result<Self, IngestError> {
        let exclude = options
            .exclude
            .iter()
            .map(|pattern| Pattern::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            inner,
            glob: Pattern::new(&options.glob)?,
            exclude,
            silent_errors: options.silent_errors,
            load_hidden: options.load_hidden,
        })
    }

    fn accepts(&self, relative: &Path) -> bool {
        self.glob.matches_path_with(relative, MATCH_OPTIONS)
            && !self
                .exclude
                .iter()
                .any(|pattern| pattern.matches_path_with(relative, MATCH_OPTIONS))
    }

    /// Files the loader would visit, in visiting order.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, IngestError> {
        self.matches(root)?.collect()
    }

    fn matches<'a>(
        &'a self,
        root: &Path,
    ) -> Result<impl Iterator<Item = Result<PathBuf, IngestError>> + Send + 'a, IngestError> {
        if !root.exists() {
            return Err(IngestError::NotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(IngestError::InvalidConfig(format!(
                "expected a directory: {}",
                root.display()
            )));
        }

        let root = root.to_path_buf();
        let load_hidden = self.load_hidden;
        let walker = WalkDir::new(&root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| load_hidden || !is_hidden(entry.file_name()));

        Ok(walker.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => return Some(Err(IngestError::Io(error.into()))),
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            if self.accepts(relative) {
                Some(Ok(entry.into_path()))
            } else {
                None
            }
        }))
    }
}

impl Loader for DirectoryLoader {
    fn lazy_load<'a>(&'a self, source: &Path) -> Result<RecordCursor<'a>, IngestError> {
        let files = self.matches(source)?;
        Ok(Box::new(DirectoryCursor {
            loader: self,
            files: Box::new(files),
            current: None,
            done: false,
        }))
    }
}

struct DirectoryCursor<'a> {
    loader: &'a DirectoryLoader,
    files: Box<dyn Iterator<Item = Result<PathBuf, IngestError>> + Send + 'a>,
    current: Option<(PathBuf, RecordCursor<'a>)>,
    done: bool,
}

impl DirectoryCursor<'_> {
    /// Either swallows `error` with a warning or ends the cursor with it.
    fn fail(&mut self, path: Option<&Path>, error: IngestError) -> Option<IngestError> {
        if self.loader.silent_errors {
            let shown = path.map(|path| path.display().to_string()).unwrap_or_default();
            warn!(path = %shown, error = %error, "skipping file");
            None
        } else {
            self.done = true;
            Some(error)
        }
    }
}

impl<'a> Iterator for DirectoryCursor<'a> {
    type Item = Result<Record, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        let loader: &'a DirectoryLoader = self.loader;

        while !self.done {
            if let Some((path, cursor)) = self.current.as_mut() {
                match cursor.next() {
                    Some(Ok(record)) => return Some(Ok(record)),
                    Some(Err(error)) => {
                        let path = path.clone();
                        self.current = None;
                        if let Some(error) = self.fail(Some(&path), error) {
                            return Some(Err(error));
                        }
                    }
                    None => self.current = None,
                }
                continue;
            }

            match self.files.next() {
                None => self.done = true,
                Some(Err(error)) => {
                    if let Some(error) = self.fail(None, error) {
                        return Some(Err(error));
                    }
                }
                Some(Ok(path)) => {
                    debug!(path = %path.display(), "loading directory entry");
                    match loader.inner.lazy_load(&path) {
                        Ok(cursor) => self.current = Some((path, cursor)),
                        Err(error) => {
                            if let Some(error) = self.fail(Some(&path), error) {
                                return Some(Err(error));
                            }
                        }
                    }
                }
            }
        }

        None
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::fixtures::pdf_with_pages;
    use crate::loaders::{PdfLoader, TextLoader};
    use std::fs;
    use tempfile::tempdir;

    fn text_loader() -> Arc<dyn Loader + Send + Sync> {
        Arc::new(TextLoader::default())
    }

    #[test]
    fn glob_keeps_only_matching_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.pdf"), pdf_with_pages(&[Some("First book")], None))?;
        fs::write(
            dir.path().join("b.pdf"),
            pdf_with_pages(&[Some("Second book"), Some("More")], None),
        )?;
        fs::write(dir.path().join("notes.txt"), "not a pdf")?;

        let loader = DirectoryLoader::new(
            Arc::new(PdfLoader),
            DirectoryOptions {
                glob: "*.pdf".to_string(),
                ..DirectoryOptions::default()
            },
        )?;
        let records = loader.load(dir.path())?;

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|record| record.source().ends_with(".pdf")));
        assert!(records[0].source().ends_with("a.pdf"));
        Ok(())
    }

    #[test]
    fn single_star_does_not_descend() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        fs::write(dir.path().join("top.txt"), "top")?;
        fs::write(nested.join("deep.txt"), "deep")?;

        let shallow = DirectoryLoader::new(
            text_loader(),
            DirectoryOptions {
                glob: "*.txt".to_string(),
                ..DirectoryOptions::default()
            },
        )?;
        assert_eq!(shallow.discover(dir.path())?.len(), 1);

        let deep = DirectoryLoader::new(
            text_loader(),
            DirectoryOptions {
                glob: "**/*.txt".to_string(),
                ..DirectoryOptions::default()
            },
        )?;
        let found = deep.discover(dir.path())?;
        assert!(found.iter().any(|path| path.ends_with("nested/deep.txt")));
        Ok(())
    }

    #[test]
    fn exclude_and_hidden_files_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("keep.txt"), "keep")?;
        fs::write(dir.path().join("drop.txt"), "drop")?;
        fs::write(dir.path().join(".secret.txt"), "hidden")?;

        let loader = DirectoryLoader::new(
            text_loader(),
            DirectoryOptions {
                glob: "*.txt".to_string(),
                exclude: vec!["drop*".to_string()],
                ..DirectoryOptions::default()
            },
        )?;
        let records = loader.load(dir.path())?;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content(), "keep");
        Ok(())
    }

    #[test]
    fn missing_root_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let loader = DirectoryLoader::new(text_loader(), DirectoryOptions::default())?;
        let result = loader.load(Path::new("/no/such/books"));
        assert!(matches!(result, Err(IngestError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn broken_file_propagates_by_default() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.pdf"), b"%PDF-1.4\n%broken")?;
        fs::write(dir.path().join("b.pdf"), pdf_with_pages(&[Some("Fine")], None))?;

        let loader = DirectoryLoader::new(
            Arc::new(PdfLoader),
            DirectoryOptions {
                glob: "*.pdf".to_string(),
                ..DirectoryOptions::default()
            },
        )?;

        assert!(matches!(loader.load(dir.path()), Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn silent_errors_skips_broken_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.pdf"), b"%PDF-1.4\n%broken")?;
        fs::write(dir.path().join("b.pdf"), pdf_with_pages(&[Some("Fine")], None))?;

        let loader = DirectoryLoader::new(
            Arc::new(PdfLoader),
            DirectoryOptions {
                glob: "*.pdf".to_string(),
                silent_errors: true,
                ..DirectoryOptions::default()
            },
        )?;
        let records = loader.load(dir.path())?;

        assert_eq!(records.len(), 1);
        assert!(records[0].source().ends_with("b.pdf"));
        Ok(())
    }

    #[test]
    fn lazy_cursor_stops_when_caller_stops() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        for name in ["1.txt", "2.txt", "3.txt"] {
            fs::write(dir.path().join(name), name)?;
        }

        let loader = DirectoryLoader::new(text_loader(), DirectoryOptions::default())?;
        let first_two = loader
            .lazy_load(dir.path())?
            .take(2)
            .collect::<Result<Vec<_>, _>>()?;

        assert_eq!(first_two.len(), 2);
        assert_eq!(first_two[0].content(), "1.txt");
        assert_eq!(first_two[1].content(), "2.txt");
        Ok(())
    }
}
