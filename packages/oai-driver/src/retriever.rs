//! Staged retrieval of query results.
//!
//! Responses are written to a uniquely named temporary file and parsed from
//! there, so large result sets never sit in memory. The file is removed when
//! the returned [`TupleIterator`] is closed or dropped, or immediately if the
//! download fails.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use crate::config::QUERY_RESULT_PREFIX;
use crate::error::{RepositoryError, Result};
use crate::query::{build_query_url, QueryParameters};
use crate::sparql::{ResultRow, TupleReader};
use crate::transport::Downloader;

/// Runs queries against the resource index.
pub struct Retriever {
    base_url: String,
    downloader: Box<dyn Downloader>,
    staging_dir: Option<PathBuf>,
}

impl Retriever {
    /// Create a retriever for a base URL ending in `/`.
    pub fn new(base_url: impl Into<String>, downloader: Box<dyn Downloader>) -> Self {
        Self {
            base_url: base_url.into(),
            downloader,
            staging_dir: None,
        }
    }

    /// Stage downloads in `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Run a tuple query and return its rows.
    ///
    /// The caller should [`TupleIterator::close`] the result when done; it is
    /// also released on drop.
    pub fn tuples(&self, params: QueryParameters) -> Result<TupleIterator> {
        let url = build_query_url(&self.base_url, params);
        tracing::debug!(url = %url, "Querying resource index");

        let staged = self.stage(&url, QUERY_RESULT_PREFIX)?;
        TupleIterator::open(staged)
    }

    /// Download `url` into a new temporary file.
    ///
    /// On failure the temporary file is removed before the error is returned.
    pub fn stage(&self, url: &str, prefix: &str) -> Result<NamedTempFile> {
        let mut builder = Builder::new();
        builder.prefix(prefix).suffix(".xml");
        let created = match &self.staging_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut staged = created.map_err(|source| RepositoryError::Retrieval {
            message: "could not create temporary file".to_string(),
            source,
        })?;

        let mut writer = BufWriter::new(staged.as_file_mut());
        let written = self
            .downloader
            .get(url, &mut writer)
            .map_err(|source| RepositoryError::Transport {
                url: url.to_string(),
                source,
            })?;
        writer.flush().map_err(|source| RepositoryError::Retrieval {
            message: format!("could not write {}", url),
            source,
        })?;
        drop(writer);

        tracing::debug!(path = %staged.path().display(), bytes = written, "Staged response");
        Ok(staged)
    }
}

/// Rows of a staged query result.
///
/// Owns the temporary file; forward-only and single-consumer.
pub struct TupleIterator {
    rows: Option<TupleReader<BufReader<File>>>,
    staged: Option<NamedTempFile>,
}

impl TupleIterator {
    /// Open a staged result for reading.
    pub fn open(staged: NamedTempFile) -> Result<Self> {
        let file = staged.reopen().map_err(|source| RepositoryError::Retrieval {
            message: format!("could not reopen {}", staged.path().display()),
            source,
        })?;
        Ok(Self {
            rows: Some(TupleReader::new(BufReader::new(file))),
            staged: Some(staged),
        })
    }

    /// Path of the staged file, until released.
    pub fn path(&self) -> Option<&Path> {
        self.staged.as_ref().map(NamedTempFile::path)
    }

    /// Release the staged file.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.rows = None;
        if let Some(staged) = self.staged.take() {
            let path = staged.path().to_path_buf();
            if let Err(e) = staged.close() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged result");
            }
        }
    }
}

impl Iterator for TupleIterator {
    type Item = Result<ResultRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.as_mut()?.next()
    }
}

impl Drop for TupleIterator {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error::TransportError;
    use crate::query::query_params;

    /// Serves a canned body.
    struct FakeDownloader {
        body: Option<String>,
    }

    impl FakeDownloader {
        fn serving(body: &str) -> Self {
            Self { body: Some(body.to_string()) }
        }

        /// Writes a partial body, then fails.
        fn failing() -> Self {
            Self { body: None }
        }
    }

    impl Downloader for FakeDownloader {
        fn get(&self, url: &str, out: &mut dyn Write) -> std::result::Result<u64, TransportError> {
            match &self.body {
                Some(body) => {
                    out.write_all(body.as_bytes())?;
                    Ok(body.len() as u64)
                }
                None => {
                    out.write_all(b"<sparql><results>")?;
                    Err(TransportError::Status {
                        status: 503,
                        url: url.to_string(),
                    })
                }
            }
        }
    }

    const TWO_ROWS: &str = r#"<sparql><results>
<result><binding name="n"><literal>1</literal></binding></result>
<result><binding name="n"><literal>2</literal></binding></result>
</results></sparql>"#;

    fn fake_retriever(downloader: FakeDownloader, dir: &Path) -> Retriever {
        Retriever::new("http://localhost/fedora/", Box::new(downloader)).with_staging_dir(dir)
    }

    fn staged_files(dir: &Path) -> usize {
        fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[test]
    fn test_rows_are_read_from_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = fake_retriever(FakeDownloader::serving(TWO_ROWS), dir.path());

        let tuples = retriever.tuples(query_params([("lang", "itql")])).unwrap();
        let path = tuples.path().unwrap().to_path_buf();
        assert!(path.exists());
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(QUERY_RESULT_PREFIX)));

        let values: Vec<String> = tuples
            .map(|row| row.unwrap().literal("n").unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["1", "2"]);
        assert!(!path.exists());
    }

    #[test]
    fn test_close_after_partial_read_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = fake_retriever(FakeDownloader::serving(TWO_ROWS), dir.path());

        let mut tuples = retriever.tuples(QueryParameters::new()).unwrap();
        assert!(tuples.next().is_some());
        assert_eq!(staged_files(dir.path()), 1);
        tuples.close();
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[test]
    fn test_transport_failure_removes_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = fake_retriever(FakeDownloader::failing(), dir.path());

        let result = retriever.tuples(QueryParameters::new());
        assert!(matches!(result, Err(RepositoryError::Transport { .. })));
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[test]
    fn test_staged_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = fake_retriever(FakeDownloader::serving(TWO_ROWS), dir.path());

        let first = retriever.tuples(QueryParameters::new()).unwrap();
        let second = retriever.tuples(QueryParameters::new()).unwrap();
        assert_ne!(first.path(), second.path());
        assert_eq!(staged_files(dir.path()), 2);
    }
}
