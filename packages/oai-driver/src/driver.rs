//! Fedora-backed implementation of [`OaiDriver`].

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::config::{DriverConfig, Properties, IDENTIFY_PREFIX};
use crate::date::parse_date;
use crate::error::{RepositoryError, Result};
use crate::formats::MetadataFormat;
use crate::provider::{OaiDriver, Record, SetDescriptor};
use crate::query_factory::{QueryFactory, QueryFactoryRegistry};
use crate::retriever::Retriever;
use crate::sparql::ResultRow;
use crate::transport::{Downloader, HttpDownloader};

/// Driver answering provider requests from a Fedora resource index.
///
/// A value of this type is always fully initialised; construction either
/// succeeds completely or returns an error.
pub struct FedoraOaiDriver {
    config: DriverConfig,
    query_factory: Box<dyn QueryFactory>,
    retriever: Retriever,
}

impl FedoraOaiDriver {
    /// Initialise from properties with the default factories and HTTP transport.
    pub fn init(props: &Properties) -> Result<Self> {
        Self::builder(props).build()
    }

    /// Start building a driver with injected collaborators.
    pub fn builder(props: &Properties) -> DriverBuilder<'_> {
        DriverBuilder {
            props,
            registry: None,
            query_factory: None,
            downloader: None,
            staging_dir: None,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn metadata_formats(&self) -> &[MetadataFormat] {
        &self.config.metadata_formats
    }
}

/// Builder for [`FedoraOaiDriver`].
pub struct DriverBuilder<'a> {
    props: &'a Properties,
    registry: Option<QueryFactoryRegistry>,
    query_factory: Option<Box<dyn QueryFactory>>,
    downloader: Option<Box<dyn Downloader>>,
    staging_dir: Option<PathBuf>,
}

impl DriverBuilder<'_> {
    /// Resolve the configured factory name in `registry`.
    #[must_use]
    pub fn registry(mut self, registry: QueryFactoryRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use this factory instead of resolving one by name.
    #[must_use]
    pub fn query_factory(mut self, factory: Box<dyn QueryFactory>) -> Self {
        self.query_factory = Some(factory);
        self
    }

    /// Use this transport instead of an [`HttpDownloader`].
    #[must_use]
    pub fn downloader(mut self, downloader: Box<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Stage downloads in `dir`.
    #[must_use]
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Validate configuration and assemble the driver.
    ///
    /// Nothing is fetched from the repository here.
    pub fn build(self) -> Result<FedoraOaiDriver> {
        let config = DriverConfig::from_properties(self.props)?;

        let query_factory = match self.query_factory {
            Some(factory) => factory,
            None => self
                .registry
                .unwrap_or_default()
                .create(&config.query_factory, self.props)?,
        };

        let downloader = match self.downloader {
            Some(downloader) => downloader,
            None => Box::new(
                HttpDownloader::new(&config.host, config.port, &config.user, &config.pass)
                    .map_err(|source| RepositoryError::Transport {
                        url: config.base_url.clone(),
                        source,
                    })?,
            ),
        };

        let mut retriever = Retriever::new(config.base_url.clone(), downloader);
        if let Some(dir) = self.staging_dir {
            retriever = retriever.with_staging_dir(dir);
        }

        tracing::debug!(
            base_url = %config.base_url,
            query_factory = %config.query_factory,
            formats = config.metadata_formats.len(),
            "Driver initialised"
        );

        Ok(FedoraOaiDriver {
            config,
            query_factory,
            retriever,
        })
    }
}

impl OaiDriver for FedoraOaiDriver {
    fn write_identify(&self, out: &mut dyn Write) -> Result<()> {
        let source_url = self.config.identify.as_str();
        let identify_error = |source: RepositoryError| RepositoryError::IdentifyIo {
            source_url: source_url.to_string(),
            source: Box::new(source),
        };

        let staged = self
            .retriever
            .stage(source_url, IDENTIFY_PREFIX)
            .map_err(identify_error)?;

        let relayed = staged
            .reopen()
            .map_err(RepositoryError::Io)
            .and_then(|file| relay_lines(BufReader::new(file), out))
            .map_err(identify_error);

        let path = staged.path().to_path_buf();
        if let Err(e) = staged.close() {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged identify document");
        }
        relayed
    }

    fn latest_date(&self) -> Result<DateTime<Utc>> {
        let latest = self
            .retriever
            .tuples(self.query_factory.latest_record_date_query())
            .and_then(|mut tuples| {
                let latest = first_date(&mut tuples);
                tuples.close();
                latest
            });
        latest.map_err(|e| e.during("latest changed record date"))
    }

    fn list_metadata_formats(&self) -> Result<Vec<MetadataFormat>> {
        Ok(self.config.metadata_formats.clone())
    }

    fn list_set_info(&self) -> Result<Vec<SetDescriptor>> {
        let queries = self.query_factory.set_info_queries();
        let merge = queries.len() > 1;

        let mut sets = Vec::new();
        for params in queries {
            let mut tuples = self
                .retriever
                .tuples(params)
                .map_err(|e| e.during("set information"))?;
            let rows = (&mut tuples)
                .map(|row| row.and_then(|row| set_descriptor(&row)))
                .collect::<Result<Vec<_>>>();
            tuples.close();
            sets.extend(rows.map_err(|e| e.during("set information"))?);
        }
        if merge {
            sets.sort_by(|a, b| a.spec.cmp(&b.spec));
        }
        for set in &sets {
            tracing::debug!(
                spec = %set.spec,
                name = %set.name,
                dissemination = set.dissemination.as_deref().unwrap_or("-"),
                "Set"
            );
        }
        Ok(sets)
    }

    fn list_records(
        &self,
        _from: Option<DateTime<Utc>>,
        _until: Option<DateTime<Utc>>,
        _prefix: &str,
        _with_content: bool,
    ) -> Result<Vec<Record>> {
        Err(RepositoryError::Unsupported("listRecords"))
    }

    fn close(self) -> Result<()> {
        tracing::debug!(base_url = %self.config.base_url, "Driver closed");
        Ok(())
    }
}

/// Read the `date` binding of the first row.
fn first_date(rows: &mut impl Iterator<Item = Result<ResultRow>>) -> Result<DateTime<Utc>> {
    let row = rows.next().ok_or(RepositoryError::NoRows {
        query: "latest record date",
    })??;
    let lexical = row
        .literal("date")
        .ok_or_else(|| RepositoryError::MissingBinding {
            binding: "date".to_string(),
        })?;
    parse_date(lexical)
}

/// Project a set-info row.
fn set_descriptor(row: &ResultRow) -> Result<SetDescriptor> {
    let required = |binding: &str| {
        row.literal(binding)
            .map(str::to_string)
            .ok_or_else(|| RepositoryError::MissingBinding {
                binding: binding.to_string(),
            })
    };

    Ok(SetDescriptor {
        spec: required("setSpec")?,
        name: required("setName")?,
        dissemination: row.uri("setDiss").map(str::to_string),
    })
}

/// Copy `reader` to `out` line by line, without decoding.
///
/// A final line without a terminator gets one.
fn relay_lines(mut reader: impl BufRead, out: &mut dyn Write) -> Result<()> {
    let mut line = Vec::new();
    while reader.read_until(b'\n', &mut line)? > 0 {
        if !line.ends_with(b"\n") {
            line.push(b'\n');
        }
        out.write_all(&line)?;
        line.clear();
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sparql::Value;

    fn date_row(value: Value) -> Result<ResultRow> {
        Ok([("date", value)].into_iter().collect())
    }

    #[test]
    fn test_first_date_without_rows() {
        let mut rows = std::iter::empty::<Result<ResultRow>>();
        assert!(matches!(first_date(&mut rows), Err(RepositoryError::NoRows { .. })));
    }

    #[test]
    fn test_first_date_without_binding() {
        let mut rows = std::iter::once(Ok(ResultRow::new()));
        assert!(matches!(
            first_date(&mut rows),
            Err(RepositoryError::MissingBinding { ref binding }) if binding == "date"
        ));
    }

    #[test]
    fn test_first_date_reads_only_one_row() {
        let mut rows = vec![
            date_row(Value::literal("2020-01-01T00:00:00Z")),
            date_row(Value::literal("garbage")),
        ]
        .into_iter();
        assert_eq!(
            first_date(&mut rows).unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_first_date_propagates_parse_error() {
        let mut rows = std::iter::once(date_row(Value::literal("yesterday")));
        assert!(matches!(
            first_date(&mut rows),
            Err(RepositoryError::UnparsableDate(ref s)) if s == "yesterday"
        ));
    }

    #[test]
    fn test_set_descriptor_optional_dissemination() {
        let row: ResultRow = [
            ("setSpec", Value::literal("abc")),
            ("setName", Value::literal("Set ABC")),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            set_descriptor(&row).unwrap(),
            SetDescriptor {
                spec: "abc".to_string(),
                name: "Set ABC".to_string(),
                dissemination: None,
            }
        );
    }

    #[test]
    fn test_set_descriptor_requires_name() {
        let row: ResultRow = [("setSpec", Value::literal("abc"))].into_iter().collect();
        assert!(matches!(
            set_descriptor(&row),
            Err(RepositoryError::MissingBinding { ref binding }) if binding == "setName"
        ));
    }

    #[test]
    fn test_relay_lines_passes_latin1_bytes_through() {
        let document: &[u8] = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n\
            <Identify><repositoryName>Caf\xe9</repositoryName></Identify>\n";
        let mut out = Vec::<u8>::new();
        relay_lines(document, &mut out).unwrap();
        assert_eq!(out, document);
    }

    #[test]
    fn test_relay_lines_preserves_crlf() {
        let mut out = Vec::<u8>::new();
        relay_lines(&b"<Identify>\r\n</Identify>\r\n"[..], &mut out).unwrap();
        assert_eq!(out, b"<Identify>\r\n</Identify>\r\n");
    }

    #[test]
    fn test_relay_lines_preserves_lines() {
        let mut out = Vec::<u8>::new();
        relay_lines("<Identify>\n  <repositoryName>Demo</repositoryName>\n</Identify>".as_bytes(), &mut out)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<Identify>\n  <repositoryName>Demo</repositoryName>\n</Identify>\n"
        );
    }
}
