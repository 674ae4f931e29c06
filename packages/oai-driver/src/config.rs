//! Configuration keys, constants and validation for the driver.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use url::Url;

use crate::error::{RepositoryError, Result};
use crate::formats::{metadata_formats, MetadataFormat};

pub const PROP_BASEURL: &str = "driver.fedora.baseURL";
pub const PROP_USER: &str = "driver.fedora.user";
pub const PROP_PASS: &str = "driver.fedora.pass";
pub const PROP_IDENTIFY: &str = "driver.fedora.identify";
pub const PROP_ITEMID: &str = "driver.fedora.itemID";
pub const PROP_SETSPEC: &str = "driver.fedora.setSpec";
pub const PROP_SETSPEC_NAME: &str = "driver.fedora.setSpec.name";
pub const PROP_SETSPEC_DISSTYPE: &str = "driver.fedora.setSpec.dissType";
pub const PROP_QUERY_FACTORY: &str = "driver.fedora.queryFactory";
pub const PROP_FORMATS: &str = "driver.fedora.md.formats";

/// Start of every per-format key, followed by the configured prefix.
pub const PROP_FORMAT_START: &str = "driver.fedora.md.format.";
pub const PROP_FORMAT_PFX_END: &str = ".mdPrefix";
pub const PROP_FORMAT_LOC_END: &str = ".loc";
pub const PROP_FORMAT_URI_END: &str = ".uri";
pub const PROP_FORMAT_DISSTYPE_END: &str = ".dissType";

/// HTTP timeout in seconds.
///
/// The driver enforces no timeout of its own; this is handed to the transport.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Path of the resource index search service, relative to the base URL.
pub const RISEARCH_PATH: &str = "risearch";

/// Result shape directive appended to every query.
pub const RESULT_TYPE: (&str, &str) = ("type", "tuples");

/// Result format directive appended to every query.
pub const RESULT_FORMAT: (&str, &str) = ("format", "Sparql");

/// Temp file prefix for staged query results.
pub const QUERY_RESULT_PREFIX: &str = "fedora-oai-queryresult";

/// Temp file prefix for the staged identify document.
pub const IDENTIFY_PREFIX: &str = "fedora-oai-identify";

/// Flat key/value configuration, as read from a properties file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    /// Create an empty property set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load properties from a file on disk.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse `key=value`, `key: value` or `key value` lines.
    ///
    /// The key ends at the first `=`, `:` or whitespace; one `=` or `:`
    /// may follow whitespace after the key. Blank lines and lines starting
    /// with `#` or `!` are skipped. A line without a separator defines the
    /// key with an empty value. Escapes and continuation lines are not
    /// supported.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut props = Self::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                continue;
            }
            let (key, rest) = match trimmed.find(|c: char| c == '=' || c == ':' || c.is_whitespace()) {
                Some(idx) => trimmed.split_at(idx),
                None => (trimmed, ""),
            };
            let rest = rest.trim_start();
            let value = rest
                .strip_prefix(['=', ':'])
                .unwrap_or(rest)
                .trim_start();
            props.set(key, value);
        }
        Ok(props)
    }

    /// Set a property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get an optional property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Get a property that must be present.
    ///
    /// # Returns
    /// * `Ok(value)` if set
    /// * `Err(RepositoryError::MissingProperty)` naming `key` otherwise
    pub fn get_required(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| RepositoryError::MissingProperty {
            key: key.to_string(),
        })
    }

    /// Remove a property, returning its old value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::new();
        for (key, value) in iter {
            props.set(key, value);
        }
        props
    }
}

/// Validated driver configuration.
///
/// Built once by [`DriverConfig::from_properties`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Repository base URL, always ending in `/`.
    pub base_url: String,
    pub user: String,
    pub pass: String,
    pub item_id: String,
    pub set_spec: String,
    pub set_spec_name: String,
    pub set_spec_diss_type: String,
    pub identify: Url,
    /// Name the query factory is resolved by.
    pub query_factory: String,
    pub metadata_formats: Vec<MetadataFormat>,
    /// Host the transport is bound to.
    pub host: String,
    /// Port the transport is bound to, defaulted from the scheme.
    pub port: u16,
}

impl DriverConfig {
    /// Validate all required keys and build the configuration.
    ///
    /// Keys are checked in a fixed order so the first missing one is the
    /// one reported.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let base_url = normalize_base_url(props.get_required(PROP_BASEURL)?);
        let user = props.get_required(PROP_USER)?.to_string();
        let pass = props.get_required(PROP_PASS)?.to_string();
        let item_id = props.get_required(PROP_ITEMID)?.to_string();
        let set_spec = props.get_required(PROP_SETSPEC)?.to_string();
        let set_spec_name = props.get_required(PROP_SETSPEC_NAME)?.to_string();
        let set_spec_diss_type = props.get_required(PROP_SETSPEC_DISSTYPE)?.to_string();

        let metadata_formats = metadata_formats(props)?;

        let identify_str = props.get_required(PROP_IDENTIFY)?;
        let identify =
            Url::parse(identify_str).map_err(|source| RepositoryError::InvalidIdentifyUrl {
                url: identify_str.to_string(),
                source,
            })?;

        let query_factory = props.get_required(PROP_QUERY_FACTORY)?.to_string();

        let (host, port) = host_and_port(&base_url)?;

        Ok(Self {
            base_url,
            user,
            pass,
            item_id,
            set_spec,
            set_spec_name,
            set_spec_diss_type,
            identify,
            query_factory,
            metadata_formats,
            host,
            port,
        })
    }
}

/// Ensure the base URL ends with a path separator.
///
/// # Examples
/// ```
/// use fedora_oai_driver::config::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:8080/fedora"), "http://localhost:8080/fedora/");
/// assert_eq!(normalize_base_url("http://localhost:8080/fedora/"), "http://localhost:8080/fedora/");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    }
}

/// Extract the host and effective port of the base URL.
fn host_and_port(base_url: &str) -> Result<(String, u16)> {
    let invalid = |source| RepositoryError::InvalidBaseUrl {
        url: base_url.to_string(),
        source,
    };
    let parsed = Url::parse(base_url).map_err(invalid)?;
    let host = parsed
        .host_str()
        .ok_or(url::ParseError::EmptyHost)
        .map_err(invalid)?
        .to_string();
    let port = parsed
        .port_or_known_default()
        .ok_or(url::ParseError::InvalidPort)
        .map_err(invalid)?;
    Ok((host, port))
}
