//! Error types for the driver.
//!
//! Uses the dual-error pattern: `RepositoryError` is the only error the
//! harvesting framework ever sees, and `TransportError` is the narrower type
//! returned at the download seam before it is classified.

use thiserror::Error;

/// Main error type for the driver.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A required configuration key is absent.
    #[error("Required property is not set: {key}")]
    MissingProperty { key: String },

    /// The identify property is not a URL.
    #[error("Identify property is not a valid URL: {url}")]
    InvalidIdentifyUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The base URL could not be parsed or has no host.
    #[error("Error parsing baseURL: {url}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The query factory could not be resolved or initialised.
    #[error("Unable to initialize query factory '{name}': {message}")]
    QueryFactory { name: String, message: String },

    /// The transport failed while staging a query result.
    #[error("Error querying remote repository at {url}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    /// Staging or reopening the temporary result file failed.
    #[error("Error staging query result: {message}")]
    Retrieval {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// The result document is not well-formed query results XML.
    #[error("Error parsing query result: {0}")]
    ResultParse(String),

    /// A query expected to return a row returned nothing.
    #[error("No rows returned from {query} query")]
    NoRows { query: &'static str },

    /// A row came back without a binding the caller depends on.
    #[error("A row was returned, but it did not contain a '{binding}' binding")]
    MissingBinding { binding: String },

    /// A timestamp matched none of the supported lexical forms.
    #[error("Could not parse date: {0}")]
    UnparsableDate(String),

    /// Relaying the identify document failed.
    #[error("Error getting identify document from {source_url}")]
    IdentifyIo {
        source_url: String,
        #[source]
        source: Box<RepositoryError>,
    },

    /// A repository query failed; `source` is the classified cause.
    #[error("Error querying for {operation}")]
    Query {
        operation: &'static str,
        #[source]
        source: Box<RepositoryError>,
    },

    /// The operation is part of the provider contract but not implemented.
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepositoryError {
    /// Attach the operation that was being attempted.
    #[must_use]
    pub fn during(self, operation: &'static str) -> Self {
        Self::Query {
            operation,
            source: Box::new(self),
        }
    }

    /// The classified cause, without operation context.
    pub fn without_context(&self) -> &RepositoryError {
        match self {
            Self::Query { source, .. } => source.without_context(),
            other => other,
        }
    }
}

/// Errors raised by a [`crate::transport::Downloader`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Unexpected HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    /// Writing the body to the sink failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
