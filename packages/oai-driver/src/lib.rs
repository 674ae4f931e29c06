//! Fedora OAI Driver - Serve an OAI-PMH provider from a Fedora repository.
//!
//! This crate adapts the Fedora resource index query service to the
//! contract an OAI-PMH provider expects from its repository driver:
//! the Identify document, the latest change date, the metadata formats and
//! the sets.
//!
//! # Example
//!
//! ```
//! use fedora_oai_driver::date::parse_date;
//! use fedora_oai_driver::query::{build_query_url, query_params};
//!
//! assert!(parse_date("2005-04-13T09:30:12.345Z").is_ok());
//!
//! let url = build_query_url("http://localhost:8080/fedora/", query_params([("lang", "itql")]));
//! assert!(url.ends_with("risearch?format=Sparql&lang=itql&type=tuples"));
//! ```
//!
//! # Architecture
//!
//! The driver is organized into several modules:
//!
//! - [`config`]: Property keys, constants and validated configuration
//! - [`error`]: Error types and Result alias
//! - [`date`]: Timestamp normalization
//! - [`query`]: Query URL construction
//! - [`query_factory`]: Pluggable query builders, resolved by name
//! - [`transport`]: HTTP downloads bound to the repository host
//! - [`sparql`]: Streaming SPARQL results reader
//! - [`retriever`]: Staged query execution through temporary files
//! - [`formats`]: Metadata format registry
//! - [`provider`]: The provider-facing driver contract
//! - [`driver`]: The Fedora implementation of that contract
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod date;
pub mod driver;
pub mod error;
pub mod formats;
pub mod provider;
pub mod query;
pub mod query_factory;
pub mod retriever;
pub mod sparql;
pub mod transport;

// Re-export commonly used items
pub use config::{DriverConfig, Properties};
pub use driver::FedoraOaiDriver;
pub use error::{RepositoryError, Result};
pub use formats::MetadataFormat;
pub use provider::{OaiDriver, SetDescriptor};
