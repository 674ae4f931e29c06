//! The capability contract an OAI-PMH provider expects from a driver.

use std::io::Write;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::formats::MetadataFormat;

/// A set as reported to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDescriptor {
    /// Hierarchical set spec, e.g. `abc:def`.
    pub spec: String,
    pub name: String,
    /// Dissemination holding the set description, if the set has one.
    pub dissemination: Option<String>,
}

/// A record changed within a harvest window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub item_id: String,
    pub prefix: String,
    /// Dissemination that produces the record's metadata.
    pub dissemination: String,
    pub date: DateTime<Utc>,
}

/// Operations a repository driver provides to the OAI provider.
///
/// Calls on one instance are expected to be serialized by the caller.
pub trait OaiDriver {
    /// Write the repository's Identify document to `out`.
    fn write_identify(&self, out: &mut dyn Write) -> Result<()>;

    /// Timestamp of the most recently changed record.
    fn latest_date(&self) -> Result<DateTime<Utc>>;

    /// Metadata formats the repository can disseminate, in configured order.
    fn list_metadata_formats(&self) -> Result<Vec<MetadataFormat>>;

    /// All sets, in the order the repository returns them.
    fn list_set_info(&self) -> Result<Vec<SetDescriptor>>;

    /// Records in `prefix` changed between `from` and `until`.
    fn list_records(
        &self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        prefix: &str,
        with_content: bool,
    ) -> Result<Vec<Record>>;

    /// Release the driver.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}
