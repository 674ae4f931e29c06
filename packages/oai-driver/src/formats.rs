//! Metadata formats supported by the driver.
//!
//! The list is read from configuration once, at initialization, and never
//! touches the repository.

use crate::config::{
    Properties, PROP_FORMATS, PROP_FORMAT_DISSTYPE_END, PROP_FORMAT_LOC_END, PROP_FORMAT_PFX_END,
    PROP_FORMAT_START, PROP_FORMAT_URI_END,
};
use crate::error::Result;

/// A metadata format the provider can disseminate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFormat {
    /// Externally visible metadata prefix (e.g. `oai_dc`).
    pub prefix: String,
    pub namespace_uri: String,
    pub schema_location: String,
    /// Repository dissemination type that produces this format.
    pub dissemination_type: String,
}

/// Build the metadata format list from configuration.
///
/// `md.formats` is a space-separated list of keys. Each key needs a `.uri`,
/// `.loc` and `.dissType`; an optional `.mdPrefix` replaces the key as the
/// visible prefix. Fails on the first missing key, so no partial list is
/// ever returned.
///
/// # Examples
/// ```
/// use fedora_oai_driver::config::Properties;
/// use fedora_oai_driver::formats::metadata_formats;
///
/// let props: Properties = [
///     ("driver.fedora.md.formats", "oai_dc"),
///     ("driver.fedora.md.format.oai_dc.uri", "http://www.openarchives.org/OAI/2.0/oai_dc/"),
///     ("driver.fedora.md.format.oai_dc.loc", "http://www.openarchives.org/OAI/2.0/oai_dc.xsd"),
///     ("driver.fedora.md.format.oai_dc.dissType", "info:fedora/*/oai_dc"),
/// ]
/// .into_iter()
/// .collect();
///
/// let formats = metadata_formats(&props).unwrap();
/// assert_eq!(formats.len(), 1);
/// assert_eq!(formats[0].prefix, "oai_dc");
/// ```
pub fn metadata_formats(props: &Properties) -> Result<Vec<MetadataFormat>> {
    let mut formats = Vec::new();

    for key in props.get_required(PROP_FORMATS)?.split_whitespace() {
        let property = |end: &str| format!("{PROP_FORMAT_START}{key}{end}");

        let namespace_uri = props.get_required(&property(PROP_FORMAT_URI_END))?;
        let schema_location = props.get_required(&property(PROP_FORMAT_LOC_END))?;
        let dissemination_type = props.get_required(&property(PROP_FORMAT_DISSTYPE_END))?;
        let prefix = props.get(&property(PROP_FORMAT_PFX_END)).unwrap_or(key);

        formats.push(MetadataFormat {
            prefix: prefix.to_string(),
            namespace_uri: namespace_uri.to_string(),
            schema_location: schema_location.to_string(),
            dissemination_type: dissemination_type.to_string(),
        });
    }

    Ok(formats)
}
