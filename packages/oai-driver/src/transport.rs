//! HTTP transport for downloading from the repository.

use std::io::Write;
use std::time::Duration;

use reqwest::blocking::Client;
use url::Url;

use crate::config::HTTP_TIMEOUT_SECS;
use crate::error::TransportError;

/// User agent string identifying this driver.
const USER_AGENT: &str = concat!("fedora-oai-driver/", env!("CARGO_PKG_VERSION"));

/// Fetches a URL into a byte sink.
pub trait Downloader {
    /// Download `url`, writing the body to `out`.
    ///
    /// # Returns
    /// Number of bytes written
    fn get(&self, url: &str, out: &mut dyn Write) -> Result<u64, TransportError>;
}

/// Create a configured HTTP client.
///
/// # Returns
/// A `reqwest::blocking::Client` configured with appropriate timeout and user agent.
pub fn create_client() -> Result<Client, TransportError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Downloader bound to one repository host and port.
///
/// Credentials are only sent to URLs on the bound host and port; anything
/// else (an identify document on another server, say) is fetched anonymously.
pub struct HttpDownloader {
    client: Client,
    host: String,
    port: u16,
    user: String,
    pass: String,
}

impl HttpDownloader {
    /// Create a downloader for `host:port` using the given credentials.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        pass: impl Into<String>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: create_client()?,
            host: host.into(),
            port,
            user: user.into(),
            pass: pass.into(),
        })
    }

    /// Whether requests to `url` should carry the credentials.
    fn is_bound_origin(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|u| {
            u.host_str() == Some(self.host.as_str()) && u.port_or_known_default() == Some(self.port)
        })
    }
}

impl Downloader for HttpDownloader {
    fn get(&self, url: &str, out: &mut dyn Write) -> Result<u64, TransportError> {
        let mut request = self.client.get(url);
        if self.is_bound_origin(url) {
            request = request.basic_auth(&self.user, Some(&self.pass));
        }

        let mut response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, url, "Repository returned an error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let written = response.copy_to(out)?;
        tracing::debug!(url, bytes = written, "Download complete");
        Ok(written)
    }
}
