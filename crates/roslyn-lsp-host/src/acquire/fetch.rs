//! Package download seam.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while downloading a package archive.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The feed answered with a non-success status.
    #[error("'{url}' answered HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The request never produced a response.
    #[error("request to '{url}' failed: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport failure description.
        message: String,
    },

    /// Writing the archive to disk failed.
    #[error("failed to write download: {0}")]
    Io(#[from] io::Error),
}

/// Downloads a URL to a local file.
///
/// The acquirer talks to the network only through this trait so that a
/// populated cache can be shown to perform no network work.
pub trait PackageFetcher {
    /// Streams `url` into `destination`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the request fails, the server answers
    /// with a non-2xx status, or the file cannot be written.
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError>;
}

/// [`PackageFetcher`] backed by a blocking HTTP agent.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Connection establishment timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    /// Longest stall allowed between two reads of the response body.
    pub const READ_TIMEOUT: Duration = Duration::from_secs(120);

    /// Builds a fetcher with the default timeouts.
    #[must_use]
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Self::CONNECT_TIMEOUT)
            .timeout_read(Self::READ_TIMEOUT)
            .build();
        Self { agent }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageFetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        let response = self.agent.get(url).call().map_err(|error| match error {
            ureq::Error::Status(status, _) => FetchError::Status {
                url: url.to_owned(),
                status,
            },
            ureq::Error::Transport(transport) => FetchError::Network {
                url: url.to_owned(),
                message: transport.to_string(),
            },
        })?;

        let mut body = response.into_reader();
        let mut file = BufWriter::new(File::create(destination)?);
        let written = io::copy(&mut body, &mut file)?;
        file.flush()?;
        Ok(written)
    }
}
