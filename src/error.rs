//! Error types shared by the downloaders and the dispatch service

use std::path::PathBuf;
use thiserror::Error;

/// Prefix carried by every transfer failure, regardless of backend.
pub const CLONE_FAILURE_PREFIX: &str = "failed to clone git repository";

#[derive(Debug, Error)]
pub enum FetchError {
    /// The git transport failed (network, authentication, protocol or checkout).
    #[error("failed to clone git repository: {0}")]
    Clone(#[source] git2::Error),

    /// The Azure DevOps download path failed.
    #[error("failed to clone git repository: {0}")]
    Azure(#[source] AzureError),

    /// The caller cancelled the transfer.
    #[error("clone of {url} was cancelled")]
    Cancelled { url: String },

    /// The background transfer thread could not be started or died without a result.
    #[error("failed to clone git repository: transfer worker failed: {0}")]
    Worker(String),

    /// The shared HTTP client could not be constructed.
    #[error("failed to build HTTP transport client: {0}")]
    Transport(#[source] reqwest::Error),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }
}

impl From<AzureError> for FetchError {
    fn from(err: AzureError) -> Self {
        FetchError::Azure(err)
    }
}

/// Failures specific to the Azure DevOps archive download.
#[derive(Debug, Error)]
pub enum AzureError {
    #[error("unrecognised Azure DevOps repository URL: {0}")]
    InvalidUrl(String),

    // reqwest's own message already names the URL.
    #[error("{source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid repository archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
