//! Error types for provision-transport.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no transport handles scheme '{scheme}' (target {target})")]
    UnsupportedScheme { scheme: String, target: String },

    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error(transparent)]
    Fs(#[from] provision_fs::Error),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("FTP transfer of {url} failed: {message}")]
    Ftp { url: String, message: String },

    #[error("object store transfer of {url} failed: {source}")]
    ObjectStore {
        url: String,
        #[source]
        source: object_store::Error,
    },

    #[error("plugin {plugin} failed: {message}")]
    Plugin { plugin: String, message: String },

    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),

    #[error("could not provision {remote} to {} after {attempts} attempts", local.display())]
    ProvisioningFailed {
        remote: String,
        local: PathBuf,
        attempts: u32,
        #[source]
        last: Box<TransportError>,
    },
}

impl TransportError {
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            TransportError::UnsupportedScheme { .. }
                | TransportError::InvalidTarget { .. }
                | TransportError::ProvisioningFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
