//! Error types for provision-core.

use std::io;
use std::path::PathBuf;

use provision_plugin::PluginError;
use provision_transport::TransportError;
use thiserror::Error;

use crate::request::ErrorKind;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("configuration '{}' is invalid: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("could not place cached copy of {remote} at '{}': {source}", local.display())]
    CacheLink {
        remote: String,
        local: PathBuf,
        #[source]
        source: provision_fs::Error,
    },

    #[error("could not stage '{}' at '{}': {source}", source_path.display(), local.display())]
    Stage {
        source_path: PathBuf,
        local: PathBuf,
        #[source]
        source: provision_fs::Error,
    },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("transfer worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Fs(#[from] provision_fs::Error),
}

impl ProvisionError {
    /// Place this error in the reporting taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::Config { .. } => ErrorKind::InvalidConfiguration,
            ProvisionError::CacheLink { .. } => ErrorKind::CacheLinkFailed,
            ProvisionError::Transport(TransportError::UnsupportedScheme { .. }) => {
                ErrorKind::UnsupportedScheme
            }
            ProvisionError::Plugin(PluginError::DescriptorInvalid { .. }) => {
                ErrorKind::PluginDescriptorInvalid
            }
            ProvisionError::Plugin(PluginError::DirectoryConflict { .. }) => {
                ErrorKind::PluginDirectoryConflict
            }
            ProvisionError::Plugin(PluginError::Transport(TransportError::UnsupportedScheme {
                ..
            })) => ErrorKind::UnsupportedScheme,
            _ => ErrorKind::TransferFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
