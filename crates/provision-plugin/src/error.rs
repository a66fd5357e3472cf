//! Error types for provision-plugin.

use std::io;
use std::path::PathBuf;

use provision_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("invalid plugin descriptor in '{}': {reason}", dir.display())]
    DescriptorInvalid { dir: PathBuf, reason: String },

    #[error("could not remove superseded plugin directory '{}': {source}", dir.display())]
    DirectoryConflict {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("plugin archive '{}' could not be expanded: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("archive entry '{entry}' escapes the extraction directory")]
    ZipSlip { entry: String },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("plugin catalog '{}' is unreadable: {reason}", path.display())]
    Catalog { path: PathBuf, reason: String },

    #[error("plugin {id} rejected its configuration: {source}")]
    Configure {
        id: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Fs(#[from] provision_fs::Error),
}

impl PluginError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
