use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("cannot link '{src}' to '{dest}': {source}")]
    Link {
        src: PathBuf,
        dest: PathBuf,
        source: io::Error,
    },

    #[error("destination already exists: '{0}'")]
    AlreadyExists(PathBuf),

    #[error("source does not exist: '{0}'")]
    NotFound(PathBuf),
}

impl Error {
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::AlreadyExists(_) => true,
            Error::Write { source, .. } | Error::Link { source, .. } => {
                source.kind() == io::ErrorKind::AlreadyExists
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
