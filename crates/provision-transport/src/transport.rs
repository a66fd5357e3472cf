//! The contract every file transport implements.
//!
//! Plugins and the built-in generic transport are driven through the same
//! object-safe trait, so the dispatcher can hold them as `Arc<dyn Transport>`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Key/value settings handed to a transport before first use.
pub type PluginSettings = BTreeMap<String, String>;

/// One transfer inside a batched upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSetEntry {
    pub destination: String,
    pub source: PathBuf,
    pub metadata: Option<String>,
}

/// The batch of uploads one transport receives between
/// [`Transport::prepare_file_set`] and [`Transport::finalize_file_set`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSet {
    pub files: Vec<FileSetEntry>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        destination: impl Into<String>,
        source: impl Into<PathBuf>,
        metadata: Option<String>,
    ) {
        self.files.push(FileSetEntry {
            destination: destination.into(),
            source: source.into(),
            metadata,
        });
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.destination.as_str())
    }

    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.source.as_path())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable identifier used in logs and error messages.
    fn name(&self) -> &str;

    /// URI schemes this transport accepts, lower-case.
    fn schemes_handled(&self) -> BTreeSet<String>;

    fn handles(&self, scheme: &str) -> bool {
        self.schemes_handled()
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }

    /// Receive the plugin's configuration section. Called once, before any
    /// transfer.
    fn configure(&mut self, _settings: &PluginSettings) -> Result<()> {
        Ok(())
    }

    async fn download_from(&self, source: &str, destination: &Path) -> Result<()>;

    async fn upload_to(&self, destination: &str, source: &Path, metadata: Option<&str>)
    -> Result<()>;

    async fn prepare_file_set(&self, _files: &FileSet) -> Result<()> {
        Ok(())
    }

    async fn finalize_file_set(&self, _files: &FileSet) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Transport for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn schemes_handled(&self) -> BTreeSet<String> {
            BTreeSet::from(["s3".to_string()])
        }

        async fn download_from(&self, _source: &str, _destination: &Path) -> Result<()> {
            Ok(())
        }

        async fn upload_to(
            &self,
            _destination: &str,
            _source: &Path,
            _metadata: Option<&str>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_handles_is_case_insensitive() {
        let transport: Box<dyn Transport> = Box::new(Echo);
        assert!(transport.handles("S3"));
        assert!(!transport.handles("gs"));
    }

    #[tokio::test]
    async fn test_batch_hooks_default_to_noop() {
        let mut files = FileSet::new();
        files.push("s3://b/k", "/tmp/k", None);
        assert!(Echo.prepare_file_set(&files).await.is_ok());
        assert!(Echo.finalize_file_set(&files).await.is_ok());
        assert_eq!(files.destinations().collect::<Vec<_>>(), vec!["s3://b/k"]);
    }
}
