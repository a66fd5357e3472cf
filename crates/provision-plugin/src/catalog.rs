//! The `plugins.json` catalog of plugins to install.
//!
//! ```json
//! [
//!   { "name": "dockstore-file-s3-plugin", "version": "0.0.7" },
//!   { "name": "custom", "version": "1.0.0", "location": "https://example.org/custom-1.0.0.zip" }
//! ]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use provision_transport::{RetryPolicy, Transport};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::archive::ARCHIVE_EXTENSION;
use crate::error::{PluginError, Result};

pub const ARTIFACT_BASE: &str = "https://artifacts.oicr.on.ca/artifactory/collab-release/io/dockstore";

/// Plugin archives are fetched with a single retry.
pub const INSTALL_RETRIES: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl CatalogEntry {
    /// Where the archive is downloaded from; the artifact repository layout
    /// unless the entry names a location.
    pub fn source(&self) -> String {
        match &self.location {
            Some(location) => location.clone(),
            None => format!(
                "{ARTIFACT_BASE}/{name}/{version}/{name}-{version}.{ARCHIVE_EXTENSION}",
                name = self.name,
                version = self.version
            ),
        }
    }

    pub fn archive_name(&self) -> String {
        format!("{}-{}.{ARCHIVE_EXTENSION}", self.name, self.version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub downloaded: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PluginCatalog {
    path: PathBuf,
    entries: Vec<CatalogEntry>,
}

impl PluginCatalog {
    /// Read the catalog, writing an empty one first if the file is missing.
    pub fn load_or_create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let invalid = |reason: String| PluginError::Catalog {
            path: path.clone(),
            reason,
        };

        if path.is_dir() {
            return Err(invalid("path is a directory".to_string()));
        }
        if !path.exists() {
            info!(path = %path.display(), "creating empty plugin catalog");
            provision_fs::ensure_parent(&path)?;
            fs::write(&path, "[]\n").map_err(|e| PluginError::io(&path, e))?;
        }

        let raw = fs::read_to_string(&path).map_err(|e| PluginError::io(&path, e))?;
        let entries = serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Download each entry's archive into `root` unless it is already there.
    pub async fn install(&self, root: &Path, transport: &dyn Transport) -> Result<InstallReport> {
        let policy = RetryPolicy::new(INSTALL_RETRIES);
        let mut report = InstallReport::default();
        fs::create_dir_all(root).map_err(|e| PluginError::io(root, e))?;

        for entry in &self.entries {
            let destination = root.join(entry.archive_name());
            if destination.exists() {
                info!(archive = %destination.display(), "plugin archive already present, skipping");
                report.skipped.push(destination);
                continue;
            }

            let source = entry.source();
            info!(%source, archive = %destination.display(), "downloading plugin");
            policy.download(transport, &source, &destination).await?;
            report.downloaded.push(destination);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_source_uses_artifact_layout() {
        let entry = CatalogEntry {
            name: "dockstore-file-s3-plugin".to_string(),
            version: "0.0.7".to_string(),
            location: None,
        };
        assert_eq!(
            entry.source(),
            "https://artifacts.oicr.on.ca/artifactory/collab-release/io/dockstore/dockstore-file-s3-plugin/0.0.7/dockstore-file-s3-plugin-0.0.7.zip"
        );
        assert_eq!(entry.archive_name(), "dockstore-file-s3-plugin-0.0.7.zip");
    }

    #[test]
    fn test_missing_catalog_is_created_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf/plugins.json");

        let catalog = PluginCatalog::load_or_create(&path).unwrap();

        assert!(catalog.entries().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "[]");
    }

    #[test]
    fn test_malformed_catalog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plugins.json");
        fs::write(&path, "{\"name\": 1}").unwrap();
        assert!(matches!(
            PluginCatalog::load_or_create(&path),
            Err(PluginError::Catalog { .. })
        ));
    }
}
