use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Download,
    Upload,
}

/// One file or directory to move between the working directory and a
/// remote location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub logical_id: String,
    /// URI or bare filesystem path.
    pub remote_path: String,
    pub local_path: PathBuf,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub direction: Direction,
}

impl TransferRequest {
    pub fn download(
        logical_id: impl Into<String>,
        remote_path: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            remote_path: remote_path.into(),
            local_path: local_path.into(),
            is_directory: false,
            metadata: None,
            direction: Direction::Download,
        }
    }

    pub fn upload(
        logical_id: impl Into<String>,
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
    ) -> Self {
        Self {
            direction: Direction::Upload,
            ..Self::download(logical_id, remote_path, local_path)
        }
    }

    pub fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }

    pub fn metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    UnsupportedScheme,
    TransferFailed,
    CacheLinkFailed,
    PluginDescriptorInvalid,
    PluginDirectoryConflict,
    InvalidConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub logical_id: String,
    pub success: bool,
    pub resolved_local_path: PathBuf,
    /// Final remote location of an upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_remote_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl TransferOutcome {
    pub(crate) fn succeeded(logical_id: &str, local: PathBuf, remote: Option<String>) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            success: true,
            resolved_local_path: local,
            resolved_remote_path: remote,
            error: None,
        }
    }

    pub(crate) fn failed(logical_id: &str, local: PathBuf, error: Option<ErrorKind>) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            success: false,
            resolved_local_path: local,
            resolved_remote_path: None,
            error,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub outcomes: Vec<TransferOutcome>,
}

impl ProvisionReport {
    pub fn new(outcomes: Vec<TransferOutcome>) -> Self {
        Self { outcomes }
    }

    /// Logical id to local path for every successful transfer.
    pub fn localized(&self) -> BTreeMap<String, PathBuf> {
        self.outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| (o.logical_id.clone(), o.resolved_local_path.clone()))
            .collect()
    }

    /// Logical id to remote location for every successful upload.
    pub fn uploaded(&self) -> BTreeMap<String, String> {
        self.outcomes
            .iter()
            .filter(|o| o.success)
            .filter_map(|o| {
                o.resolved_remote_path
                    .clone()
                    .map(|remote| (o.logical_id.clone(), remote))
            })
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    pub fn extend(&mut self, other: ProvisionReport) {
        self.outcomes.extend(other.outcomes);
    }
}
