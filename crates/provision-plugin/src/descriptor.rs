use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::Deserialize;

use crate::error::{PluginError, Result};

/// File every installed plugin directory carries at its top level.
pub const DESCRIPTOR_FILE: &str = "plugin.toml";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DescriptorFile {
    id: String,
    version: Version,
    schemes: Vec<String>,
    #[serde(default)]
    entry: Option<PathBuf>,
    #[serde(default)]
    batch_hooks: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Metadata of one installed plugin version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub plugin_id: String,
    pub version: Version,
    pub install_directory: PathBuf,
    /// Lower-cased URI schemes.
    pub declared_schemes: BTreeSet<String>,
    /// Executable driven by the command adapter, resolved against the
    /// install directory.
    pub entry: Option<PathBuf>,
    /// Whether the executable understands `prepare` and `finalize`.
    pub batch_hooks: bool,
    pub description: Option<String>,
}

impl PluginDescriptor {
    pub fn load(install_directory: impl AsRef<Path>) -> Result<Self> {
        let dir = install_directory.as_ref();
        let invalid = |reason: String| PluginError::DescriptorInvalid {
            dir: dir.to_path_buf(),
            reason,
        };

        let path = dir.join(DESCRIPTOR_FILE);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| invalid(format!("cannot read {DESCRIPTOR_FILE}: {e}")))?;
        let file: DescriptorFile = toml::from_str(&raw).map_err(|e| invalid(e.to_string()))?;

        if file.id.trim().is_empty() {
            return Err(invalid("empty plugin id".to_string()));
        }
        if file.schemes.is_empty() {
            return Err(invalid("no schemes declared".to_string()));
        }

        Ok(Self {
            plugin_id: file.id,
            version: file.version,
            install_directory: dir.to_path_buf(),
            declared_schemes: file.schemes.iter().map(|s| s.to_ascii_lowercase()).collect(),
            entry: file.entry.map(|entry| dir.join(entry)),
            batch_hooks: file.batch_hooks,
            description: file.description,
        })
    }

    pub fn handles(&self, scheme: &str) -> bool {
        self.declared_schemes.contains(&scheme.to_ascii_lowercase())
    }
}
