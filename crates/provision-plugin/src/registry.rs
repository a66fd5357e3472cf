use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use provision_transport::{PluginSettings, Transport};
use tracing::{debug, info, warn};

use crate::archive::{archive_path, expand_archives};
use crate::descriptor::PluginDescriptor;
use crate::error::{PluginError, Result};
use crate::index::PluginVersionIndex;
use crate::loader::PluginLoader;

/// Every parsed candidate directory plus the versions chosen from them.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub candidates: Vec<PluginDescriptor>,
    pub index: PluginVersionIndex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed_dirs: Vec<PathBuf>,
    pub removed_archives: Vec<PathBuf>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.removed_dirs.is_empty() && self.removed_archives.is_empty()
    }
}

#[derive(Clone)]
pub struct LoadedPlugin {
    pub descriptor: PluginDescriptor,
    pub transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("plugin_id", &self.descriptor.plugin_id)
            .field("version", &self.descriptor.version)
            .field("transport", &self.transport.name())
            .finish()
    }
}

/// Live plugins in registration order.
#[derive(Debug, Clone, Default)]
pub struct PluginSet {
    plugins: Vec<LoadedPlugin>,
}

impl PluginSet {
    pub fn new(plugins: Vec<LoadedPlugin>) -> Self {
        Self { plugins }
    }

    pub fn get(&self, position: usize) -> Option<&LoadedPlugin> {
        self.plugins.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedPlugin> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// The plugin root directory: one subdirectory per installed plugin version,
/// optionally with the `<dir>.zip` it was expanded from.
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    root: PathBuf,
}

impl PluginRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root if needed and expand packaged installs.
    pub fn prepare_root(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            info!(root = %self.root.display(), "creating plugin directory");
            fs::create_dir_all(&self.root).map_err(|e| PluginError::io(&self.root, e))?;
        }
        expand_archives(&self.root)
    }

    /// Parse every plugin directory and pick the version to keep per id.
    pub fn discover(&self) -> Result<Discovery> {
        let mut dirs = fs::read_dir(&self.root)
            .map_err(|e| PluginError::io(&self.root, e))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect::<Vec<_>>();
        dirs.sort();

        let candidates = dirs
            .iter()
            .map(PluginDescriptor::load)
            .collect::<Result<Vec<_>>>()?;
        let index = PluginVersionIndex::build(&candidates);
        debug!(
            candidates = candidates.len(),
            retained = index.len(),
            "plugin discovery finished"
        );

        Ok(Discovery { candidates, index })
    }

    /// Delete every candidate directory the index does not retain, with its
    /// sibling archive.
    pub fn cleanup(&self, discovery: &Discovery) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        for candidate in &discovery.candidates {
            let dir = &candidate.install_directory;
            if discovery.index.retains(dir) {
                continue;
            }

            info!(
                plugin = %candidate.plugin_id,
                version = %candidate.version,
                dir = %dir.display(),
                "removing superseded plugin version"
            );
            fs::remove_dir_all(dir).map_err(|source| PluginError::DirectoryConflict {
                dir: dir.clone(),
                source,
            })?;
            report.removed_dirs.push(dir.clone());

            let archive = archive_path(dir);
            if archive.exists() {
                match fs::remove_file(&archive) {
                    Ok(()) => report.removed_archives.push(archive),
                    Err(e) => {
                        warn!(archive = %archive.display(), error = %e, "could not remove plugin archive")
                    }
                }
            }
        }
        Ok(report)
    }

    /// Instantiate one transport per retained plugin. `settings` holds the
    /// configuration section of each plugin id.
    pub fn load(
        &self,
        index: &PluginVersionIndex,
        loader: &PluginLoader,
        settings: &BTreeMap<String, PluginSettings>,
    ) -> Result<PluginSet> {
        let empty = PluginSettings::new();
        let mut plugins = Vec::with_capacity(index.len());
        for descriptor in index.iter() {
            let section = settings.get(&descriptor.plugin_id).unwrap_or(&empty);
            let transport = loader.load(descriptor, section)?;

            // the live plugin's answer is what routing uses
            let mut descriptor = descriptor.clone();
            let handled: BTreeSet<String> = transport
                .schemes_handled()
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect();
            if handled != descriptor.declared_schemes {
                warn!(
                    plugin = %descriptor.plugin_id,
                    declared = ?descriptor.declared_schemes,
                    handled = ?handled,
                    "plugin handles different schemes than its descriptor declares"
                );
                descriptor.declared_schemes = handled;
            }

            info!(
                plugin = %descriptor.plugin_id,
                version = %descriptor.version,
                schemes = ?descriptor.declared_schemes,
                "loaded plugin"
            );
            plugins.push(LoadedPlugin {
                descriptor,
                transport,
            });
        }
        Ok(PluginSet::new(plugins))
    }

    /// Prepare, discover, clean up and load, in that order.
    pub fn initialize(
        &self,
        loader: &PluginLoader,
        settings: &BTreeMap<String, PluginSettings>,
    ) -> Result<PluginSet> {
        self.prepare_root()?;
        let discovery = self.discover()?;
        self.cleanup(&discovery)?;
        self.load(&discovery.index, loader, settings)
    }
}
