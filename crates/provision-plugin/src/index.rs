use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::descriptor::PluginDescriptor;

/// Highest installed version of each plugin id, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct PluginVersionIndex {
    retained: Vec<PluginDescriptor>,
    positions: HashMap<String, usize>,
}

impl PluginVersionIndex {
    /// Keep the greatest version per id. On a tie the earlier candidate stays.
    pub fn build<'a>(candidates: impl IntoIterator<Item = &'a PluginDescriptor>) -> Self {
        let mut index = Self::default();
        for candidate in candidates {
            match index.positions.get(&candidate.plugin_id) {
                None => {
                    index
                        .positions
                        .insert(candidate.plugin_id.clone(), index.retained.len());
                    index.retained.push(candidate.clone());
                }
                Some(&pos) if candidate.version > index.retained[pos].version => {
                    debug!(
                        plugin = %candidate.plugin_id,
                        from = %index.retained[pos].version,
                        to = %candidate.version,
                        "newer plugin version found"
                    );
                    index.retained[pos] = candidate.clone();
                }
                Some(_) => {}
            }
        }
        index
    }

    pub fn get(&self, plugin_id: &str) -> Option<&PluginDescriptor> {
        self.positions.get(plugin_id).map(|&pos| &self.retained[pos])
    }

    pub fn retains(&self, install_directory: &Path) -> bool {
        self.retained
            .iter()
            .any(|d| d.install_directory == install_directory)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.retained.iter()
    }

    pub fn len(&self) -> usize {
        self.retained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }
}
