use std::collections::HashMap;
use std::sync::Arc;

use provision_transport::{PluginSettings, Transport};
use tracing::debug;

use crate::command::CommandTransport;
use crate::descriptor::PluginDescriptor;
use crate::error::{PluginError, Result};

type TransportFactory = Box<dyn Fn(&PluginDescriptor) -> Box<dyn Transport> + Send + Sync>;

/// Turns descriptors into live transports.
///
/// A factory registered under the plugin id takes precedence; otherwise the
/// descriptor's `entry` executable is driven through [`CommandTransport`].
#[derive(Default)]
pub struct PluginLoader {
    factories: HashMap<String, TransportFactory>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, plugin_id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&PluginDescriptor) -> Box<dyn Transport> + Send + Sync + 'static,
    {
        self.factories.insert(plugin_id.into(), Box::new(factory));
        self
    }

    pub fn load(
        &self,
        descriptor: &PluginDescriptor,
        settings: &PluginSettings,
    ) -> Result<Arc<dyn Transport>> {
        let mut transport: Box<dyn Transport> =
            if let Some(factory) = self.factories.get(&descriptor.plugin_id) {
                debug!(plugin = %descriptor.plugin_id, "using built-in plugin implementation");
                factory(descriptor)
            } else if let Some(command) = CommandTransport::from_descriptor(descriptor) {
                Box::new(command)
            } else {
                return Err(PluginError::DescriptorInvalid {
                    dir: descriptor.install_directory.clone(),
                    reason: format!(
                        "plugin {} has no entry executable and no built-in implementation",
                        descriptor.plugin_id
                    ),
                });
            };

        transport
            .configure(settings)
            .map_err(|source| PluginError::Configure {
                id: descriptor.plugin_id.clone(),
                source,
            })?;
        Ok(Arc::from(transport))
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
