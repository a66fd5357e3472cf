use std::sync::Arc;

use provision_plugin::PluginSet;
use provision_transport::{GenericTransport, Target, Transport, TransportError};
use tracing::{debug, warn};

/// Which transport serves a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Position in the plugin set.
    Plugin(usize),
    Generic,
}

/// Maps a remote path to the plugin that declared its scheme, or to the
/// generic transport.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    plugins: PluginSet,
    generic: Arc<GenericTransport>,
}

impl Dispatcher {
    pub fn new(plugins: PluginSet, generic: GenericTransport) -> Self {
        Self {
            plugins,
            generic: Arc::new(generic),
        }
    }

    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }

    pub fn generic(&self) -> &GenericTransport {
        &self.generic
    }

    /// The first plugin in registration order whose transport handles the
    /// scheme wins.
    pub fn resolve(&self, target: &str) -> Result<Route, TransportError> {
        let scheme = match Target::parse(target)? {
            Target::Local(_) => return Ok(Route::Generic),
            Target::Remote(url) => url.scheme().to_string(),
        };

        let matches: Vec<usize> = self
            .plugins
            .iter()
            .enumerate()
            .filter(|(_, plugin)| plugin.transport.handles(&scheme))
            .map(|(position, _)| position)
            .collect();

        if let Some(&first) = matches.first() {
            if matches.len() > 1 {
                let claimants: Vec<&str> = matches
                    .iter()
                    .filter_map(|&p| self.plugins.get(p))
                    .map(|p| p.descriptor.plugin_id.as_str())
                    .collect();
                warn!(%scheme, ?claimants, "several plugins handle this scheme, using the first");
            }
            debug!(remote = target, %scheme, plugin = %self.name(Route::Plugin(first)), "dispatching to plugin");
            return Ok(Route::Plugin(first));
        }

        if GenericTransport::supports(&scheme) {
            debug!(remote = target, %scheme, "dispatching to generic transport");
            Ok(Route::Generic)
        } else {
            Err(TransportError::UnsupportedScheme {
                scheme,
                target: target.to_string(),
            })
        }
    }

    pub fn transport(&self, route: Route) -> Arc<dyn Transport> {
        match route {
            Route::Plugin(position) => match self.plugins.get(position) {
                Some(plugin) => Arc::clone(&plugin.transport),
                None => self.generic_transport(),
            },
            Route::Generic => self.generic_transport(),
        }
    }

    fn generic_transport(&self) -> Arc<dyn Transport> {
        self.generic.clone()
    }

    pub fn name(&self, route: Route) -> &str {
        match route {
            Route::Plugin(position) => self
                .plugins
                .get(position)
                .map(|p| p.descriptor.plugin_id.as_str())
                .unwrap_or("generic"),
            Route::Generic => "generic",
        }
    }
}
