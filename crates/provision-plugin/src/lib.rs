//! Transport plugins installed under a plugin root directory.
//!
//! Each subdirectory of the root holds one installed version of a plugin and
//! a `plugin.toml` descriptor:
//!
//! ```toml
//! id = "s3-plugin"
//! version = "1.2.0"
//! schemes = ["s3"]
//! entry = "bin/s3-plugin"
//! batch-hooks = true
//! ```
//!
//! [`PluginRegistry::initialize`] expands packaged `.zip` installs, keeps the
//! highest version of every plugin id, deletes the rest and loads what
//! remains into a [`PluginSet`].

mod archive;
mod catalog;
mod command;
mod descriptor;
mod error;
mod index;
mod loader;
mod registry;

pub use archive::{archive_path, expand_archives, extract_zip};
pub use catalog::{ARTIFACT_BASE, CatalogEntry, INSTALL_RETRIES, InstallReport, PluginCatalog};
pub use command::{CommandTransport, ENV_PREFIX};
pub use descriptor::{DESCRIPTOR_FILE, PluginDescriptor};
pub use error::{PluginError, Result};
pub use index::PluginVersionIndex;
pub use loader::PluginLoader;
pub use registry::{CleanupReport, Discovery, LoadedPlugin, PluginRegistry, PluginSet};
