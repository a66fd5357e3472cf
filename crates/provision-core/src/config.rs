//! Provisioning settings read from `~/.dockstore/config.toml`.
//!
//! ```toml
//! file-provision-threads = 4
//! file-provision-retries = 3
//! use-cache = true
//! cache-dir = "~/.dockstore/cache"
//! file-plugins-location = "~/.dockstore/plugins"
//!
//! [s3-plugin]
//! endpoint = "https://minio.local"
//! ```
//!
//! Every table whose name is not a known key is handed to the plugin with
//! that id, values stringified.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use provision_transport::{DEFAULT_MAX_RETRIES, PluginSettings, RetryPolicy};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ProvisionError, Result};

pub const CONFIG_DIR: &str = ".dockstore";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_THREADS: usize = 1;
pub const DEFAULT_EXCLUDES: &[&str] = &["datastore"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    file_provision_threads: Option<i64>,
    file_provision_retries: Option<i64>,
    use_cache: Option<toml::Value>,
    cache_dir: Option<String>,
    file_plugins_location: Option<String>,
    plugins_json_location: Option<String>,
    file_provision_timeout: Option<u64>,
    provision_excludes: Option<Vec<String>>,
    #[serde(flatten)]
    rest: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    threads: usize,
    retries: u32,
    use_cache: bool,
    cache_dir: PathBuf,
    plugin_dir: PathBuf,
    catalog_path: PathBuf,
    attempt_timeout: Option<Duration>,
    excludes: Vec<String>,
    plugin_settings: BTreeMap<String, PluginSettings>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self::with_base(&default_base())
    }
}

fn default_base() -> PathBuf {
    home::home_dir().unwrap_or_default().join(CONFIG_DIR)
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => home::home_dir().unwrap_or_default().join(rest),
        None if raw == "~" => home::home_dir().unwrap_or_default(),
        None => PathBuf::from(raw),
    }
}

/// `true`, `use` and `t` in any case enable the cache.
fn truthy(value: &toml::Value) -> Option<bool> {
    match value {
        toml::Value::Boolean(b) => Some(*b),
        toml::Value::String(s) => Some(matches!(
            s.to_ascii_lowercase().as_str(),
            "true" | "use" | "t"
        )),
        _ => None,
    }
}

fn stringify(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ProvisionConfig {
    /// Defaults with every location under `base`.
    pub fn with_base(base: &Path) -> Self {
        Self {
            threads: DEFAULT_THREADS,
            retries: DEFAULT_MAX_RETRIES,
            use_cache: false,
            cache_dir: base.join("cache"),
            plugin_dir: base.join("plugins"),
            catalog_path: base.join("plugins.json"),
            attempt_timeout: None,
            excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            plugin_settings: BTreeMap::new(),
        }
    }

    pub fn default_path() -> PathBuf {
        default_base().join(CONFIG_FILE)
    }

    /// Read `path`, or the default location when `None`. A missing file
    /// yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path).map_err(|e| ProvisionError::Io {
            path: path.clone(),
            source: e,
        })?;
        Self::parse(&raw, &path)
    }

    /// Parse TOML text. `origin` only labels errors.
    pub fn parse(raw: &str, origin: &Path) -> Result<Self> {
        let invalid = |reason: String| ProvisionError::Config {
            path: origin.to_path_buf(),
            reason,
        };
        let raw: RawConfig = toml::from_str(raw).map_err(|e| invalid(e.to_string()))?;
        let mut config = Self::default();

        if let Some(threads) = raw.file_provision_threads {
            if threads < 1 {
                return Err(invalid(format!(
                    "file-provision-threads must be at least 1, got {threads}"
                )));
            }
            config.threads = threads as usize;
        }
        if let Some(retries) = raw.file_provision_retries {
            config.retries = u32::try_from(retries).map_err(|_| {
                invalid(format!("file-provision-retries must be non-negative, got {retries}"))
            })?;
        }
        if let Some(value) = &raw.use_cache {
            config.use_cache = truthy(value)
                .ok_or_else(|| invalid(format!("use-cache must be a boolean, got {value}")))?;
        }
        if let Some(dir) = &raw.cache_dir {
            config.cache_dir = expand_home(dir);
        }
        if let Some(dir) = &raw.file_plugins_location {
            config.plugin_dir = expand_home(dir);
        }
        if let Some(path) = &raw.plugins_json_location {
            config.catalog_path = expand_home(path);
        }
        config.attempt_timeout = raw.file_provision_timeout.map(Duration::from_secs);
        if let Some(excludes) = raw.provision_excludes {
            config.excludes = excludes;
        }

        for (key, value) in &raw.rest {
            match value {
                toml::Value::Table(table) => {
                    let settings = table
                        .iter()
                        .map(|(k, v)| (k.clone(), stringify(v)))
                        .collect();
                    config.plugin_settings.insert(key.clone(), settings);
                }
                _ => warn!(key, "ignoring unknown configuration key"),
            }
        }

        Ok(config)
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = dir.into();
        self
    }

    pub fn catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = path.into();
        self
    }

    pub fn attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn excludes(mut self, excludes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excludes = excludes.into_iter().map(Into::into).collect();
        self
    }

    pub fn plugin_section(mut self, plugin_id: impl Into<String>, settings: PluginSettings) -> Self {
        self.plugin_settings.insert(plugin_id.into(), settings);
        self
    }

    pub fn get_threads(&self) -> usize {
        self.threads
    }

    pub fn get_retries(&self) -> u32 {
        self.retries
    }

    pub fn get_use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn get_cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn get_plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    pub fn get_catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn get_attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    pub fn get_excludes(&self) -> &[String] {
        &self.excludes
    }

    pub fn exclude_names(&self) -> Vec<OsString> {
        self.excludes.iter().map(OsString::from).collect()
    }

    pub fn get_plugin_settings(&self) -> &BTreeMap<String, PluginSettings> {
        &self.plugin_settings
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries).attempt_timeout(self.attempt_timeout)
    }
}
