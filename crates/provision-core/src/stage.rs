use std::ffi::OsString;
use std::path::{Path, PathBuf};

use provision_fs::{FallbackStrategy, HardlinkOrCopyOptions, Placement, hardlink_or_copy};
use tracing::{info, warn};

use crate::error::{ProvisionError, Result};

/// Places inputs that are already on the local filesystem.
#[derive(Debug, Clone)]
pub struct Stager {
    working_dir: PathBuf,
    options: HardlinkOrCopyOptions,
}

impl Stager {
    pub fn new(working_dir: impl Into<PathBuf>, excludes: Vec<OsString>) -> Self {
        Self {
            working_dir: working_dir.into(),
            options: HardlinkOrCopyOptions::new()
                .fallback(FallbackStrategy::Copy)
                .exclude(excludes),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Absolute paths stay as they are; relative ones are taken from the
    /// working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Hard-link `source` to `local`, copying (recursively for directories)
    /// when that fails. Both paths are resolved against the working directory.
    pub fn stage(&self, source: &Path, local: &Path) -> Result<Placement> {
        let source = self.resolve(source);
        let local = self.resolve(local);
        let stage_error = |e: provision_fs::Error| ProvisionError::Stage {
            source_path: source.clone(),
            local: local.clone(),
            source: e,
        };

        provision_fs::ensure_parent(&local).map_err(stage_error)?;
        let placement = hardlink_or_copy(&source, &local, &self.options).map_err(stage_error)?;
        match &placement {
            Placement::Linked => {
                info!(source = %source.display(), local = %local.display(), "linked local input")
            }
            Placement::Copied { reason } => warn!(
                source = %source.display(),
                local = %local.display(),
                %reason,
                "hard link failed, copied local input"
            ),
        }
        Ok(placement)
    }
}
