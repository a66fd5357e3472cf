//! Expansion of packaged plugin installs (`<name>.zip` next to the plugin
//! directories).

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::error::{PluginError, Result};

pub const ARCHIVE_EXTENSION: &str = "zip";

/// Expand every `<name>.zip` in `root` that has no `<name>/` directory yet.
/// Returns the directories created.
pub fn expand_archives(root: &Path) -> Result<Vec<PathBuf>> {
    let mut archives = fs::read_dir(root)
        .map_err(|e| PluginError::io(root, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension() == Some(OsStr::new(ARCHIVE_EXTENSION)))
        .collect::<Vec<_>>();
    archives.sort();

    let mut expanded = Vec::new();
    for archive in archives {
        let target = archive.with_extension("");
        if target.exists() {
            debug!(archive = %archive.display(), "plugin archive already expanded");
            continue;
        }
        info!(archive = %archive.display(), "expanding plugin archive");
        extract_zip(&archive, &target)?;
        expanded.push(target);
    }
    Ok(expanded)
}

/// Extract `archive` into `target`. Entries are written to a hidden staging
/// directory that is renamed into place once complete. When every entry sits
/// under one top-level directory that directory is stripped.
pub fn extract_zip(archive: &Path, target: &Path) -> Result<()> {
    let corrupted = |reason: String| PluginError::Archive {
        path: archive.to_path_buf(),
        reason,
    };

    let file = fs::File::open(archive).map_err(|e| PluginError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| corrupted(e.to_string()))?;

    let mut names = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let entry = zip.by_index(index).map_err(|e| corrupted(e.to_string()))?;
        let name = entry.enclosed_name().ok_or_else(|| PluginError::ZipSlip {
            entry: entry.name().to_string(),
        })?;
        names.push((name, entry.is_dir()));
    }
    let strip = common_root(&names);

    let staging = staging_dir(target);
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| PluginError::io(&staging, e))?;
    }
    fs::create_dir_all(&staging).map_err(|e| PluginError::io(&staging, e))?;

    let written = (|| -> Result<()> {
        for (index, (name, is_dir)) in names.iter().enumerate() {
            let relative = match &strip {
                Some(prefix) => match name.strip_prefix(prefix) {
                    Ok(rest) if rest.as_os_str().is_empty() => continue,
                    Ok(rest) => rest.to_path_buf(),
                    Err(_) => name.clone(),
                },
                None => name.clone(),
            };
            let out = staging.join(&relative);

            if *is_dir {
                fs::create_dir_all(&out).map_err(|e| PluginError::io(&out, e))?;
                continue;
            }
            provision_fs::ensure_parent(&out)?;
            let mut entry = zip.by_index(index).map_err(|e| corrupted(e.to_string()))?;
            let mut dest = fs::File::create(&out).map_err(|e| PluginError::io(&out, e))?;
            io::copy(&mut entry, &mut dest).map_err(|e| PluginError::io(&out, e))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&out, fs::Permissions::from_mode(mode))
                    .map_err(|e| PluginError::io(&out, e))?;
            }
        }
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }
    fs::rename(&staging, target).map_err(|e| PluginError::io(target, e))
}

/// The archive a plugin directory would have been expanded from.
pub fn archive_path(dir: &Path) -> PathBuf {
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(ARCHIVE_EXTENSION);
    dir.with_file_name(name)
}

fn staging_dir(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.expanding"))
}

/// The single top-level directory shared by every entry, if there is one.
fn common_root(names: &[(PathBuf, bool)]) -> Option<PathBuf> {
    let mut root: Option<&OsStr> = None;
    for (name, is_dir) in names {
        let mut components = name.components();
        let first = match components.next() {
            Some(Component::Normal(first)) => first,
            _ => return None,
        };
        // a file at the top level means there is no wrapping directory
        if components.next().is_none() && !is_dir {
            return None;
        }
        match root {
            None => root = Some(first),
            Some(existing) if existing == first => {}
            Some(_) => return None,
        }
    }
    root.map(PathBuf::from)
}
