use std::ffi::OsString;
use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// Recursively copy `src` into `dest`, skipping entries whose file name is in
/// `exclude` at any depth.
pub fn copy_dir_all(
    src: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    exclude: &[OsString],
) -> Result<()> {
    let src = src.as_ref();
    let dest = dest.as_ref();

    if !dest.exists() {
        fs::create_dir_all(dest).map_err(|e| Error::Write {
            path: dest.to_path_buf(),
            source: e,
        })?;
    }

    for entry in fs::read_dir(src).map_err(|e| Error::Read {
        path: src.to_path_buf(),
        source: e,
    })? {
        let entry = entry.map_err(|e| Error::Read {
            path: src.to_path_buf(),
            source: e,
        })?;
        if exclude.iter().any(|name| *name == entry.file_name()) {
            continue;
        }
        let file_type = entry.file_type().map_err(|e| Error::Read {
            path: entry.path(),
            source: e,
        })?;

        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir_all(&src_path, &dest_path, exclude)?;
        } else if file_type.is_symlink() {
            copy_symlink(&src_path, &dest_path)?;
        } else {
            fs::copy(&src_path, &dest_path).map_err(|e| Error::Write {
                path: dest_path,
                source: e,
            })?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(src).map_err(|e| Error::Read {
        path: src.to_path_buf(),
        source: e,
    })?;
    std::os::unix::fs::symlink(target, dest).map_err(|e| Error::Write {
        path: dest.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest).map(drop).map_err(|e| Error::Write {
        path: dest.to_path_buf(),
        source: e,
    })
}
