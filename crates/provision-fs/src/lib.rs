//! Filesystem primitives for staging workflow files.
//!
//! - [`hardlink_or_copy`]: place a file or directory without duplicating bytes
//!   when the filesystem allows it
//! - [`copy_dir_all`]: recursive copy with name exclusions
//! - [`walk_tree`]: deterministic listing used to mirror a directory elsewhere

mod copy_dir;
mod error;
mod link;
mod walk;

pub use copy_dir::copy_dir_all;
pub use error::{Error, Result};
pub use link::{FallbackStrategy, HardlinkOrCopyOptions, Placement, hardlink_or_copy};
pub use walk::{TreeEntry, walk_tree};

use std::path::Path;

/// Create the parent directory of `path` if it is missing.
pub fn ensure_parent(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(|e| Error::Write {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        _ => Ok(()),
    }
}
