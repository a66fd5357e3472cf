use std::ffi::OsString;
use std::io;
use std::path::Path;

use crate::copy_dir::copy_dir_all;
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallbackStrategy {
    #[default]
    Copy,
    Error,
}

#[derive(Clone, Debug, Default)]
pub struct HardlinkOrCopyOptions {
    fallback: FallbackStrategy,
    exclude: Vec<OsString>,
}

impl HardlinkOrCopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Entry names skipped when the fallback copies a directory.
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.exclude = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn get_fallback(&self) -> FallbackStrategy {
        self.fallback
    }

    pub fn excluded(&self) -> &[OsString] {
        &self.exclude
    }
}

/// How a file ended up at its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Linked,
    /// The hard link failed and the content was copied instead.
    Copied { reason: String },
}

impl Placement {
    pub fn is_linked(&self) -> bool {
        matches!(self, Placement::Linked)
    }
}

/// Hard-link `src` to `dest`, copying when linking is impossible.
///
/// Directories cannot be hard-linked, so they always take the copy path when
/// the fallback allows it. An existing `dest` is never overwritten.
pub fn hardlink_or_copy(
    src: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    options: &HardlinkOrCopyOptions,
) -> Result<Placement> {
    let src = src.as_ref();
    let dest = dest.as_ref();

    if !src.exists() {
        return Err(Error::NotFound(src.to_path_buf()));
    }
    if dest.exists() {
        return Err(Error::AlreadyExists(dest.to_path_buf()));
    }

    let link_error = match std::fs::hard_link(src, dest) {
        Ok(()) => return Ok(Placement::Linked),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(Error::AlreadyExists(dest.to_path_buf()));
        }
        Err(e) => e,
    };

    match options.get_fallback() {
        FallbackStrategy::Error => Err(Error::Link {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            source: link_error,
        }),
        FallbackStrategy::Copy => {
            if src.is_dir() {
                copy_dir_all(src, dest, options.excluded())?;
            } else {
                std::fs::copy(src, dest).map_err(|e| Error::Write {
                    path: dest.to_path_buf(),
                    source: e,
                })?;
            }
            Ok(Placement::Copied {
                reason: link_error.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hardlink_or_copy_links_files() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dest = dir.path().join("dest.txt");
        std::fs::write(&src, "data").unwrap();

        let placement = hardlink_or_copy(&src, &dest, &HardlinkOrCopyOptions::new()).unwrap();
        assert!(placement.is_linked());
        assert_eq!(std::fs::read(&dest).unwrap(), b"data");
    }

    #[test]
    fn test_directory_falls_back_to_copy() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("datastore")).unwrap();
        std::fs::write(src.join("a.txt"), "a").unwrap();
        std::fs::write(src.join("datastore/state"), "x").unwrap();
        let dest = dir.path().join("dest");

        let options = HardlinkOrCopyOptions::new().exclude(["datastore"]);
        let placement = hardlink_or_copy(&src, &dest, &options).unwrap();

        assert!(matches!(placement, Placement::Copied { .. }));
        assert!(dest.join("a.txt").exists());
        assert!(!dest.join("datastore").exists());
    }

    #[test]
    fn test_directory_with_error_fallback() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();

        let options = HardlinkOrCopyOptions::new().fallback(FallbackStrategy::Error);
        let err = hardlink_or_copy(&src, dir.path().join("dest"), &options).unwrap_err();
        assert!(matches!(err, Error::Link { .. }));
    }

    #[test]
    fn test_existing_destination_is_reported() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dest = dir.path().join("dest.txt");
        std::fs::write(&src, "new").unwrap();
        std::fs::write(&dest, "old").unwrap();

        let err = hardlink_or_copy(&src, &dest, &HardlinkOrCopyOptions::new()).unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
    }

    #[test]
    fn test_missing_source() {
        let dir = tempdir().unwrap();
        let err = hardlink_or_copy(
            dir.path().join("nope"),
            dir.path().join("dest"),
            &HardlinkOrCopyOptions::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
