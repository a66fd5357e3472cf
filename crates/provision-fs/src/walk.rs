use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the walked root.
    pub relative: PathBuf,
    pub is_dir: bool,
}

/// List everything below `root`, parents before children, siblings in name
/// order. Excluded names are pruned together with their subtrees. Symbolic
/// links to directories are skipped.
pub fn walk_tree(root: impl AsRef<Path>, exclude: &[OsString]) -> Result<Vec<TreeEntry>> {
    let root = root.as_ref();
    let mut entries = Vec::new();
    walk_into(root, Path::new(""), exclude, &mut entries)?;
    Ok(entries)
}

fn walk_into(
    dir: &Path,
    relative: &Path,
    exclude: &[OsString],
    out: &mut Vec<TreeEntry>,
) -> Result<()> {
    let read_err = |source| Error::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut children = fs::read_dir(dir)
        .map_err(read_err)?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(read_err)?;
    children.sort_by_key(|entry| entry.file_name());

    for child in children {
        let name = child.file_name();
        if exclude.contains(&name) {
            continue;
        }
        let file_type = child.file_type().map_err(|source| Error::Read {
            path: child.path(),
            source,
        })?;
        // linked directories are not followed; linked files count as files
        if file_type.is_symlink() && child.path().is_dir() {
            continue;
        }
        let child_relative = relative.join(&name);
        let is_dir = file_type.is_dir();
        out.push(TreeEntry {
            relative: child_relative.clone(),
            is_dir,
        });
        if is_dir {
            walk_into(&child.path(), &child_relative, exclude, out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_walk_orders_parents_first() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b/c")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("b/c/d.txt"), "d").unwrap();

        let entries = walk_tree(dir.path(), &[]).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.relative.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b"),
                PathBuf::from("b/c"),
                PathBuf::from("b/c/d.txt"),
            ]
        );
        assert!(entries[1].is_dir);
        assert!(!entries[3].is_dir);
    }

    #[test]
    fn test_walk_prunes_excluded() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("datastore/inner")).unwrap();
        std::fs::write(dir.path().join("keep.txt"), "k").unwrap();

        let entries = walk_tree(dir.path(), &[OsString::from("datastore")]).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative, PathBuf::from("keep.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_does_not_follow_directory_links() {
        let dir = tempdir().unwrap();
        let results = dir.path().join("results");
        std::fs::create_dir_all(&results).unwrap();
        std::fs::write(results.join("out.txt"), "o").unwrap();
        std::os::unix::fs::symlink("..", results.join("loop")).unwrap();
        std::os::unix::fs::symlink("out.txt", results.join("alias.txt")).unwrap();

        let entries = walk_tree(&results, &[]).unwrap();
        assert_eq!(
            entries,
            vec![
                TreeEntry {
                    relative: PathBuf::from("alias.txt"),
                    is_dir: false,
                },
                TreeEntry {
                    relative: PathBuf::from("out.txt"),
                    is_dir: false,
                },
            ]
        );
    }
}
