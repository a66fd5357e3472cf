//! Content cache for downloads keyed by the remote identifier.
//!
//! An entry lives at `root/<hash[0..2]>/<hash[2..]>` where `hash` is the hex
//! SHA-1 of the remote path string. Entries are only ever added; nothing
//! expires or is revalidated.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use provision_fs::{FallbackStrategy, HardlinkOrCopyOptions, Placement, hardlink_or_copy};
use sha1::{Digest, Sha1};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::{ProvisionError, Result};

/// Hex SHA-1 of `remote`.
pub fn cache_key(remote: &str) -> String {
    hex::encode(Sha1::digest(remote.as_bytes()))
}

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

#[derive(Debug)]
pub struct ContentCache {
    root: PathBuf,
    locks: Arc<LockMap>,
}

/// Held while one identifier is being restored or downloaded. The map entry
/// goes away with the last holder.
#[derive(Debug)]
pub struct IdentifierLock {
    key: String,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentifierLock {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        // waiters clone the entry under the map lock, so a count of one means
        // nobody else can still reach it
        if locks
            .get(&self.key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, remote: &str) -> PathBuf {
        let key = cache_key(remote);
        let (shard, rest) = key.split_at(2);
        self.root.join(shard).join(rest)
    }

    /// Serialize work on one identifier. Different identifiers never wait on
    /// each other.
    pub async fn lock(&self, remote: &str) -> IdentifierLock {
        let key = cache_key(remote);
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        IdentifierLock {
            key,
            locks: Arc::clone(&self.locks),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Place the cached copy of `remote` at `local`. Returns `false` on a miss
    /// or when the entry cannot be placed at all.
    pub fn restore(&self, remote: &str, local: &Path) -> Result<bool> {
        let entry = self.entry_path(remote);
        if !entry.is_file() {
            debug!(remote, "cache miss");
            return Ok(false);
        }

        provision_fs::ensure_parent(local)?;
        if local.is_file() {
            fs::remove_file(local).map_err(|e| ProvisionError::Io {
                path: local.to_path_buf(),
                source: e,
            })?;
        }

        let options = HardlinkOrCopyOptions::new().fallback(FallbackStrategy::Copy);
        match hardlink_or_copy(&entry, local, &options) {
            Ok(Placement::Linked) => {
                info!(remote, local = %local.display(), "cache hit");
                Ok(true)
            }
            Ok(Placement::Copied { reason }) => {
                warn!(
                    remote,
                    local = %local.display(),
                    %reason,
                    "cache hit, but hard link failed; copied instead"
                );
                Ok(true)
            }
            Err(source) => {
                let err = ProvisionError::CacheLink {
                    remote: remote.to_string(),
                    local: local.to_path_buf(),
                    source,
                };
                warn!(error = %err, "cached copy unusable, downloading again");
                Ok(false)
            }
        }
    }

    /// Record the freshly downloaded `local` as the entry for `remote`.
    /// Directories are never cached.
    pub fn populate(&self, remote: &str, local: &Path) -> Result<()> {
        if !local.is_file() {
            debug!(remote, local = %local.display(), "not a regular file, not caching");
            return Ok(());
        }
        let entry = self.entry_path(remote);
        if entry.exists() {
            return Ok(());
        }
        provision_fs::ensure_parent(&entry)?;

        let options = HardlinkOrCopyOptions::new().fallback(FallbackStrategy::Copy);
        match hardlink_or_copy(local, &entry, &options) {
            Ok(_) => {
                debug!(remote, entry = %entry.display(), "cached download");
                Ok(())
            }
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_key_is_deterministic() {
        assert_eq!(cache_key("s3://bucket/a.txt"), cache_key("s3://bucket/a.txt"));
        assert_ne!(cache_key("s3://bucket/a.txt"), cache_key("s3://bucket/b.txt"));
        // sha1("abc")
        assert_eq!(cache_key("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_entry_path_is_sharded() {
        let cache = ContentCache::new("/cache");
        assert_eq!(
            cache.entry_path("abc"),
            PathBuf::from("/cache/a9/993e364706816aba3e25717850c26c9cd0d89d")
        );
    }

    #[test]
    fn test_populate_then_restore() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::new(dir.path().join("cache"));
        let downloaded = dir.path().join("first/reads.fq");
        fs::create_dir_all(downloaded.parent().unwrap()).unwrap();
        fs::write(&downloaded, "ACGT").unwrap();

        cache.populate("s3://b/reads.fq", &downloaded).unwrap();
        // second population is a no-op
        cache.populate("s3://b/reads.fq", &downloaded).unwrap();

        let restored = dir.path().join("second/inputs/reads.fq");
        assert!(cache.restore("s3://b/reads.fq", &restored).unwrap());
        assert_eq!(fs::read_to_string(&restored).unwrap(), "ACGT");
    }

    #[test]
    fn test_restore_miss() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        assert!(!cache.restore("gs://x/y", &dir.path().join("y")).unwrap());
    }

    #[test]
    fn test_directories_are_not_cached() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::new(dir.path().join("cache"));
        let tree = dir.path().join("tree");
        fs::create_dir(&tree).unwrap();

        cache.populate("s3://b/tree", &tree).unwrap();

        assert!(!cache.entry_path("s3://b/tree").exists());
    }

    #[tokio::test]
    async fn test_lock_is_per_identifier() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        let _a = cache.lock("s3://b/a").await;
        // a different identifier does not block
        let _b = cache.lock("s3://b/b").await;
        let again = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            cache.lock("s3://b/a"),
        )
        .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_lock_entries_are_released() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(ContentCache::new(dir.path()));
        for i in 0..10 {
            let _guard = cache.lock(&format!("s3://b/{i}")).await;
        }
        assert_eq!(cache.tracked_locks(), 0);

        let held = cache.lock("s3://b/a").await;
        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let _guard = cache.lock("s3://b/a").await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(held);
        // the waiter still needs the entry
        waiter.await.unwrap();
        assert_eq!(cache.tracked_locks(), 0);
    }
}
