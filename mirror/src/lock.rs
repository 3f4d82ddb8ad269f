use crate::error::{SyncError, SyncResult};
use fs4::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock on one bare repository, released when dropped
#[derive(Debug)]
pub struct RepositoryLock {
    path: PathBuf,
    _file: File,
}

impl RepositoryLock {
    /// Block until the lock for `repository_key` is held
    pub async fn acquire(lock_dir: &Path, repository_key: &str) -> SyncResult<Self> {
        let path = lock_path(lock_dir, repository_key);
        tokio::task::spawn_blocking(move || Self::acquire_blocking(path))
            .await
            .map_err(|e| SyncError::Lock {
                path: lock_dir.to_path_buf(),
                source: std::io::Error::other(e),
            })?
    }

    fn acquire_blocking(path: PathBuf) -> SyncResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::storage(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| SyncError::Lock {
                path: path.clone(),
                source,
            })?;

        file.lock_exclusive().map_err(|source| SyncError::Lock {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Acquired repository lock");
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Repository keys are page titles, so the file name is a digest of the key
fn lock_path(lock_dir: &Path, repository_key: &str) -> PathBuf {
    let digest = Sha256::digest(repository_key.as_bytes());
    lock_dir.join(format!("{}.lock", hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_lock_path_is_stable_and_flat() {
        let dir = Path::new("/srv/git/.locks");
        let a = lock_path(dir, "Talk:Main_Page/Archive");
        let b = lock_path(dir, "Talk:Main_Page/Archive");
        assert_eq!(a, b);
        assert_eq!(a.parent(), Some(dir));
        assert_ne!(a, lock_path(dir, "Main_Page"));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let lock_dir = dir.path().join(".locks");

        let first = RepositoryLock::acquire(&lock_dir, "E").await.unwrap();
        assert!(first.path().is_file());

        let released = Arc::new(AtomicBool::new(false));
        let observed = released.clone();
        let waiter_dir = lock_dir.clone();
        let waiter = tokio::spawn(async move {
            let _second = RepositoryLock::acquire(&waiter_dir, "E").await.unwrap();
            observed.load(Ordering::SeqCst)
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        released.store(true, Ordering::SeqCst);
        drop(first);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let _a = RepositoryLock::acquire(dir.path(), "A").await.unwrap();
        let _b = tokio::time::timeout(
            Duration::from_secs(5),
            RepositoryLock::acquire(dir.path(), "B"),
        )
        .await
        .unwrap()
        .unwrap();
    }
}
