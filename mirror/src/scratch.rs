//! Ephemeral working directories for building commits.

use crate::error::{SyncError, SyncResult};
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A uniquely named directory that is removed when dropped
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create a fresh randomly named directory under `parent`, trying up to
    /// `attempts` names
    pub fn allocate(parent: &Path, attempts: usize) -> SyncResult<Self> {
        std::fs::create_dir_all(parent).map_err(|e| SyncError::storage(parent, e))?;

        let mut rng = rand::thread_rng();
        for attempt in 1..=attempts {
            let path = parent.join(format!("wikigit-{:016x}", rng.gen::<u64>()));
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Allocated scratch directory");
                    return Ok(Self { path });
                }
                Err(e) => {
                    debug!(
                        path = %path.display(),
                        attempt,
                        error = %e,
                        "Scratch directory allocation failed"
                    );
                }
            }
        }

        Err(SyncError::ResourceExhaustion {
            base: parent.to_path_buf(),
            attempts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove scratch directory"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::allocate(parent.path(), 5).unwrap();
        let path = scratch.path().to_path_buf();
        std::fs::write(path.join("file"), "data").unwrap();
        assert!(path.is_dir());

        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_names_are_unique() {
        let parent = tempfile::tempdir().unwrap();
        let a = ScratchDir::allocate(parent.path(), 5).unwrap();
        let b = ScratchDir::allocate(parent.path(), 5).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().file_name().unwrap().to_string_lossy().starts_with("wikigit-"));
    }

    #[test]
    fn test_exhaustion_after_attempts() {
        let parent = tempfile::tempdir().unwrap();
        let result = ScratchDir::allocate(parent.path(), 0);
        assert!(matches!(
            result,
            Err(SyncError::ResourceExhaustion { attempts: 0, .. })
        ));
    }

    #[test]
    fn test_parent_that_is_a_file_is_a_storage_error() {
        let parent = tempfile::tempdir().unwrap();
        let blocked = parent.path().join("blocked");
        std::fs::write(&blocked, "not a directory").unwrap();

        let result = ScratchDir::allocate(&blocked, 3);
        assert!(matches!(result, Err(SyncError::Storage { .. })));
    }

    #[test]
    fn test_drop_tolerates_missing_directory() {
        let parent = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::allocate(parent.path(), 1).unwrap();
        std::fs::remove_dir_all(scratch.path()).unwrap();
        drop(scratch);
    }
}
