//! Cross-process mutual exclusion on the state file (spec.md §6.3).
//!
//! One exclusive advisory lock on a sibling `<state>.lock` file is held for
//! the full duration of `apply`. Two concurrent `devrig apply` invocations on
//! the same state file are serialised; the second one to ask for the lock
//! either blocks or, in try-mode, fails immediately with `LockConflict`.

use crate::core::error::{CoreError, CoreResult};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Holds the lock file handle for as long as the guard lives. Dropping it
/// releases the OS-level lock.
pub struct StateLock {
    path: PathBuf,
    file: File,
}

impl StateLock {
    fn lock_path_for(state_path: &Path) -> PathBuf {
        let mut lock_path = state_path.as_os_str().to_owned();
        lock_path.push(".lock");
        PathBuf::from(lock_path)
    }

    /// Blocks until the exclusive lock on `state_path`'s sibling lockfile is
    /// acquired.
    pub fn acquire(state_path: &Path) -> CoreResult<Self> {
        let path = Self::lock_path_for(state_path);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| CoreError::StateIo {
                path: path.clone(),
                source,
            })?;
        file.lock_exclusive().map_err(|_| CoreError::LockConflict(path.clone()))?;
        Ok(Self { path, file })
    }

    /// Attempts to acquire the lock without blocking; surfaces a
    /// `LockConflict` immediately if another process already holds it.
    pub fn try_acquire(state_path: &Path) -> CoreResult<Self> {
        let path = Self::lock_path_for(state_path);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| CoreError::StateIo {
                path: path.clone(),
                source,
            })?;
        file.try_lock_exclusive()
            .map_err(|_| CoreError::LockConflict(path.clone()))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_try_acquire_on_the_same_file_conflicts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_path = dir.path().join("state.json");

        let first = StateLock::try_acquire(&state_path).expect("first lock succeeds");
        let second = StateLock::try_acquire(&state_path);
        assert!(second.is_err());
        drop(first);

        let third = StateLock::try_acquire(&state_path);
        assert!(third.is_ok());
    }
}
