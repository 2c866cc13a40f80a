//! Advisory file locking
//!
//! Serializes invocations that touch the manifest cache or the repository
//! backup. Locks are fail-fast: a second invocation gets `ResourceBusy`
//! immediately instead of waiting on the first.
//!
//! The kernel releases an flock when its holder dies, so there is no stale
//! lock recovery; the PID written into the file is only for the error message.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;

use fs4::FileExt;

use crate::error::{ArmoryError, Result};

/// Lock file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID holding the lock
    pub pid: u32,
    /// When the lock was taken (RFC 3339)
    pub acquired_at: String,
    /// What the holder is doing
    pub purpose: String,
}

impl LockInfo {
    fn new(purpose: &str) -> Self {
        Self {
            pid: process::id(),
            acquired_at: chrono::Utc::now().to_rfc3339(),
            purpose: purpose.to_string(),
        }
    }

    fn describe(&self) -> String {
        format!("pid {} since {} ({})", self.pid, self.acquired_at, self.purpose)
    }
}

/// Exclusive lock handle - releases on drop
#[derive(Debug)]
pub struct ResourceLock {
    file: File,
    path: PathBuf,
}

impl ResourceLock {
    /// Take the lock at `path` or fail with `ResourceBusy`
    pub fn try_acquire(path: &Path, resource: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ArmoryError::io(parent, e))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| ArmoryError::io(path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                let holder = read_holder(path);
                tracing::warn!(resource, holder = %holder, "lock contended");
                return Err(ArmoryError::ResourceBusy {
                    resource: resource.to_string(),
                    holder,
                });
            }
            Err(e) => return Err(ArmoryError::io(path, e)),
        }

        // Diagnostics only; failing to record them must not fail the lock.
        let info = LockInfo::new(resource);
        if let Ok(content) = serde_json::to_string(&info) {
            let _ = file.set_len(0);
            let _ = file.write_all(content.as_bytes());
            let _ = file.sync_data();
        }

        tracing::debug!(path = %path.display(), resource, "lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        tracing::debug!(path = %self.path.display(), "lock released");
        // The flock itself goes away when `file` is closed.
    }
}

fn read_holder(path: &Path) -> String {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<LockInfo>(&content).ok())
        .map(|info| info.describe())
        .unwrap_or_else(|| "another armory process".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind as ArmoryErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_second_lock_is_busy() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.lock");

        let first = ResourceLock::try_acquire(&path, "manifest cache").unwrap();
        let err = ResourceLock::try_acquire(&path, "manifest cache").unwrap_err();

        assert_eq!(err.kind(), ArmoryErrorKind::Concurrency);
        let message = err.to_string();
        assert!(message.contains("manifest cache"));
        assert!(message.contains(&format!("pid {}", process::id())));
        drop(first);
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("repo.lock");

        let first = ResourceLock::try_acquire(&path, "repository").unwrap();
        drop(first);
        let second = ResourceLock::try_acquire(&path, "repository").unwrap();
        assert_eq!(second.path(), path.as_path());
    }

    #[test]
    fn test_lock_creates_parent_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("deep/inside/x.lock");
        let _lock = ResourceLock::try_acquire(&path, "x").unwrap();
        assert!(path.exists());
    }
}
