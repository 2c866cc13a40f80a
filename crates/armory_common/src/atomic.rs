//! Atomic file replacement
//!
//! Every persisted mutation (manifest cache, repository backup, apt sources)
//! goes through here: write a temp file in the target's directory, fsync it,
//! rename it over the target, fsync the directory. A reader sees either the
//! old file or the new one, never a prefix of either.

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{ArmoryError, Result};

/// Permission bits for files that did not exist before
pub const DEFAULT_MODE: u32 = 0o644;

/// A fully written, fsynced temp file that has not replaced its target yet
///
/// Dropping it without `commit` deletes the temp file and leaves the target
/// untouched, which is exactly what an interrupted write looks like.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Write `bytes` next to `target`. `mode` defaults to the target's
    /// current permission bits, or `DEFAULT_MODE` for a new file.
    pub fn stage(target: &Path, bytes: &[u8], mode: Option<u32>) -> Result<Self> {
        let dir = parent_dir(target);
        fs::create_dir_all(&dir).map_err(|e| write_error(target, "create directory", e))?;

        let mode = mode
            .or_else(|| existing_mode(target))
            .unwrap_or(DEFAULT_MODE);

        let mut temp =
            NamedTempFile::new_in(&dir).map_err(|e| write_error(target, "create temp file", e))?;
        temp.write_all(bytes)
            .map_err(|e| write_error(target, "write temp file", e))?;
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))
            .map_err(|e| write_error(target, "chmod temp file", e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| write_error(target, "sync temp file", e))?;

        Ok(Self {
            temp,
            target: target.to_path_buf(),
        })
    }

    /// Path of the staged temp file
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Rename over the target and make the rename durable
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| write_error(&target, "rename temp file", e.error))?;
        sync_dir(&parent_dir(&target)).map_err(|e| write_error(&target, "sync directory", e))?;
        tracing::debug!(path = %target.display(), "atomic write committed");
        Ok(())
    }
}

/// Stage and commit in one step
pub fn write_atomic(target: &Path, bytes: &[u8], mode: Option<u32>) -> Result<()> {
    StagedWrite::stage(target, bytes, mode)?.commit()
}

/// Remove `target` and make the removal durable. Missing is fine.
pub fn remove_durable(target: &Path) -> Result<()> {
    match fs::remove_file(target) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(write_error(target, "remove", e)),
    }
    sync_dir(&parent_dir(target)).map_err(|e| write_error(target, "sync directory", e))
}

/// Read a file, treating "does not exist" as `None`
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ArmoryError::io(path, e)),
    }
}

fn existing_mode(path: &Path) -> Option<u32> {
    fs::metadata(path)
        .ok()
        .map(|meta| meta.permissions().mode() & 0o7777)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

fn write_error(path: &Path, action: &str, e: std::io::Error) -> ArmoryError {
    ArmoryError::Write {
        path: path.to_path_buf(),
        reason: format!("{}: {}", action, e),
    }
}
