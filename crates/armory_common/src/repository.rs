//! Repository State Manager
//!
//! Adds the curated source line to the package manager's source file and
//! takes it out again, byte for byte. The sequence on enable is:
//!
//! 1. read the current sources file (missing is fine)
//! 2. return early if the curated line is already there
//! 3. durably write a backup record holding the exact pre-change bytes
//! 4. atomically replace the sources file with the line appended
//!
//! If step 3 fails nothing was changed. If step 4 fails the backup exists but
//! is harmless: the sources file still holds its original bytes.
//!
//! Disable restores the recorded bytes and marks the backup inactive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::atomic;
use crate::config::RepositoryConfig;
use crate::error::{ArmoryError, Result};
use crate::lock::ResourceLock;
use crate::manifest::checksum_hex;
use crate::paths;

/// Pre-enable snapshot of the sources file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryBackup {
    pub sources_path: PathBuf,
    /// False when the sources file did not exist before enable
    pub existed: bool,
    /// Original bytes, hex encoded
    pub original: String,
    /// SHA-256 of the original bytes
    pub sha256: String,
    pub created_at: DateTime<Utc>,
    /// Cleared once the backup has been restored
    pub active: bool,
}

impl RepositoryBackup {
    fn capture(sources_path: &Path, original: Option<&[u8]>) -> Self {
        let bytes = original.unwrap_or_default();
        Self {
            sources_path: sources_path.to_path_buf(),
            existed: original.is_some(),
            original: hex::encode(bytes),
            sha256: checksum_hex(bytes),
            created_at: Utc::now(),
            active: true,
        }
    }

    /// Decode and verify the stored bytes
    pub fn original_bytes(&self) -> std::result::Result<Vec<u8>, String> {
        let bytes =
            hex::decode(&self.original).map_err(|e| format!("backup bytes not decodable: {}", e))?;
        let actual = checksum_hex(&bytes);
        if actual != self.sha256 {
            return Err(format!(
                "backup bytes hash to {}, record says {}",
                actual, self.sha256
            ));
        }
        Ok(bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnableOutcome {
    Enabled,
    AlreadyEnabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisableOutcome {
    /// Original bytes written back
    Restored,
    /// The file did not exist before enable and was removed
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryStatus {
    pub enabled: bool,
    pub backup_active: bool,
    pub sources_path: PathBuf,
}

/// Read-only view of repository state, consulted by the planner
pub trait RepositoryProbe {
    fn status(&self) -> Result<RepositoryStatus>;
}

impl RepositoryProbe for RepositoryStatus {
    fn status(&self) -> Result<RepositoryStatus> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct RepositoryManager {
    sources_file: PathBuf,
    backup_file: PathBuf,
    curated_entry: String,
}

impl RepositoryManager {
    pub fn new(
        sources_file: impl Into<PathBuf>,
        backup_file: impl Into<PathBuf>,
        curated_entry: impl Into<String>,
    ) -> Self {
        Self {
            sources_file: sources_file.into(),
            backup_file: backup_file.into(),
            curated_entry: curated_entry.into().trim().to_string(),
        }
    }

    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self::new(
            &config.sources_file,
            &config.backup_file,
            &config.curated_entry,
        )
    }

    pub fn sources_file(&self) -> &Path {
        &self.sources_file
    }

    pub fn backup_file(&self) -> &Path {
        &self.backup_file
    }

    pub fn curated_entry(&self) -> &str {
        &self.curated_entry
    }

    pub fn enable(&self) -> Result<EnableOutcome> {
        let _lock = self.lock()?;

        let current = atomic::read_optional(&self.sources_file)?;
        if self.contains_entry(current.as_deref()) {
            tracing::info!(path = %self.sources_file.display(), "curated repository already enabled");
            return Ok(EnableOutcome::AlreadyEnabled);
        }

        match self.backup()? {
            Some(existing) if existing.active => {
                // The line was removed by hand; the existing backup still
                // holds the bytes from before the first enable.
                tracing::warn!(
                    backup = %self.backup_file.display(),
                    "curated line missing but backup still active, keeping backup"
                );
            }
            _ => {
                let backup = RepositoryBackup::capture(&self.sources_file, current.as_deref());
                self.write_backup(&backup)?;
                tracing::info!(
                    backup = %self.backup_file.display(),
                    existed = backup.existed,
                    "repository backup written"
                );
            }
        }

        let mut next = current.unwrap_or_default();
        if !next.is_empty() && !next.ends_with(b"\n") {
            next.push(b'\n');
        }
        next.extend_from_slice(self.curated_entry.as_bytes());
        next.push(b'\n');

        atomic::write_atomic(&self.sources_file, &next, None)?;
        tracing::info!(path = %self.sources_file.display(), "curated repository enabled");
        Ok(EnableOutcome::Enabled)
    }

    pub fn disable(&self) -> Result<DisableOutcome> {
        let _lock = self.lock()?;

        let backup = match self.backup()? {
            Some(backup) if backup.active => backup,
            _ => return Err(ArmoryError::NoBackupFound(self.backup_file.clone())),
        };
        if backup.sources_path != self.sources_file {
            return Err(self.restore_error(format!(
                "backup was taken for {}, not {}",
                backup.sources_path.display(),
                self.sources_file.display()
            )));
        }
        let original = backup
            .original_bytes()
            .map_err(|reason| self.restore_error(reason))?;

        let outcome = if backup.existed {
            atomic::write_atomic(&self.sources_file, &original, None)
                .map_err(|e| self.restore_error(e.to_string()))?;
            DisableOutcome::Restored
        } else {
            atomic::remove_durable(&self.sources_file)
                .map_err(|e| self.restore_error(e.to_string()))?;
            DisableOutcome::Removed
        };

        let cleared = RepositoryBackup {
            active: false,
            ..backup
        };
        self.write_backup(&cleared)?;

        tracing::info!(path = %self.sources_file.display(), ?outcome, "curated repository disabled");
        Ok(outcome)
    }

    /// The stored backup record, if any
    pub fn backup(&self) -> Result<Option<RepositoryBackup>> {
        let Some(bytes) = atomic::read_optional(&self.backup_file)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| self.restore_error(format!("backup record is unreadable: {}", e)))
    }

    fn write_backup(&self, backup: &RepositoryBackup) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(backup)?;
        atomic::write_atomic(&self.backup_file, &bytes, Some(0o600)).map_err(|e| {
            ArmoryError::Backup {
                path: self.backup_file.clone(),
                reason: e.to_string(),
            }
        })
    }

    fn contains_entry(&self, content: Option<&[u8]>) -> bool {
        content.is_some_and(|bytes| {
            String::from_utf8_lossy(bytes)
                .lines()
                .any(|line| line.trim() == self.curated_entry)
        })
    }

    fn lock(&self) -> Result<ResourceLock> {
        ResourceLock::try_acquire(
            &paths::repository_lock_file(&self.backup_file),
            "repository configuration",
        )
    }

    fn restore_error(&self, reason: String) -> ArmoryError {
        ArmoryError::Restore {
            path: self.backup_file.clone(),
            reason,
        }
    }
}

impl RepositoryProbe for RepositoryManager {
    fn status(&self) -> Result<RepositoryStatus> {
        let current = atomic::read_optional(&self.sources_file)?;
        let backup_active = match self.backup() {
            Ok(backup) => backup.is_some_and(|b| b.active),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable repository backup in status");
                false
            }
        };
        Ok(RepositoryStatus {
            enabled: self.contains_entry(current.as_deref()),
            backup_active,
            sources_path: self.sources_file.clone(),
        })
    }
}
