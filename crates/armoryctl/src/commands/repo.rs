//! repo enable / disable / status

use anyhow::Result;
use armory_common::{
    ArmoryError, DisableOutcome, EnableOutcome, RepositoryProbe, RepositoryStatus,
};
use serde::Serialize;
use std::path::PathBuf;

use super::Context;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "detail", rename_all = "snake_case")]
pub enum RepoAction {
    Enabled(EnableOutcome),
    Disabled(DisableOutcome),
    /// Dry run: what enable would do
    WouldEnable { append: String, backup: PathBuf },
    /// Dry run: what disable would restore
    WouldDisable { restore_bytes: usize, remove: bool },
    Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoReport {
    pub action: RepoAction,
    pub status: RepositoryStatus,
}

pub fn enable(ctx: &Context) -> Result<RepoReport> {
    let repo = ctx.repository();

    if ctx.dry_run {
        let status = repo.status()?;
        let action = if status.enabled {
            RepoAction::Enabled(EnableOutcome::AlreadyEnabled)
        } else {
            RepoAction::WouldEnable {
                append: repo.curated_entry().to_string(),
                backup: repo.backup_file().to_path_buf(),
            }
        };
        return Ok(RepoReport { action, status });
    }

    ctx.require_root()?;
    let outcome = repo.enable()?;
    Ok(RepoReport {
        action: RepoAction::Enabled(outcome),
        status: repo.status()?,
    })
}

pub fn disable(ctx: &Context) -> Result<RepoReport> {
    let repo = ctx.repository();

    if ctx.dry_run {
        let backup = match repo.backup()? {
            Some(backup) if backup.active => backup,
            _ => return Err(ArmoryError::NoBackupFound(repo.backup_file().to_path_buf()).into()),
        };
        let original = backup.original_bytes().map_err(|reason| ArmoryError::Restore {
            path: repo.backup_file().to_path_buf(),
            reason,
        })?;
        return Ok(RepoReport {
            action: RepoAction::WouldDisable {
                restore_bytes: original.len(),
                remove: !backup.existed,
            },
            status: repo.status()?,
        });
    }

    ctx.require_root()?;
    let outcome = repo.disable()?;
    Ok(RepoReport {
        action: RepoAction::Disabled(outcome),
        status: repo.status()?,
    })
}

pub fn status(ctx: &Context) -> Result<RepoReport> {
    Ok(RepoReport {
        action: RepoAction::Status,
        status: ctx.repository().status()?,
    })
}
