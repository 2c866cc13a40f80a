//! Error types for Armory.
//!
//! Every failure the library can surface is one `ArmoryError` variant. The
//! variants are grouped into an `ErrorKind` so callers can decide between
//! "report and exit", "retry later" and "fix the precondition first" without
//! matching on every variant.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArmoryError>;

#[derive(Error, Debug)]
pub enum ArmoryError {
    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("Duplicate tool '{0}' in manifest")]
    DuplicateTool(String),

    #[error("Unknown tool or category '{0}'")]
    UnknownTool(String),

    #[error("Unknown category '{name}'. Available: {available}")]
    UnknownCategory { name: String, available: String },

    #[error("Checksum mismatch for {subject}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        subject: String,
        expected: String,
        actual: String,
    },

    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("Failed to write repository backup {path}: {reason}")]
    Backup { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("No active repository backup at {0}; nothing can be restored")]
    NoBackupFound(PathBuf),

    #[error("Failed to restore repository backup {path}: {reason}")]
    Restore { path: PathBuf, reason: String },

    #[error("Tool '{tool}' requires the curated repository, which is not enabled")]
    RepositoryRequired { tool: String },

    #[error("{resource} is busy (held by {holder})")]
    ResourceBusy { resource: String, holder: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Package manager error: {0}")]
    PackageManager(String),

    #[error("Configuration error in {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("{0}")]
    PermissionDenied(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure classes, one per row of the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad manifest, unknown tool or category. Nothing was mutated.
    MalformedInput,
    /// Checksum or signature failure. Manifest discarded, cache untouched.
    Trust,
    /// Backup missing or unwritable. The safety model depends on these.
    Reversibility,
    /// Network trouble. Recovered by falling back to cache or bundled data.
    Transient,
    /// Lock held by another invocation. Retryable.
    Concurrency,
    /// Repository required but not enabled.
    Precondition,
    /// IO, configuration, permissions or the package manager itself.
    Environment,
}

impl ErrorKind {
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::MalformedInput => 65,
            ErrorKind::Trust => 66,
            ErrorKind::Reversibility => 67,
            ErrorKind::Precondition => 78,
            ErrorKind::Concurrency => 75,
            ErrorKind::Transient | ErrorKind::Environment => 1,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Concurrency | ErrorKind::Transient)
    }
}

impl ArmoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArmoryError::MalformedManifest(_)
            | ArmoryError::DuplicateTool(_)
            | ArmoryError::UnknownTool(_)
            | ArmoryError::UnknownCategory { .. }
            | ArmoryError::Json(_) => ErrorKind::MalformedInput,
            ArmoryError::ChecksumMismatch { .. } | ArmoryError::SignatureVerification(_) => {
                ErrorKind::Trust
            }
            ArmoryError::Backup { .. }
            | ArmoryError::NoBackupFound(_)
            | ArmoryError::Restore { .. } => ErrorKind::Reversibility,
            ArmoryError::Network(_) => ErrorKind::Transient,
            ArmoryError::ResourceBusy { .. } => ErrorKind::Concurrency,
            ArmoryError::RepositoryRequired { .. } => ErrorKind::Precondition,
            ArmoryError::Write { .. }
            | ArmoryError::PackageManager(_)
            | ArmoryError::Config { .. }
            | ArmoryError::PermissionDenied(_)
            | ArmoryError::Io { .. }
            | ArmoryError::Internal(_) => ErrorKind::Environment,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArmoryError::Io {
            path: path.into(),
            source,
        }
    }
}
