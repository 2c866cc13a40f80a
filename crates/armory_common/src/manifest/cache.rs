//! Local manifest cache
//!
//! One JSON record holding the last verified manifest body, its checksum and
//! when it was fetched. The record is replaced atomically under the cache
//! lock, and re-hashed on every read so a hand-edited body is caught.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::descriptor::checksum_hex;
use crate::atomic;
use crate::error::{ArmoryError, Result};
use crate::lock::ResourceLock;
use crate::paths;

/// Where a cached body originally came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    Remote,
    Bundled,
}

/// On-disk cache record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheRecord {
    /// Manifest body exactly as verified
    pub body: String,
    /// SHA-256 of `body`, lowercase hex
    pub checksum: String,
    pub fetched_at: DateTime<Utc>,
    pub source: CacheSource,
}

impl CacheRecord {
    pub fn remote(body: String, fetched_at: DateTime<Utc>) -> Self {
        let checksum = checksum_hex(body.as_bytes());
        Self {
            body,
            checksum,
            fetched_at,
            source: CacheSource::Remote,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManifestCache {
    dir: PathBuf,
}

impl ManifestCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        paths::cache_file(&self.dir)
    }

    pub fn lock_path(&self) -> PathBuf {
        paths::cache_lock_file(&self.dir)
    }

    /// Load the record, if any. A body that no longer matches its recorded
    /// checksum is `ChecksumMismatch`; an undecodable record is malformed.
    pub fn read(&self) -> Result<Option<CacheRecord>> {
        let path = self.path();
        let Some(bytes) = atomic::read_optional(&path)? else {
            return Ok(None);
        };

        let record: CacheRecord = serde_json::from_slice(&bytes).map_err(|e| {
            ArmoryError::MalformedManifest(format!(
                "cache record {} is unreadable: {}",
                path.display(),
                e
            ))
        })?;

        let actual = checksum_hex(record.body.as_bytes());
        if actual != record.checksum {
            return Err(ArmoryError::ChecksumMismatch {
                subject: format!("cached manifest {}", path.display()),
                expected: record.checksum,
                actual,
            });
        }

        Ok(Some(record))
    }

    /// Replace the record under the cache lock
    pub fn store(&self, record: &CacheRecord) -> Result<()> {
        let _lock = self.lock()?;
        atomic::write_atomic(&self.path(), &encode(record)?, None)?;
        tracing::info!(
            checksum = %record.checksum,
            path = %self.path().display(),
            "manifest cache updated"
        );
        Ok(())
    }

    /// Write the record to a temp file without replacing the cache
    pub fn stage(&self, record: &CacheRecord) -> Result<atomic::StagedWrite> {
        atomic::StagedWrite::stage(&self.path(), &encode(record)?, None)
    }

    pub fn lock(&self) -> Result<ResourceLock> {
        ResourceLock::try_acquire(&self.lock_path(), "manifest cache")
    }
}

fn encode(record: &CacheRecord) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(record)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn record() -> CacheRecord {
        CacheRecord::remote(
            r#"{"schema_version": 2}"#.to_string(),
            "2024-06-01T12:00:00Z".parse().unwrap(),
        )
    }

    #[test]
    fn test_missing_cache_is_none() {
        let temp = TempDir::new().unwrap();
        let cache = ManifestCache::new(temp.path());
        assert!(cache.read().unwrap().is_none());
    }

    #[test]
    fn test_store_then_read() {
        let temp = TempDir::new().unwrap();
        let cache = ManifestCache::new(temp.path().join("armory"));
        cache.store(&record()).unwrap();
        assert_eq!(cache.read().unwrap(), Some(record()));
    }

    #[test]
    fn test_same_record_same_bytes() {
        let temp = TempDir::new().unwrap();
        let cache = ManifestCache::new(temp.path());
        cache.store(&record()).unwrap();
        let first = fs::read(cache.path()).unwrap();
        cache.store(&record()).unwrap();
        assert_eq!(fs::read(cache.path()).unwrap(), first);
    }

    #[test]
    fn test_tampered_body_is_checksum_mismatch() {
        let temp = TempDir::new().unwrap();
        let cache = ManifestCache::new(temp.path());
        cache.store(&record()).unwrap();

        let mut tampered = record();
        tampered.body = r#"{"schema_version": 1}"#.to_string();
        fs::write(cache.path(), serde_json::to_vec(&tampered).unwrap()).unwrap();

        let err = cache.read().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Trust);
    }

    #[test]
    fn test_garbage_record_is_malformed() {
        let temp = TempDir::new().unwrap();
        let cache = ManifestCache::new(temp.path());
        fs::write(cache.path(), b"not json").unwrap();
        assert!(matches!(
            cache.read().unwrap_err(),
            ArmoryError::MalformedManifest(_)
        ));
    }

    #[test]
    fn test_store_fails_fast_while_locked() {
        let temp = TempDir::new().unwrap();
        let cache = ManifestCache::new(temp.path());
        let _held = cache.lock().unwrap();
        let err = cache.store(&record()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Concurrency);
        assert!(cache.read().unwrap().is_none());
    }

    #[test]
    fn test_interrupted_stage_keeps_previous_record() {
        let temp = TempDir::new().unwrap();
        let cache = ManifestCache::new(temp.path());
        cache.store(&record()).unwrap();

        let newer = CacheRecord::remote(
            r#"{"schema_version": 2, "x": 1}"#.to_string(),
            "2024-07-01T12:00:00Z".parse().unwrap(),
        );
        let staged = cache.stage(&newer).unwrap();
        // process dies here
        drop(staged);

        assert_eq!(cache.read().unwrap(), Some(record()));
    }
}
