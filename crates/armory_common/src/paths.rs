//! Path helpers for Armory
//!
//! System locations are fixed; the manifest cache is per-user.
//! Citation: [XDG Base Directory Specification]

use std::path::{Path, PathBuf};

/// Default configuration file
pub const SYSTEM_CONFIG_FILE: &str = "/etc/armory/config.toml";

/// Default apt source configuration the curated entry is appended to
pub const DEFAULT_SOURCES_FILE: &str = "/etc/apt/sources.list";

/// Default location of the repository backup record
pub const DEFAULT_BACKUP_FILE: &str = "/var/lib/armory/sources.backup.json";

/// OS identification file
pub const OS_RELEASE_FILE: &str = "/etc/os-release";

const CACHE_FILE: &str = "manifest-cache.json";
const CACHE_LOCK_FILE: &str = "cache.lock";

/// Get the per-user cache directory
///
/// Priority:
/// 1. $ARMORY_CACHE_DIR (explicit override)
/// 2. $XDG_CACHE_HOME/armory or ~/.cache/armory
/// 3. /tmp/armory-$UID (fallback)
pub fn user_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ARMORY_CACHE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(cache) = dirs::cache_dir() {
        return cache.join("armory");
    }

    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/armory-{}", uid))
}

/// Manifest cache record inside a cache directory
pub fn cache_file(cache_dir: &Path) -> PathBuf {
    cache_dir.join(CACHE_FILE)
}

/// Lock guarding the cache record
pub fn cache_lock_file(cache_dir: &Path) -> PathBuf {
    cache_dir.join(CACHE_LOCK_FILE)
}

/// Lock guarding the backup record and the sources file
pub fn repository_lock_file(backup_file: &Path) -> PathBuf {
    let mut name = backup_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "sources.backup".into());
    name.push(".lock");
    backup_file.with_file_name(name)
}

/// Config file to load: $ARMORY_CONFIG or the system default
pub fn config_file() -> PathBuf {
    match std::env::var("ARMORY_CONFIG") {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(SYSTEM_CONFIG_FILE),
    }
}
