//! Armory Configuration
//!
//! Configuration lives in /etc/armory/config.toml (override with
//! $ARMORY_CONFIG or `--config`). A missing file means defaults; a file that
//! does not parse is an error rather than a silent fallback.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ArmoryError, Result};
use crate::paths;

/// Ed25519 public key the manifest descriptor must be signed with
pub const TRUSTED_MANIFEST_KEY: &str =
    "270b4e12fbd110d7455cf1d56c29163f5baedceac6430dc336b53da3e7122217";

/// The curated upstream source line
pub const CURATED_ENTRY: &str =
    "deb http://http.kali.org/kali kali-rolling main contrib non-free non-free-firmware";

/// Repository settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Source configuration file the curated entry is appended to
    #[serde(default = "default_sources_file")]
    pub sources_file: PathBuf,

    /// Where the pre-enable copy of `sources_file` is recorded
    #[serde(default = "default_backup_file")]
    pub backup_file: PathBuf,

    /// Exact line appended on enable and looked for on status
    #[serde(default = "default_curated_entry")]
    pub curated_entry: String,
}

fn default_sources_file() -> PathBuf {
    PathBuf::from(paths::DEFAULT_SOURCES_FILE)
}

fn default_backup_file() -> PathBuf {
    PathBuf::from(paths::DEFAULT_BACKUP_FILE)
}

fn default_curated_entry() -> String {
    CURATED_ENTRY.to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            sources_file: default_sources_file(),
            backup_file: default_backup_file(),
            curated_entry: default_curated_entry(),
        }
    }
}

/// Manifest pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestConfig {
    /// Remote descriptor (checksum, signature, publish time)
    #[serde(default = "default_descriptor_url")]
    pub descriptor_url: String,

    /// Remote manifest body
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,

    /// Cache directory override (default: per-user XDG cache)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Hex Ed25519 public key override
    #[serde(default)]
    pub trusted_key: Option<String>,

    /// Age after which the selected manifest is reported as stale
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: u32,
}

fn default_descriptor_url() -> String {
    "https://catalog.armory-tools.org/v2/latest.json".to_string()
}

fn default_manifest_url() -> String {
    "https://catalog.armory-tools.org/v2/manifest.json".to_string()
}

fn default_stale_after_days() -> u32 {
    30
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            descriptor_url: default_descriptor_url(),
            manifest_url: default_manifest_url(),
            cache_dir: None,
            trusted_key: None,
            stale_after_days: default_stale_after_days(),
        }
    }
}

impl ManifestConfig {
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(paths::user_cache_dir)
    }

    pub fn effective_trusted_key(&self) -> &str {
        self.trusted_key.as_deref().unwrap_or(TRUSTED_MANIFEST_KEY)
    }
}

/// Network settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// Per-request timeout (valid: 1-120)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause before the single retry (valid: 0-10000)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_retry_backoff_ms() -> u64 {
    750
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(1, 120))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.min(10_000))
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArmoryConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub manifest: ManifestConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl ArmoryConfig {
    /// Load from `path`, or defaults when the file does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ArmoryError::io(path, e)),
        };

        Self::parse(&content).map_err(|reason| ArmoryError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Load from $ARMORY_CONFIG or /etc/armory/config.toml
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file())
    }

    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        if config.repository.curated_entry.trim().is_empty()
            || config.repository.curated_entry.contains('\n')
        {
            return Err("repository.curated_entry must be a single non-empty line".to_string());
        }
        Ok(config)
    }
}
