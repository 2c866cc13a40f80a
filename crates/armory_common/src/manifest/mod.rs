//! Manifest Update Pipeline
//!
//! Decides which manifest body the catalog is built from on this run:
//!
//! ```text
//! Start ─offline──────────────────────────────┐
//!   │                                         v
//!   └> FetchRemoteDescriptor ─failed───> CachedOrBundled ──> Loaded
//!        │                                    ^   ^             ^
//!        v                                    │   │             │
//!      CompareChecksum ─same──────────────────┘   │             │
//!        │ changed, check only ───────────────────┘             │
//!        v                                                      │
//!      DownloadAndVerify ─verified, cached──────────────────────┘
//! ```
//!
//! Network problems never fail the run; they become warnings and the
//! pipeline falls back to the cache or the bundled manifest. Checksum and
//! signature failures always fail it, and leave the cache untouched.

pub mod bundled;
pub mod cache;
pub mod descriptor;
pub mod source;

pub use cache::{CacheRecord, CacheSource, ManifestCache};
pub use descriptor::{checksum_hex, ManifestMetadata, TrustAnchor};
pub use source::{HttpSource, ManifestSource};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

use crate::catalog::Catalog;
use crate::config::ArmoryConfig;
use crate::error::{ArmoryError, Result};

/// Per-run switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Skip the network entirely
    pub offline: bool,
    /// Download and cache a changed manifest (false: only report it)
    pub apply: bool,
    pub now: DateTime<Utc>,
}

impl PipelineOptions {
    pub fn new(offline: bool, apply: bool) -> Self {
        Self {
            offline,
            apply,
            now: Utc::now(),
        }
    }
}

/// A downloaded body that passed checksum, signature and schema checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedBody {
    pub body: Vec<u8>,
    pub metadata: ManifestMetadata,
}

/// What was fetched from the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Descriptor(ManifestMetadata),
    Body(VerifiedBody),
}

/// Outcome of running one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Fetched(Fetched),
    CacheHit(CacheRecord),
    BundledFallback,
    /// Transient failure; the reason ends up in a warning
    Failed(String),
}

/// The body the run settled on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selected {
    Remote(VerifiedBody),
    Cached(CacheRecord),
    Bundled,
}

impl Selected {
    pub fn origin(&self) -> ManifestOrigin {
        match self {
            Selected::Remote(_) => ManifestOrigin::Remote,
            Selected::Cached(_) => ManifestOrigin::Cache,
            Selected::Bundled => ManifestOrigin::Bundled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    FetchRemoteDescriptor,
    CompareChecksum(ManifestMetadata),
    DownloadAndVerify(ManifestMetadata),
    CachedOrBundled,
    Loaded(Selected),
}

impl PipelineState {
    /// First transition out of `Start`
    pub fn initial(offline: bool) -> Self {
        if offline {
            PipelineState::CachedOrBundled
        } else {
            PipelineState::FetchRemoteDescriptor
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Start => "start",
            PipelineState::FetchRemoteDescriptor => "fetch_remote_descriptor",
            PipelineState::CompareChecksum(_) => "compare_checksum",
            PipelineState::DownloadAndVerify(_) => "download_and_verify",
            PipelineState::CachedOrBundled => "cached_or_bundled",
            PipelineState::Loaded(_) => "loaded",
        }
    }
}

/// The fallback chain. Pure: no I/O, no clock.
pub fn transition(state: PipelineState, result: StageResult, apply: bool) -> Result<PipelineState> {
    use PipelineState as S;
    use StageResult as R;

    let from = state.name();
    let next = match (state, result) {
        (S::FetchRemoteDescriptor, R::Fetched(Fetched::Descriptor(meta))) => S::CompareChecksum(meta),
        (S::FetchRemoteDescriptor, R::Failed(_)) => S::CachedOrBundled,

        (S::CompareChecksum(_), R::CacheHit(_) | R::BundledFallback) => S::CachedOrBundled,
        (S::CompareChecksum(meta), R::Fetched(Fetched::Descriptor(_))) if apply => {
            S::DownloadAndVerify(meta)
        }
        (S::CompareChecksum(_), R::Fetched(Fetched::Descriptor(_))) => S::CachedOrBundled,

        (S::DownloadAndVerify(_), R::Fetched(Fetched::Body(body))) => {
            S::Loaded(Selected::Remote(body))
        }
        (S::DownloadAndVerify(_), R::Failed(_)) => S::CachedOrBundled,

        (S::CachedOrBundled, R::CacheHit(record)) => S::Loaded(Selected::Cached(record)),
        (S::CachedOrBundled, R::BundledFallback) => S::Loaded(Selected::Bundled),

        (_, result) => {
            return Err(ArmoryError::Internal(format!(
                "manifest pipeline cannot leave {} with {:?}",
                from, result
            )))
        }
    };
    Ok(next)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestOrigin {
    Remote,
    Cache,
    Bundled,
}

impl fmt::Display for ManifestOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestOrigin::Remote => write!(f, "remote"),
            ManifestOrigin::Cache => write!(f, "cache"),
            ManifestOrigin::Bundled => write!(f, "bundled"),
        }
    }
}

/// What the remote descriptor said about the local manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    UpToDate {
        checksum: String,
    },
    Available {
        checksum: String,
        published_at: DateTime<Utc>,
        /// Downloaded, verified and cached during this run
        applied: bool,
    },
    Unknown {
        reason: String,
    },
}

/// Non-fatal conditions surfaced to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    RemoteUnavailable { stage: &'static str, reason: String },
    CacheUnreadable { reason: String },
    Stale { origin: ManifestOrigin, age_days: i64 },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::RemoteUnavailable { stage, reason } => {
                write!(f, "remote manifest unavailable ({}): {}", stage, reason)
            }
            PipelineWarning::CacheUnreadable { reason } => {
                write!(f, "ignoring unreadable manifest cache: {}", reason)
            }
            PipelineWarning::Stale { origin, age_days } => write!(
                f,
                "using {} manifest that is {} days old; run `armoryctl update` when online",
                origin, age_days
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub catalog: Catalog,
    pub origin: ManifestOrigin,
    pub update: UpdateStatus,
    pub warnings: Vec<PipelineWarning>,
    /// States visited, in order
    pub trace: Vec<&'static str>,
}

pub struct ManifestPipeline<S> {
    source: S,
    cache: ManifestCache,
    trust: TrustAnchor,
    bundled: Cow<'static, [u8]>,
    stale_after: Duration,
}

impl ManifestPipeline<HttpSource> {
    /// Pipeline wired to the configured HTTPS endpoints, cache and key
    pub fn from_config(config: &ArmoryConfig) -> Result<Self> {
        let source = HttpSource::new(&config.manifest, &config.network);
        let cache = ManifestCache::new(config.manifest.effective_cache_dir());
        let trust = TrustAnchor::from_hex(config.manifest.effective_trusted_key())?;
        Ok(ManifestPipeline::new(source, cache, trust)
            .with_stale_after_days(config.manifest.stale_after_days))
    }
}

impl<S: ManifestSource> ManifestPipeline<S> {
    pub fn new(source: S, cache: ManifestCache, trust: TrustAnchor) -> Self {
        Self {
            source,
            cache,
            trust,
            bundled: Cow::Borrowed(bundled::body()),
            stale_after: Duration::days(30),
        }
    }

    /// Replace the compiled-in fallback manifest
    pub fn with_bundled(mut self, body: impl Into<Cow<'static, [u8]>>) -> Self {
        self.bundled = body.into();
        self
    }

    pub fn with_stale_after_days(mut self, days: u32) -> Self {
        self.stale_after = Duration::days(i64::from(days));
        self
    }

    pub fn cache(&self) -> &ManifestCache {
        &self.cache
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn run(&self, options: &PipelineOptions) -> Result<PipelineReport> {
        let mut trace = vec![PipelineState::Start.name()];
        let mut warnings = Vec::new();
        let mut update = UpdateStatus::Unknown {
            reason: if options.offline {
                "offline".to_string()
            } else {
                "not checked".to_string()
            },
        };

        let mut state = PipelineState::initial(options.offline);
        loop {
            trace.push(state.name());
            let result = match &state {
                PipelineState::Loaded(_) => break,
                PipelineState::Start => {
                    return Err(ArmoryError::Internal(
                        "manifest pipeline re-entered start".to_string(),
                    ))
                }
                PipelineState::FetchRemoteDescriptor => self.fetch_descriptor(),
                PipelineState::CompareChecksum(meta) => self.compare_checksum(meta, &mut warnings),
                PipelineState::DownloadAndVerify(meta) => {
                    self.download_and_verify(meta, options.now)?
                }
                PipelineState::CachedOrBundled => self.cached_or_bundled()?,
            };

            match (&state, &result) {
                (_, StageResult::Failed(reason)) => {
                    tracing::warn!(stage = state.name(), %reason, "remote manifest unavailable");
                    if matches!(state, PipelineState::FetchRemoteDescriptor) {
                        update = UpdateStatus::Unknown {
                            reason: reason.clone(),
                        };
                    }
                    warnings.push(PipelineWarning::RemoteUnavailable {
                        stage: state.name(),
                        reason: reason.clone(),
                    });
                }
                (PipelineState::CompareChecksum(meta), StageResult::Fetched(_)) => {
                    tracing::info!(checksum = %meta.checksum, "newer manifest available");
                    update = UpdateStatus::Available {
                        checksum: meta.checksum.clone(),
                        published_at: meta.published_at,
                        applied: false,
                    };
                }
                (PipelineState::CompareChecksum(meta), _) => {
                    update = UpdateStatus::UpToDate {
                        checksum: meta.checksum.clone(),
                    };
                }
                (PipelineState::DownloadAndVerify(meta), StageResult::Fetched(_)) => {
                    update = UpdateStatus::Available {
                        checksum: meta.checksum.clone(),
                        published_at: meta.published_at,
                        applied: true,
                    };
                }
                _ => {}
            }

            state = transition(state, result, options.apply)?;
        }

        let PipelineState::Loaded(selected) = state else {
            return Err(ArmoryError::Internal(
                "manifest pipeline stopped before loading".to_string(),
            ));
        };
        let origin = selected.origin();
        let (body, fetched_at): (Cow<'_, [u8]>, Option<DateTime<Utc>>) = match selected {
            Selected::Remote(verified) => (Cow::Owned(verified.body), None),
            Selected::Cached(record) => {
                (Cow::Owned(record.body.into_bytes()), Some(record.fetched_at))
            }
            Selected::Bundled => (Cow::Borrowed(self.bundled.as_ref()), None),
        };

        let catalog = Catalog::load(&body)?;

        if origin != ManifestOrigin::Remote {
            let age = options.now - fetched_at.unwrap_or(catalog.generated_at);
            if age > self.stale_after {
                tracing::warn!(%origin, age_days = age.num_days(), "manifest is stale");
                warnings.push(PipelineWarning::Stale {
                    origin,
                    age_days: age.num_days(),
                });
            }
        }

        tracing::info!(%origin, checksum = %catalog.checksum, "manifest loaded");
        Ok(PipelineReport {
            catalog,
            origin,
            update,
            warnings,
            trace,
        })
    }

    fn fetch_descriptor(&self) -> StageResult {
        match self.source.fetch_descriptor() {
            Ok(bytes) => match ManifestMetadata::parse(&bytes) {
                Ok(meta) => StageResult::Fetched(Fetched::Descriptor(meta)),
                Err(reason) => StageResult::Failed(reason),
            },
            Err(e) => StageResult::Failed(e.to_string()),
        }
    }

    fn compare_checksum(
        &self,
        meta: &ManifestMetadata,
        warnings: &mut Vec<PipelineWarning>,
    ) -> StageResult {
        // A damaged cache here only means "download again"; the load path
        // still refuses it if nothing replaces it.
        let cached = match self.cache.read() {
            Ok(cached) => cached,
            Err(e) => {
                warnings.push(PipelineWarning::CacheUnreadable {
                    reason: e.to_string(),
                });
                None
            }
        };

        match cached {
            Some(record) if record.checksum == meta.checksum => StageResult::CacheHit(record),
            Some(_) => StageResult::Fetched(Fetched::Descriptor(meta.clone())),
            None if checksum_hex(&self.bundled) == meta.checksum => StageResult::BundledFallback,
            None => StageResult::Fetched(Fetched::Descriptor(meta.clone())),
        }
    }

    fn download_and_verify(
        &self,
        meta: &ManifestMetadata,
        now: DateTime<Utc>,
    ) -> Result<StageResult> {
        let body = match self.source.fetch_body() {
            Ok(body) => body,
            Err(e) => return Ok(StageResult::Failed(e.to_string())),
        };

        let actual = checksum_hex(&body);
        if actual != meta.checksum {
            return Err(ArmoryError::ChecksumMismatch {
                subject: "downloaded manifest".to_string(),
                expected: meta.checksum.clone(),
                actual,
            });
        }
        meta.verify_signature(&self.trust)?;

        let text = String::from_utf8(body).map_err(|_| {
            ArmoryError::MalformedManifest("manifest body is not UTF-8".to_string())
        })?;
        Catalog::load(text.as_bytes())?;

        self.cache.store(&CacheRecord::remote(text.clone(), now))?;
        Ok(StageResult::Fetched(Fetched::Body(VerifiedBody {
            body: text.into_bytes(),
            metadata: meta.clone(),
        })))
    }

    fn cached_or_bundled(&self) -> Result<StageResult> {
        Ok(match self.cache.read()? {
            Some(record) => StageResult::CacheHit(record),
            None => StageResult::BundledFallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ManifestMetadata {
        ManifestMetadata {
            checksum: checksum_hex(b"body"),
            signature: String::new(),
            published_at: "2024-06-01T00:00:00Z".parse().unwrap(),
        }
    }

    fn record() -> CacheRecord {
        CacheRecord::remote("body".to_string(), "2024-06-01T00:00:00Z".parse().unwrap())
    }

    #[test]
    fn test_offline_goes_straight_to_fallback() {
        assert_eq!(PipelineState::initial(true), PipelineState::CachedOrBundled);
        assert_eq!(
            PipelineState::initial(false),
            PipelineState::FetchRemoteDescriptor
        );
    }

    #[test]
    fn test_descriptor_failure_falls_back() {
        let next = transition(
            PipelineState::FetchRemoteDescriptor,
            StageResult::Failed("timeout".to_string()),
            true,
        )
        .unwrap();
        assert_eq!(next, PipelineState::CachedOrBundled);
    }

    #[test]
    fn test_changed_checksum_downloads_only_when_applying() {
        let changed = || StageResult::Fetched(Fetched::Descriptor(meta()));
        assert_eq!(
            transition(PipelineState::CompareChecksum(meta()), changed(), true).unwrap(),
            PipelineState::DownloadAndVerify(meta())
        );
        assert_eq!(
            transition(PipelineState::CompareChecksum(meta()), changed(), false).unwrap(),
            PipelineState::CachedOrBundled
        );
    }

    #[test]
    fn test_unchanged_checksum_goes_through_fallback() {
        for result in [StageResult::CacheHit(record()), StageResult::BundledFallback] {
            let next = transition(PipelineState::CompareChecksum(meta()), result, true).unwrap();
            assert_eq!(next, PipelineState::CachedOrBundled);
        }
    }

    #[test]
    fn test_cache_hit_loads_cache() {
        let next = transition(PipelineState::CachedOrBundled, StageResult::CacheHit(record()), true)
            .unwrap();
        assert_eq!(next, PipelineState::Loaded(Selected::Cached(record())));
    }

    #[test]
    fn test_body_download_failure_falls_back() {
        let next = transition(
            PipelineState::DownloadAndVerify(meta()),
            StageResult::Failed("reset".to_string()),
            true,
        )
        .unwrap();
        assert_eq!(next, PipelineState::CachedOrBundled);
    }

    #[test]
    fn test_fallback_prefers_whatever_stage_chose() {
        assert_eq!(
            transition(PipelineState::CachedOrBundled, StageResult::BundledFallback, true).unwrap(),
            PipelineState::Loaded(Selected::Bundled)
        );
    }

    #[test]
    fn test_impossible_transition_is_an_error() {
        let err = transition(
            PipelineState::CachedOrBundled,
            StageResult::Failed("x".to_string()),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, ArmoryError::Internal(_)));
    }
}
