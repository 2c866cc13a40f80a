//! Manifest pipeline integration tests
//!
//! Runs the whole fetch -> verify -> cache -> load sequence against a
//! scripted source and a temp cache directory:
//! - repeated updates leave a byte-identical cache
//! - tampered or foreign-signed manifests are refused, cache untouched
//! - network failures fall back to cache, then bundled, with warnings
//! - check-only runs report availability without writing

use std::cell::Cell;

use armory_common::manifest::{
    checksum_hex, CacheRecord, ManifestCache, ManifestSource, TrustAnchor,
};
use armory_common::{
    ArmoryError, Catalog, ErrorKind, ManifestOrigin, ManifestPipeline, PipelineOptions,
    PipelineWarning, UpdateStatus,
};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signer, SigningKey};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const BODY: &str = r#"{
  "schema_version": 2,
  "generated_at": "2026-09-01T00:00:00Z",
  "categories": [
    { "key": "recon", "title": "Reconnaissance", "description": "Discovery" },
    { "key": "web", "title": "Web" }
  ],
  "tools": [
    { "name": "nmap", "category": "recon", "packages": ["nmap"], "repository": "none" },
    { "name": "burpsuite", "category": "web", "packages": ["burpsuite"],
      "repository": "curated", "manual_upgrade": true }
  ]
}
"#;

const NEWER_BODY: &str = r#"{
  "schema_version": 2,
  "generated_at": "2026-10-01T00:00:00Z",
  "categories": [
    { "key": "recon", "title": "Reconnaissance" }
  ],
  "tools": [
    { "name": "nmap", "category": "recon", "packages": ["nmap"], "repository": "none" },
    { "name": "masscan", "category": "recon", "packages": ["masscan"], "repository": "none" }
  ]
}
"#;

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

fn trust() -> TrustAnchor {
    TrustAnchor::new(signing_key().verifying_key())
}

fn descriptor_for(body: &str, key: &SigningKey) -> Vec<u8> {
    let checksum = checksum_hex(body.as_bytes());
    let signature = hex::encode(key.sign(checksum.as_bytes()).to_bytes());
    serde_json::json!({
        "checksum": checksum,
        "signature": signature,
        "published_at": "2026-10-02T12:00:00Z",
    })
    .to_string()
    .into_bytes()
}

/// Source returning canned responses and counting requests
struct Scripted {
    descriptor: Option<Vec<u8>>,
    body: Option<Vec<u8>>,
    descriptor_calls: Cell<usize>,
    body_calls: Cell<usize>,
}

impl Scripted {
    fn serving(body: &str) -> Self {
        Self {
            descriptor: Some(descriptor_for(body, &signing_key())),
            body: Some(body.as_bytes().to_vec()),
            descriptor_calls: Cell::new(0),
            body_calls: Cell::new(0),
        }
    }

    fn unreachable() -> Self {
        Self {
            descriptor: None,
            body: None,
            descriptor_calls: Cell::new(0),
            body_calls: Cell::new(0),
        }
    }
}

impl ManifestSource for Scripted {
    fn fetch_descriptor(&self) -> armory_common::Result<Vec<u8>> {
        self.descriptor_calls.set(self.descriptor_calls.get() + 1);
        self.descriptor
            .clone()
            .ok_or_else(|| ArmoryError::Network("connection refused".to_string()))
    }

    fn fetch_body(&self) -> armory_common::Result<Vec<u8>> {
        self.body_calls.set(self.body_calls.get() + 1);
        self.body
            .clone()
            .ok_or_else(|| ArmoryError::Network("connection reset".to_string()))
    }
}

fn now() -> DateTime<Utc> {
    "2026-10-05T00:00:00Z".parse().unwrap()
}

fn options(offline: bool, apply: bool) -> PipelineOptions {
    PipelineOptions {
        offline,
        apply,
        now: now(),
    }
}

fn pipeline(source: Scripted, dir: &TempDir) -> ManifestPipeline<Scripted> {
    ManifestPipeline::new(source, ManifestCache::new(dir.path()), trust())
}

fn cache_bytes(dir: &TempDir) -> Option<Vec<u8>> {
    std::fs::read(ManifestCache::new(dir.path()).path()).ok()
}

#[test]
fn test_update_downloads_verifies_and_caches() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(Scripted::serving(BODY), &dir);

    let report = pipeline.run(&options(false, true)).unwrap();

    assert_eq!(report.origin, ManifestOrigin::Remote);
    assert!(matches!(
        report.update,
        UpdateStatus::Available { applied: true, .. }
    ));
    assert!(report.warnings.is_empty());
    assert_eq!(report.catalog.checksum, checksum_hex(BODY.as_bytes()));

    let cached = pipeline.cache().read().unwrap().unwrap();
    assert_eq!(cached.body, BODY);
    assert_eq!(cached.fetched_at, now());
}

#[test]
fn test_repeated_update_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(Scripted::serving(BODY), &dir);

    let first = pipeline.run(&options(false, true)).unwrap();
    let bytes_after_first = cache_bytes(&dir).unwrap();

    let later = PipelineOptions {
        now: now() + Duration::hours(3),
        ..options(false, true)
    };
    let second = pipeline.run(&later).unwrap();

    assert_eq!(cache_bytes(&dir).unwrap(), bytes_after_first);
    assert_eq!(first.catalog, second.catalog);
    assert_eq!(second.origin, ManifestOrigin::Cache);
    assert_eq!(
        second.update,
        UpdateStatus::UpToDate {
            checksum: checksum_hex(BODY.as_bytes())
        }
    );
    // Unchanged checksum must not download the body again
    assert_eq!(pipeline.source_body_calls(), 1);
}

#[test]
fn test_confirmed_old_cache_still_warns_stale() {
    let dir = TempDir::new().unwrap();
    ManifestCache::new(dir.path())
        .store(&CacheRecord::remote(BODY.to_string(), now() - Duration::days(90)))
        .unwrap();

    let pipeline = pipeline(Scripted::serving(BODY), &dir);
    let report = pipeline.run(&options(false, true)).unwrap();

    assert_eq!(report.origin, ManifestOrigin::Cache);
    assert_eq!(
        report.trace,
        vec![
            "start",
            "fetch_remote_descriptor",
            "compare_checksum",
            "cached_or_bundled",
            "loaded"
        ]
    );
    assert!(matches!(report.update, UpdateStatus::UpToDate { .. }));
    assert!(report.warnings.iter().any(|w| matches!(
        w,
        PipelineWarning::Stale { origin: ManifestOrigin::Cache, age_days: 90 }
    )));
    assert_eq!(pipeline.source_body_calls(), 0);
}

#[test]
fn test_check_only_reports_without_writing() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(Scripted::serving(NEWER_BODY), &dir);

    let report = pipeline.run(&options(false, false)).unwrap();

    assert_eq!(
        report.update,
        UpdateStatus::Available {
            checksum: checksum_hex(NEWER_BODY.as_bytes()),
            published_at: "2026-10-02T12:00:00Z".parse().unwrap(),
            applied: false,
        }
    );
    assert_eq!(report.origin, ManifestOrigin::Bundled);
    assert_eq!(cache_bytes(&dir), None);
    assert_eq!(pipeline.source_body_calls(), 0);
}

#[test]
fn test_newer_manifest_replaces_cache() {
    let dir = TempDir::new().unwrap();
    ManifestCache::new(dir.path())
        .store(&CacheRecord::remote(BODY.to_string(), now() - Duration::days(3)))
        .unwrap();

    let pipeline = pipeline(Scripted::serving(NEWER_BODY), &dir);
    let report = pipeline.run(&options(false, true)).unwrap();

    assert_eq!(report.origin, ManifestOrigin::Remote);
    assert!(report.catalog.tool("masscan").is_some());
    assert_eq!(pipeline.cache().read().unwrap().unwrap().body, NEWER_BODY);
}

#[test]
fn test_body_checksum_mismatch_is_fatal_and_cache_untouched() {
    let dir = TempDir::new().unwrap();
    ManifestCache::new(dir.path())
        .store(&CacheRecord::remote(BODY.to_string(), now()))
        .unwrap();
    let before = cache_bytes(&dir).unwrap();

    // Descriptor announces NEWER_BODY, server sends something else
    let mut source = Scripted::serving(NEWER_BODY);
    source.body = Some(NEWER_BODY.replace("masscan", "evilscan").into_bytes());

    let err = pipeline(source, &dir).run(&options(false, true)).unwrap_err();

    assert!(matches!(err, ArmoryError::ChecksumMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::Trust);
    assert_eq!(cache_bytes(&dir).unwrap(), before);
}

#[test]
fn test_foreign_signature_is_fatal_and_cache_untouched() {
    let dir = TempDir::new().unwrap();
    ManifestCache::new(dir.path())
        .store(&CacheRecord::remote(BODY.to_string(), now()))
        .unwrap();
    let before = cache_bytes(&dir).unwrap();

    let mut source = Scripted::serving(NEWER_BODY);
    source.descriptor = Some(descriptor_for(
        NEWER_BODY,
        &SigningKey::from_bytes(&[9u8; 32]),
    ));

    let err = pipeline(source, &dir).run(&options(false, true)).unwrap_err();

    assert!(matches!(err, ArmoryError::SignatureVerification(_)));
    assert_eq!(err.kind(), ErrorKind::Trust);
    assert_eq!(cache_bytes(&dir).unwrap(), before);
}

#[test]
fn test_tampered_cache_is_refused_offline() {
    let dir = TempDir::new().unwrap();
    let cache = ManifestCache::new(dir.path());
    cache
        .store(&CacheRecord::remote(BODY.to_string(), now()))
        .unwrap();

    let raw = std::fs::read_to_string(cache.path()).unwrap();
    std::fs::write(cache.path(), raw.replace("burpsuite", "burpsuitx")).unwrap();

    let err = pipeline(Scripted::unreachable(), &dir)
        .run(&options(true, true))
        .unwrap_err();

    assert!(matches!(err, ArmoryError::ChecksumMismatch { .. }));
}

#[test]
fn test_tampered_cache_heals_on_update() {
    let dir = TempDir::new().unwrap();
    let cache = ManifestCache::new(dir.path());
    cache
        .store(&CacheRecord::remote(BODY.to_string(), now()))
        .unwrap();
    let raw = std::fs::read_to_string(cache.path()).unwrap();
    std::fs::write(cache.path(), raw.replace("burpsuite", "burpsuitx")).unwrap();

    let report = pipeline(Scripted::serving(BODY), &dir)
        .run(&options(false, true))
        .unwrap();

    assert_eq!(report.origin, ManifestOrigin::Remote);
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, PipelineWarning::CacheUnreadable { .. })));
    assert_eq!(cache.read().unwrap().unwrap().body, BODY);
}

#[test]
fn test_network_failure_falls_back_to_cache() {
    let dir = TempDir::new().unwrap();
    ManifestCache::new(dir.path())
        .store(&CacheRecord::remote(BODY.to_string(), now() - Duration::days(2)))
        .unwrap();

    let source = Scripted::unreachable();
    let report = pipeline(source, &dir).run(&options(false, true)).unwrap();

    assert_eq!(report.origin, ManifestOrigin::Cache);
    assert!(matches!(report.update, UpdateStatus::Unknown { .. }));
    assert!(report.warnings.iter().any(|w| matches!(
        w,
        PipelineWarning::RemoteUnavailable { stage: "fetch_remote_descriptor", .. }
    )));
    // Two days old is not stale
    assert!(!report
        .warnings
        .iter()
        .any(|w| matches!(w, PipelineWarning::Stale { .. })));
}

#[test]
fn test_body_failure_after_descriptor_falls_back() {
    let dir = TempDir::new().unwrap();
    let mut source = Scripted::serving(NEWER_BODY);
    source.body = None;

    let report = pipeline(source, &dir).run(&options(false, true)).unwrap();

    assert_eq!(report.origin, ManifestOrigin::Bundled);
    assert!(report.warnings.iter().any(|w| matches!(
        w,
        PipelineWarning::RemoteUnavailable { stage: "download_and_verify", .. }
    )));
    assert_eq!(cache_bytes(&dir), None);
}

#[test]
fn test_offline_without_cache_uses_bundled_and_warns_stale() {
    let dir = TempDir::new().unwrap();
    let source = Scripted::unreachable();
    let pipeline = pipeline(source, &dir).with_bundled(BODY.as_bytes());

    let far_future = PipelineOptions {
        now: "2027-06-01T00:00:00Z".parse().unwrap(),
        ..options(true, true)
    };
    let report = pipeline.run(&far_future).unwrap();

    assert_eq!(report.origin, ManifestOrigin::Bundled);
    assert_eq!(report.catalog.checksum, checksum_hex(BODY.as_bytes()));
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, PipelineWarning::Stale { origin: ManifestOrigin::Bundled, .. })));
    assert_eq!(pipeline.source_descriptor_calls(), 0);
    assert_eq!(report.trace, vec!["start", "cached_or_bundled", "loaded"]);
}

#[test]
fn test_remote_equal_to_bundled_needs_no_download() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(Scripted::serving(BODY), &dir).with_bundled(BODY.as_bytes());

    let report = pipeline.run(&options(false, true)).unwrap();

    assert_eq!(report.origin, ManifestOrigin::Bundled);
    assert!(matches!(report.update, UpdateStatus::UpToDate { .. }));
    assert_eq!(pipeline.source_body_calls(), 0);
    assert_eq!(cache_bytes(&dir), None);
}

#[test]
fn test_interrupted_cache_write_keeps_previous_record() {
    let dir = TempDir::new().unwrap();
    let cache = ManifestCache::new(dir.path());
    cache
        .store(&CacheRecord::remote(BODY.to_string(), now()))
        .unwrap();
    let before = cache_bytes(&dir).unwrap();

    // Staged but never committed, as if the process died mid-write
    let staged = cache
        .stage(&CacheRecord::remote(NEWER_BODY.to_string(), now()))
        .unwrap();
    drop(staged);

    assert_eq!(cache_bytes(&dir).unwrap(), before);
    let report = pipeline(Scripted::unreachable(), &dir)
        .run(&options(true, true))
        .unwrap();
    assert_eq!(report.origin, ManifestOrigin::Cache);
    assert_eq!(report.catalog, Catalog::load(BODY.as_bytes()).unwrap());
}

#[test]
fn test_update_while_cache_locked_is_busy() {
    let dir = TempDir::new().unwrap();
    let cache = ManifestCache::new(dir.path());
    let _held = cache.lock().unwrap();

    let err = pipeline(Scripted::serving(BODY), &dir)
        .run(&options(false, true))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Concurrency);
    assert_eq!(cache_bytes(&dir), None);
}

#[test]
fn test_every_bundled_tool_resolves() {
    let catalog = Catalog::load(armory_common::manifest::bundled::body()).unwrap();
    assert!(!catalog.tools().is_empty());
    for tool in catalog.tools() {
        let resolved = catalog.resolve(&tool.name).unwrap();
        assert_eq!(resolved.len(), 1, "{} resolves to one tool", tool.name);
        assert_eq!(resolved[0].name, tool.name);
        assert!(catalog.category(&tool.category).is_ok());
    }
}

/// Request counters, read through the pipeline's source
trait Counters {
    fn source_body_calls(&self) -> usize;
    fn source_descriptor_calls(&self) -> usize;
}

impl Counters for ManifestPipeline<Scripted> {
    fn source_body_calls(&self) -> usize {
        self.source().body_calls.get()
    }

    fn source_descriptor_calls(&self) -> usize {
        self.source().descriptor_calls.get()
    }
}
