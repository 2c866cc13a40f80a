//! Manifest schemas
//!
//! The manifest body is decoded by looking at its integer `schema_version`
//! first and then handing the document to the strict decoder for exactly
//! that version. Every decoder denies unknown fields, so a field this build
//! does not understand fails the load instead of being dropped.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{RepositorySource, ToolEntry};
use crate::error::{ArmoryError, Result};

/// Schema versions this build can read
pub const SUPPORTED_SCHEMAS: &[u32] = &[1, 2];

/// Version-independent shape every decoder produces
#[derive(Debug)]
pub(super) struct RawCatalog {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub categories: Vec<RawCategory>,
    pub tools: Vec<ToolEntry>,
}

#[derive(Debug)]
pub(super) struct RawCategory {
    pub key: String,
    pub title: String,
    pub description: String,
}

pub(super) fn decode(body: &[u8]) -> Result<RawCatalog> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ArmoryError::MalformedManifest(format!("not valid JSON: {}", e)))?;

    let version = value
        .get("schema_version")
        .ok_or_else(|| ArmoryError::MalformedManifest("missing schema_version".to_string()))?
        .as_u64()
        .ok_or_else(|| {
            ArmoryError::MalformedManifest("schema_version must be an integer".to_string())
        })?;

    match version {
        1 => decode_as::<ManifestV1>(value).map(RawCatalog::from),
        2 => decode_as::<ManifestV2>(value).map(RawCatalog::from),
        other => Err(ArmoryError::MalformedManifest(format!(
            "unsupported schema_version {} (supported: {:?})",
            other, SUPPORTED_SCHEMAS
        ))),
    }
}

fn decode_as<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ArmoryError::MalformedManifest(e.to_string()))
}

// =============================================================================
// Schema v1: categories nest their tools, update policy is `auto_updates`
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestV1 {
    #[allow(dead_code)]
    schema_version: u32,
    generated_at: DateTime<Utc>,
    categories: Vec<CategoryV1>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CategoryV1 {
    key: String,
    name: String,
    #[serde(default)]
    description: String,
    tools: Vec<ToolV1>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolV1 {
    name: String,
    packages: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(default = "default_auto_updates")]
    auto_updates: bool,
}

fn default_auto_updates() -> bool {
    true
}

impl From<ManifestV1> for RawCatalog {
    fn from(manifest: ManifestV1) -> Self {
        let mut categories = Vec::with_capacity(manifest.categories.len());
        let mut tools = Vec::new();

        for category in manifest.categories {
            for tool in category.tools {
                tools.push(ToolEntry {
                    name: tool.name,
                    category: category.key.clone(),
                    packages: tool.packages,
                    description: tool.description,
                    // v1 predates per-tool sources; everything came from upstream
                    repository: RepositorySource::Curated,
                    manual_upgrade: !tool.auto_updates,
                    note: None,
                    min_os_releases: Vec::new(),
                    version_constraints: BTreeMap::new(),
                });
            }
            categories.push(RawCategory {
                key: category.key,
                title: category.name,
                description: category.description,
            });
        }

        RawCatalog {
            schema_version: 1,
            generated_at: manifest.generated_at,
            categories,
            tools,
        }
    }
}

// =============================================================================
// Schema v2: flat tool list referencing categories by key
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestV2 {
    #[allow(dead_code)]
    schema_version: u32,
    generated_at: DateTime<Utc>,
    categories: Vec<CategoryV2>,
    tools: Vec<ToolV2>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CategoryV2 {
    key: String,
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolV2 {
    name: String,
    category: String,
    packages: Vec<String>,
    #[serde(default)]
    description: String,
    repository: RepositorySource,
    #[serde(default)]
    manual_upgrade: bool,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    min_os_releases: Vec<String>,
    #[serde(default)]
    version_constraints: BTreeMap<String, String>,
}

impl From<ManifestV2> for RawCatalog {
    fn from(manifest: ManifestV2) -> Self {
        RawCatalog {
            schema_version: 2,
            generated_at: manifest.generated_at,
            categories: manifest
                .categories
                .into_iter()
                .map(|c| RawCategory {
                    key: c.key,
                    title: c.title,
                    description: c.description,
                })
                .collect(),
            tools: manifest
                .tools
                .into_iter()
                .map(|t| ToolEntry {
                    name: t.name,
                    category: t.category,
                    packages: t.packages,
                    description: t.description,
                    repository: t.repository,
                    manual_upgrade: t.manual_upgrade,
                    note: t.note,
                    min_os_releases: t.min_os_releases,
                    version_constraints: t.version_constraints,
                })
                .collect(),
        }
    }
}
