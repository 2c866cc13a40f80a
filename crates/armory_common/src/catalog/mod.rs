//! Catalog Model
//!
//! In-memory categories and tools built from one manifest body. Pure data
//! and validation: no I/O happens here. A `Catalog` is built fresh on every
//! load and never mutated afterwards.

pub mod schema;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{ArmoryError, Result};
use crate::manifest::checksum_hex;

/// Where a tool's packages come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositorySource {
    /// The distribution's own archive
    None,
    /// The curated upstream source managed by `repo enable`
    Curated,
}

/// One installable tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolEntry {
    pub name: String,
    /// Key of the owning category
    pub category: String,
    pub packages: Vec<String>,
    pub description: String,
    pub repository: RepositorySource,
    /// Upstream ships releases outside the package manager
    pub manual_upgrade: bool,
    pub note: Option<String>,
    /// Empty means every release is supported
    pub min_os_releases: Vec<String>,
    /// package -> constraint, e.g. "nmap" -> ">= 7.94"
    pub version_constraints: BTreeMap<String, String>,
}

impl ToolEntry {
    pub fn requires_curated(&self) -> bool {
        self.repository == RepositorySource::Curated
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        if self.manual_upgrade {
            UpdatePolicy::Manual
        } else {
            UpdatePolicy::Automatic
        }
    }

    /// Whether `release` (codename or version id) is in the supported list
    pub fn supports_release(&self, release: &str) -> bool {
        self.min_os_releases.is_empty()
            || self
                .min_os_releases
                .iter()
                .any(|r| r.eq_ignore_ascii_case(release))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    Automatic,
    Manual,
}

impl std::fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdatePolicy::Automatic => write!(f, "automatic"),
            UpdatePolicy::Manual => write!(f, "manual"),
        }
    }
}

/// A named, ordered group of tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub key: String,
    pub title: String,
    pub description: String,
    #[serde(skip)]
    tools: Vec<usize>,
}

/// Version report for one tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub tool: String,
    pub manual_upgrade: bool,
    pub update_policy: UpdatePolicy,
    pub packages: Vec<PackageConstraint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageConstraint {
    pub package: String,
    pub constraint: Option<String>,
}

/// Group the update policy with declared version constraints
pub fn versions_of(tool: &ToolEntry) -> VersionInfo {
    VersionInfo {
        tool: tool.name.clone(),
        manual_upgrade: tool.manual_upgrade,
        update_policy: tool.update_policy(),
        packages: tool
            .packages
            .iter()
            .map(|package| PackageConstraint {
                package: package.clone(),
                constraint: tool.version_constraints.get(package).cloned(),
            })
            .collect(),
    }
}

/// All categories and tools from one manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    /// SHA-256 of the manifest body this catalog was built from
    pub checksum: String,
    categories: Vec<Category>,
    tools: Vec<ToolEntry>,
    tool_index: HashMap<String, usize>,
    category_index: HashMap<String, usize>,
}

impl Catalog {
    /// Build and validate a catalog from a manifest body
    pub fn load(body: &[u8]) -> Result<Self> {
        let raw = schema::decode(body)?;
        let checksum = checksum_hex(body);

        let mut categories = Vec::with_capacity(raw.categories.len());
        let mut category_index = HashMap::new();
        for category in raw.categories {
            let key = normalize(&category.key);
            if key.is_empty() {
                return Err(malformed("category with empty key"));
            }
            if category_index.insert(key, categories.len()).is_some() {
                return Err(malformed(&format!(
                    "duplicate category '{}'",
                    category.key
                )));
            }
            categories.push(Category {
                key: category.key,
                title: category.title,
                description: category.description,
                tools: Vec::new(),
            });
        }

        let mut tools = Vec::with_capacity(raw.tools.len());
        let mut tool_index = HashMap::new();
        for tool in raw.tools {
            validate_tool(&tool)?;

            let Some(&category_pos) = category_index.get(&normalize(&tool.category)) else {
                return Err(malformed(&format!(
                    "tool '{}' references unknown category '{}'",
                    tool.name, tool.category
                )));
            };
            if tool_index.insert(normalize(&tool.name), tools.len()).is_some() {
                return Err(ArmoryError::DuplicateTool(tool.name));
            }

            categories[category_pos].tools.push(tools.len());
            tools.push(tool);
        }

        tracing::debug!(
            schema = raw.schema_version,
            categories = categories.len(),
            tools = tools.len(),
            "catalog loaded"
        );

        Ok(Self {
            schema_version: raw.schema_version,
            generated_at: raw.generated_at,
            checksum,
            categories,
            tools,
            tool_index,
            category_index,
        })
    }

    /// Resolve a tool name or category key to tools, in declaration order.
    /// A tool name wins over a category with the same name.
    pub fn resolve(&self, name: &str) -> Result<Vec<&ToolEntry>> {
        let key = normalize(name);
        if let Some(&pos) = self.tool_index.get(&key) {
            return Ok(vec![&self.tools[pos]]);
        }
        if let Some(&pos) = self.category_index.get(&key) {
            return Ok(self.tools_in(&self.categories[pos]));
        }
        Err(ArmoryError::UnknownTool(name.trim().to_string()))
    }

    /// Look up a category by key only
    pub fn category(&self, key: &str) -> Result<&Category> {
        self.category_index
            .get(&normalize(key))
            .map(|&pos| &self.categories[pos])
            .ok_or_else(|| ArmoryError::UnknownCategory {
                name: key.trim().to_string(),
                available: self.category_keys().join(", "),
            })
    }

    pub fn tool(&self, name: &str) -> Option<&ToolEntry> {
        self.tool_index.get(&normalize(name)).map(|&pos| &self.tools[pos])
    }

    pub fn tools_in(&self, category: &Category) -> Vec<&ToolEntry> {
        category.tools.iter().map(|&pos| &self.tools[pos]).collect()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn tools(&self) -> &[ToolEntry] {
        &self.tools
    }

    /// Category keys, sorted, for error messages
    pub fn category_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.categories.iter().map(|c| c.key.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn versions_of(&self, tool: &ToolEntry) -> VersionInfo {
        versions_of(tool)
    }
}

fn validate_tool(tool: &ToolEntry) -> Result<()> {
    if tool.name.trim().is_empty() {
        return Err(malformed("tool with empty name"));
    }
    if tool.packages.is_empty() {
        return Err(malformed(&format!("tool '{}' lists no packages", tool.name)));
    }

    let mut seen = HashSet::new();
    for package in &tool.packages {
        if package.trim().is_empty() || package.chars().any(char::is_whitespace) {
            return Err(malformed(&format!(
                "tool '{}' has invalid package name '{}'",
                tool.name, package
            )));
        }
        if !seen.insert(package.as_str()) {
            return Err(malformed(&format!(
                "tool '{}' lists package '{}' twice",
                tool.name, package
            )));
        }
    }

    if let Some(package) = tool
        .version_constraints
        .keys()
        .find(|p| !seen.contains(p.as_str()))
    {
        return Err(malformed(&format!(
            "tool '{}' constrains '{}', which it does not install",
            tool.name, package
        )));
    }
    Ok(())
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn malformed(reason: &str) -> ArmoryError {
    ArmoryError::MalformedManifest(reason.to_string())
}
