//! Install Planner
//!
//! Turns a tool or category name into the packages to install plus what the
//! user should be told about them. Planning never mutates anything; dry-run
//! and real runs get the same plan and only the caller decides whether to
//! hand it to the package manager.

use serde::Serialize;
use std::collections::HashSet;

use crate::apt::AptInvocation;
use crate::catalog::{Catalog, ToolEntry};
use crate::error::{ArmoryError, Result};
use crate::repository::RepositoryProbe;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOptions {
    pub dry_run: bool,
    /// Only upgrade packages that are already installed
    pub upgrade: bool,
    /// Host release key (codename or version id), if known
    pub os_release: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Install,
    Upgrade,
}

/// Shown for tools whose upstream ships updates outside the package manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisory {
    pub tool: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolNote {
    pub tool: String,
    pub note: String,
}

/// The host release is not in a tool's supported list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseWarning {
    pub tool: String,
    pub release: String,
    pub supported: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallPlan {
    pub target: String,
    pub operation: Operation,
    /// Resolved tools, declaration order
    pub tools: Vec<String>,
    /// De-duplicated, first-seen order
    pub packages: Vec<String>,
    pub advisories: Vec<Advisory>,
    pub notes: Vec<ToolNote>,
    pub warnings: Vec<ReleaseWarning>,
}

impl InstallPlan {
    /// Package manager invocations that carry out the plan
    pub fn commands(&self) -> Vec<AptInvocation> {
        if self.packages.is_empty() {
            return Vec::new();
        }
        let install = match self.operation {
            Operation::Install => AptInvocation::install(&self.packages),
            Operation::Upgrade => AptInvocation::upgrade(&self.packages),
        };
        vec![AptInvocation::update(), install]
    }
}

pub struct Planner<'a> {
    catalog: &'a Catalog,
    repository: &'a dyn RepositoryProbe,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a Catalog, repository: &'a dyn RepositoryProbe) -> Self {
        Self {
            catalog,
            repository,
        }
    }

    pub fn plan(&self, target: &str, options: &PlanOptions) -> Result<InstallPlan> {
        let tools = self.catalog.resolve(target)?;
        self.check_repository(&tools)?;

        let mut seen = HashSet::new();
        let mut packages = Vec::new();
        let mut advisories = Vec::new();
        let mut notes = Vec::new();
        let mut warnings = Vec::new();

        for tool in &tools {
            for package in &tool.packages {
                if seen.insert(package.as_str()) {
                    packages.push(package.clone());
                }
            }
            if tool.manual_upgrade {
                advisories.push(Advisory {
                    tool: tool.name.clone(),
                    message: format!(
                        "{} is upgraded manually; the package manager will not keep it current",
                        tool.name
                    ),
                });
            }
            if let Some(note) = &tool.note {
                notes.push(ToolNote {
                    tool: tool.name.clone(),
                    note: note.clone(),
                });
            }
            if let Some(release) = &options.os_release {
                if !tool.supports_release(release) {
                    warnings.push(ReleaseWarning {
                        tool: tool.name.clone(),
                        release: release.clone(),
                        supported: tool.min_os_releases.clone(),
                    });
                }
            }
        }

        tracing::debug!(
            requested = target,
            tools = tools.len(),
            packages = packages.len(),
            dry_run = options.dry_run,
            "install plan built"
        );

        Ok(InstallPlan {
            target: target.trim().to_string(),
            operation: if options.upgrade {
                Operation::Upgrade
            } else {
                Operation::Install
            },
            tools: tools.iter().map(|t| t.name.clone()).collect(),
            packages,
            advisories,
            notes,
            warnings,
        })
    }

    /// Every curated tool needs the repository; name the first one that
    /// cannot be satisfied
    fn check_repository(&self, tools: &[&ToolEntry]) -> Result<()> {
        let Some(first) = tools.iter().find(|t| t.requires_curated()) else {
            return Ok(());
        };
        if self.repository.status()?.enabled {
            return Ok(());
        }
        Err(ArmoryError::RepositoryRequired {
            tool: first.name.clone(),
        })
    }
}
