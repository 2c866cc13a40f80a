//! install command
//!
//! Planning happens before confirmation so the user sees exactly which
//! packages and commands are involved; nothing is run under `--dry-run`.

use anyhow::{Context as _, Result};
use armory_common::apt::{installed_versions, AptInvocation};
use armory_common::{
    Catalog, InstallPlan, PipelineWarning, PlanOptions, Planner, UpdatePolicy,
};
use serde::Serialize;

use super::Context;

pub struct PreparedInstall {
    pub catalog: Catalog,
    pub plan: InstallPlan,
    pub warnings: Vec<PipelineWarning>,
}

impl PreparedInstall {
    pub fn commands(&self) -> Vec<AptInvocation> {
        self.plan.commands()
    }
}

/// Installed version of one tool before and after the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionChange {
    pub tool: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub update_policy: UpdatePolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub plan: InstallPlan,
    pub changes: Vec<VersionChange>,
}

pub fn prepare(ctx: &Context, target: &str, upgrade: bool) -> Result<PreparedInstall> {
    let pipeline = ctx.load_catalog()?;
    let repository = ctx.repository();
    let options = PlanOptions {
        dry_run: ctx.dry_run,
        upgrade,
        os_release: ctx.os_release.clone(),
    };

    let plan = Planner::new(&pipeline.catalog, &repository).plan(target, &options)?;
    Ok(PreparedInstall {
        catalog: pipeline.catalog,
        plan,
        warnings: pipeline.warnings,
    })
}

pub fn apply(ctx: &Context, prepared: &PreparedInstall) -> Result<InstallReport> {
    ctx.require_root()?;
    let pm = ctx.package_manager.as_ref();

    let tools: Vec<_> = prepared
        .plan
        .tools
        .iter()
        .filter_map(|name| prepared.catalog.tool(name))
        .collect();

    let mut before = Vec::with_capacity(tools.len());
    for tool in &tools {
        before.push(installed_versions(pm, tool)?);
    }

    for invocation in prepared.commands() {
        pm.run(&invocation)
            .with_context(|| format!("installing {}", prepared.plan.target))?;
    }

    let mut changes = Vec::with_capacity(tools.len());
    for (tool, before) in tools.iter().zip(before) {
        changes.push(VersionChange {
            tool: tool.name.clone(),
            before,
            after: installed_versions(pm, tool)?,
            update_policy: tool.update_policy(),
        });
    }

    Ok(InstallReport {
        plan: prepared.plan.clone(),
        changes,
    })
}
