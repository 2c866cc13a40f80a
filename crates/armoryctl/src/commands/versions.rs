//! versions command

use anyhow::Result;
use armory_common::apt::installed_versions;
use armory_common::{PipelineWarning, VersionInfo};
use serde::Serialize;

use super::Context;

#[derive(Debug, Clone, Serialize)]
pub struct VersionRow {
    #[serde(flatten)]
    pub info: VersionInfo,
    pub category: String,
    pub installed: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionsReport {
    pub rows: Vec<VersionRow>,
    #[serde(skip)]
    pub warnings: Vec<PipelineWarning>,
}

pub fn run(ctx: &Context, target: Option<&str>) -> Result<VersionsReport> {
    let pipeline = ctx.load_catalog()?;
    let catalog = &pipeline.catalog;

    let tools = match target {
        Some(name) => catalog.resolve(name)?,
        None => catalog.tools().iter().collect(),
    };

    let mut rows = Vec::with_capacity(tools.len());
    for tool in tools {
        rows.push(VersionRow {
            info: catalog.versions_of(tool),
            category: tool.category.clone(),
            installed: installed_versions(ctx.package_manager.as_ref(), tool)?,
        });
    }

    Ok(VersionsReport {
        rows,
        warnings: pipeline.warnings,
    })
}
