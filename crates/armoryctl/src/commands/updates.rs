//! check-updates and update
//!
//! Both run the manifest pipeline; only `update` may download and cache.

use anyhow::Result;
use armory_common::{ManifestOrigin, PipelineWarning, UpdateStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Context;

#[derive(Debug, Clone, Serialize)]
pub struct UpdatesReport {
    pub update: UpdateStatus,
    pub origin: ManifestOrigin,
    pub checksum: String,
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub warnings: Vec<PipelineWarning>,
}

pub fn run(ctx: &Context, apply: bool) -> Result<UpdatesReport> {
    let report = ctx.run_pipeline(apply)?;
    Ok(UpdatesReport {
        update: report.update,
        origin: report.origin,
        checksum: report.catalog.checksum.clone(),
        schema_version: report.catalog.schema_version,
        generated_at: report.catalog.generated_at,
        warnings: report.warnings,
    })
}
