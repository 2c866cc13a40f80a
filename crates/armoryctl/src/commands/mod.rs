//! Command handlers for armoryctl
//!
//! Each handler returns a report value; rendering lives in `output`.
//! - list: categories and tools with installed versions
//! - repo: curated source enable/disable/status
//! - install: plan, confirm, run the package manager
//! - versions: update policy, constraints and installed versions
//! - updates: check-updates and update

pub mod install;
pub mod list;
pub mod repo;
pub mod updates;
pub mod versions;

use anyhow::{Context as _, Result};
use armory_common::apt::{self, AptRunner, PackageManager};
use armory_common::os_release::OsRelease;
use armory_common::{
    ArmoryConfig, ManifestPipeline, PipelineOptions, PipelineReport, RepositoryManager,
};

use crate::cli::{Cli, Commands, RepoCommands};
use crate::output::Output;

/// Everything a handler needs from the invocation
pub struct Context {
    pub config: ArmoryConfig,
    pub dry_run: bool,
    pub offline: bool,
    pub assume_yes: bool,
    /// Mutations check euid first; off only when every path is user-owned
    pub check_root: bool,
    pub os_release: Option<String>,
    pub package_manager: Box<dyn PackageManager>,
}

impl Context {
    pub fn new(config: ArmoryConfig, cli: &Cli) -> Self {
        Self {
            config,
            dry_run: cli.dry_run,
            offline: cli.offline,
            assume_yes: cli.yes,
            check_root: true,
            os_release: OsRelease::detect().and_then(|r| r.release_key().map(str::to_string)),
            package_manager: Box::new(AptRunner),
        }
    }

    /// Run the manifest pipeline. `apply` is ignored under `--dry-run`,
    /// which never writes the cache.
    pub fn run_pipeline(&self, apply: bool) -> Result<PipelineReport> {
        let pipeline = ManifestPipeline::from_config(&self.config)
            .context("cannot set up manifest pipeline")?;
        let apply = apply && !self.dry_run;
        let report = pipeline.run(&PipelineOptions::new(self.offline, apply))?;
        tracing::debug!(trace = ?report.trace, "manifest pipeline finished");
        Ok(report)
    }

    /// Catalog for list, install and versions; refreshes the cache when online
    pub fn load_catalog(&self) -> Result<PipelineReport> {
        self.run_pipeline(true)
    }

    pub fn repository(&self) -> RepositoryManager {
        RepositoryManager::from_config(&self.config.repository)
    }

    pub fn require_root(&self) -> Result<()> {
        if self.check_root {
            apt::require_root()?;
        }
        Ok(())
    }
}

/// Run the parsed command and render its result
pub fn execute(cli: &Cli, ctx: &Context, out: &Output) -> Result<()> {
    tracing::debug!(command = cli.command.name(), "dispatching");
    match &cli.command {
        Commands::List {
            category,
            only_installed,
        } => {
            let report = list::run(ctx, category.as_deref(), *only_installed)?;
            out.warnings(&report.warnings);
            out.list(&report)
        }
        Commands::Repo { action } => {
            let report = match action {
                RepoCommands::Enable => repo::enable(ctx)?,
                RepoCommands::Disable => repo::disable(ctx)?,
                RepoCommands::Status => repo::status(ctx)?,
            };
            out.repo(&report)
        }
        Commands::Install { target, upgrade } => {
            let prepared = install::prepare(ctx, target, *upgrade)?;
            out.warnings(&prepared.warnings);
            out.plan(&prepared.plan, ctx.dry_run)?;
            if ctx.dry_run || prepared.plan.packages.is_empty() {
                return Ok(());
            }
            if !ctx.assume_yes && !out.confirm("Proceed with installation?")? {
                out.note("aborted, nothing was installed");
                return Ok(());
            }
            let report = install::apply(ctx, &prepared)?;
            out.install(&report)
        }
        Commands::Versions { target } => {
            let report = versions::run(ctx, target.as_deref())?;
            out.warnings(&report.warnings);
            out.versions(&report)
        }
        Commands::CheckUpdates => {
            let report = updates::run(ctx, false)?;
            out.warnings(&report.warnings);
            out.updates(&report)
        }
        Commands::Update => {
            let report = updates::run(ctx, true)?;
            out.warnings(&report.warnings);
            out.updates(&report)
        }
    }
}
