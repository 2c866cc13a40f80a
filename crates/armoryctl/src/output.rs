//! Output formatting - plain ASCII text or JSON
//!
//! Results go to stdout, warnings and prompts to stderr. Colour is only
//! used when stdout is a terminal and `--no-color` is absent.

use anyhow::{bail, Result};
use armory_common::planner::{InstallPlan, Operation};
use armory_common::{DisableOutcome, EnableOutcome, PipelineWarning, UpdateStatus};
use console::Term;
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::commands::install::InstallReport;
use crate::commands::list::ListReport;
use crate::commands::repo::{RepoAction, RepoReport};
use crate::commands::updates::UpdatesReport;
use crate::commands::versions::VersionsReport;

pub struct Output {
    json: bool,
    color: bool,
}

#[derive(Serialize)]
struct PlanView<'a> {
    #[serde(flatten)]
    plan: &'a InstallPlan,
    commands: Vec<String>,
}

impl Output {
    pub fn new(json: bool, no_color: bool) -> Self {
        let color = !json && !no_color && Term::stdout().features().colors_supported();
        Self { json, color }
    }

    pub fn warnings(&self, warnings: &[PipelineWarning]) {
        for warning in warnings {
            let label = if self.color {
                "warning:".yellow().bold().to_string()
            } else {
                "warning:".to_string()
            };
            eprintln!("{} {}", label, warning);
        }
    }

    pub fn note(&self, message: &str) {
        eprintln!("{}", message);
    }

    /// Ask on stderr; a non-interactive terminal needs `--yes`
    pub fn confirm(&self, question: &str) -> Result<bool> {
        let term = Term::stderr();
        if !term.is_term() {
            bail!("refusing to continue without confirmation on a non-interactive terminal; pass --yes");
        }
        term.write_str(&format!("{} [y/N] ", question))?;
        let answer = term.read_line()?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    pub fn list(&self, report: &ListReport) -> Result<()> {
        if self.json {
            return self.print_json(report);
        }
        if report.categories.is_empty() {
            println!("No tools match the current filters.");
            return Ok(());
        }

        for category in &report.categories {
            let header = format!("[{}] {}", category.key, category.title);
            println!("{} - {}", self.accent(&header), category.description);
            for tool in &category.tools {
                let curated = if tool.repository == armory_common::RepositorySource::Curated {
                    " [curated]"
                } else {
                    ""
                };
                let installed = match &tool.installed {
                    Some(version) => self.good(version),
                    None => self.muted("not installed"),
                };
                println!(
                    "  - {} ({}){} :: {} :: {} :: {} updates",
                    tool.name,
                    tool.packages.join(", "),
                    curated,
                    tool.description,
                    installed,
                    tool.update_policy
                );
            }
        }
        println!();
        println!(
            "{} categories, {} tools (manifest: {})",
            report.categories.len(),
            report.tool_count(),
            report.origin
        );
        Ok(())
    }

    pub fn repo(&self, report: &RepoReport) -> Result<()> {
        if self.json {
            return self.print_json(report);
        }
        let sources = report.status.sources_path.display();
        match &report.action {
            RepoAction::Enabled(EnableOutcome::Enabled) => {
                println!("{} {}", self.good("Curated repository enabled in"), sources);
                println!("Run `armoryctl repo disable` to restore the previous file.");
            }
            RepoAction::Enabled(EnableOutcome::AlreadyEnabled) => {
                println!("Curated repository is already enabled in {}; nothing changed.", sources);
            }
            RepoAction::Disabled(DisableOutcome::Restored) => {
                println!("{} {} restored from backup.", self.good("Curated repository disabled;"), sources);
            }
            RepoAction::Disabled(DisableOutcome::Removed) => {
                println!(
                    "{} {} removed (it did not exist before enable).",
                    self.good("Curated repository disabled;"),
                    sources
                );
            }
            RepoAction::WouldEnable { append, backup } => {
                println!("[dry-run] would back up {} to {}", sources, backup.display());
                println!("[dry-run] would append: {}", append);
            }
            RepoAction::WouldDisable {
                restore_bytes,
                remove,
            } => {
                if *remove {
                    println!("[dry-run] would remove {} (it did not exist before enable)", sources);
                } else {
                    println!("[dry-run] would restore {} bytes to {}", restore_bytes, sources);
                }
            }
            RepoAction::Status => {
                let state = if report.status.enabled {
                    self.good("enabled")
                } else {
                    self.muted("disabled")
                };
                println!("Curated repository is {} ({}).", state, sources);
                println!(
                    "Backup: {}",
                    if report.status.backup_active {
                        "active"
                    } else {
                        "none"
                    }
                );
            }
        }
        Ok(())
    }

    /// Show the plan; in JSON mode only when it is the final output
    pub fn plan(&self, plan: &InstallPlan, dry_run: bool) -> Result<()> {
        if self.json {
            if dry_run || plan.packages.is_empty() {
                return self.print_json(&PlanView {
                    plan,
                    commands: plan.commands().iter().map(|c| c.to_string()).collect(),
                });
            }
            return Ok(());
        }

        let verb = match plan.operation {
            Operation::Install => "install",
            Operation::Upgrade => "upgrade",
        };
        println!(
            "{} {} {} ({} tools)",
            self.accent("[PLAN]"),
            verb,
            plan.target,
            plan.tools.len()
        );
        if plan.packages.is_empty() {
            println!("  nothing to install");
            return Ok(());
        }
        println!("  packages: {}", plan.packages.join(" "));
        println!("  commands:");
        for command in plan.commands() {
            println!("    {}", command);
        }
        for advisory in &plan.advisories {
            println!("{} {}", self.warn("[ADVISORY]"), advisory.message);
        }
        for note in &plan.notes {
            println!("[NOTE] {}: {}", note.tool, note.note);
        }
        for warning in &plan.warnings {
            println!(
                "{} {} is not listed for {} (supported: {})",
                self.warn("[WARNING]"),
                warning.tool,
                warning.release,
                warning.supported.join(", ")
            );
        }
        if dry_run {
            println!("[dry-run] nothing was run");
        }
        Ok(())
    }

    pub fn install(&self, report: &InstallReport) -> Result<()> {
        if self.json {
            return self.print_json(report);
        }
        for change in &report.changes {
            println!(
                "{}: {} -> {} ({} updates)",
                change.tool,
                change.before.as_deref().unwrap_or("not installed"),
                change.after.as_deref().unwrap_or("not installed"),
                change.update_policy
            );
        }
        Ok(())
    }

    pub fn versions(&self, report: &VersionsReport) -> Result<()> {
        if self.json {
            return self.print_json(&report.rows);
        }

        let headers = ["Tool", "Category", "Updates", "Constraints", "Installed"];
        let rows: Vec<[String; 5]> = report
            .rows
            .iter()
            .map(|row| {
                let constraints: Vec<String> = row
                    .info
                    .packages
                    .iter()
                    .filter_map(|p| p.constraint.as_ref().map(|c| format!("{} {}", p.package, c)))
                    .collect();
                [
                    row.info.tool.clone(),
                    row.category.clone(),
                    row.info.update_policy.to_string(),
                    if constraints.is_empty() {
                        "-".to_string()
                    } else {
                        constraints.join(", ")
                    },
                    row.installed
                        .clone()
                        .unwrap_or_else(|| "not installed".to_string()),
                ]
            })
            .collect();

        let mut widths = headers.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row.iter()) {
                *width = (*width).max(cell.len());
            }
        }

        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(widths.iter())
                .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        println!("{}", self.accent(&line(&header_cells)));
        println!(
            "{}",
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("  ")
        );
        for row in &rows {
            println!("{}", line(&row[..]));
        }
        Ok(())
    }

    pub fn updates(&self, report: &UpdatesReport) -> Result<()> {
        if self.json {
            return self.print_json(report);
        }
        match &report.update {
            UpdateStatus::UpToDate { checksum } => {
                println!("{} ({})", self.good("Manifest is up to date"), short(checksum));
            }
            UpdateStatus::Available {
                checksum,
                published_at,
                applied: true,
            } => {
                println!(
                    "{} {} (published {})",
                    self.good("Manifest updated to"),
                    short(checksum),
                    published_at.format("%Y-%m-%d")
                );
            }
            UpdateStatus::Available {
                checksum,
                published_at,
                applied: false,
            } => {
                println!(
                    "{} {} (published {}). Run `armoryctl update` to fetch it.",
                    self.warn("A newer manifest is available:"),
                    short(checksum),
                    published_at.format("%Y-%m-%d")
                );
            }
            UpdateStatus::Unknown { reason } => {
                println!("Could not check for updates: {}", reason);
            }
        }
        println!(
            "Using {} manifest {} (schema v{}, generated {}).",
            report.origin,
            short(&report.checksum),
            report.schema_version,
            report.generated_at.format("%Y-%m-%d")
        );
        Ok(())
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn accent(&self, text: &str) -> String {
        if self.color {
            text.bright_magenta().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn good(&self, text: &str) -> String {
        if self.color {
            text.bright_green().to_string()
        } else {
            text.to_string()
        }
    }

    fn warn(&self, text: &str) -> String {
        if self.color {
            text.yellow().to_string()
        } else {
            text.to_string()
        }
    }

    fn muted(&self, text: &str) -> String {
        if self.color {
            text.bright_black().to_string()
        } else {
            text.to_string()
        }
    }
}

fn short(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}
