//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution logic.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Armory - curated security tooling, reversibly
#[derive(Parser, Debug)]
#[command(name = "armoryctl")]
#[command(about = "Install curated security tools and manage their package source", long_about = None)]
#[command(version = env!("ARMORY_VERSION"))]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Show what would happen without changing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Do not contact the manifest server
    #[arg(long, global = true)]
    pub offline: bool,

    /// Do not ask for confirmation
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Machine-readable output on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colour even on a terminal
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file (overrides $ARMORY_CONFIG and /etc/armory/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List categories and tools
    List {
        /// Only this category
        category: Option<String>,

        /// Only tools with an installed package
        #[arg(long)]
        only_installed: bool,
    },

    /// Manage the curated package source
    Repo {
        #[command(subcommand)]
        action: RepoCommands,
    },

    /// Install a tool or every tool in a category
    Install {
        /// Tool name or category key
        target: String,

        /// Only upgrade packages that are already installed
        #[arg(long)]
        upgrade: bool,
    },

    /// Show update policy, version constraints and installed versions
    Versions {
        /// Tool name or category key (default: everything)
        target: Option<String>,
    },

    /// Check whether a newer manifest is published, without downloading it
    CheckUpdates,

    /// Download, verify and cache the latest manifest
    Update,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoCommands {
    /// Back up the source file and append the curated entry
    Enable,
    /// Restore the source file from its backup
    Disable,
    /// Show whether the curated entry is present
    Status,
}

impl Commands {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Commands::List { .. } => "list",
            Commands::Repo {
                action: RepoCommands::Enable,
            } => "repo enable",
            Commands::Repo {
                action: RepoCommands::Disable,
            } => "repo disable",
            Commands::Repo {
                action: RepoCommands::Status,
            } => "repo status",
            Commands::Install { .. } => "install",
            Commands::Versions { .. } => "versions",
            Commands::CheckUpdates => "check-updates",
            Commands::Update => "update",
        }
    }
}
