//! Argument parsing for armoryctl
//!
//! Global flags are accepted before or after the subcommand, and every
//! subcommand named in the help text parses.

use armoryctl::cli::{Cli, Commands, RepoCommands};
use clap::{CommandFactory, Parser};

#[test]
fn test_cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["armoryctl", "install", "web", "--dry-run", "-y", "--json"]).unwrap();
    assert!(cli.dry_run);
    assert!(cli.yes);
    assert!(cli.json);
    assert_eq!(
        cli.command,
        Commands::Install {
            target: "web".to_string(),
            upgrade: false
        }
    );
}

#[test]
fn test_repo_subcommands() {
    for (arg, expected) in [
        ("enable", RepoCommands::Enable),
        ("disable", RepoCommands::Disable),
        ("status", RepoCommands::Status),
    ] {
        let cli = Cli::try_parse_from(["armoryctl", "repo", arg]).unwrap();
        assert_eq!(cli.command, Commands::Repo { action: expected });
    }
}

#[test]
fn test_list_filters_and_verbosity() {
    let cli = Cli::try_parse_from(["armoryctl", "-vv", "list", "recon", "--only-installed", "--offline"]).unwrap();
    assert_eq!(cli.verbose, 2);
    assert!(cli.offline);
    assert_eq!(
        cli.command,
        Commands::List {
            category: Some("recon".to_string()),
            only_installed: true
        }
    );
}

#[test]
fn test_update_commands_and_names() {
    let check = Cli::try_parse_from(["armoryctl", "check-updates"]).unwrap();
    assert_eq!(check.command, Commands::CheckUpdates);
    assert_eq!(check.command.name(), "check-updates");

    let versions = Cli::try_parse_from(["armoryctl", "versions"]).unwrap();
    assert_eq!(versions.command, Commands::Versions { target: None });
}

#[test]
fn test_install_requires_target() {
    assert!(Cli::try_parse_from(["armoryctl", "install"]).is_err());
    assert!(Cli::try_parse_from(["armoryctl", "frobnicate"]).is_err());
}
