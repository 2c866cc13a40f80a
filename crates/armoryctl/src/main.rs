//! Armory Control - curated security tooling for Debian-family systems
//!
//! Parses arguments, loads configuration and hands off to `commands`.

use armory_common::ArmoryConfig;
use armoryctl::cli::Cli;
use armoryctl::commands::{self, Context};
use armoryctl::errors;
use armoryctl::logging;
use armoryctl::output::Output;
use clap::Parser;

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ArmoryConfig::load_from(path),
        None => ArmoryConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => fail(&anyhow::Error::new(e)),
    };

    logging::init(cli.verbose, &config.log.level);
    tracing::debug!(version = env!("ARMORY_VERSION"), "armoryctl starting");

    let out = Output::new(cli.json, cli.no_color);
    let ctx = Context::new(config, &cli);

    if let Err(e) = commands::execute(&cli, &ctx, &out) {
        fail(&e);
    }
    std::process::exit(errors::EXIT_SUCCESS);
}

fn fail(err: &anyhow::Error) -> ! {
    eprintln!("error: {:#}", err);
    if let Some(hint) = errors::hint(err) {
        eprintln!("hint: {}", hint);
    }
    std::process::exit(errors::exit_code(err));
}
