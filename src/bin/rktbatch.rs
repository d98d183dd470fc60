// src/bin/rktbatch.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use rktbatch::cli::Cli;
use rktbatch::constants::SETUP_FAILURE_EXIT_CODE;
use rktbatch::core::config::Config;
use rktbatch::core::supervisor;

/// Parses the command line, sets up logging and runs the job. The process
/// exits with the child's normalized return code, or 12 if the job could
/// not be run.
fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level.into())
        .parse_default_env()
        .init();

    match run_cli(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(SETUP_FAILURE_EXIT_CODE);
        }
    }
}

fn run_cli(cli: &Cli) -> Result<i32> {
    log::debug!("CLI args parsed: {:?}", cli);
    let config = Config::discover(cli.config.as_deref()).context("Error loading configuration")?;
    let options = cli
        .run_options(&config)
        .context("Error resolving run options")?;
    supervisor::run(&options, &config)
}
