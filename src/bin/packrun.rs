// src/bin/packrun.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use packrun::{
    cli::{self, Cli},
    system::Services,
};
use std::fs::{self, OpenOptions};

/// Sets up logging, runs the requested section and maps the outcome to the
/// process exit code.
fn main() {
    match run_cli(Cli::parse()) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run_cli(cli: Cli) -> Result<bool> {
    let config = cli::load_config(&cli)?;
    let services = Services::host(config);
    init_logging(&services)?;
    log::debug!("CLI args parsed: {:?}", cli);

    let outcome = cli::run::handle(&cli, &services)?;
    Ok(outcome.success && !outcome.aborted)
}

/// `env_logger` on stderr, or appended to the configured log file.
fn init_logging(services: &Services) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));

    if let Some(log_file) = &services.config.log_file {
        let path = services.fs.resolve(log_file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory '{}'", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file '{}'", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}
