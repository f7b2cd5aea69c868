// src/cli/mod.rs

use crate::{config::InterpreterConfig, models::PlatformVariant};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

pub mod run;

/// packrun: runs sections of a package script against a host directory
/// standing in for the device's SD card.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
pub struct Cli {
    /// The package script (`package.ini`) to load.
    pub package: PathBuf,

    /// The section to run. Without it, the sections are listed.
    pub section: Option<String>,

    /// List the sections, and the entries of source-driven sections.
    #[arg(short, long)]
    pub list: bool,

    /// Interpreter config file. Defaults to `<config_dir>/packrun/config.toml`.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host directory backing `sdmc:/`.
    #[arg(long, value_name = "DIR")]
    pub sdmc_root: Option<PathBuf>,

    /// Hardware revision to emulate (`erista` or `mariko`).
    #[arg(long)]
    pub platform: Option<PlatformVariant>,

    /// For a source-driven section: the entry to run, by position or name.
    #[arg(short, long)]
    pub entry: Option<String>,
}

/// Loads the interpreter config and applies the command-line overrides.
pub fn load_config(cli: &Cli) -> Result<InterpreterConfig> {
    let mut config = match &cli.config {
        Some(path) => InterpreterConfig::load(path)?,
        None => InterpreterConfig::load_default()?,
    };
    if let Some(root) = &cli.sdmc_root {
        config.sdmc_root = root.clone();
    }
    if let Some(platform) = cli.platform {
        config.platform = platform;
    }
    config.sdmc_root = dunce::canonicalize(&config.sdmc_root).with_context(|| {
        format!("Device root '{}' is not accessible", config.sdmc_root.display())
    })?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_overrides_apply_on_top_of_the_config_file() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let config_file = dir.path().join("config.toml");
        std::fs::write(&config_file, "download_attempts = 5\nplatform = \"erista\"\n").unwrap();

        // --- Action ---
        let cli = Cli::try_parse_from([
            "packrun",
            "pkg/package.ini",
            "Install",
            "--config",
            config_file.to_str().unwrap(),
            "--sdmc-root",
            dir.path().to_str().unwrap(),
            "--platform",
            "mariko",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();

        // --- Assertions ---
        assert_eq!(cli.section.as_deref(), Some("Install"));
        assert_eq!(config.download_attempts, 5);
        assert_eq!(config.platform, PlatformVariant::Mariko);
        assert_eq!(config.sdmc_root, dunce::canonicalize(dir.path()).unwrap());
    }
}
