// src/cli/run.rs

use super::Cli;
use crate::{
    core::{
        package_parser::load_package,
        paths::get_name_from_path,
        source_expander::{discover_entries, expand_for_entry},
        task_executor::execute_commands,
    },
    models::{Package, RunOutcome},
    system::Services,
};
use anyhow::{Context, Result, bail};
use colored::*;

/// Lists the package, or runs one of its sections on the calling thread.
pub fn handle(cli: &Cli, services: &Services) -> Result<RunOutcome> {
    let package_file = dunce::canonicalize(&cli.package)
        .with_context(|| format!("Package '{}' not found", cli.package.display()))?;
    let package = load_package(&package_file);
    if package.is_empty() {
        bail!("Package '{}' has no sections.", package_file.display());
    }
    let package_path = package_file
        .parent()
        .map(|dir| services.fs.to_device_path(dir))
        .unwrap_or_default();
    log::debug!("Package directory is '{}'", package_path);

    let section = match (&cli.section, cli.list) {
        (Some(section), false) => section,
        _ => {
            print_package(&package, &package_path, services);
            return Ok(RunOutcome { success: true, ..RunOutcome::default() });
        }
    };
    let commands = package
        .section(section)
        .with_context(|| format!("Section '[{}]' not found.", section))?;

    let entries = discover_entries(commands, &package_path, services);
    let outcome = if entries.is_empty() {
        execute_commands(commands, &package_path, section, services)
    } else {
        let Some(selector) = cli.entry.as_deref() else {
            print_entries(&entries);
            bail!("Section '[{}]' is source-driven; pick an entry with --entry.", section);
        };
        let (index, entry) = select_entry(&entries, selector)
            .with_context(|| format!("No entry '{}' in section '[{}]'.", selector, section))?;
        println!("{} {}", "Entry:".blue(), entry);
        let expanded = expand_for_entry(commands, entry, index, &package_path, services);
        execute_commands(&expanded, &package_path, section, services)
    };

    print_outcome(section, &outcome);
    Ok(outcome)
}

/// An entry by its position, its full value, or its file name.
fn select_entry<'a>(entries: &'a [String], selector: &str) -> Option<(usize, &'a str)> {
    if let Ok(index) = selector.parse::<usize>() {
        return entries.get(index).map(|entry| (index, entry.as_str()));
    }
    entries
        .iter()
        .enumerate()
        .find(|(_, entry)| entry.as_str() == selector || get_name_from_path(entry) == selector)
        .map(|(index, entry)| (index, entry.as_str()))
}

fn print_package(package: &Package, package_path: &str, services: &Services) {
    println!("\n--- {} '{}' ---", "Package".bold(), package_path.yellow());
    for (name, commands) in package.iter() {
        println!("  {:<30} {} commands", name.cyan().bold(), commands.len());
        let entries = discover_entries(commands, package_path, services);
        if !entries.is_empty() {
            print_entries(&entries);
        }
    }
}

fn print_entries(entries: &[String]) {
    for (index, entry) in entries.iter().enumerate() {
        println!("    {} {}", format!("[{}]", index).dimmed(), entry);
    }
}

fn print_outcome(section: &str, outcome: &RunOutcome) {
    let status = if outcome.aborted {
        "aborted".yellow().bold()
    } else if outcome.success {
        "succeeded".green().bold()
    } else {
        "failed".red().bold()
    };
    println!("\n{} '[{}]' {}", "Section".bold(), section, status);
    if outcome.refresh_page || outcome.refresh_package {
        println!("  {}", "(a refresh was requested)".dimmed());
    }
}
