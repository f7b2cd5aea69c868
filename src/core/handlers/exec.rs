// src/core/handlers/exec.rs

use crate::{
    constants::BOOT_PACKAGE_FILENAME,
    core::{
        package_parser::load_package,
        paths::remove_quotes,
        task_executor::{ExecutionContext, run_commands},
    },
};

/// How deep `exec` may nest before a section is refused.
const MAX_EXEC_DEPTH: usize = 16;

/// `exec <section>`: runs a section of the package's `boot_package.ini`.
///
/// The section runs with fresh per-run state. Its success is AND-ed into
/// the caller, so an earlier failure is never cleared; its refresh requests
/// carry over, and an abort inside it stops the caller too.
pub fn handle(context: &mut ExecutionContext<'_>, command: &[String]) {
    let Some(section) = command.get(1).map(|token| remove_quotes(token)) else {
        return;
    };
    if context.exec_depth >= MAX_EXEC_DEPTH {
        log::error!("Refusing to exec '[{}]': nested deeper than {} levels.", section, MAX_EXEC_DEPTH);
        context.command_success = false;
        return;
    }
    let boot_package = format!("{}{}", context.package_path, BOOT_PACKAGE_FILENAME);
    let host_path = context.services.fs.resolve(&boot_package);
    if !host_path.is_file() {
        log::debug!("No boot package at '{}'", boot_package);
        return;
    }

    let package = load_package(&host_path);
    let Some(commands) = package.section(&section) else {
        log::debug!("Section '[{}]' not found in '{}'", section, boot_package);
        return;
    };

    let mut inner = ExecutionContext::new(context.services, context.package_path.clone(), section);
    inner.exec_depth = context.exec_depth + 1;
    let _ = run_commands(&mut inner, commands);

    context.command_success = context.command_success && inner.command_success;
    context.refresh_page |= inner.refresh_page;
    context.refresh_package |= inner.refresh_package;
    context.aborted |= inner.aborted;
}
