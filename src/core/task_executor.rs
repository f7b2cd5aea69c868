// src/core/task_executor.rs

use crate::{
    core::{dispatcher, interpolator::Interpolator, paths::{preprocess_path, remove_quotes}},
    models::{Command, Gate, Marker, RunOutcome, SourceBindings},
    system::Services,
};
use std::fmt::Display;
use std::ops::ControlFlow;

// --- Execution Context ---

/// The mutable state of one engine invocation. An `exec` runs its section
/// in a child context and merges the result back.
#[derive(Debug)]
pub struct ExecutionContext<'a> {
    pub services: &'a Services,
    pub package_path: String,
    pub selected_command: String,
    pub gate: Gate,
    pub in_try: bool,
    pub command_success: bool,
    pub refresh_page: bool,
    pub refresh_package: bool,
    pub logging: bool,
    pub aborted: bool,
    pub bindings: SourceBindings,
    /// Nesting level of `exec`; 0 for a top-level run.
    pub exec_depth: usize,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        services: &'a Services,
        package_path: impl Into<String>,
        selected_command: impl Into<String>,
    ) -> Self {
        Self {
            services,
            package_path: package_path.into(),
            selected_command: selected_command.into(),
            gate: Gate::Open,
            in_try: false,
            command_success: true,
            refresh_page: false,
            refresh_package: false,
            logging: false,
            aborted: false,
            exec_depth: 0,
            bindings: SourceBindings::default(),
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        RunOutcome {
            success: self.command_success,
            refresh_page: self.refresh_page,
            refresh_package: self.refresh_package,
            aborted: self.aborted,
        }
    }

    /// Preprocesses a path argument against the package directory.
    pub fn path(&self, token: &str) -> String {
        preprocess_path(token, &self.package_path)
    }

    /// ANDs a collaborator result into the success flag. Errors are logged.
    pub fn record<T, E: Display>(&mut self, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("{}", e);
                self.command_success = false;
                None
            }
        }
    }
}

// --- Main Public Function ---

/// Runs a command list to completion and reports its outcome.
///
/// This is the synchronous entry point; the background worker calls it for
/// every queued job.
pub fn execute_commands(
    commands: &[Command],
    package_path: &str,
    selected_command: &str,
    services: &Services,
) -> RunOutcome {
    let mut context = ExecutionContext::new(services, package_path, selected_command);
    if run_commands(&mut context, commands).is_break() {
        log::warn!("Execution of '{}' was aborted.", selected_command);
    }
    let outcome = context.outcome();
    log::debug!("Run of '{}' finished: {:?}", selected_command, outcome);
    outcome
}

/// Walks `commands` with a cursor. Breaks when the run was aborted, which
/// also stops every enclosing `exec`.
pub fn run_commands(context: &mut ExecutionContext<'_>, commands: &[Command]) -> ControlFlow<()> {
    let variant = context.services.platform.variant();

    for command in commands {
        // 1. Abort check.
        if context.aborted || context.services.state.take_command_abort() {
            context.command_success = false;
            context.aborted = true;
            return ControlFlow::Break(());
        }

        let Some(name) = command.first() else {
            continue;
        };

        // 2. Control markers.
        match Marker::parse(name) {
            Some(Marker::Try) => {
                if context.in_try && context.command_success {
                    break;
                }
                context.command_success = true;
                context.in_try = true;
                continue;
            }
            Some(Marker::Erista) => {
                context.gate = Gate::Erista;
                continue;
            }
            Some(Marker::Mariko) => {
                context.gate = Gate::Mariko;
                continue;
            }
            None => {}
        }

        // 3. A failed try-block consumes commands until the next marker.
        if context.in_try && !context.command_success {
            continue;
        }
        if !context.gate.admits(variant) {
            continue;
        }

        // 4. Resolve, then bind or dispatch.
        let resolved = Interpolator::new(&context.bindings, context.services)
            .with_logging(context.logging)
            .resolve_command(command);
        if context.logging {
            log::info!("Executing command: {}", resolved.join(" "));
        } else {
            log::trace!("Executing command: {:?}", resolved);
        }

        if !bind_source(context, &resolved) {
            dispatcher::dispatch(context, &resolved);
        }
    }

    if context.aborted {
        ControlFlow::Break(())
    } else {
        ControlFlow::Continue(())
    }
}

/// Handles the one-time source declarations. Returns false for any other command.
fn bind_source(context: &mut ExecutionContext<'_>, command: &[String]) -> bool {
    let Some(name) = command.first() else {
        return false;
    };
    let argument = command.get(1);
    let slot = match name.as_str() {
        "list" => &mut context.bindings.list_string,
        "list_file" => &mut context.bindings.list_path,
        "json" => &mut context.bindings.json_string,
        "json_file" => &mut context.bindings.json_path,
        "ini_file" => &mut context.bindings.ini_path,
        "hex_file" => &mut context.bindings.hex_path,
        _ => return false,
    };
    let Some(argument) = argument else {
        return true;
    };

    *slot = Some(match name.as_str() {
        "list" => remove_quotes(argument),
        "json" => argument.clone(),
        _ => preprocess_path(argument, &context.package_path),
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlatformVariant;
    use crate::system::test_support::services_at;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn cmd(tokens: &[&str]) -> Command {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    /// `mkdir` never fails on the host; `cp` of a missing file always does.
    fn ok(dir: &str) -> Command {
        cmd(&["mkdir", dir])
    }

    fn failing() -> Command {
        cmd(&["cp", "sdmc:/missing.bin", "sdmc:/out/"])
    }

    fn exists(root: &Path, relative: &str) -> bool {
        root.join(relative).exists()
    }

    #[test]
    fn test_try_falls_back_after_failure() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        let commands = vec![cmd(&["try:"]), failing(), ok("sdmc:/skipped"), cmd(&["try:"]), ok("sdmc:/b")];

        let outcome = execute_commands(&commands, "", "opt", &services);

        assert!(outcome.success);
        assert!(!exists(dir.path(), "skipped"));
        assert!(exists(dir.path(), "b"));
    }

    #[test]
    fn test_successful_try_short_circuits() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        let commands = vec![cmd(&["try:"]), ok("sdmc:/a"), cmd(&["try:"]), ok("sdmc:/b")];

        let outcome = execute_commands(&commands, "", "opt", &services);

        assert!(outcome.success);
        assert!(exists(dir.path(), "a"));
        assert!(!exists(dir.path(), "b"));
    }

    #[test]
    fn test_failures_outside_try_accumulate_but_continue() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        let commands = vec![failing(), ok("sdmc:/after")];

        let outcome = execute_commands(&commands, "", "opt", &services);

        assert!(!outcome.success);
        assert!(exists(dir.path(), "after"));
    }

    #[test]
    fn test_platform_gates_are_exclusive() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Mariko);
        let commands = vec![
            ok("sdmc:/common"),
            cmd(&["erista:"]),
            ok("sdmc:/erista"),
            cmd(&["mariko:"]),
            ok("sdmc:/mariko"),
        ];

        execute_commands(&commands, "", "opt", &services);

        assert!(exists(dir.path(), "common"));
        assert!(!exists(dir.path(), "erista"));
        assert!(exists(dir.path(), "mariko"));
    }

    #[test]
    fn test_pending_abort_stops_the_run() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        services.state.request_abort();

        let outcome = execute_commands(&[ok("sdmc:/never")], "", "opt", &services);

        assert!(!outcome.success);
        assert!(outcome.aborted);
        assert!(!exists(dir.path(), "never"));
        assert!(!services.state.abort_command.load(std::sync::atomic::Ordering::Acquire));
    }

    #[test]
    fn test_bindings_feed_later_placeholders() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        let commands = vec![
            cmd(&["list", "(alpha, beta)"]),
            cmd(&["mkdir", "sdmc:/{list(1)}"]),
            cmd(&["mkdir", "sdmc:/x_{list(7)}"]),
        ];

        execute_commands(&commands, "", "opt", &services);

        assert!(exists(dir.path(), "beta"));
        assert!(exists(dir.path(), "x_null"));
    }

    #[test]
    fn test_exec_keeps_outer_failure_and_merges_flags() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        let package = dir.path().join("pkg");
        fs::create_dir_all(&package).unwrap();
        fs::write(
            package.join("boot_package.ini"),
            "[good]\nmkdir ./made\nrefresh package\n[bad]\ncp ./missing ./out/\n",
        )
        .unwrap();
        let package_path = "sdmc:/pkg/";

        // --- Action & Assertions ---
        let outer_failed = execute_commands(
            &[failing(), cmd(&["exec", "good"])],
            package_path,
            "opt",
            &services,
        );
        assert!(!outer_failed.success);
        assert!(outer_failed.refresh_package);
        assert!(exists(&package, "made"));

        let inner_failed = execute_commands(&[cmd(&["exec", "bad"])], package_path, "opt", &services);
        assert!(!inner_failed.success);

        let both_fine = execute_commands(&[cmd(&["exec", "good"])], package_path, "opt", &services);
        assert!(both_fine.success);
    }

    #[test]
    fn test_logging_toggle_and_refresh_flags() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        let commands = vec![cmd(&["logging"]), cmd(&["refresh"]), cmd(&["unknown-op", "x"])];

        let outcome = execute_commands(&commands, "", "opt", &services);

        assert!(outcome.success);
        assert!(outcome.refresh_page);
        assert!(!outcome.refresh_package);
    }
}
