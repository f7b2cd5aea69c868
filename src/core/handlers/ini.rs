// src/core/handlers/ini.rs

use super::commons::join_trailing;
use crate::{
    constants::{CONFIG_FILENAME, FOOTER_KEY},
    core::{dispatcher::Operation, paths::remove_quotes, task_executor::ExecutionContext},
    system::ini_file::{IniError, edit_ini_file, set_ini_file_value},
};

/// The INI editing family. Minimum token counts:
/// `add-ini-section <file> <section>` (3), `rename-ini-section <file> <section> <new>` (4),
/// `remove-ini-section <file> <section>` (3), `remove-ini-key <file> <section> <key>` (4),
/// `set-ini-val|set-ini-key <file> <section> <key> <value...>` (5).
pub fn handle(context: &mut ExecutionContext<'_>, operation: Operation, command: &[String]) {
    let required = match operation {
        Operation::AddIniSection | Operation::RemoveIniSection => 3,
        Operation::RenameIniSection | Operation::RemoveIniKey => 4,
        Operation::SetIniValue | Operation::SetIniKey => 5,
        _ => return,
    };
    let [_, file, section, rest @ ..] = command else {
        return;
    };
    if command.len() < required {
        return;
    }

    let path = context.services.fs.resolve(&context.path(file));
    let section = remove_quotes(section);
    let third = rest.first().map(|token| remove_quotes(token)).unwrap_or_default();

    let result = edit_ini_file(&path, |document| match operation {
        Operation::AddIniSection => match document.add_section(&section) {
            Err(IniError::SectionExists(name)) => {
                log::debug!("Section '[{}]' already present", name);
                Ok(())
            }
            other => other,
        },
        Operation::RenameIniSection => document.rename_section(&section, &third),
        Operation::RemoveIniSection => document.remove_section(&section),
        Operation::RemoveIniKey => document.remove_key(&section, &third),
        Operation::SetIniValue => {
            document.set_value(&section, &third, &join_trailing(command, 4));
            Ok(())
        }
        Operation::SetIniKey => document.set_key(&section, &third, &join_trailing(command, 4)),
        _ => Ok(()),
    });
    context.record(result);
}

/// `set-footer <value>`: stores the footer of the selected option in the
/// package's `config.ini`.
pub fn set_footer(context: &mut ExecutionContext<'_>, command: &[String]) {
    let Some(value) = command.get(1).map(|token| remove_quotes(token)) else {
        return;
    };
    let config_path = format!("{}{}", context.package_path, CONFIG_FILENAME);
    let path = context.services.fs.resolve(&config_path);
    let result = set_ini_file_value(&path, &context.selected_command, FOOTER_KEY, &value);
    context.record(result);
}
