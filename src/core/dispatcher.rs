// src/core/dispatcher.rs

use crate::core::{handlers, task_executor::ExecutionContext};
use crate::system::fs_ops::MirrorMode;

/// Every operation a package command can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    MakeDirectory,
    Copy,
    Delete,
    Move,
    MirrorCopy,
    MirrorDelete,
    AddIniSection,
    RenameIniSection,
    RemoveIniSection,
    RemoveIniKey,
    SetIniValue,
    SetIniKey,
    SetFooter,
    Compare,
    HexByOffset,
    HexBySwap,
    HexByString,
    HexByDecimal,
    HexByReversedDecimal,
    HexByCustomOffset,
    HexByCustomDecimalOffset,
    HexByCustomReversedDecimalOffset,
    Download,
    Unzip,
    PchtxtToIps,
    PchtxtToCheat,
    Exec,
    Reboot,
    Shutdown,
    Exit,
    Backlight,
    Refresh,
    Logging,
    Clear,
}

// --- Command Definition and Registry ---

struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    operation: Operation,
}

macro_rules! command {
    ($name:literal, [$($alias:literal),*], $operation:ident) => {
        CommandDefinition {
            name: $name,
            aliases: &[$($alias),*],
            operation: Operation::$operation,
        }
    };
}

/// The single source of truth for command names.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    command!("mkdir", ["make"], MakeDirectory),
    command!("cp", ["copy"], Copy),
    command!("del", ["delete"], Delete),
    command!("mv", ["move", "rename"], Move),
    command!("mirror_copy", ["mirror_cp"], MirrorCopy),
    command!("mirror_delete", ["mirror_del"], MirrorDelete),
    command!("add-ini-section", [], AddIniSection),
    command!("rename-ini-section", [], RenameIniSection),
    command!("remove-ini-section", [], RemoveIniSection),
    command!("remove-ini-key", [], RemoveIniKey),
    command!("set-ini-val", ["set-ini-value"], SetIniValue),
    command!("set-ini-key", [], SetIniKey),
    command!("set-footer", [], SetFooter),
    command!("compare", [], Compare),
    command!("hex-by-offset", [], HexByOffset),
    command!("hex-by-swap", [], HexBySwap),
    command!("hex-by-string", [], HexByString),
    command!("hex-by-decimal", [], HexByDecimal),
    command!("hex-by-rdecimal", [], HexByReversedDecimal),
    command!("hex-by-custom-offset", [], HexByCustomOffset),
    command!("hex-by-custom-decimal-offset", [], HexByCustomDecimalOffset),
    command!("hex-by-custom-rdecimal-offset", [], HexByCustomReversedDecimalOffset),
    command!("download", [], Download),
    command!("unzip", [], Unzip),
    command!("pchtxt2ips", [], PchtxtToIps),
    command!("pchtxt2cheat", [], PchtxtToCheat),
    command!("exec", [], Exec),
    command!("reboot", [], Reboot),
    command!("shutdown", [], Shutdown),
    command!("exit", [], Exit),
    command!("backlight", [], Backlight),
    command!("refresh", [], Refresh),
    command!("logging", [], Logging),
    command!("clear", [], Clear),
];

impl Operation {
    /// Finds an operation in the registry by its name or alias.
    pub fn from_name(name: &str) -> Option<Self> {
        COMMAND_REGISTRY
            .iter()
            .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
            .map(|cmd| cmd.operation)
    }
}

/// Routes a resolved command to its handler. Unknown names are ignored.
pub fn dispatch(context: &mut ExecutionContext<'_>, command: &[String]) {
    let Some(name) = command.first() else {
        return;
    };
    let Some(operation) = Operation::from_name(name) else {
        log::trace!("Ignoring unknown command '{}'", name);
        return;
    };

    use handlers::{exec, files, hex, ini, system, transfer};
    match operation {
        Operation::MakeDirectory => files::make_directory(context, command),
        Operation::Copy => files::copy(context, command),
        Operation::Delete => files::delete(context, command),
        Operation::Move => files::move_entries(context, command),
        Operation::MirrorCopy => files::mirror(context, command, MirrorMode::Copy),
        Operation::MirrorDelete => files::mirror(context, command, MirrorMode::Delete),
        Operation::Compare => files::compare(context, command),
        Operation::AddIniSection
        | Operation::RenameIniSection
        | Operation::RemoveIniSection
        | Operation::RemoveIniKey
        | Operation::SetIniValue
        | Operation::SetIniKey => ini::handle(context, operation, command),
        Operation::SetFooter => ini::set_footer(context, command),
        Operation::HexByOffset
        | Operation::HexBySwap
        | Operation::HexByString
        | Operation::HexByDecimal
        | Operation::HexByReversedDecimal
        | Operation::HexByCustomOffset
        | Operation::HexByCustomDecimalOffset
        | Operation::HexByCustomReversedDecimalOffset => hex::handle(context, operation, command),
        Operation::Download => transfer::download(context, command),
        Operation::Unzip => transfer::unzip(context, command),
        Operation::PchtxtToIps => transfer::pchtxt_to_ips(context, command),
        Operation::PchtxtToCheat => transfer::pchtxt_to_cheat(context, command),
        Operation::Exec => exec::handle(context, command),
        Operation::Reboot => system::reboot(context, command),
        Operation::Shutdown => system::shutdown(context),
        Operation::Exit => system::exit(context, command),
        Operation::Backlight => system::backlight(context, command),
        Operation::Refresh => system::refresh(context, command),
        Operation::Logging => context.logging = !context.logging,
        Operation::Clear => system::clear(context, command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_aliases_resolve() {
        assert_eq!(Operation::from_name("cp"), Some(Operation::Copy));
        assert_eq!(Operation::from_name("copy"), Some(Operation::Copy));
        assert_eq!(Operation::from_name("rename"), Some(Operation::Move));
        assert_eq!(Operation::from_name("set-ini-value"), Some(Operation::SetIniValue));
        assert_eq!(Operation::from_name("mirror_del"), Some(Operation::MirrorDelete));
        assert_eq!(Operation::from_name("CP"), None);
        assert_eq!(Operation::from_name("list"), None);
    }

    #[test]
    fn test_registry_names_are_unique() {
        let mut names: Vec<&str> = COMMAND_REGISTRY
            .iter()
            .flat_map(|cmd| std::iter::once(cmd.name).chain(cmd.aliases.iter().copied()))
            .collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
