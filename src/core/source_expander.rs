// src/core/source_expander.rs

//! Per-entry expansion of a section that iterates over a data source.
//!
//! A section declares where its entries come from (`file_source`,
//! `list_source`, `list_file_source`, `json_source`, `json_file_source`, or
//! `ini_file_source` for lookups) and refers to the current entry through
//! `{file_source}`, `{file_name}`, `{folder_name}` and the `{*_source(...)}`
//! markers. [`expand_for_entry`] produces the concrete command list for one
//! entry; [`discover_entries`] lists the entries a section iterates over.

use crate::{
    constants::NULL_STR,
    core::{
        interpolator::{ini_lookup, json_lookup, read_json_file, replace_all, string_to_list},
        paths::{drop_extension, get_name_from_path, get_parent_dir_name_from_path, preprocess_path, remove_quotes},
    },
    models::{Command, CommandList, Gate, Marker, SourceBindings},
    system::Services,
};
use serde_json::Value;

/// Upper bound on substitutions of one marker kind within a token.
const MAX_SOURCE_SUBSTITUTIONS: usize = 32;

const FILE_SOURCE: &str = "file_source";
const FILE_NAME: &str = "file_name";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFn {
    List,
    ListFile,
    IniFile,
    Json,
    JsonFile,
}

impl SourceFn {
    const ALL: [Self; 5] = [Self::List, Self::ListFile, Self::IniFile, Self::Json, Self::JsonFile];

    fn name(self) -> &'static str {
        match self {
            Self::List => "list_source",
            Self::ListFile => "list_file_source",
            Self::IniFile => "ini_file_source",
            Self::Json => "json_source",
            Self::JsonFile => "json_file_source",
        }
    }
}

/// Tracks `erista:` / `mariko:` markers while walking a command list.
fn gate_transition(command: &Command) -> Option<Gate> {
    let name = command.first()?.to_ascii_lowercase();
    match Marker::parse(&name)? {
        Marker::Erista => Some(Gate::Erista),
        Marker::Mariko => Some(Gate::Mariko),
        Marker::Try => None,
    }
}

/// Records a source declaration. The first declaration of each kind wins.
fn bind_source(bindings: &mut SourceBindings, command: &Command, package_path: &str) {
    let (Some(name), Some(argument)) = (command.first(), command.get(1)) else {
        return;
    };
    let slot = match name.as_str() {
        "list_source" => (&mut bindings.list_string, remove_quotes(argument)),
        "list_file_source" => (&mut bindings.list_path, preprocess_path(argument, package_path)),
        "ini_file_source" => (&mut bindings.ini_path, preprocess_path(argument, package_path)),
        "json_source" => (&mut bindings.json_string, remove_quotes(argument)),
        "json_file_source" => (&mut bindings.json_path, preprocess_path(argument, package_path)),
        _ => return,
    };
    if slot.0.is_none() {
        *slot.0 = Some(slot.1);
    }
}

struct Expander<'a> {
    entry: &'a str,
    entry_index: usize,
    file_name: String,
    folder_name: String,
    bindings: SourceBindings,
    services: &'a Services,
}

impl Expander<'_> {
    fn expand_token(&self, token: &str) -> String {
        let mut expanded = replace_all(token, "{file_source}", self.entry);
        expanded = replace_all(&expanded, "{file_name}", &self.file_name);
        expanded = replace_all(&expanded, "{folder_name}", &self.folder_name);

        for function in SourceFn::ALL {
            expanded = self.replace_source_markers(expanded, function);
        }
        expanded
    }

    fn replace_source_markers(&self, mut token: String, function: SourceFn) -> String {
        let opener = format!("{{{}(", function.name());
        for _ in 0..MAX_SOURCE_SUBSTITUTIONS {
            let Some(start) = token.find(&opener) else {
                break;
            };
            let args_start = start + opener.len();
            let Some(close) = token
                .get(args_start..)
                .and_then(|rest| rest.find(")}"))
                .map(|offset| args_start + offset)
            else {
                break;
            };

            let args = token
                .get(args_start..close)
                .unwrap_or_default()
                .replace('*', &self.entry_index.to_string());
            let value = self
                .evaluate(function, &args)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| NULL_STR.to_string());
            token.replace_range(start..close + 2, &value);
        }
        token
    }

    fn evaluate(&self, function: SourceFn, args: &str) -> Option<String> {
        let index = remove_quotes(args.trim())
            .parse::<usize>()
            .unwrap_or(self.entry_index);
        match function {
            SourceFn::List => string_to_list(self.bindings.list_string.as_deref()?)
                .into_iter()
                .nth(index),
            SourceFn::ListFile => self
                .services
                .fs
                .get_entry_from_list_file(self.bindings.list_path.as_deref()?, index),
            SourceFn::IniFile => {
                let path = self.services.fs.resolve(self.bindings.ini_path.as_deref()?);
                ini_lookup(&path, args)
            }
            SourceFn::Json => {
                let root: Value = serde_json::from_str(self.bindings.json_string.as_deref()?).ok()?;
                json_lookup(&root, args)
            }
            SourceFn::JsonFile => {
                let root = read_json_file(self.services, self.bindings.json_path.as_deref()?)?;
                json_lookup(&root, args)
            }
        }
    }
}

/// Produces the command list for one entry of a source-driven section.
///
/// Gate markers are honoured against the platform variant and dropped from
/// the output. If the section declares `file_source`, the result starts with
/// `["file_name", <entry name>]`.
pub fn expand_for_entry(
    commands: &[Command],
    entry: &str,
    entry_index: usize,
    package_path: &str,
    services: &Services,
) -> CommandList {
    let variant = services.platform.variant();
    let entry_name = get_name_from_path(entry);
    let file_name = if entry.ends_with('/') || services.fs.is_directory(entry) {
        entry_name
    } else {
        drop_extension(&entry_name)
    };

    let mut expander = Expander {
        entry,
        entry_index,
        file_name,
        folder_name: remove_quotes(&get_parent_dir_name_from_path(entry)),
        bindings: SourceBindings::default(),
        services,
    };

    let mut gate = Gate::Open;
    let mut using_file_source = false;
    let mut expanded = CommandList::with_capacity(commands.len() + 1);

    for command in commands {
        let Some(name) = command.first() else {
            continue;
        };
        if let Some(next) = gate_transition(command) {
            gate = next;
            continue;
        }
        if !gate.admits(variant) {
            continue;
        }

        if name == FILE_SOURCE {
            using_file_source = true;
        }
        bind_source(&mut expander.bindings, command, package_path);

        expanded.push(command.iter().map(|token| expander.expand_token(token)).collect());
    }

    if using_file_source {
        expanded.insert(0, vec![FILE_NAME.to_string(), expander.file_name.clone()]);
    }
    log::trace!(
        "Expanded {} command(s) for entry #{} '{}'",
        expanded.len(),
        entry_index,
        entry
    );
    expanded
}

/// Lists the entries a source-driven section iterates over, from its first
/// admitted `file_source`, `list_source`, `list_file_source`, `json_source`
/// or `json_file_source` declaration.
///
/// JSON sources yield the items of a top-level array; an optional second
/// argument picks that key from each object item.
pub fn discover_entries(commands: &[Command], package_path: &str, services: &Services) -> Vec<String> {
    let variant = services.platform.variant();
    let mut gate = Gate::Open;

    for command in commands {
        if let Some(next) = gate_transition(command) {
            gate = next;
            continue;
        }
        if !gate.admits(variant) {
            continue;
        }
        let (Some(name), Some(argument)) = (command.first(), command.get(1)) else {
            continue;
        };

        let key = command.get(2).map(|key| remove_quotes(key));
        let entries = match name.as_str() {
            FILE_SOURCE => {
                let pattern = preprocess_path(argument, package_path);
                match services.fs.get_files_list_by_wildcards(&pattern) {
                    Ok(matches) => matches,
                    Err(e) => {
                        log::warn!("{}", e);
                        Vec::new()
                    }
                }
            }
            "list_source" => string_to_list(&remove_quotes(argument)),
            "list_file_source" => services
                .fs
                .read_list_from_file(&preprocess_path(argument, package_path)),
            "json_source" => match serde_json::from_str::<Value>(&remove_quotes(argument)) {
                Ok(root) => json_entries(&root, key.as_deref()),
                Err(e) => {
                    log::warn!("json_source is not valid JSON: {}", e);
                    Vec::new()
                }
            },
            "json_file_source" => read_json_file(services, &preprocess_path(argument, package_path))
                .map(|root| json_entries(&root, key.as_deref()))
                .unwrap_or_default(),
            _ => continue,
        };
        return entries;
    }
    Vec::new()
}

fn json_entries(root: &Value, key: Option<&str>) -> Vec<String> {
    let Value::Array(items) = root else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let value = match key {
                Some(key) => item.get(key)?,
                None => item,
            };
            match value {
                Value::String(text) => Some(text.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            }
        })
        .collect()
}
