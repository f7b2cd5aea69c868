// src/core/interpolator.rs

use crate::{
    constants::{DEFAULT_TIMESTAMP_FORMAT, NULL_STR},
    core::paths::remove_quotes,
    models::{Command, SourceBindings},
    system::{
        Services,
        hex_edit,
        ini_file::{IniDocument, read_ini_value},
        platform::DeviceInfo,
    },
};
use serde_json::Value;
use std::cell::OnceCell;
use std::fmt::Write as _;
use std::path::Path;

/// Upper bound on call-marker substitutions within a single token.
const MAX_SUBSTITUTIONS: usize = 64;

/// Upper bound on passes of [`replace_all`].
const MAX_REPLACE_PASSES: usize = 64;

const CALL_CLOSE: &str = ")}";

/// The parameterised placeholder functions, written `{name(args)}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderFn {
    HexFile,
    IniFile,
    List,
    ListFile,
    Json,
    JsonFile,
    Timestamp,
    DecimalToHex,
    AsciiToHex,
    HexToRhex,
    HexToDecimal,
    Slice,
    Split,
}

static PLACEHOLDER_REGISTRY: &[(&str, PlaceholderFn)] = &[
    ("hex_file", PlaceholderFn::HexFile),
    ("ini_file", PlaceholderFn::IniFile),
    ("list", PlaceholderFn::List),
    ("list_file", PlaceholderFn::ListFile),
    ("json", PlaceholderFn::Json),
    ("json_file", PlaceholderFn::JsonFile),
    ("timestamp", PlaceholderFn::Timestamp),
    ("decimal_to_hex", PlaceholderFn::DecimalToHex),
    ("ascii_to_hex", PlaceholderFn::AsciiToHex),
    ("hex_to_rhex", PlaceholderFn::HexToRhex),
    ("hex_to_decimal", PlaceholderFn::HexToDecimal),
    ("slice", PlaceholderFn::Slice),
    ("split", PlaceholderFn::Split),
];

impl PlaceholderFn {
    pub fn from_name(name: &str) -> Option<Self> {
        PLACEHOLDER_REGISTRY
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, function)| *function)
    }
}

/// A located `{fn(args)}` marker. `start..end` spans the whole marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMarker<'t> {
    pub start: usize,
    pub end: usize,
    pub function: PlaceholderFn,
    pub args: &'t str,
}

/// Finds the call marker to evaluate next.
///
/// Takes the first `)}` that closes a recognised call and pairs it with the
/// latest recognised `{fn(` opener before it, so nested calls resolve from
/// the inside out.
pub fn find_innermost_call(text: &str) -> Option<CallMarker<'_>> {
    let mut search_from = 0;
    while let Some(offset) = text.get(search_from..)?.find(CALL_CLOSE) {
        let close = search_from + offset;
        let head = text.get(..close)?;

        let opener = head.match_indices('{').filter_map(|(index, _)| {
            let after = head.get(index + 1..)?;
            let paren = after.find('(')?;
            let function = PlaceholderFn::from_name(after.get(..paren)?)?;
            Some((index, function, index + 1 + paren + 1))
        });

        if let Some((start, function, args_start)) = opener.last() {
            return Some(CallMarker {
                start,
                end: close + CALL_CLOSE.len(),
                function,
                args: text.get(args_start..close)?,
            });
        }
        search_from = close + CALL_CLOSE.len();
    }
    None
}

/// Replaces every occurrence of `placeholder`, one at a time, until none is
/// left or a pass changes nothing.
pub fn replace_all(source: &str, placeholder: &str, replacement: &str) -> String {
    let mut current = source.to_string();
    if placeholder.is_empty() {
        return current;
    }
    for _ in 0..MAX_REPLACE_PASSES {
        let Some(position) = current.find(placeholder) else {
            break;
        };
        let mut next = current.clone();
        next.replace_range(position..position + placeholder.len(), replacement);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Resolves placeholders against the bindings of one run.
pub struct Interpolator<'a> {
    bindings: &'a SourceBindings,
    services: &'a Services,
    logging: bool,
    device_info: OnceCell<DeviceInfo>,
}

impl<'a> Interpolator<'a> {
    pub fn new(bindings: &'a SourceBindings, services: &'a Services) -> Self {
        Self {
            bindings,
            services,
            logging: false,
            device_info: OnceCell::new(),
        }
    }

    /// Failed replacements are reported when logging is on.
    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn resolve_command(&self, command: &[String]) -> Command {
        command.iter().map(|token| self.resolve_token(token)).collect()
    }

    pub fn resolve_token(&self, token: &str) -> String {
        if !token.contains('{') {
            return token.to_string();
        }

        let mut current = token.to_string();
        let mut budget = MAX_SUBSTITUTIONS;

        while let Some(call) = find_innermost_call(&current) {
            if budget == 0 {
                log::warn!("Placeholder budget exhausted for '{}'", token);
                current = NULL_STR.to_string();
                break;
            }
            budget -= 1;

            let (start, end) = (call.start, call.end);
            let marker = current.get(start..end).unwrap_or_default().to_string();
            let mut replacement = self
                .evaluate(call.function, call.args)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| NULL_STR.to_string());

            if replacement == marker {
                if self.logging {
                    log::info!("failed replacement arg: {}", current);
                }
                replacement = NULL_STR.to_string();
            }
            current.replace_range(start..end, &replacement);
        }

        self.replace_device_markers(current)
    }

    fn replace_device_markers(&self, token: String) -> String {
        const MARKERS: [&str; 4] = ["{ram_vendor}", "{ram_model}", "{ams_version}", "{hos_version}"];
        if !MARKERS.iter().any(|marker| token.contains(marker)) {
            return token;
        }

        let info = self
            .device_info
            .get_or_init(|| self.services.platform.device_info());
        let mut resolved = token;
        for (marker, value) in MARKERS.iter().zip([
            &info.ram_vendor,
            &info.ram_model,
            &info.ams_version,
            &info.hos_version,
        ]) {
            resolved = replace_all(&resolved, marker, value);
        }
        resolved
    }

    fn evaluate(&self, function: PlaceholderFn, args: &str) -> Option<String> {
        let fs = &self.services.fs;
        match function {
            PlaceholderFn::HexFile => {
                let path = self.bindings.hex_path.as_deref()?;
                let mut parts = args.split(',').map(|part| remove_quotes(part.trim()));
                let (anchor, offset, length) = (parts.next()?, parts.next()?, parts.next()?);
                let length: usize = length.parse().ok()?;
                self.services
                    .hex
                    .read_at_custom_offset(&fs.resolve(path), &anchor, &offset, length)
                    .map_err(|e| log::debug!("hex_file lookup failed: {}", e))
                    .ok()
            }
            PlaceholderFn::IniFile => {
                let path = self.bindings.ini_path.as_deref()?;
                ini_lookup(&fs.resolve(path), args)
            }
            PlaceholderFn::List => {
                let list = self.bindings.list_string.as_deref()?;
                let index = parse_index(args)?;
                string_to_list(list).into_iter().nth(index)
            }
            PlaceholderFn::ListFile => {
                let path = self.bindings.list_path.as_deref()?;
                fs.get_entry_from_list_file(path, parse_index(args)?)
            }
            PlaceholderFn::Json => {
                let root: Value = serde_json::from_str(self.bindings.json_string.as_deref()?)
                    .map_err(|e| log::debug!("json source is not valid JSON: {}", e))
                    .ok()?;
                json_lookup(&root, args)
            }
            PlaceholderFn::JsonFile => {
                let path = self.bindings.json_path.as_deref()?;
                let root = read_json_file(self.services, path)?;
                json_lookup(&root, args)
            }
            PlaceholderFn::Timestamp => {
                let format = remove_quotes(args.trim());
                let format = if format.is_empty() {
                    DEFAULT_TIMESTAMP_FORMAT.to_string()
                } else {
                    format
                };
                current_timestamp(&format)
            }
            PlaceholderFn::DecimalToHex => hex_edit::decimal_to_hex(&remove_quotes(args.trim())).ok(),
            PlaceholderFn::AsciiToHex => Some(hex_edit::ascii_to_hex(&remove_quotes(args))),
            PlaceholderFn::HexToRhex => hex_edit::hex_to_reversed_hex(&remove_quotes(args.trim())).ok(),
            PlaceholderFn::HexToDecimal => hex_edit::hex_to_decimal(&remove_quotes(args.trim())).ok(),
            PlaceholderFn::Slice => slice_placeholder(args),
            PlaceholderFn::Split => split_placeholder(args),
        }
    }
}

// --- Lookup helpers (shared with the source expander) ---

fn parse_index(args: &str) -> Option<usize> {
    remove_quotes(args.trim()).parse().ok()
}

/// `"(a, 'b c', d)"` or `"[a,b]"` → entries, trimmed and unquoted.
pub fn string_to_list(list: &str) -> Vec<String> {
    let trimmed = list.trim();
    let inner = trimmed
        .strip_prefix(['(', '['])
        .unwrap_or(trimmed);
    let inner = inner.strip_suffix([')', ']']).unwrap_or(inner);
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|item| remove_quotes(item.trim()))
        .collect()
}

/// `section, key` reads a value; a bare number `N` names the N-th section.
pub fn ini_lookup(path: &Path, args: &str) -> Option<String> {
    let args = args.trim();
    match args.split_once(',') {
        Some((section, key)) => read_ini_value(
            path,
            &remove_quotes(section.trim()),
            &remove_quotes(key.trim()),
        ),
        None if !args.is_empty() && args.bytes().all(|b| b.is_ascii_digit()) => {
            let index: usize = args.parse().ok()?;
            IniDocument::load(path)
                .ok()?
                .section_names()
                .nth(index)
                .map(str::to_string)
        }
        None => None,
    }
}

/// Walks objects by key and arrays by index, e.g. `items, 0, name`.
pub fn json_lookup(root: &Value, path: &str) -> Option<String> {
    let mut value = root;
    for key in path.split(',') {
        let key = remove_quotes(key.trim());
        value = match value {
            Value::Object(map) => map.get(&key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

pub fn read_json_file(services: &Services, path: &str) -> Option<Value> {
    let content = services
        .fs
        .read_to_string(path)
        .map_err(|e| log::debug!("{}", e))
        .ok()?;
    serde_json::from_str(&content)
        .map_err(|e| log::debug!("'{}' is not valid JSON: {}", path, e))
        .ok()
}

fn current_timestamp(format: &str) -> Option<String> {
    let mut out = String::new();
    // An invalid specifier surfaces as a formatting error instead of a panic.
    write!(out, "{}", chrono::Local::now().format(format)).ok()?;
    Some(out)
}

/// Characters `start..end` of `text` (half-open, by character).
pub fn slice_chars(text: &str, start: usize, end: usize) -> String {
    if start >= end {
        return String::new();
    }
    text.chars().skip(start).take(end - start).collect()
}

/// `str, start, end`
fn slice_placeholder(args: &str) -> Option<String> {
    let (text, rest) = args.split_once(',')?;
    let start: usize = rest.split(',').next()?.trim().parse().ok()?;
    let end: usize = args.rsplit(',').next()?.trim().parse().ok()?;
    Some(slice_chars(&remove_quotes(text.trim()), start, end))
}

/// `str, delimiter, index`: the delimiter is everything between the first
/// and the last comma.
fn split_placeholder(args: &str) -> Option<String> {
    let first = args.find(',')?;
    let last = args.rfind(',')?;
    if first == last {
        return None;
    }
    let text = remove_quotes(args.get(..first)?.trim());
    let delimiter = remove_quotes(args.get(first + 1..last)?.trim());
    let index: usize = args.get(last + 1..)?.trim().parse().ok()?;

    let field = if delimiter.is_empty() {
        String::new()
    } else {
        text.split(delimiter.as_str())
            .nth(index)
            .unwrap_or_default()
            .to_string()
    };
    Some(if field.is_empty() { text } else { field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlatformVariant;
    use crate::system::test_support::services_at;
    use std::fs;
    use tempfile::tempdir;

    fn resolve_with(bindings: &SourceBindings, token: &str) -> String {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        Interpolator::new(bindings, &services).resolve_token(token)
    }

    fn resolve(token: &str) -> String {
        resolve_with(&SourceBindings::default(), token)
    }

    #[test]
    fn test_find_innermost_call_prefers_latest_opener() {
        let call = find_innermost_call("x{slice({list(0)},0,2)}y").unwrap();
        assert_eq!(call.function, PlaceholderFn::List);
        assert_eq!(call.args, "0");
        assert_eq!((call.start, call.end), (8, 17));

        assert!(find_innermost_call("{unknown(1)} plain").is_none());
        assert_eq!(
            find_innermost_call("a)} {split(a-b,-,1)}").unwrap().function,
            PlaceholderFn::Split
        );
    }

    #[test]
    fn test_tokens_without_markers_are_unchanged() {
        assert_eq!(resolve("sdmc:/switch/x.ovl"), "sdmc:/switch/x.ovl");
        assert_eq!(resolve("{unknown(1)}"), "{unknown(1)}");
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(resolve("{slice(hello,1,3)}"), "el");
        assert_eq!(resolve("{slice(héllo,1,3)}"), "él");
        assert_eq!(resolve("{split(a-b-c, -, 1)}"), "b");
        assert_eq!(resolve("{split(abc, -, 5)}"), "abc");
        assert_eq!(resolve("{decimal_to_hex(255)}"), "FF");
        assert_eq!(resolve("{ascii_to_hex(Hi)}"), "4869");
        assert_eq!(resolve("{hex_to_rhex(AABB)}"), "BBAA");
        assert_eq!(resolve("{hex_to_decimal(FF)}"), "255");
        assert_eq!(resolve("v{decimal_to_hex(x)}"), "vnull");
    }

    #[test]
    fn test_list_binding_nested_and_out_of_range() {
        let bindings = SourceBindings {
            list_string: Some("(alpha, 'b c', d)".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_with(&bindings, "{list(1)}"), "b c");
        assert_eq!(resolve_with(&bindings, "{slice({list(0)},0,2)}"), "al");
        assert_eq!(resolve_with(&bindings, "{list(9)}"), NULL_STR);
        assert_eq!(resolve("{list(0)}"), NULL_STR);
    }

    #[test]
    fn test_self_referencing_value_terminates() {
        let bindings = SourceBindings {
            list_string: Some("[{list(0)}]".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_with(&bindings, "{list(0)}"), NULL_STR);

        let growing = SourceBindings {
            list_string: Some("({list(0)}x)".to_string()),
            ..Default::default()
        };
        let resolved = resolve_with(&growing, "sdmc:/{list(0)}");
        assert_eq!(resolved, NULL_STR);
        assert!(!resolved.contains("{list("));
    }

    #[test]
    fn test_json_walk() {
        let bindings = SourceBindings {
            json_string: Some(r#"{"items":[{"name":"a","size":3,"ok":true}]}"#.to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_with(&bindings, "{json(items, 0, name)}"), "a");
        assert_eq!(resolve_with(&bindings, "{json(items,0,size)}"), "3");
        assert_eq!(resolve_with(&bindings, "{json(items,0,ok)}"), "true");
        assert_eq!(resolve_with(&bindings, "{json(items,x,name)}"), NULL_STR);
        assert_eq!(resolve_with(&bindings, "{json(items,0,name,deeper)}"), NULL_STR);
    }

    #[test]
    fn test_file_backed_sources() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        fs::write(dir.path().join("list.txt"), "first\nsecond\n").unwrap();
        fs::write(dir.path().join("data.json"), r#"{"version":"1.2"}"#).unwrap();
        fs::write(dir.path().join("opts.ini"), "[One]\nkey=v1\n[Two]\n").unwrap();
        fs::write(dir.path().join("bin.dat"), b"..TAG\x0A\x0B").unwrap();

        let bindings = SourceBindings {
            list_path: Some("sdmc:/list.txt".to_string()),
            json_path: Some("sdmc:/data.json".to_string()),
            ini_path: Some("sdmc:/opts.ini".to_string()),
            hex_path: Some("sdmc:/bin.dat".to_string()),
            ..Default::default()
        };
        let interpolator = Interpolator::new(&bindings, &services);

        // --- Assertions ---
        assert_eq!(interpolator.resolve_token("{list_file(1)}"), "second");
        assert_eq!(interpolator.resolve_token("v{json_file(version)}"), "v1.2");
        assert_eq!(interpolator.resolve_token("{ini_file(One, key)}"), "v1");
        assert_eq!(interpolator.resolve_token("{ini_file(1)}"), "Two");
        assert_eq!(interpolator.resolve_token("{ini_file(One, nope)}"), NULL_STR);
        assert_eq!(interpolator.resolve_token("{hex_file(TAG, 3, 2)}"), "0A0B");
        assert_eq!(interpolator.resolve_token("{hex_file(TAG, 3, 3)}"), NULL_STR);
        assert_eq!(
            interpolator.resolve_token("{hex_file(TAG, 0, 18446744073709551615)}"),
            NULL_STR
        );
    }

    #[test]
    fn test_timestamp_and_device_markers() {
        let stamp = resolve("{timestamp('%Y')}");
        assert_eq!(stamp.len(), 4);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(resolve("{timestamp(%Q)}"), NULL_STR);
        assert!(!resolve("{timestamp()}").contains('{'));

        assert_eq!(resolve("{ram_vendor}_{ram_model}"), "Host_Generic");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let bindings = SourceBindings {
            list_string: Some("(x,y)".to_string()),
            ..Default::default()
        };
        let once = resolve_with(&bindings, "sdmc:/{list(1)}/{slice(abcdef,2,4)}");
        assert_eq!(once, "sdmc:/y/cd");
        assert_eq!(resolve_with(&bindings, &once), once);
    }

    #[test]
    fn test_replace_all_stops_on_self_reference() {
        assert_eq!(replace_all("a{x}b{x}", "{x}", "1"), "a1b1");
        let looped = replace_all("{x}", "{x}", "{x}");
        assert_eq!(looped, "{x}");
    }
}
