//! # Package Parser
//!
//! Turns the section-delimited package format into an ordered [`Package`]:
//!
//! ```text
//! # comment
//! [Install theme]
//! download 'https://example.com/theme.zip' sdmc:/config/ultrahand/downloads/
//! unzip sdmc:/config/ultrahand/downloads/theme.zip sdmc:/
//! ```
//!
//! Lines outside a section are ignored. Single quotes group a run of text
//! into one token; there is no escaping.

use crate::models::{Command, CommandList, Package};
use std::fs;
use std::path::Path;

/// Reads and parses a package file. An unreadable file yields an empty package.
pub fn load_package(path: &Path) -> Package {
    match fs::read_to_string(path) {
        Ok(content) => parse_package(&content),
        Err(e) => {
            log::debug!("Could not read package '{}': {}", path.display(), e);
            Package::new()
        }
    }
}

/// Parses package text into sections, preserving file order.
pub fn parse_package(content: &str) -> Package {
    let mut package = Package::new();
    let mut current_section = String::new();
    let mut section_commands: CommandList = Vec::new();

    for raw_line in content.split('\n') {
        let line: String = raw_line.chars().filter(|&c| c != '\r').collect();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if !current_section.is_empty() {
                package.push_section(
                    std::mem::take(&mut current_section),
                    std::mem::take(&mut section_commands),
                );
            }
            section_commands.clear();
            current_section = name.to_string();
        } else if !current_section.is_empty() {
            let command = tokenize_line(&line);
            if !command.is_empty() {
                section_commands.push(command);
            }
        }
    }

    if !current_section.is_empty() {
        package.push_section(current_section, section_commands);
    }

    log::trace!("Parsed package with {} section(s).", package.len());
    package
}

/// Splits a command line into tokens.
///
/// Text alternates between "outside quotes" (split on whitespace) and
/// "inside quotes" (kept verbatim as one token), toggled by every `'`.
pub fn tokenize_line(line: &str) -> Command {
    let mut tokens = Vec::new();
    let pieces: Vec<&str> = line.split('\'').collect();
    let last = pieces.len().saturating_sub(1);

    for (i, piece) in pieces.iter().enumerate() {
        let in_quotes = i % 2 == 1;
        if in_quotes {
            // An unterminated quote at end of line contributes nothing.
            if i == last && piece.is_empty() {
                continue;
            }
            tokens.push((*piece).to_string());
        } else {
            tokens.extend(piece.split_whitespace().map(str::to_string));
        }
    }

    tokens
}
