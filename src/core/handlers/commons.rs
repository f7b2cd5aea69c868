// src/core/handlers/commons.rs

// Argument helpers shared by the command handlers.

use crate::{core::paths::preprocess_path, system::fs_ops::OpLogs};

const FLAG_SOURCE_LIST: &str = "-src";
const FLAG_DESTINATION_LIST: &str = "-dest";
const FLAG_LOG_SOURCE: &str = "-log_src";
const FLAG_LOG_DESTINATION: &str = "-log_dest";
const FLAG_FILTER: &str = "-filter";
const FLAG_COPY_FILTER: &[&str] = &["-copy_filter", "-cp_filter"];

/// The arguments of a file command (`cp`, `del`, `mv`), with every path
/// already preprocessed against the package directory.
///
/// A flag with no value after it is taken as a positional path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileOpArgs {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub source_list: Option<String>,
    pub destination_list: Option<String>,
    pub filter_list: Option<String>,
    pub copy_filter_list: Option<String>,
    pub log_source: Option<String>,
    pub log_destination: Option<String>,
}

impl FileOpArgs {
    pub fn parse(command: &[String], package_path: &str) -> Self {
        let mut args = Self::default();
        let mut tokens = command.iter().skip(1).peekable();

        while let Some(token) = tokens.next() {
            if tokens.peek().is_some() && args.flag_slot(token).is_some() {
                let value = tokens
                    .next()
                    .map(|value| preprocess_path(value, package_path));
                if let Some(slot) = args.flag_slot(token) {
                    *slot = value;
                }
                continue;
            }

            let path = preprocess_path(token, package_path);
            if args.source.is_none() {
                args.source = Some(path);
            } else if args.destination.is_none() {
                args.destination = Some(path);
            }
        }
        args
    }

    fn flag_slot(&mut self, flag: &str) -> Option<&mut Option<String>> {
        match flag {
            FLAG_SOURCE_LIST => Some(&mut self.source_list),
            FLAG_DESTINATION_LIST => Some(&mut self.destination_list),
            FLAG_LOG_SOURCE => Some(&mut self.log_source),
            FLAG_LOG_DESTINATION => Some(&mut self.log_destination),
            FLAG_FILTER => Some(&mut self.filter_list),
            _ if FLAG_COPY_FILTER.contains(&flag) => Some(&mut self.copy_filter_list),
            _ => None,
        }
    }

    pub fn logs(&self) -> OpLogs<'_> {
        OpLogs {
            source: self.log_source.as_deref(),
            destination: self.log_destination.as_deref(),
        }
    }
}

/// Joins `command[from..]` with single spaces.
pub fn join_trailing(command: &[String], from: usize) -> String {
    command.get(from..).map(|rest| rest.join(" ")).unwrap_or_default()
}
