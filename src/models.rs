// src/models.rs

use crate::constants::{ERISTA_MARKER, MARIKO_MARKER, TRY_MARKER};
use serde::{Deserialize, Serialize};

// --- SCRIPT MODELS ---

/// One command line of a package: token 0 is the operation name or a control marker.
pub type Command = Vec<String>;

/// An ordered list of commands. Order is execution order.
pub type CommandList = Vec<Command>;

/// A parsed package file: named sections in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    sections: Vec<(String, CommandList)>,
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_section(&mut self, name: String, commands: CommandList) {
        self.sections.push((name, commands));
    }

    /// Returns the commands of the first section with the given name.
    pub fn section(&self, name: &str) -> Option<&CommandList> {
        self.sections
            .iter()
            .find(|(section, _)| section == name)
            .map(|(_, commands)| commands)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CommandList)> {
        self.sections
            .iter()
            .map(|(name, commands)| (name.as_str(), commands))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn into_sections(self) -> Vec<(String, CommandList)> {
        self.sections
    }
}

/// Control markers recognised by the execution engine and the source expander.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Try,
    Erista,
    Mariko,
}

impl Marker {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            TRY_MARKER => Some(Self::Try),
            ERISTA_MARKER => Some(Self::Erista),
            MARIKO_MARKER => Some(Self::Mariko),
            _ => None,
        }
    }
}

/// Which platform-gated section the cursor is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gate {
    /// No gate marker seen yet: commands run on every platform.
    #[default]
    Open,
    Erista,
    Mariko,
}

impl Gate {
    /// Whether commands under this gate run on the given hardware revision.
    pub fn admits(self, variant: PlatformVariant) -> bool {
        match self {
            Self::Open => true,
            Self::Erista => variant == PlatformVariant::Erista,
            Self::Mariko => variant == PlatformVariant::Mariko,
        }
    }
}

/// The console hardware revision the interpreter is running on.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformVariant {
    #[default]
    Erista,
    Mariko,
}

impl std::str::FromStr for PlatformVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "erista" => Ok(Self::Erista),
            "mariko" => Ok(Self::Mariko),
            other => Err(format!("unknown platform variant '{}'", other)),
        }
    }
}

/// The rolling data sources later placeholders resolve against.
/// Each is set by a one-time declaration command in the same run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBindings {
    pub list_string: Option<String>,
    pub list_path: Option<String>,
    pub json_string: Option<String>,
    pub json_path: Option<String>,
    pub ini_path: Option<String>,
    pub hex_path: Option<String>,
}

// --- EXECUTION MODELS ---

/// One unit of asynchronous work for the background interpreter.
#[derive(Debug, Clone, Default)]
pub struct Job {
    pub commands: CommandList,
    /// Directory of the originating package, with a trailing slash.
    pub package_path: String,
    /// Name of the section or option the commands came from.
    pub selected_command: String,
}

impl Job {
    pub fn new(
        commands: CommandList,
        package_path: impl Into<String>,
        selected_command: impl Into<String>,
    ) -> Self {
        Self {
            commands,
            package_path: package_path.into(),
            selected_command: selected_command.into(),
        }
    }
}

/// The externally visible result of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOutcome {
    pub success: bool,
    pub refresh_page: bool,
    pub refresh_package: bool,
    /// The run was stopped by the abort flag.
    pub aborted: bool,
}
