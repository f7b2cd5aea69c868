//! # INI Editing
//!
//! A small order-preserving INI document. Comments, blank lines and key
//! order survive an edit; only the touched lines change.

use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IniError {
    #[error("Failed to read INI file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write INI file '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Section '[{0}]' not found.")]
    SectionNotFound(String),
    #[error("Key '{key}' not found in section '[{section}]'.")]
    KeyNotFound { section: String, key: String },
    #[error("Section '[{0}]' already exists.")]
    SectionExists(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum IniLine {
    Pair { key: String, value: String },
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IniSection {
    name: String,
    lines: Vec<IniLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    preamble: Vec<String>,
    sections: Vec<IniSection>,
}

impl IniDocument {
    pub fn parse(content: &str) -> Self {
        let mut document = Self::default();

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                document.sections.push(IniSection {
                    name: name.trim().to_string(),
                    lines: Vec::new(),
                });
                continue;
            }

            let parsed = match line.split_once('=') {
                Some((key, value)) if !line.starts_with(';') && !line.starts_with('#') => {
                    IniLine::Pair {
                        key: key.trim().to_string(),
                        value: value.trim().to_string(),
                    }
                }
                _ => IniLine::Raw(raw_line.to_string()),
            };

            match (document.sections.last_mut(), parsed) {
                (Some(section), parsed) => section.lines.push(parsed),
                (None, IniLine::Raw(raw)) => document.preamble.push(raw),
                (None, IniLine::Pair { .. }) => document.preamble.push(raw_line.to_string()),
            }
        }

        document
    }

    pub fn load(path: &Path) -> Result<Self, IniError> {
        let content = fs::read_to_string(path).map_err(|e| IniError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Self::parse(&content))
    }

    /// Loads the file, or starts an empty document if it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, IniError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), IniError> {
        let write_error = |e| IniError::Write {
            path: path.display().to_string(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_error)?;
            }
        }
        fs::write(path, self.to_string()).map_err(write_error)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?.lines.iter().find_map(|line| match line {
            IniLine::Pair { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Sets `key=value` in `section`, creating either as needed.
    pub fn set_value(&mut self, section: &str, key: &str, value: &str) {
        if self.section(section).is_none() {
            self.sections.push(IniSection {
                name: section.to_string(),
                lines: Vec::new(),
            });
        }
        let Some(target) = self.section_mut(section) else {
            return;
        };
        for line in target.lines.iter_mut() {
            if let IniLine::Pair { key: k, value: v } = line {
                if k == key {
                    *v = value.to_string();
                    return;
                }
            }
        }
        target.lines.push(IniLine::Pair {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Renames `key` to `new_key`, keeping its value and position.
    pub fn set_key(&mut self, section: &str, key: &str, new_key: &str) -> Result<(), IniError> {
        let target = self
            .section_mut(section)
            .ok_or_else(|| IniError::SectionNotFound(section.to_string()))?;
        for line in target.lines.iter_mut() {
            if let IniLine::Pair { key: k, .. } = line {
                if k == key {
                    *k = new_key.to_string();
                    return Ok(());
                }
            }
        }
        Err(IniError::KeyNotFound {
            section: section.to_string(),
            key: key.to_string(),
        })
    }

    pub fn add_section(&mut self, section: &str) -> Result<(), IniError> {
        if self.section(section).is_some() {
            return Err(IniError::SectionExists(section.to_string()));
        }
        self.sections.push(IniSection {
            name: section.to_string(),
            lines: Vec::new(),
        });
        Ok(())
    }

    pub fn rename_section(&mut self, section: &str, new_name: &str) -> Result<(), IniError> {
        let target = self
            .section_mut(section)
            .ok_or_else(|| IniError::SectionNotFound(section.to_string()))?;
        target.name = new_name.to_string();
        Ok(())
    }

    pub fn remove_section(&mut self, section: &str) -> Result<(), IniError> {
        let before = self.sections.len();
        self.sections.retain(|s| s.name != section);
        if self.sections.len() == before {
            return Err(IniError::SectionNotFound(section.to_string()));
        }
        Ok(())
    }

    pub fn remove_key(&mut self, section: &str, key: &str) -> Result<(), IniError> {
        let target = self
            .section_mut(section)
            .ok_or_else(|| IniError::SectionNotFound(section.to_string()))?;
        let before = target.lines.len();
        target
            .lines
            .retain(|line| !matches!(line, IniLine::Pair { key: k, .. } if k == key));
        if target.lines.len() == before {
            return Err(IniError::KeyNotFound {
                section: section.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn section_mut(&mut self, name: &str) -> Option<&mut IniSection> {
        self.sections.iter_mut().find(|s| s.name == name)
    }
}

impl fmt::Display for IniDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.preamble {
            writeln!(f, "{}", line)?;
        }
        for section in &self.sections {
            writeln!(f, "[{}]", section.name)?;
            for line in &section.lines {
                match line {
                    IniLine::Pair { key, value } => writeln!(f, "{}={}", key, value)?,
                    IniLine::Raw(raw) => writeln!(f, "{}", raw)?,
                }
            }
        }
        Ok(())
    }
}

// --- File-level helpers used by the command handlers ---

/// Loads, edits and saves in one step. Missing files start empty.
pub fn edit_ini_file<F>(path: &Path, edit: F) -> Result<(), IniError>
where
    F: FnOnce(&mut IniDocument) -> Result<(), IniError>,
{
    let mut document = IniDocument::load_or_default(path)?;
    edit(&mut document)?;
    document.save(path)
}

pub fn set_ini_file_value(path: &Path, section: &str, key: &str, value: &str) -> Result<(), IniError> {
    edit_ini_file(path, |document| {
        document.set_value(section, key, value);
        Ok(())
    })
}

/// Reads a single value; any failure reads as "absent".
pub fn read_ini_value(path: &Path, section: &str, key: &str) -> Option<String> {
    let document = IniDocument::load(path).ok()?;
    document.get(section, key).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "; header\n[main]\nname = demo\n# note\nmode=fast\n\n[extra]\nflag=1\n";

    #[test]
    fn test_parse_and_read_values() {
        let document = IniDocument::parse(SAMPLE);
        assert_eq!(document.get("main", "name"), Some("demo"));
        assert_eq!(document.get("extra", "flag"), Some("1"));
        assert_eq!(document.get("extra", "missing"), None);
        let names: Vec<&str> = document.section_names().collect();
        assert_eq!(names, vec!["main", "extra"]);
    }

    #[test]
    fn test_edits_preserve_comments_and_order() {
        let mut document = IniDocument::parse(SAMPLE);
        document.set_value("main", "mode", "slow");
        document.set_value("new", "k", "v w");
        document.set_key("main", "name", "title").unwrap();
        document.remove_key("extra", "flag").unwrap();

        let text = document.to_string();
        assert_eq!(
            text,
            "; header\n[main]\ntitle=demo\n# note\nmode=slow\n\n[extra]\n[new]\nk=v w\n"
        );
    }

    #[test]
    fn test_section_operations_report_missing_targets() {
        let mut document = IniDocument::parse(SAMPLE);
        assert!(document.add_section("main").is_err());
        document.add_section("third").unwrap();
        document.rename_section("third", "fourth").unwrap();
        assert!(matches!(
            document.remove_section("third"),
            Err(IniError::SectionNotFound(_))
        ));
        document.remove_section("fourth").unwrap();
        assert!(matches!(
            document.remove_key("main", "nope"),
            Err(IniError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_set_value_creates_file_and_parents() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let path = dir.path().join("config").join("pkg").join("config.ini");

        // --- Action ---
        set_ini_file_value(&path, "Install", "footer", "Done").unwrap();
        set_ini_file_value(&path, "Install", "footer", "Again").unwrap();

        // --- Assertions ---
        assert_eq!(
            read_ini_value(&path, "Install", "footer").as_deref(),
            Some("Again")
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "[Install]\nfooter=Again\n");
    }
}
