//! # Interpreter Configuration
//!
//! `InterpreterConfig` is read from `config.toml` in the application's config
//! directory. Every field has a default, so a missing file or a partial file is
//! always usable; unknown keys are rejected to catch typos early.

use crate::{
    constants::APP_CONFIG_FILENAME,
    core::paths::{self, PathError},
    models::PlatformVariant,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct InterpreterConfig {
    /// Host directory that backs the `sdmc:/` device root.
    pub sdmc_root: PathBuf,
    /// Settings INI written by `exit` (device path).
    pub settings_ini: String,
    /// Log file removed by `clear log` (device path).
    pub log_file: Option<String>,
    pub copy_buffer_size: usize,
    pub unzip_buffer_size: usize,
    pub download_buffer_size: usize,
    pub hex_buffer_size: usize,
    pub download_attempts: u32,
    pub user_agent: String,
    /// Hardware revision reported by the host platform.
    pub platform: PlatformVariant,
    /// Stack size of the background interpreter thread, in bytes.
    pub worker_stack_size: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            sdmc_root: PathBuf::from("/"),
            settings_ini: "sdmc:/config/ultrahand/config.ini".to_string(),
            log_file: None,
            copy_buffer_size: 4096,
            unzip_buffer_size: 4096,
            download_buffer_size: 4096,
            hex_buffer_size: 4096,
            download_attempts: 3,
            user_agent: format!("packrun/{}", env!("CARGO_PKG_VERSION")),
            platform: PlatformVariant::Erista,
            worker_stack_size: 0x8000 * 16,
        }
    }
}

impl InterpreterConfig {
    /// Loads the configuration from an explicit TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        log::debug!("Loaded interpreter config from '{}'", path.display());
        Ok(config)
    }

    /// Loads `config.toml` from the application config directory, falling back
    /// to defaults when the file does not exist.
    pub fn load_default() -> Result<Self> {
        let path = default_config_path()?;
        if path.is_file() {
            Self::load(&path)
        } else {
            log::debug!(
                "No config file at '{}', using defaults.",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// A configuration whose device root is `root`; used by hosts and tests.
    pub fn with_sdmc_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sdmc_root: root.into(),
            ..Self::default()
        }
    }
}

/// `<config_dir>/packrun/config.toml`
pub fn default_config_path() -> Result<PathBuf, PathError> {
    paths::get_app_config_dir().map(|dir| dir.join(APP_CONFIG_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sdmc_root = \"/tmp/sd\"\nplatform = \"mariko\"").unwrap();
        file.flush().unwrap();

        let config = InterpreterConfig::load(file.path()).unwrap();
        assert_eq!(config.sdmc_root, PathBuf::from("/tmp/sd"));
        assert_eq!(config.platform, PlatformVariant::Mariko);
        assert_eq!(config.download_attempts, 3);
        assert_eq!(config.settings_ini, "sdmc:/config/ultrahand/config.ini");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "download_retries = 5").unwrap();
        file.flush().unwrap();

        let result = InterpreterConfig::load(file.path());
        assert!(result.is_err());
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("download_retries"), "Error was: {}", message);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(InterpreterConfig::load(Path::new("definitely_missing_config.toml")).is_err());
    }
}
