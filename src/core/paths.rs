// src/core/paths.rs

use crate::constants::APP_CONFIG_DIRNAME;
use lazy_static::lazy_static;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

lazy_static! {
    static ref APP_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not create config directory at '{path}': {source}")]
    ConfigDirCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Returns the interpreter's configuration directory (`~/.config/packrun`),
/// creating it on first use.
///
/// The result is memoized: only the first call touches the filesystem.
pub fn get_app_config_dir() -> Result<PathBuf, PathError> {
    let mut cached_path_guard = APP_CONFIG_DIR
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(path) = &*cached_path_guard {
        return Ok(path.clone());
    }

    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join(APP_CONFIG_DIRNAME);

    if !config_path.exists() {
        fs::create_dir_all(&config_path).map_err(|e| PathError::ConfigDirCreation {
            path: config_path.display().to_string(),
            source: e,
        })?;
    }

    *cached_path_guard = Some(config_path.clone());
    Ok(config_path)
}

/// Strips one pair of matching surrounding quotes (`'` or `"`).
pub fn remove_quotes(value: &str) -> String {
    for quote in ['\'', '"'] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner.to_string();
        }
    }
    value.to_string()
}

/// Normalizes a path argument from a package script: quotes are removed and a
/// leading `./` is anchored to the package directory.
pub fn preprocess_path(path: &str, package_path: &str) -> String {
    let unquoted = remove_quotes(path.trim());
    if package_path.is_empty() {
        return unquoted;
    }
    match unquoted.strip_prefix("./") {
        Some(rest) if package_path.ends_with('/') => format!("{}{}", package_path, rest),
        Some(rest) => format!("{}/{}", package_path, rest),
        None => unquoted,
    }
}

pub fn preprocess_url(url: &str) -> String {
    remove_quotes(url.trim())
}

/// Last path component; a trailing slash (directory form) is ignored.
pub fn get_name_from_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => trimmed.to_string(),
    }
}

/// The segment between the last two slashes: the parent folder of a file, or
/// the folder itself when given in directory form (`.../name/`).
pub fn get_parent_dir_name_from_path(path: &str) -> String {
    path.rsplit_once('/')
        .and_then(|(head, _)| head.rsplit_once('/'))
        .map(|(_, parent)| parent.to_string())
        .unwrap_or_default()
}

/// Removes the extension of the final path component, if any.
pub fn drop_extension(name: &str) -> String {
    let (dir, file) = match name.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, name),
    };
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => match dir {
            Some(dir) => format!("{}/{}", dir, stem),
            None => stem.to_string(),
        },
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_path_anchors_relative_paths() {
        assert_eq!(
            preprocess_path("'./files/a.txt'", "sdmc:/switch/.packages/demo/"),
            "sdmc:/switch/.packages/demo/files/a.txt"
        );
        assert_eq!(preprocess_path("sdmc:/x", "sdmc:/pkg/"), "sdmc:/x");
        assert_eq!(preprocess_path("./x", ""), "./x");
    }

    #[test]
    fn test_remove_quotes_only_strips_matching_pairs() {
        assert_eq!(remove_quotes("'a b'"), "a b");
        assert_eq!(remove_quotes("\"a\""), "a");
        assert_eq!(remove_quotes("'a\""), "'a\"");
        assert_eq!(remove_quotes("'"), "'");
    }

    #[test]
    fn test_name_helpers() {
        assert_eq!(get_name_from_path("sdmc:/a/b/"), "b");
        assert_eq!(get_name_from_path("sdmc:/a/b.txt"), "b.txt");
        assert_eq!(get_parent_dir_name_from_path("sdmc:/a/b/c.txt"), "b");
        assert_eq!(get_parent_dir_name_from_path("sdmc:/a/b/"), "b");
        assert_eq!(drop_extension("theme.v2.ini"), "theme.v2");
        assert_eq!(drop_extension(".hidden"), ".hidden");
        assert_eq!(drop_extension("dir.d/file"), "dir.d/file");
    }
}
