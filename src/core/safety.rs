// src/core/safety.rs

use crate::constants::{PROTECTED_FOLDERS, ULTRA_PROTECTED_FOLDERS};
use glob::Pattern;

const TRAVERSAL_PATTERNS: &[&str] = &["..", "~"];

/// Returns `true` when a delete or move of `pattern_path` must be refused.
///
/// A path is refused when it:
/// - lies inside an ultra-protected folder;
/// - is exactly a protected folder;
/// - lies below a protected folder with `..`/`~` in the remainder, or with a
///   `*` directly inside it (no further `/`);
/// - used as a glob, matches an ultra-protected folder or one of its ancestors;
/// - contains `..` or `~` anywhere;
/// - has a wildcard in the device root (before the first `:/`).
pub fn is_dangerous_combination(pattern_path: &str) -> bool {
    if ULTRA_PROTECTED_FOLDERS
        .iter()
        .any(|folder| pattern_path.starts_with(folder))
    {
        return true;
    }

    for folder in PROTECTED_FOLDERS {
        if pattern_path == *folder {
            return true;
        }
        let Some(relative_path) = pattern_path.strip_prefix(folder) else {
            continue;
        };

        if TRAVERSAL_PATTERNS
            .iter()
            .any(|pattern| relative_path.contains(pattern))
        {
            return true;
        }

        if !relative_path.contains('/') && relative_path.contains('*') {
            return true;
        }

        if reaches_ultra_protected(pattern_path) {
            return true;
        }
    }

    if TRAVERSAL_PATTERNS
        .iter()
        .any(|pattern| pattern_path.contains(pattern))
    {
        return true;
    }

    if let Some(root_end) = pattern_path.find(":/") {
        if pattern_path.get(..root_end + 2).is_some_and(|root| root.contains('*')) {
            return true;
        }
    }

    false
}

/// Whether the path, read as a glob, names an ultra-protected folder or a
/// directory that contains one.
fn reaches_ultra_protected(pattern_path: &str) -> bool {
    let Ok(pattern) = Pattern::new(pattern_path.trim_end_matches('/')) else {
        return false;
    };

    ULTRA_PROTECTED_FOLDERS.iter().any(|ultra| {
        ancestors_of(ultra)
            .iter()
            .any(|candidate| pattern.matches(candidate))
    })
}

/// `sdmc:/a/b/c/` → `["sdmc:/a", "sdmc:/a/b", "sdmc:/a/b/c"]`
fn ancestors_of(folder: &str) -> Vec<String> {
    let trimmed = folder.trim_end_matches('/');
    let Some(root_end) = trimmed.find(":/") else {
        return vec![trimmed.to_string()];
    };
    let (root, rest) = trimmed.split_at(root_end + 2);

    let mut current = root.to_string();
    let mut ancestors = Vec::new();
    for segment in rest.split('/').filter(|s| !s.is_empty()) {
        if !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(segment);
        ancestors.push(current.clone());
    }
    ancestors
}
