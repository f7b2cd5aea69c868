//! # File Operations
//!
//! Copy, move, delete and list helpers over device paths. A device path
//! (`sdmc:/...`) is mapped onto the configured host directory; any other path
//! is used as given.
//!
//! Directory arguments follow one rule everywhere: the *contents* of a source
//! directory land inside the destination directory. A file copied or moved to
//! a destination ending in `/` keeps its name inside that directory.

use crate::constants::{DEVICE_PREFIX, ROOT_PATH};
use crate::core::paths::get_name_from_path;
use crate::state::{SharedState, update_progress};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Source file or directory doesn't exist: {0}")]
    NotFound(String),
    #[error("Failed to {op} '{path}': {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid wildcard pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("Operation on '{0}' was aborted.")]
    Aborted(String),
    #[error("{failed} of {total} matched entries failed.")]
    Partial { failed: usize, total: usize },
}

fn io_error<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> FsError + 'a {
    move |source| FsError::Io {
        op,
        path: path.display().to_string(),
        source,
    }
}

/// Optional log files that record processed source and destination paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpLogs<'a> {
    pub source: Option<&'a str>,
    pub destination: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    Copy,
    Delete,
}

struct Progress {
    total: u64,
    done: u64,
}

#[derive(Debug)]
pub struct FileOps {
    sdmc_root: PathBuf,
    copy_buffer_size: usize,
    state: SharedState,
}

impl FileOps {
    pub fn new(sdmc_root: impl Into<PathBuf>, copy_buffer_size: usize, state: SharedState) -> Self {
        Self {
            sdmc_root: sdmc_root.into(),
            copy_buffer_size: copy_buffer_size.max(1),
            state,
        }
    }

    /// Maps a device path onto the host filesystem.
    pub fn resolve(&self, path: &str) -> PathBuf {
        match path.strip_prefix(DEVICE_PREFIX) {
            Some(rest) => {
                let relative = rest.trim_start_matches('/');
                if relative.is_empty() {
                    self.sdmc_root.clone()
                } else {
                    self.sdmc_root.join(relative)
                }
            }
            None => PathBuf::from(path),
        }
    }

    /// Maps a host path back to device form. Directories get a trailing `/`.
    pub fn to_device_path(&self, host: &Path) -> String {
        let host = dunce::simplified(host);
        let mut device = match host.strip_prefix(&self.sdmc_root) {
            Ok(relative) => {
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect();
                format!("{}{}", ROOT_PATH, parts.join("/"))
            }
            Err(_) => host.to_string_lossy().to_string(),
        };
        if host.is_dir() && !device.ends_with('/') {
            device.push('/');
        }
        device
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }

    pub fn create_directory(&self, path: &str) -> Result<(), FsError> {
        let target = self.resolve(path);
        fs::create_dir_all(&target).map_err(io_error("create directory", &target))?;
        log::debug!("Created directory '{}'", path);
        Ok(())
    }

    pub fn read_to_string(&self, path: &str) -> Result<String, FsError> {
        let source = self.resolve(path);
        fs::read_to_string(&source).map_err(io_error("read", &source))
    }

    pub fn write_string(&self, path: &str, content: &str) -> Result<(), FsError> {
        let target = self.resolve(path);
        ensure_parent(&target)?;
        fs::write(&target, content).map_err(io_error("write", &target))
    }

    // --- Copy ---

    pub fn copy(&self, from: &str, to: &str, logs: OpLogs<'_>) -> Result<(), FsError> {
        let source = self.resolve(from);
        if !source.exists() {
            return Err(FsError::NotFound(from.to_string()));
        }

        let mut progress = Progress {
            total: total_size(&source),
            done: 0,
        };
        self.state.copy_percentage.store(0, Ordering::Release);

        let destination = if source.is_dir() {
            self.copy_dir_contents(&source, &self.resolve(to), &mut progress)?;
            to.to_string()
        } else {
            let destination = file_destination(to, from);
            self.copy_file(&source, &self.resolve(&destination), &mut progress)?;
            destination
        };

        self.record_logs(logs, from, &destination);
        log::debug!("Copied '{}' to '{}'", from, destination);
        Ok(())
    }

    pub fn copy_by_pattern(&self, pattern: &str, to: &str, logs: OpLogs<'_>) -> Result<(), FsError> {
        let matches = self.get_files_list_by_wildcards(pattern)?;
        let target_dir = as_directory(to);
        self.for_each_match(&matches, |entry| {
            let destination = if entry.ends_with('/') {
                format!("{}{}/", target_dir, get_name_from_path(entry))
            } else {
                target_dir.clone()
            };
            self.copy(entry, &destination, logs)
        })
    }

    fn copy_file(&self, source: &Path, target: &Path, progress: &mut Progress) -> Result<(), FsError> {
        ensure_parent(target)?;
        let mut reader = File::open(source).map_err(io_error("open", source))?;
        let mut writer = File::create(target).map_err(io_error("create", target))?;
        let mut buffer = vec![0u8; self.copy_buffer_size];

        loop {
            if self.state.abort_file_op.load(Ordering::Acquire) {
                drop(writer);
                let _ = fs::remove_file(target);
                return Err(FsError::Aborted(source.display().to_string()));
            }
            let read = reader.read(&mut buffer).map_err(io_error("read", source))?;
            if read == 0 {
                break;
            }
            writer
                .write_all(buffer.get(..read).unwrap_or_default())
                .map_err(io_error("write", target))?;
            progress.done += read as u64;
            update_progress(&self.state.copy_percentage, progress.total, progress.done);
        }
        Ok(())
    }

    fn copy_dir_contents(&self, source: &Path, target: &Path, progress: &mut Progress) -> Result<(), FsError> {
        fs::create_dir_all(target).map_err(io_error("create directory", target))?;
        for entry in WalkDir::new(source).min_depth(1) {
            let entry = entry.map_err(|e| FsError::Io {
                op: "walk",
                path: source.display().to_string(),
                source: e.into(),
            })?;
            let Ok(relative) = entry.path().strip_prefix(source) else {
                continue;
            };
            let destination = target.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&destination)
                    .map_err(io_error("create directory", &destination))?;
            } else {
                self.copy_file(entry.path(), &destination, progress)?;
            }
        }
        Ok(())
    }

    // --- Move ---

    pub fn move_path(&self, from: &str, to: &str, logs: OpLogs<'_>) -> Result<(), FsError> {
        let source = self.resolve(from);
        if !source.exists() {
            return Err(FsError::NotFound(from.to_string()));
        }

        let destination = if source.is_dir() {
            self.move_dir_contents(&source, &self.resolve(to))?;
            to.to_string()
        } else {
            let destination = file_destination(to, from);
            self.move_file(&source, &self.resolve(&destination))?;
            destination
        };

        self.record_logs(logs, from, &destination);
        log::debug!("Moved '{}' to '{}'", from, destination);
        Ok(())
    }

    pub fn move_by_pattern(&self, pattern: &str, to: &str, logs: OpLogs<'_>) -> Result<(), FsError> {
        let matches = self.get_files_list_by_wildcards(pattern)?;
        let target_dir = as_directory(to);
        self.for_each_match(&matches, |entry| {
            let destination = if entry.ends_with('/') {
                format!("{}{}/", target_dir, get_name_from_path(entry))
            } else {
                target_dir.clone()
            };
            self.move_path(entry, &destination, logs)
        })
    }

    fn move_file(&self, source: &Path, target: &Path) -> Result<(), FsError> {
        ensure_parent(target)?;
        if target.is_file() {
            fs::remove_file(target).map_err(io_error("replace", target))?;
        }
        if fs::rename(source, target).is_ok() {
            return Ok(());
        }
        // Rename fails across filesystems.
        let mut progress = Progress {
            total: total_size(source),
            done: 0,
        };
        self.copy_file(source, target, &mut progress)?;
        fs::remove_file(source).map_err(io_error("remove", source))
    }

    fn move_dir_contents(&self, source: &Path, target: &Path) -> Result<(), FsError> {
        if !target.exists() {
            ensure_parent(target)?;
            if fs::rename(source, target).is_ok() {
                return Ok(());
            }
        }

        fs::create_dir_all(target).map_err(io_error("create directory", target))?;
        let files: Vec<PathBuf> = WalkDir::new(source)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();
        for file in files {
            let Ok(relative) = file.strip_prefix(source) else {
                continue;
            };
            self.move_file(&file, &target.join(relative))?;
        }
        fs::remove_dir_all(source).map_err(io_error("remove directory", source))
    }

    // --- Delete ---

    /// Deletes a file or directory tree. A missing path is not an error.
    pub fn delete(&self, path: &str, log_source: Option<&str>) -> Result<(), FsError> {
        let target = self.resolve(path);
        if !target.exists() {
            log::debug!("Nothing to delete at '{}'", path);
            return Ok(());
        }
        if target.is_dir() {
            fs::remove_dir_all(&target).map_err(io_error("delete directory", &target))?;
        } else {
            fs::remove_file(&target).map_err(io_error("delete", &target))?;
        }
        if let Some(log) = log_source {
            self.append_line(log, path);
        }
        log::debug!("Deleted '{}'", path);
        Ok(())
    }

    pub fn delete_by_pattern(&self, pattern: &str, log_source: Option<&str>) -> Result<(), FsError> {
        let matches = self.get_files_list_by_wildcards(pattern)?;
        self.for_each_match(&matches, |entry| self.delete(entry, log_source))
    }

    // --- Listing ---

    /// Expands a wildcard device path. A pattern ending in `/` matches
    /// directories only; matched directories carry a trailing `/`.
    pub fn get_files_list_by_wildcards(&self, pattern: &str) -> Result<Vec<String>, FsError> {
        let directories_only = pattern.ends_with('/');
        let host_pattern = self.host_pattern(pattern.trim_end_matches('/'));

        let paths = glob::glob(&host_pattern).map_err(|e| FsError::Pattern {
            pattern: pattern.to_string(),
            source: e,
        })?;

        let mut matches: Vec<String> = paths
            .filter_map(Result::ok)
            .filter(|path| !directories_only || path.is_dir())
            .map(|path| self.to_device_path(&path))
            .collect();
        matches.sort();
        log::trace!("Pattern '{}' matched {} entries", pattern, matches.len());
        Ok(matches)
    }

    /// Non-empty lines of a list file. An unreadable file reads as empty.
    pub fn read_list_from_file(&self, path: &str) -> Vec<String> {
        match self.read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(|line| line.trim_end_matches('\r').to_string())
                .filter(|line| !line.is_empty())
                .collect(),
            Err(e) => {
                log::warn!("{}", e);
                Vec::new()
            }
        }
    }

    pub fn read_set_from_file(&self, path: &str) -> HashSet<String> {
        self.read_list_from_file(path).into_iter().collect()
    }

    pub fn get_entry_from_list_file(&self, path: &str, index: usize) -> Option<String> {
        self.read_list_from_file(path).into_iter().nth(index)
    }

    // --- Mirror & Compare ---

    /// Replays the tree under `source_root` onto `target_root`: every file
    /// found at `source_root/<rel>` is copied to, or deleted from,
    /// `target_root/<rel>`.
    pub fn mirror_files(&self, source_root: &str, target_root: &str, mode: MirrorMode) -> Result<(), FsError> {
        let source = self.resolve(source_root);
        if !source.is_dir() {
            return Err(FsError::NotFound(source_root.to_string()));
        }
        let target_root = as_directory(target_root);

        let mut failures = 0;
        let mut total = 0;
        for entry in WalkDir::new(&source).min_depth(1).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&source) else {
                continue;
            };
            let relative: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            let target = format!("{}{}", target_root, relative.join("/"));
            let from = self.to_device_path(entry.path());
            total += 1;

            let result = match mode {
                MirrorMode::Copy if from != target => self.copy(&from, &target, OpLogs::default()),
                MirrorMode::Copy => Ok(()),
                MirrorMode::Delete => self.delete(&target, None),
            };
            if let Err(e) = result {
                log::error!("{}", e);
                failures += 1;
            }
        }

        if failures > 0 {
            return Err(FsError::Partial { failed: failures, total });
        }
        Ok(())
    }

    /// Writes the lines present in both list files to `output`.
    pub fn compare_files_lists(&self, first: &str, second: &str, output: &str) -> Result<(), FsError> {
        let lines = self.read_list_from_file(first);
        self.write_common_lines(lines, second, output)
    }

    /// Like [`Self::compare_files_lists`], with the first list being the union
    /// of every file matching `pattern`.
    pub fn compare_wildcard_files_lists(&self, pattern: &str, second: &str, output: &str) -> Result<(), FsError> {
        let lines = self
            .get_files_list_by_wildcards(pattern)?
            .iter()
            .filter(|path| !path.ends_with('/') && path.as_str() != second)
            .flat_map(|path| self.read_list_from_file(path))
            .collect();
        self.write_common_lines(lines, second, output)
    }

    fn write_common_lines(&self, lines: Vec<String>, second: &str, output: &str) -> Result<(), FsError> {
        let other = self.read_set_from_file(second);
        let mut seen = HashSet::new();
        let mut content = String::new();
        for line in lines {
            if other.contains(&line) && seen.insert(line.clone()) {
                content.push_str(&line);
                content.push('\n');
            }
        }
        self.write_string(output, &content)
    }

    // --- Helpers ---

    fn for_each_match<F>(&self, matches: &[String], mut operation: F) -> Result<(), FsError>
    where
        F: FnMut(&str) -> Result<(), FsError>,
    {
        let mut failed = 0;
        for entry in matches {
            if self.state.abort_file_op.load(Ordering::Acquire) {
                return Err(FsError::Aborted(entry.clone()));
            }
            if let Err(e) = operation(entry) {
                log::error!("{}", e);
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(FsError::Partial {
                failed,
                total: matches.len(),
            });
        }
        Ok(())
    }

    fn host_pattern(&self, pattern: &str) -> String {
        match pattern.strip_prefix(DEVICE_PREFIX) {
            Some(rest) => {
                let root = glob::Pattern::escape(&self.sdmc_root.to_string_lossy());
                format!(
                    "{}/{}",
                    root.trim_end_matches(['/', '\\']),
                    rest.trim_start_matches('/')
                )
            }
            None => pattern.to_string(),
        }
    }

    fn record_logs(&self, logs: OpLogs<'_>, from: &str, to: &str) {
        if let Some(log) = logs.source {
            self.append_line(log, from);
        }
        if let Some(log) = logs.destination {
            self.append_line(log, to);
        }
    }

    fn append_line(&self, log_path: &str, line: &str) {
        let target = self.resolve(log_path);
        let result = ensure_parent(&target).and_then(|_| {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&target)
                .map_err(io_error("open", &target))?;
            writeln!(file, "{}", line).map_err(io_error("append to", &target))
        });
        if let Err(e) = result {
            log::warn!("{}", e);
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), FsError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_error("create directory", parent))
        }
        _ => Ok(()),
    }
}

fn total_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// `dir/` + `a/b.txt` → `dir/b.txt`; any other destination is used as is.
fn file_destination(to: &str, from: &str) -> String {
    if to.ends_with('/') {
        format!("{}{}", to, get_name_from_path(from))
    } else {
        to.to_string()
    }
}

fn as_directory(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InterpreterState;
    use tempfile::{TempDir, tempdir};

    fn setup() -> (TempDir, FileOps) {
        let dir = tempdir().unwrap();
        let ops = FileOps::new(dir.path(), 8, InterpreterState::shared());
        (dir, ops)
    }

    #[test]
    fn test_device_paths_map_onto_root() {
        let (dir, ops) = setup();
        assert_eq!(ops.resolve("sdmc:/a/b.txt"), dir.path().join("a/b.txt"));
        assert_eq!(ops.resolve("sdmc:/"), dir.path().to_path_buf());
        assert_eq!(ops.resolve("relative/x"), PathBuf::from("relative/x"));

        fs::create_dir_all(dir.path().join("a")).unwrap();
        assert_eq!(ops.to_device_path(&dir.path().join("a")), "sdmc:/a/");
    }

    #[test]
    fn test_copy_file_into_directory_and_directory_contents() {
        // --- Setup ---
        let (dir, ops) = setup();
        ops.write_string("sdmc:/src/one.txt", "0123456789abcdef").unwrap();
        ops.write_string("sdmc:/src/sub/two.txt", "2").unwrap();

        // --- Action ---
        ops.copy("sdmc:/src/one.txt", "sdmc:/dest/", OpLogs::default())
            .unwrap();
        ops.copy("sdmc:/src/", "sdmc:/tree/", OpLogs { source: Some("sdmc:/log.txt"), destination: None })
            .unwrap();

        // --- Assertions ---
        let root = dir.path();
        assert_eq!(fs::read_to_string(root.join("dest/one.txt")).unwrap(), "0123456789abcdef");
        assert_eq!(fs::read_to_string(root.join("tree/sub/two.txt")).unwrap(), "2");
        assert_eq!(fs::read_to_string(root.join("log.txt")).unwrap(), "sdmc:/src/\n");
        assert_eq!(ops.state.copy_percentage.load(Ordering::Acquire), 100);
    }

    #[test]
    fn test_copy_missing_source_is_an_error() {
        let (_dir, ops) = setup();
        let result = ops.copy("sdmc:/missing.txt", "sdmc:/x.txt", OpLogs::default());
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_copy_stops_when_aborted() {
        let (dir, ops) = setup();
        ops.write_string("sdmc:/big.bin", &"x".repeat(64)).unwrap();
        ops.state.abort_file_op.store(true, Ordering::Release);

        let result = ops.copy("sdmc:/big.bin", "sdmc:/copy.bin", OpLogs::default());
        assert!(matches!(result, Err(FsError::Aborted(_))));
        assert!(!dir.path().join("copy.bin").exists());
    }

    #[test]
    fn test_move_file_and_directory_merge() {
        let (dir, ops) = setup();
        ops.write_string("sdmc:/a/f.txt", "f").unwrap();
        ops.write_string("sdmc:/b/keep.txt", "k").unwrap();
        ops.write_string("sdmc:/c/g.txt", "g").unwrap();

        ops.move_path("sdmc:/a/f.txt", "sdmc:/b/", OpLogs::default())
            .unwrap();
        ops.move_path("sdmc:/c/", "sdmc:/b/", OpLogs::default())
            .unwrap();

        let root = dir.path();
        assert!(root.join("b/f.txt").is_file());
        assert!(root.join("b/g.txt").is_file());
        assert!(root.join("b/keep.txt").is_file());
        assert!(!root.join("a/f.txt").exists());
        assert!(!root.join("c").exists());
    }

    #[test]
    fn test_delete_missing_path_is_ok_and_pattern_deletes_matches() {
        let (dir, ops) = setup();
        assert!(ops.delete("sdmc:/never/existed", None).is_ok());

        ops.write_string("sdmc:/p/a.ovl", "").unwrap();
        ops.write_string("sdmc:/p/b.ovl", "").unwrap();
        ops.write_string("sdmc:/p/c.txt", "").unwrap();
        ops.delete_by_pattern("sdmc:/p/*.ovl", Some("sdmc:/deleted.log"))
            .unwrap();

        let root = dir.path();
        assert!(!root.join("p/a.ovl").exists());
        assert!(root.join("p/c.txt").exists());
        assert_eq!(
            fs::read_to_string(root.join("deleted.log")).unwrap(),
            "sdmc:/p/a.ovl\nsdmc:/p/b.ovl\n"
        );
    }

    #[test]
    fn test_wildcard_listing_marks_directories() {
        let (_dir, ops) = setup();
        ops.write_string("sdmc:/themes/dark/theme.ini", "").unwrap();
        ops.write_string("sdmc:/themes/light/theme.ini", "").unwrap();
        ops.write_string("sdmc:/themes/readme.txt", "").unwrap();

        assert_eq!(
            ops.get_files_list_by_wildcards("sdmc:/themes/*/").unwrap(),
            vec!["sdmc:/themes/dark/", "sdmc:/themes/light/"]
        );
        assert_eq!(
            ops.get_files_list_by_wildcards("sdmc:/themes/*.txt").unwrap(),
            vec!["sdmc:/themes/readme.txt"]
        );
    }

    #[test]
    fn test_mirror_copy_then_delete() {
        let (dir, ops) = setup();
        ops.write_string("sdmc:/pkg/files/atmosphere/x.bin", "x").unwrap();

        ops.mirror_files("sdmc:/pkg/files/", "sdmc:/", MirrorMode::Copy)
            .unwrap();
        assert!(dir.path().join("atmosphere/x.bin").is_file());

        ops.mirror_files("sdmc:/pkg/files/", "sdmc:/", MirrorMode::Delete)
            .unwrap();
        assert!(!dir.path().join("atmosphere/x.bin").exists());
        assert!(dir.path().join("pkg/files/atmosphere/x.bin").is_file());
    }

    #[test]
    fn test_compare_lists_writes_common_lines() {
        let (_dir, ops) = setup();
        ops.write_string("sdmc:/l1.txt", "a\nb\nc\nb\n").unwrap();
        ops.write_string("sdmc:/l2.txt", "c\nb\nz\n").unwrap();

        ops.compare_files_lists("sdmc:/l1.txt", "sdmc:/l2.txt", "sdmc:/out.txt")
            .unwrap();
        assert_eq!(ops.read_to_string("sdmc:/out.txt").unwrap(), "b\nc\n");
        assert_eq!(
            ops.get_entry_from_list_file("sdmc:/l2.txt", 2).as_deref(),
            Some("z")
        );
    }
}
