// src/core/handlers/files.rs

//! `mkdir`, `cp`, `del`, `mv`, the mirror commands and `compare`.
//!
//! Single-path and wildcard failures are AND-ed into the run's success.
//! In list-driven mode each entry's failure is only logged.

use super::commons::FileOpArgs;
use crate::{
    constants::ROOT_PATH,
    core::{paths::preprocess_path, safety::is_dangerous_combination, task_executor::ExecutionContext},
    system::fs_ops::{FileOps, MirrorMode, OpLogs},
};
use std::collections::HashSet;

fn read_filter(fs: &FileOps, filter_list: Option<&str>) -> HashSet<String> {
    filter_list
        .map(|path| fs.read_set_from_file(path))
        .unwrap_or_default()
}

/// Source/destination pairs from two list files, with quotes stripped.
fn read_pairs(fs: &FileOps, source_list: &str, destination_list: &str) -> (Vec<String>, Vec<String>) {
    let unquote = |entries: Vec<String>| -> Vec<String> {
        entries
            .iter()
            .map(|entry| preprocess_path(entry, ""))
            .collect()
    };
    (
        unquote(fs.read_list_from_file(source_list)),
        unquote(fs.read_list_from_file(destination_list)),
    )
}

pub fn make_directory(context: &mut ExecutionContext<'_>, command: &[String]) {
    let Some(path) = command.get(1).map(|token| context.path(token)) else {
        return;
    };
    let result = context.services.fs.create_directory(&path);
    context.record(result);
}

pub fn copy(context: &mut ExecutionContext<'_>, command: &[String]) {
    let args = FileOpArgs::parse(command, &context.package_path);
    let fs = &context.services.fs;

    // 1. List-driven mode.
    if let (Some(source_list), Some(destination_list)) = (&args.source_list, &args.destination_list) {
        let (sources, destinations) = read_pairs(fs, source_list, destination_list);
        let filter = read_filter(fs, args.filter_list.as_deref());
        for (source, destination) in sources.iter().zip(&destinations) {
            if filter.contains(source) {
                continue;
            }
            if let Err(e) = fs.copy(source, destination, OpLogs::default()) {
                log::error!("{}", e);
            }
        }
        return;
    }

    // 2. Single pair or wildcard.
    let (Some(source), Some(destination)) = (&args.source, &args.destination) else {
        return;
    };
    let result = if source.contains('*') {
        fs.copy_by_pattern(source, destination, args.logs())
    } else {
        fs.copy(source, destination, args.logs())
    };
    context.record(result);
}

pub fn delete(context: &mut ExecutionContext<'_>, command: &[String]) {
    let args = FileOpArgs::parse(command, &context.package_path);
    let fs = &context.services.fs;

    if let Some(source_list) = &args.source_list {
        let filter = read_filter(fs, args.filter_list.as_deref());
        for entry in fs.read_list_from_file(source_list) {
            let path = preprocess_path(&entry, "");
            if filter.contains(&path) {
                continue;
            }
            if let Err(e) = fs.delete(&path, None) {
                log::error!("{}", e);
            }
        }
        return;
    }

    let Some(source) = &args.source else {
        return;
    };
    if is_dangerous_combination(source) {
        log::warn!("Refusing to delete protected path '{}'", source);
        return;
    }
    let log_source = args.log_source.as_deref();
    let result = if source.contains('*') {
        fs.delete_by_pattern(source, log_source)
    } else {
        fs.delete(source, log_source)
    };
    context.record(result);
}

pub fn move_entries(context: &mut ExecutionContext<'_>, command: &[String]) {
    let args = FileOpArgs::parse(command, &context.package_path);
    let fs = &context.services.fs;

    if let (Some(source_list), Some(destination_list)) = (&args.source_list, &args.destination_list) {
        let (sources, destinations) = read_pairs(fs, source_list, destination_list);
        if sources.len() != destinations.len() {
            // The run's success flag is deliberately left as it was.
            log::error!(
                "Source and destination lists must have the same number of entries ({} vs {}).",
                sources.len(),
                destinations.len()
            );
            return;
        }

        let copy_filter = read_filter(fs, args.copy_filter_list.as_deref());
        let filter = read_filter(fs, args.filter_list.as_deref());
        for (source, destination) in sources.iter().zip(&destinations) {
            if filter.contains(source) {
                continue;
            }
            let result = if copy_filter.contains(source) {
                fs.copy(source, destination, OpLogs::default())
            } else {
                fs.move_path(source, destination, OpLogs::default())
            };
            if let Err(e) = result {
                log::error!("{}", e);
            }
        }
        return;
    }

    let (Some(source), Some(destination)) = (&args.source, &args.destination) else {
        return;
    };
    if is_dangerous_combination(source) {
        log::warn!("Refusing to move protected path '{}'", source);
        return;
    }
    let result = if source.contains('*') {
        fs.move_by_pattern(source, destination, args.logs())
    } else {
        fs.move_path(source, destination, args.logs())
    };
    context.record(result);
}

/// `mirror_copy <source> [target_root]` / `mirror_delete <source> [target_root]`
pub fn mirror(context: &mut ExecutionContext<'_>, command: &[String], mode: MirrorMode) {
    let Some(source) = command.get(1).map(|token| context.path(token)) else {
        return;
    };
    let target_root = command
        .get(2)
        .map(|token| context.path(token))
        .unwrap_or_else(|| ROOT_PATH.to_string());
    let fs = &context.services.fs;

    if !source.contains('*') {
        let result = fs.mirror_files(&source, &target_root, mode);
        context.record(result);
        return;
    }

    let Some(directories) = context.record(fs.get_files_list_by_wildcards(&source)) else {
        return;
    };
    for directory in directories {
        let result = fs.mirror_files(&directory, &target_root, mode);
        context.record(result);
    }
}

/// `compare <list|pattern> <list> <output>`
pub fn compare(context: &mut ExecutionContext<'_>, command: &[String]) {
    let [_, first, second, output, ..] = command else {
        return;
    };
    let (first, second, output) = (context.path(first), context.path(second), context.path(output));
    let fs = &context.services.fs;

    let result = if first.contains('*') {
        fs.compare_wildcard_files_lists(&first, &second, &output)
    } else {
        fs.compare_files_lists(&first, &second, &output)
    };
    context.record(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlatformVariant;
    use crate::system::Services;
    use crate::system::test_support::services_at;
    use std::fs;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    fn cmd(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn setup() -> (TempDir, Services) {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        (dir, services)
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_copy_single_file_into_directory() {
        let (dir, services) = setup();
        write(dir.path(), "pkg/theme.ini", "x");
        let mut context = ExecutionContext::new(&services, "sdmc:/pkg/", "opt");

        copy(&mut context, &cmd(&["cp", "./theme.ini", "sdmc:/config/"]));

        assert!(context.command_success);
        assert_eq!(fs::read_to_string(dir.path().join("config/theme.ini")).unwrap(), "x");
    }

    #[test]
    fn test_copy_with_one_token_does_nothing() {
        let (dir, services) = setup();
        write(dir.path(), "pkg/a.txt", "a");
        let mut context = ExecutionContext::new(&services, "sdmc:/pkg/", "opt");

        copy(&mut context, &cmd(&["cp", "./a.txt"]));

        assert!(context.command_success);
        assert_eq!(fs::read_dir(dir.path().join("pkg")).unwrap().count(), 1);
    }

    #[test]
    fn test_copy_missing_source_fails() {
        let (_dir, services) = setup();
        let mut context = ExecutionContext::new(&services, "sdmc:/pkg/", "opt");

        copy(&mut context, &cmd(&["cp", "./nope.txt", "sdmc:/out/"]));

        assert!(!context.command_success);
    }

    #[test]
    fn test_copy_list_mode_honours_filter() {
        // --- Setup ---
        let (dir, services) = setup();
        write(dir.path(), "pkg/a.txt", "a");
        write(dir.path(), "pkg/b.txt", "b");
        write(dir.path(), "pkg/src.txt", "sdmc:/pkg/a.txt\nsdmc:/pkg/b.txt\n");
        write(dir.path(), "pkg/dst.txt", "sdmc:/out/a.txt\nsdmc:/out/b.txt\n");
        write(dir.path(), "pkg/skip.txt", "sdmc:/pkg/b.txt\n");
        let mut context = ExecutionContext::new(&services, "sdmc:/pkg/", "opt");

        // --- Action ---
        copy(
            &mut context,
            &cmd(&["cp", "-src", "./src.txt", "-dest", "./dst.txt", "-filter", "./skip.txt"]),
        );

        // --- Assertions ---
        assert!(dir.path().join("out/a.txt").is_file());
        assert!(!dir.path().join("out/b.txt").exists());
    }

    #[test]
    fn test_delete_refuses_protected_paths() {
        let (dir, services) = setup();
        write(dir.path(), "atmosphere/contents/x.bin", "x");
        let mut context = ExecutionContext::new(&services, "", "opt");

        delete(&mut context, &cmd(&["del", "sdmc:/atmosphere/"]));
        delete(&mut context, &cmd(&["del", "sdmc:/atmosphere/*"]));

        assert!(context.command_success);
        assert!(dir.path().join("atmosphere/contents/x.bin").is_file());
    }

    #[test]
    fn test_delete_by_pattern_and_missing_path() {
        let (dir, services) = setup();
        write(dir.path(), "pkg/tmp/a.log", "");
        write(dir.path(), "pkg/tmp/b.log", "");
        write(dir.path(), "pkg/tmp/keep.txt", "");
        let mut context = ExecutionContext::new(&services, "sdmc:/pkg/", "opt");

        delete(&mut context, &cmd(&["del", "./tmp/*.log"]));
        delete(&mut context, &cmd(&["delete", "./not-there"]));

        assert!(context.command_success);
        assert!(!dir.path().join("pkg/tmp/a.log").exists());
        assert!(dir.path().join("pkg/tmp/keep.txt").exists());
    }

    #[test]
    fn test_move_with_mismatched_lists_moves_nothing() {
        // --- Setup ---
        let (dir, services) = setup();
        for name in ["a", "b", "c"] {
            write(dir.path(), &format!("pkg/{}.txt", name), name);
        }
        write(dir.path(), "pkg/src.txt", "sdmc:/pkg/a.txt\nsdmc:/pkg/b.txt\nsdmc:/pkg/c.txt\n");
        write(dir.path(), "pkg/dst.txt", "sdmc:/out/a.txt\nsdmc:/out/b.txt\n");
        let mut context = ExecutionContext::new(&services, "sdmc:/pkg/", "opt");

        // --- Action ---
        move_entries(&mut context, &cmd(&["mv", "-src", "./src.txt", "-dest", "./dst.txt"]));

        // --- Assertions ---
        assert!(context.command_success);
        assert!(!dir.path().join("out").exists());
        assert!(dir.path().join("pkg/a.txt").exists());
    }

    #[test]
    fn test_move_list_mode_copies_entries_in_copy_filter() {
        let (dir, services) = setup();
        write(dir.path(), "pkg/a.txt", "a");
        write(dir.path(), "pkg/b.txt", "b");
        write(dir.path(), "pkg/src.txt", "sdmc:/pkg/a.txt\nsdmc:/pkg/b.txt\n");
        write(dir.path(), "pkg/dst.txt", "sdmc:/out/a.txt\nsdmc:/out/b.txt\n");
        write(dir.path(), "pkg/keep.txt", "sdmc:/pkg/b.txt\n");
        let mut context = ExecutionContext::new(&services, "sdmc:/pkg/", "opt");

        move_entries(
            &mut context,
            &cmd(&["mv", "-src", "./src.txt", "-dest", "./dst.txt", "-copy_filter", "./keep.txt"]),
        );

        assert!(!dir.path().join("pkg/a.txt").exists());
        assert!(dir.path().join("pkg/b.txt").exists());
        assert!(dir.path().join("out/a.txt").exists());
        assert!(dir.path().join("out/b.txt").exists());
    }

    #[test]
    fn test_move_single_file_and_rename() {
        let (dir, services) = setup();
        write(dir.path(), "pkg/old.txt", "data");
        let mut context = ExecutionContext::new(&services, "sdmc:/pkg/", "opt");

        move_entries(&mut context, &cmd(&["rename", "./old.txt", "./new.txt"]));

        assert!(context.command_success);
        assert_eq!(fs::read_to_string(dir.path().join("pkg/new.txt")).unwrap(), "data");
        assert!(!dir.path().join("pkg/old.txt").exists());
    }

    #[test]
    fn test_mirror_copy_then_delete() {
        let (dir, services) = setup();
        write(dir.path(), "pkg/tree/atmosphere/config/x.ini", "x");
        let mut context = ExecutionContext::new(&services, "sdmc:/pkg/", "opt");

        mirror(&mut context, &cmd(&["mirror_copy", "./tree/"]), MirrorMode::Copy);
        assert!(dir.path().join("atmosphere/config/x.ini").is_file());

        mirror(&mut context, &cmd(&["mirror_delete", "./tree/"]), MirrorMode::Delete);
        assert!(!dir.path().join("atmosphere/config/x.ini").exists());
        assert!(dir.path().join("pkg/tree/atmosphere/config/x.ini").is_file());
        assert!(context.command_success);
    }

    #[test]
    fn test_compare_writes_common_lines() {
        let (dir, services) = setup();
        write(dir.path(), "pkg/one.txt", "a\nb\nc\n");
        write(dir.path(), "pkg/two.txt", "c\na\n");
        let mut context = ExecutionContext::new(&services, "sdmc:/pkg/", "opt");

        compare(&mut context, &cmd(&["compare", "./one.txt", "./two.txt", "./common.txt"]));

        assert_eq!(fs::read_to_string(dir.path().join("pkg/common.txt")).unwrap(), "a\nc\n");
    }
}
