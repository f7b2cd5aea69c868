// src/core/handlers/transfer.rs

//! `download`, `unzip`, `pchtxt2ips` and `pchtxt2cheat`. Every result is
//! AND-ed into the run's success.

use crate::{
    core::{paths::preprocess_url, task_executor::ExecutionContext},
    system::{patch_text, transfer::TransferError},
};
use std::sync::atomic::Ordering;

/// `download <url> <destination>`. A destination ending in `/` receives the
/// file under the URL's last path segment.
pub fn download(context: &mut ExecutionContext<'_>, command: &[String]) {
    let [_, url, destination, ..] = command else {
        return;
    };
    let url = preprocess_url(url);
    let destination = context.path(destination);
    let into_directory = destination.ends_with('/');
    let services = context.services;
    let target = services.fs.resolve(&destination);
    let attempts = services.config.download_attempts.max(1);

    let mut downloaded = false;
    for attempt in 1..=attempts {
        if services.state.abort_download.load(Ordering::Acquire) {
            break;
        }
        match services.transfer.download_file(&url, &target, into_directory) {
            Ok(path) => {
                log::debug!("Downloaded '{}' to '{}'", url, path.display());
                downloaded = true;
                break;
            }
            Err(e @ (TransferError::Aborted(_) | TransferError::InvalidUrl(_))) => {
                log::error!("{}", e);
                break;
            }
            Err(e) => log::warn!("Attempt {}/{}: {}", attempt, attempts, e),
        }
    }

    if !downloaded {
        log::error!("Download of '{}' failed.", url);
        context.command_success = false;
    }
}

/// `unzip <archive> <destination>`
pub fn unzip(context: &mut ExecutionContext<'_>, command: &[String]) {
    let [_, archive, destination, ..] = command else {
        return;
    };
    let fs = &context.services.fs;
    let (archive, destination) = (fs.resolve(&context.path(archive)), fs.resolve(&context.path(destination)));
    let result = context.services.transfer.unzip_file(&archive, &destination);
    context.record(result);
}

/// `pchtxt2ips <source> <destination>`. A directory destination receives
/// `<build id>.ips`.
pub fn pchtxt_to_ips(context: &mut ExecutionContext<'_>, command: &[String]) {
    let [_, source, destination, ..] = command else {
        return;
    };
    let destination = context.path(destination);
    let fs = &context.services.fs;
    let into_directory = destination.ends_with('/') || fs.is_directory(&destination);
    let result = patch_text::pchtxt_to_ips(
        &fs.resolve(&context.path(source)),
        &fs.resolve(&destination),
        into_directory,
    );
    context.record(result);
}

/// `pchtxt2cheat <source>`
pub fn pchtxt_to_cheat(context: &mut ExecutionContext<'_>, command: &[String]) {
    let Some(source) = command.get(1).map(|token| context.path(token)) else {
        return;
    };
    let result = patch_text::pchtxt_to_cheat(&context.services.fs.resolve(&source));
    context.record(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlatformVariant;
    use crate::system::test_support::services_at;
    use std::fs::{self, File};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn cmd(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_unzip_into_device_path() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        let mut writer = zip::ZipWriter::new(File::create(dir.path().join("pkg/mod.zip")).unwrap());
        writer.start_file("atmosphere/a.txt", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"a").unwrap();
        writer.finish().unwrap();
        let mut context = ExecutionContext::new(&services, "sdmc:/pkg/", "opt");

        // --- Action ---
        unzip(&mut context, &cmd(&["unzip", "./mod.zip", "sdmc:/"]));

        // --- Assertions ---
        assert!(context.command_success);
        assert_eq!(fs::read_to_string(dir.path().join("atmosphere/a.txt")).unwrap(), "a");
    }

    #[test]
    fn test_unzip_of_missing_archive_fails() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        let mut context = ExecutionContext::new(&services, "", "opt");

        unzip(&mut context, &cmd(&["unzip", "sdmc:/none.zip", "sdmc:/"]));
        assert!(!context.command_success);
    }

    #[test]
    fn test_download_with_placeholder_or_pending_abort_fails_without_network() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);

        let mut context = ExecutionContext::new(&services, "", "opt");
        download(&mut context, &cmd(&["download", "https://host/{x}.zip", "sdmc:/dl/"]));
        assert!(!context.command_success);

        services.state.abort_download.store(true, Ordering::Release);
        let mut context = ExecutionContext::new(&services, "", "opt");
        download(&mut context, &cmd(&["download", "https://host/a.zip", "sdmc:/dl/"]));
        assert!(!context.command_success);
        assert!(!dir.path().join("dl/a.zip").exists());
    }

    fn read_request(stream: &mut TcpStream) {
        let mut request = Vec::new();
        let mut byte = [0u8; 1];
        while !request.ends_with(b"\r\n\r\n") && stream.read(&mut byte).unwrap_or(0) == 1 {
            request.push(byte[0]);
        }
    }

    #[test]
    fn test_download_gives_up_after_configured_attempts() {
        // --- Setup ---
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        listener.set_nonblocking(true).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let server = {
            let (hits, stop) = (Arc::clone(&hits), Arc::clone(&stop));
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    match listener.accept() {
                        Ok((mut stream, _)) => {
                            stream.set_nonblocking(false).unwrap();
                            read_request(&mut stream);
                            hits.fetch_add(1, Ordering::AcqRel);
                            let _ = stream.write_all(
                                b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            );
                        }
                        Err(_) => thread::sleep(Duration::from_millis(5)),
                    }
                }
            })
        };

        let dir = tempdir().unwrap();
        let (mut services, _) = services_at(dir.path(), PlatformVariant::Erista);
        services.config.download_attempts = 2;
        let mut context = ExecutionContext::new(&services, "", "opt");

        // --- Action ---
        let url = format!("http://127.0.0.1:{}/pack.zip", port);
        download(&mut context, &cmd(&["download", &url, "sdmc:/dl/"]));
        stop.store(true, Ordering::Release);
        server.join().unwrap();

        // --- Assertions ---
        assert!(!context.command_success);
        assert_eq!(hits.load(Ordering::Acquire), 2);
        assert!(!dir.path().join("dl/pack.zip").exists());
    }

    #[test]
    fn test_pchtxt_conversions() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        fs::write(
            dir.path().join("fix.pchtxt"),
            "@nsobid-AABBCCDDEEFF00112233445566778899\n@enabled\n00000200 00000000\n",
        )
        .unwrap();
        let mut context = ExecutionContext::new(&services, "", "opt");

        pchtxt_to_ips(&mut context, &cmd(&["pchtxt2ips", "sdmc:/fix.pchtxt", "sdmc:/exefs_patches/fix/"]));
        pchtxt_to_cheat(&mut context, &cmd(&["pchtxt2cheat", "sdmc:/fix.pchtxt"]));

        assert!(context.command_success);
        assert!(dir
            .path()
            .join("exefs_patches/fix/AABBCCDDEEFF00112233445566778899.ips")
            .is_file());
        assert!(dir.path().join("AABBCCDDEEFF0011.txt").is_file());
    }
}
