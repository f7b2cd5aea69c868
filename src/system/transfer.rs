//! # Download & Unzip
//!
//! Blocking HTTP download and ZIP extraction. Both poll their abort flag
//! between chunks and publish a 0-100 progress value while running.

use crate::state::{PROGRESS_IDLE, SharedState, update_progress};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Error downloading '{url}': {source}")]
    Http {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("Error downloading '{0}': Empty file")]
    EmptyBody(String),
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Error opening zip file '{path}': {source}")]
    Archive {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Transfer of '{0}' was aborted.")]
    Aborted(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TransferError + '_ {
    move |source| TransferError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[derive(Debug)]
pub struct Transfer {
    download_buffer_size: usize,
    unzip_buffer_size: usize,
    user_agent: String,
    state: SharedState,
}

impl Transfer {
    pub fn new(
        download_buffer_size: usize,
        unzip_buffer_size: usize,
        user_agent: impl Into<String>,
        state: SharedState,
    ) -> Self {
        Self {
            download_buffer_size: download_buffer_size.max(1),
            unzip_buffer_size: unzip_buffer_size.max(1),
            user_agent: user_agent.into(),
            state,
        }
    }

    /// Downloads `url` to `destination`. With `into_directory`, the file keeps
    /// the last segment of the URL as its name inside `destination`.
    ///
    /// Returns the path written. A partial or empty file is removed.
    pub fn download_file(
        &self,
        url: &str,
        destination: &Path,
        into_directory: bool,
    ) -> Result<PathBuf, TransferError> {
        if url.contains(['{', '}']) {
            return Err(TransferError::InvalidUrl(url.to_string()));
        }

        let target = if into_directory {
            let file_name = url
                .rsplit_once('/')
                .map(|(_, name)| name)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| TransferError::InvalidUrl(url.to_string()))?;
            fs::create_dir_all(destination).map_err(io_error(destination))?;
            destination.join(file_name)
        } else {
            if let Some(parent) = destination.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(io_error(parent))?;
                }
            }
            destination.to_path_buf()
        };

        let result = self.fetch_into(url, &target);
        self.state
            .download_percentage
            .store(PROGRESS_IDLE, Ordering::Release);

        match result {
            Ok(0) => {
                let _ = fs::remove_file(&target);
                Err(TransferError::EmptyBody(url.to_string()))
            }
            Ok(bytes) => {
                log::info!("Download Complete! ({} bytes to '{}')", bytes, target.display());
                Ok(target)
            }
            Err(e) => {
                let _ = fs::remove_file(&target);
                Err(e)
            }
        }
    }

    fn fetch_into(&self, url: &str, target: &Path) -> Result<u64, TransferError> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(60))
            .timeout_write(Duration::from_secs(60))
            .build();
        let response = agent
            .get(url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| TransferError::Http {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        let total: u64 = response
            .header("Content-Length")
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);
        let mut reader = response.into_reader();
        let mut file = File::create(target).map_err(io_error(target))?;

        self.state.download_percentage.store(0, Ordering::Release);
        copy_with_progress(
            &mut reader,
            &mut file,
            self.download_buffer_size,
            Progress {
                abort: &self.state.abort_download,
                counter: &self.state.download_percentage,
                total,
            },
            url,
            target,
        )
    }

    /// Extracts every entry of `zip_path` below `destination`.
    ///
    /// Entry names that would escape the destination are skipped. Colons in
    /// entry names become spaces and doubled spaces collapse.
    pub fn unzip_file(&self, zip_path: &Path, destination: &Path) -> Result<usize, TransferError> {
        let file = File::open(zip_path).map_err(io_error(zip_path))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| archive_error(zip_path, e))?;

        self.state.unzip_percentage.store(0, Ordering::Release);
        let result = self.extract_entries(&mut archive, zip_path, destination);
        self.state
            .unzip_percentage
            .store(PROGRESS_IDLE, Ordering::Release);

        if let Ok(count) = &result {
            log::info!("Extracted {} file(s) from '{}'", count, zip_path.display());
        }
        result
    }

    fn extract_entries(
        &self,
        archive: &mut zip::ZipArchive<File>,
        zip_path: &Path,
        destination: &Path,
    ) -> Result<usize, TransferError> {
        let total: u64 = (0..archive.len())
            .filter_map(|i| archive.by_index_raw(i).ok().map(|entry| entry.size()))
            .sum();
        let mut extracted_bytes: u64 = 0;
        let mut extracted = 0;

        for i in 0..archive.len() {
            if self.state.abort_unzip.load(Ordering::Acquire) {
                return Err(TransferError::Aborted(zip_path.display().to_string()));
            }

            let mut entry = archive
                .by_index(i)
                .map_err(|e| archive_error(zip_path, e))?;
            let Some(name) = entry.enclosed_name() else {
                log::warn!("Skipping unsafe zip entry '{}'", entry.name());
                continue;
            };
            let out_path = destination.join(sanitize_entry_name(&name.to_string_lossy()));

            if entry.is_dir() {
                fs::create_dir_all(&out_path).map_err(io_error(&out_path))?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }

            let mut out_file = File::create(&out_path).map_err(io_error(&out_path))?;
            let written = copy_with_progress(
                &mut entry,
                &mut out_file,
                self.unzip_buffer_size,
                Progress {
                    abort: &self.state.abort_unzip,
                    counter: &self.state.unzip_percentage,
                    total: 0,
                },
                &zip_path.display().to_string(),
                &out_path,
            )?;
            extracted_bytes += written;
            extracted += 1;
            update_progress(&self.state.unzip_percentage, total, extracted_bytes);
        }

        Ok(extracted)
    }
}

fn archive_error(path: &Path, source: zip::result::ZipError) -> TransferError {
    TransferError::Archive {
        path: path.display().to_string(),
        source,
    }
}

struct Progress<'a> {
    abort: &'a AtomicBool,
    counter: &'a AtomicI32,
    /// Zero when the total is unknown; the counter is then left alone.
    total: u64,
}

fn copy_with_progress<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    progress: Progress<'_>,
    label: &str,
    target: &Path,
) -> Result<u64, TransferError> {
    let mut buffer = vec![0u8; buffer_size];
    let mut done: u64 = 0;
    loop {
        if progress.abort.load(Ordering::Acquire) {
            return Err(TransferError::Aborted(label.to_string()));
        }
        let read = reader.read(&mut buffer).map_err(io_error(target))?;
        if read == 0 {
            return Ok(done);
        }
        writer
            .write_all(buffer.get(..read).unwrap_or_default())
            .map_err(io_error(target))?;
        done += read as u64;
        update_progress(progress.counter, progress.total, done);
    }
}

fn sanitize_entry_name(name: &str) -> String {
    let mut sanitized = name.replace(':', " ");
    while sanitized.contains("  ") {
        sanitized = sanitized.replace("  ", " ");
    }
    sanitized
}
