//! # Patch-Text Conversion
//!
//! Converts `.pchtxt` patch listings into IPS32 patches or cheat files.
//!
//! ```text
//! @nsobid-0123456789ABCDEF0123456789ABCDEF
//! @flag offset_shift 0x100
//! @enabled
//! 0012AB34 1F2003D5
//! 00200000 "text"
//! @stop
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

lazy_static! {
    static ref PATCH_LINE: Option<Regex> =
        Regex::new(r#"^([0-9A-Fa-f]{1,8})\s+([0-9A-Fa-f]+|"[^"]*")"#).ok();
}

const IPS32_HEADER: &[u8] = b"IPS32";
const IPS32_FOOTER: &[u8] = b"EEOF";
const MAX_RECORD_LEN: usize = 0xFFFF;

/// Offset of the code segment inside an NSO; cheats address from there.
const NSO_HEADER_SIZE: u32 = 0x100;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Failed to read patch text '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("No @nsobid line in '{0}'.")]
    MissingBuildId(String),
    #[error("No enabled patches in '{0}'.")]
    NoPatches(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRecord {
    /// Offset with `offset_shift` already applied.
    pub offset: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchText {
    pub build_id: Option<String>,
    pub offset_shift: u32,
    pub records: Vec<PatchRecord>,
}

fn parse_number(value: &str) -> Option<u32> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

pub fn parse_pchtxt(content: &str) -> PatchText {
    let mut patch = PatchText::default();
    let mut enabled = false;

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        if let Some(bid) = line.strip_prefix("@nsobid-") {
            patch.build_id = Some(bid.trim().to_ascii_uppercase());
            continue;
        }
        if let Some(flag) = line.strip_prefix("@flag") {
            let mut parts = flag.split_whitespace();
            if parts.next() == Some("offset_shift") {
                if let Some(shift) = parts.next().and_then(parse_number) {
                    patch.offset_shift = shift;
                }
            }
            continue;
        }
        match line {
            "@enabled" => {
                enabled = true;
                continue;
            }
            "@disabled" => {
                enabled = false;
                continue;
            }
            "@stop" => break,
            _ if line.starts_with('@') => continue,
            _ => {}
        }

        if !enabled {
            continue;
        }
        let Some(captures) = PATCH_LINE.as_ref().and_then(|re| re.captures(line)) else {
            log::debug!("Ignoring unrecognised patch line '{}'", line);
            continue;
        };

        let (Some(offset), Some(value)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let Ok(offset) = u32::from_str_radix(offset.as_str(), 16) else {
            continue;
        };
        let value = value.as_str();
        let data = match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            Some(text) => text.as_bytes().to_vec(),
            None => match hex::decode(value) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::debug!("Ignoring patch value '{}': {}", value, e);
                    continue;
                }
            },
        };
        if data.is_empty() {
            continue;
        }

        patch.records.push(PatchRecord {
            offset: offset.wrapping_add(patch.offset_shift),
            data,
        });
    }

    patch
}

/// Serializes the records as an IPS32 patch.
pub fn to_ips32(patch: &PatchText) -> Vec<u8> {
    let mut out = IPS32_HEADER.to_vec();
    for record in &patch.records {
        let mut offset = record.offset;
        for chunk in record.data.chunks(MAX_RECORD_LEN) {
            out.extend_from_slice(&offset.to_be_bytes());
            // Chunks never exceed MAX_RECORD_LEN, which fits in a u16.
            let len = u16::try_from(chunk.len()).unwrap_or(u16::MAX);
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(chunk);
            offset = offset.wrapping_add(u32::from(len));
        }
    }
    out.extend_from_slice(IPS32_FOOTER);
    out
}

/// Renders the records as memory-write cheat codes relative to the code segment.
pub fn to_cheats(patch: &PatchText, title: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}]", title);

    for record in &patch.records {
        let mut address = record.offset.wrapping_sub(NSO_HEADER_SIZE);
        for chunk in record.data.chunks(4) {
            let value = chunk
                .iter()
                .rev()
                .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));
            let _ = writeln!(
                out,
                "0{}000000 {:08X} {:08X}",
                chunk.len(),
                address,
                value
            );
            address = address.wrapping_add(4);
        }
    }
    out
}

fn load(source: &Path) -> Result<PatchText, PatchError> {
    let content = fs::read_to_string(source).map_err(|e| PatchError::Read {
        path: source.display().to_string(),
        source: e,
    })?;
    let patch = parse_pchtxt(&content);
    if patch.records.is_empty() {
        return Err(PatchError::NoPatches(source.display().to_string()));
    }
    Ok(patch)
}

fn write(path: &Path, data: &[u8]) -> Result<(), PatchError> {
    let write_error = |e| PatchError::Write {
        path: path.display().to_string(),
        source: e,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
    }
    fs::write(path, data).map_err(write_error)
}

/// Converts `source` to an IPS32 file. A `destination` directory receives
/// `<BUILD_ID>.ips`; any other destination is used as the file path.
pub fn pchtxt_to_ips(source: &Path, destination: &Path, into_directory: bool) -> Result<PathBuf, PatchError> {
    let patch = load(source)?;
    let target = if into_directory {
        let build_id = patch
            .build_id
            .as_deref()
            .ok_or_else(|| PatchError::MissingBuildId(source.display().to_string()))?;
        destination.join(format!("{}.ips", build_id))
    } else {
        destination.to_path_buf()
    };

    write(&target, &to_ips32(&patch))?;
    log::info!(
        "Wrote {} patch record(s) to '{}'",
        patch.records.len(),
        target.display()
    );
    Ok(target)
}

/// Converts `source` to a cheat file named after the first 16 digits of the
/// build id, next to the source.
pub fn pchtxt_to_cheat(source: &Path) -> Result<PathBuf, PatchError> {
    let patch = load(source)?;
    let build_id = patch
        .build_id
        .as_deref()
        .ok_or_else(|| PatchError::MissingBuildId(source.display().to_string()))?;
    let short_id: String = build_id.chars().take(16).collect();

    let title = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| short_id.clone());
    let target = source
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!("{}.txt", short_id));

    write(&target, to_cheats(&patch, &title).as_bytes())?;
    Ok(target)
}
