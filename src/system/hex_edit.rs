//! # Hex Editing
//!
//! In-place binary patching: by absolute offset, by find/replace, and relative
//! to an anchor pattern. Anchor lookups are cached per file and pattern until
//! `clear hex_sum_cache`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HexError {
    #[error("'{value}' is not valid hex: {source}")]
    InvalidHex {
        value: String,
        #[source]
        source: hex::FromHexError,
    },
    #[error("'{0}' is not a valid number.")]
    InvalidNumber(String),
    #[error("Pattern '{pattern}' not found in '{path}'.")]
    PatternNotFound { pattern: String, path: String },
    #[error("Occurrence {occurrence} of '{pattern}' not found (only {found} present).")]
    OccurrenceNotFound {
        pattern: String,
        occurrence: usize,
        found: usize,
    },
    #[error("Hex I/O on '{path}' failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Offset {offset} is outside of '{path}'.")]
    OutOfBounds { offset: i64, path: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> HexError + '_ {
    move |source| HexError::Io {
        path: path.display().to_string(),
        source,
    }
}

pub fn decode_hex(value: &str) -> Result<Vec<u8>, HexError> {
    hex::decode(value).map_err(|e| HexError::InvalidHex {
        value: value.to_string(),
        source: e,
    })
}

#[derive(Debug)]
pub struct HexEditor {
    buffer_size: usize,
    sum_cache: Mutex<HashMap<String, u64>>,
}

impl HexEditor {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            sum_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn clear_cache(&self) {
        self.sum_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn cached_anchors(&self) -> usize {
        self.sum_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Writes `hex_data` at the decimal `offset`.
    pub fn by_offset(&self, path: &Path, offset: &str, hex_data: &str) -> Result<(), HexError> {
        let offset: u64 = offset
            .trim()
            .parse()
            .map_err(|_| HexError::InvalidNumber(offset.to_string()))?;
        let bytes = decode_hex(hex_data)?;
        self.write_at(path, offset, &bytes)
    }

    /// Replaces `find` with `replace`. `occurrence` is 1-based; `0` replaces all.
    pub fn find_replace(
        &self,
        path: &Path,
        find: &str,
        replace: &str,
        occurrence: usize,
    ) -> Result<(), HexError> {
        let pattern = decode_hex(find)?;
        let replacement = decode_hex(replace)?;
        let offsets = self.find_offsets(path, &pattern)?;

        if offsets.is_empty() {
            return Err(HexError::PatternNotFound {
                pattern: find.to_string(),
                path: path.display().to_string(),
            });
        }

        if occurrence == 0 {
            for offset in &offsets {
                self.write_at(path, *offset, &replacement)?;
            }
            log::debug!(
                "Replaced {} occurrence(s) of {} in '{}'",
                offsets.len(),
                find,
                path.display()
            );
            return Ok(());
        }

        let offset = offsets
            .get(occurrence - 1)
            .ok_or(HexError::OccurrenceNotFound {
                pattern: find.to_string(),
                occurrence,
                found: offsets.len(),
            })?;
        self.write_at(path, *offset, &replacement)
    }

    /// Writes `hex_data` at `offset` bytes from the first occurrence of the
    /// ASCII `anchor`.
    pub fn by_custom_offset(
        &self,
        path: &Path,
        anchor: &str,
        offset: &str,
        hex_data: &str,
    ) -> Result<(), HexError> {
        let position = self.anchored_position(path, anchor, offset)?;
        let bytes = decode_hex(hex_data)?;
        self.write_at(path, position, &bytes)
    }

    /// Reads `length` bytes at `offset` from the ASCII `anchor`, as uppercase hex.
    /// The whole range must lie inside the file.
    pub fn read_at_custom_offset(
        &self,
        path: &Path,
        anchor: &str,
        offset: &str,
        length: usize,
    ) -> Result<String, HexError> {
        let position = self.anchored_position(path, anchor, offset)?;
        let mut file = File::open(path).map_err(io_error(path))?;
        let file_len = file.metadata().map_err(io_error(path))?.len();
        let wanted = u64::try_from(length).unwrap_or(u64::MAX);
        if wanted > file_len.saturating_sub(position) {
            return Err(HexError::OutOfBounds {
                offset: i64::try_from(position.saturating_add(wanted)).unwrap_or(i64::MAX),
                path: path.display().to_string(),
            });
        }

        file.seek(SeekFrom::Start(position)).map_err(io_error(path))?;
        let mut data = Vec::new();
        (&mut file)
            .take(wanted)
            .read_to_end(&mut data)
            .map_err(io_error(path))?;
        if data.len() != length {
            return Err(HexError::OutOfBounds {
                offset: i64::try_from(position.saturating_add(wanted)).unwrap_or(i64::MAX),
                path: path.display().to_string(),
            });
        }
        Ok(hex::encode_upper(data))
    }

    fn anchored_position(&self, path: &Path, anchor: &str, offset: &str) -> Result<u64, HexError> {
        let delta: i64 = offset
            .trim()
            .parse()
            .map_err(|_| HexError::InvalidNumber(offset.to_string()))?;
        let base = self.anchor_offset(path, anchor)?;
        let position = i64::try_from(base).unwrap_or(i64::MAX).saturating_add(delta);
        u64::try_from(position).map_err(|_| HexError::OutOfBounds {
            offset: position,
            path: path.display().to_string(),
        })
    }

    fn anchor_offset(&self, path: &Path, anchor: &str) -> Result<u64, HexError> {
        let cache_key = format!("{}?{}", path.display(), anchor);
        if let Some(offset) = self
            .sum_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&cache_key)
        {
            return Ok(*offset);
        }

        let offsets = self.find_offsets(path, anchor.as_bytes())?;
        let first = *offsets.first().ok_or_else(|| HexError::PatternNotFound {
            pattern: anchor.to_string(),
            path: path.display().to_string(),
        })?;

        self.sum_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cache_key, first);
        Ok(first)
    }

    /// Every offset of `pattern`, scanning in buffer-sized chunks.
    fn find_offsets(&self, path: &Path, pattern: &[u8]) -> Result<Vec<u64>, HexError> {
        if pattern.is_empty() {
            return Ok(Vec::new());
        }
        let mut file = File::open(path).map_err(io_error(path))?;
        let mut offsets = Vec::new();
        let mut window: Vec<u8> = Vec::with_capacity(self.buffer_size + pattern.len());
        let mut window_start: u64 = 0;
        let mut chunk = vec![0u8; self.buffer_size];

        loop {
            let read = file.read(&mut chunk).map_err(io_error(path))?;
            if read == 0 {
                break;
            }
            window.extend_from_slice(chunk.get(..read).unwrap_or_default());

            for (i, candidate) in window.windows(pattern.len()).enumerate() {
                if candidate == pattern {
                    let offset = window_start + i as u64;
                    if offsets.last().is_none_or(|last| *last != offset) {
                        offsets.push(offset);
                    }
                }
            }

            // Keep a tail so matches spanning chunks are still found.
            let keep = (pattern.len() - 1).min(window.len());
            let drop = window.len() - keep;
            window.drain(..drop);
            window_start += drop as u64;
        }

        Ok(offsets)
    }

    fn write_at(&self, path: &Path, offset: u64, bytes: &[u8]) -> Result<(), HexError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(io_error(path))?;
        let len = file.metadata().map_err(io_error(path))?.len();
        if offset > len {
            return Err(HexError::OutOfBounds {
                offset: i64::try_from(offset).unwrap_or(i64::MAX),
                path: path.display().to_string(),
            });
        }
        file.seek(SeekFrom::Start(offset)).map_err(io_error(path))?;
        file.write_all(bytes).map_err(io_error(path))
    }
}

// --- Conversions ---

/// `"255"` → `"FF"`, `"4096"` → `"1000"`. Output always has an even length.
pub fn decimal_to_hex(decimal: &str) -> Result<String, HexError> {
    let value: u64 = decimal
        .trim()
        .parse()
        .map_err(|_| HexError::InvalidNumber(decimal.to_string()))?;
    let mut hex = format!("{:X}", value);
    if hex.len() % 2 == 1 {
        hex.insert(0, '0');
    }
    Ok(hex)
}

/// `"4096"` → `"0010"` (little-endian byte order).
pub fn decimal_to_reversed_hex(decimal: &str) -> Result<String, HexError> {
    decimal_to_hex(decimal).and_then(|hex| hex_to_reversed_hex(&hex))
}

pub fn ascii_to_hex(ascii: &str) -> String {
    hex::encode_upper(ascii.as_bytes())
}

/// Reverses byte order: `"AABBCC"` → `"CCBBAA"`.
pub fn hex_to_reversed_hex(hex_str: &str) -> Result<String, HexError> {
    let mut bytes = decode_hex(hex_str)?;
    bytes.reverse();
    Ok(hex::encode_upper(bytes))
}

pub fn hex_to_decimal(hex_str: &str) -> Result<String, HexError> {
    u64::from_str_radix(hex_str.trim(), 16)
        .map(|value| value.to_string())
        .map_err(|_| HexError::InvalidNumber(hex_str.to_string()))
}
