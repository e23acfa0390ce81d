// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! On-disk segment format: one file per book.
//!
//! A segment is the durable unit of a book: its metadata plus every page
//! (raw text, normalized text, position map). The inverted index is *not*
//! persisted - it is derived data, rebuilt from segments at open.
//!
//! # Format
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ magic: [u8; 4] = "BHTH"                    │
//! │ version: u8 = 1                            │
//! │ flags: u8  (normalization configuration)   │
//! │ payload_len: u64 LE                        │
//! ├────────────────────────────────────────────┤
//! │ payload: bincode(SegmentPayload)           │
//! ├────────────────────────────────────────────┤
//! │ crc32: u32 LE  (over everything above)     │
//! └────────────────────────────────────────────┘
//! ```
//!
//! Writes are atomic: encode to a temp file in the same directory, fsync,
//! then rename over the target. A crash mid-ingest leaves the previous
//! segment (or no segment) - never a torn one. Reads validate magic,
//! version, declared length, and the CRC before decoding; any mismatch is
//! [`StorageError::Corrupt`] naming the file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::normalize::NormalizeConfig;
use crate::types::{BookMeta, Page};

/// File magic: "BHTH".
pub const MAGIC: [u8; 4] = *b"BHTH";

/// Current format version.
pub const VERSION: u8 = 1;

/// Header size: magic + version + flags + payload_len.
const HEADER_LEN: usize = 4 + 1 + 1 + 8;

/// CRC32 footer size.
const FOOTER_LEN: usize = 4;

/// Upper bound on the declared payload length. Large enough for any real
/// book, small enough to reject a corrupted length field before allocating.
const MAX_PAYLOAD: u64 = 1 << 30;

/// Everything a segment persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SegmentPayload {
    meta: BookMeta,
    pages: Vec<Page>,
}

/// A decoded segment.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Normalization configuration the pages were derived with.
    pub config: NormalizeConfig,
    pub meta: BookMeta,
    pub pages: Vec<Page>,
}

/// Map a book id to its segment file name.
///
/// Book ids are caller-chosen strings (often Arabic); anything outside
/// `[A-Za-z0-9._-]` is escaped as `%XX` per byte so the mapping is
/// deterministic, collision-free, and filesystem-safe.
pub fn segment_file_name(book_id: &str) -> String {
    let mut name = String::with_capacity(book_id.len() + 4);
    for b in book_id.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                name.push(b as char);
            }
            _ => {
                name.push('%');
                name.push_str(&format!("{:02X}", b));
            }
        }
    }
    name.push_str(".seg");
    name
}

fn corrupt(path: &Path, reason: impl Into<String>) -> StorageError {
    StorageError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Encode a segment to its on-disk byte layout.
fn encode(segment: &Segment) -> Result<Vec<u8>, StorageError> {
    let payload = bincode::serialize(&SegmentPayload {
        meta: segment.meta.clone(),
        pages: segment.pages.clone(),
    })?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len() + FOOTER_LEN);
    bytes.extend_from_slice(&MAGIC);
    bytes.push(VERSION);
    bytes.push(segment.config.to_flag());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&payload);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&bytes);
    bytes.extend_from_slice(&hasher.finalize().to_le_bytes());

    Ok(bytes)
}

/// Write a segment atomically: temp file in the same directory, fsync,
/// rename over the target path.
pub fn write_segment(path: &Path, segment: &Segment) -> Result<(), StorageError> {
    let bytes = encode(segment)?;

    let tmp: PathBuf = path.with_extension("seg.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read and fully validate a segment file.
pub fn read_segment(path: &Path) -> Result<Segment, StorageError> {
    let bytes = fs::read(path)?;

    if bytes.len() < HEADER_LEN + FOOTER_LEN {
        return Err(corrupt(path, format!("truncated: {} bytes", bytes.len())));
    }
    if bytes[0..4] != MAGIC {
        return Err(corrupt(path, "bad magic"));
    }
    let version = bytes[4];
    if version != VERSION {
        return Err(corrupt(path, format!("unsupported version {version}")));
    }
    let flags = bytes[5];

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[6..14]);
    let payload_len = u64::from_le_bytes(len_bytes);
    if payload_len > MAX_PAYLOAD {
        return Err(corrupt(path, format!("payload length {payload_len} exceeds limit")));
    }
    let expected = HEADER_LEN + payload_len as usize + FOOTER_LEN;
    if bytes.len() != expected {
        return Err(corrupt(
            path,
            format!("length mismatch: declared {expected} bytes, found {}", bytes.len()),
        ));
    }

    let body_end = bytes.len() - FOOTER_LEN;
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[body_end..]);
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&bytes[..body_end]);
    if hasher.finalize() != stored_crc {
        return Err(corrupt(path, "crc mismatch"));
    }

    let payload: SegmentPayload = bincode::deserialize(&bytes[HEADER_LEN..body_end])?;

    Ok(Segment {
        config: NormalizeConfig::from_flag(flags),
        meta: payload.meta,
        pages: payload.pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::PositionMap;

    fn sample_segment() -> Segment {
        let raw = "بِسْمِ اللَّهِ".to_string();
        let n = normalize(&raw);
        Segment {
            config: NormalizeConfig::default(),
            meta: BookMeta {
                id: "quran".into(),
                title: "القرآن الكريم".into(),
                ..Default::default()
            },
            pages: vec![Page {
                book_id: "quran".into(),
                page_num: 1,
                raw,
                normalized: n.text,
                map: n.map,
                footnote_start: None,
                token_count: 2,
            }],
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(segment_file_name("quran"));

        let segment = sample_segment();
        write_segment(&path, &segment).unwrap();

        let loaded = read_segment(&path).unwrap();
        assert_eq!(loaded.meta.id, "quran");
        assert_eq!(loaded.config, NormalizeConfig::default());
        assert_eq!(loaded.pages.len(), 1);
        assert_eq!(loaded.pages[0].normalized, segment.pages[0].normalized);
        assert_eq!(loaded.pages[0].map, segment.pages[0].map);
    }

    #[test]
    fn rejects_flipped_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.seg");
        write_segment(&path, &sample_segment()).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        match read_segment(&path) {
            Err(StorageError::Corrupt { .. }) => {}
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.seg");

        fs::write(&path, b"NOPE").unwrap();
        assert!(matches!(
            read_segment(&path),
            Err(StorageError::Corrupt { .. })
        ));

        write_segment(&path, &sample_segment()).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(
            read_segment(&path),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn preserves_normalization_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.seg");

        let mut segment = sample_segment();
        segment.config = NormalizeConfig { aggressive: true };
        write_segment(&path, &segment).unwrap();

        let loaded = read_segment(&path).unwrap();
        assert!(loaded.config.aggressive);
    }

    #[test]
    fn file_names_escape_unsafe_bytes() {
        assert_eq!(segment_file_name("sahih_bukhari"), "sahih_bukhari.seg");
        let name = segment_file_name("كتاب/1");
        assert!(name.ends_with(".seg"));
        assert!(!name.contains('/'));
        // Deterministic: same id, same name.
        assert_eq!(name, segment_file_name("كتاب/1"));
    }

    #[test]
    fn empty_page_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.seg");
        let segment = Segment {
            config: NormalizeConfig::default(),
            meta: BookMeta {
                id: "empty".into(),
                title: "فارغ".into(),
                ..Default::default()
            },
            pages: vec![Page {
                book_id: "empty".into(),
                page_num: 1,
                raw: String::new(),
                normalized: String::new(),
                map: PositionMap::default(),
                footnote_start: None,
                token_count: 0,
            }],
        };
        write_segment(&path, &segment).unwrap();
        let loaded = read_segment(&path).unwrap();
        assert!(loaded.pages[0].raw.is_empty());
        assert!(loaded.pages[0].map.is_empty());
    }
}
