// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy.
//!
//! The split matters to callers: an empty result set is `Ok(vec![])`, always.
//! Short queries, non-matching filters, zero hits - none of those are errors.
//! Errors are reserved for genuine faults: storage I/O or corruption
//! ([`StorageError`]) and malformed filter inputs ([`QueryError`]). A UI can
//! render "no results" vs "search unavailable" off the Result discriminant
//! alone.
//!
//! Storage errors are surfaced verbatim - no internal retry. If a retry
//! policy makes sense, it belongs to whoever owns the storage medium.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure in the index store's persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failure during ingest, removal, or open.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A segment file failed validation (bad magic, unsupported version,
    /// CRC mismatch, truncation).
    #[error("corrupt segment {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Segment payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for StorageError {
    fn from(e: bincode::Error) -> Self {
        StorageError::Codec(e.to_string())
    }
}

/// Malformed query input - filter ids of the wrong shape.
///
/// Never signaled for "no results"; a query that simply matches nothing is a
/// successful empty search.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// A book or author id that is blank, overlong, or contains control
    /// characters.
    #[error("invalid {kind} id: {id:?}")]
    InvalidFilterId { kind: &'static str, id: String },
}

/// Sum of everything the search facade can fail with.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
