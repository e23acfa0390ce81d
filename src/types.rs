// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The records everything else is built from.
//!
//! Pages and book metadata are owned by the store and handed out as
//! immutable snapshots; postings are the in-memory derived view the executor
//! walks. The invariants are few but load-bearing:
//!
//! - **PositionMap**: strictly increasing byte offsets, one entry per
//!   normalized character, every value a char boundary of the raw text.
//! - **PostingList**: postings sorted by `(page_id, pos)`, `doc_freq` equals
//!   the number of distinct pages present.
//! - **Page**: immutable once committed; replaced only wholesale with its
//!   book.

use serde::{Deserialize, Serialize};

// =============================================================================
// NEWTYPES
// =============================================================================

/// Store-internal page identifier.
///
/// Assigned once at ingest, unique across the store's lifetime, and carried
/// through postings so they stay small. Prevents mixing up page identifiers
/// with page *numbers*, which are per-book and start at whatever the book
/// says they start at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct PageId(pub u32);

impl PageId {
    /// Get the underlying value.
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

// =============================================================================
// POSITION MAP
// =============================================================================

/// Maps normalized character indices back to raw byte offsets.
///
/// Entry `i` is the byte offset (into the raw text) of the character that
/// produced normalized character `i`. Strictly increasing, because
/// normalization deletes and substitutes but never reorders or duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionMap(Vec<u32>);

impl PositionMap {
    pub fn new(offsets: Vec<u32>) -> Self {
        PositionMap(offsets)
    }

    /// Number of entries - equals the normalized text's character count.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Raw byte offset of normalized character `i`.
    ///
    /// Callers index with offsets taken from postings over the same page, so
    /// out-of-range means a corrupted index, not a user error.
    #[inline]
    pub fn raw_offset(&self, i: usize) -> u32 {
        self.0[i]
    }

    /// Translate a normalized character range `[start, end)` into a raw byte
    /// range. `end` may equal `len()`, in which case the span runs to
    /// `raw_len` - trailing diacritics of the last matched letter stay
    /// inside the span, which is exactly what highlighting wants.
    pub fn raw_span(&self, start: usize, end: usize, raw_len: usize) -> (usize, usize) {
        let lo = if start < self.0.len() {
            self.0[start] as usize
        } else {
            raw_len
        };
        let hi = if end < self.0.len() {
            self.0[end] as usize
        } else {
            raw_len
        };
        (lo, hi)
    }
}

// =============================================================================
// PAGES AND BOOKS
// =============================================================================

/// One page of a book, as the store keeps it.
///
/// `raw` is the imported text with full orthography; `normalized` and `map`
/// are derived from it at ingest (or rebuild) time and always reflect the
/// store's normalization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub book_id: String,
    pub page_num: u32,
    pub raw: String,
    pub normalized: String,
    pub map: PositionMap,
    /// Character offset (in `normalized`) where the footnote block starts,
    /// if the page has the Shamela underscore-separator line.
    pub footnote_start: Option<u32>,
    /// Token count of `normalized` - the document length for scoring.
    pub token_count: u32,
}

/// Book metadata, registered at ingest and joined into every search row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookMeta {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    /// Author's death date (Hijri year), the corpus's conventional sort key.
    #[serde(default)]
    pub death_date: Option<i32>,
    #[serde(default)]
    pub category_id: Option<u32>,
    #[serde(default)]
    pub category_name: Option<String>,
}

// =============================================================================
// POSTINGS
// =============================================================================

/// A single occurrence of a term on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    /// Page containing the occurrence.
    pub page_id: PageId,
    /// Token ordinal within the page - phrase adjacency is `pos + 1`.
    pub pos: u32,
    /// Character offset in the page's normalized text.
    pub offset: u32,
}

/// All occurrences of one term, sorted by `(page_id, pos)`.
#[derive(Debug, Clone, Default)]
pub struct PostingList {
    pub postings: Vec<Posting>,
    /// Number of distinct pages containing the term. Cached because IDF asks
    /// for it on every query.
    pub doc_freq: usize,
}

// =============================================================================
// QUERIES AND RESULTS
// =============================================================================

/// How strictly the query terms must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecisionMode {
    /// "Some words": a page matches if it contains at least one term.
    Any,
    /// "All words": a page matches only if it contains every term, anywhere.
    #[default]
    All,
    /// "Consecutive words": terms must occur adjacent and in order.
    Phrase,
}

/// Result-set restriction by book, author, or category.
///
/// An empty list means no restriction on that axis. Within one axis the ids
/// are OR'd; across axes (and with the text predicate) they are AND'd.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default)]
    pub book_ids: Vec<String>,
    #[serde(default)]
    pub author_ids: Vec<String>,
    #[serde(default)]
    pub category_ids: Vec<u32>,
}

impl SearchFilter {
    /// True when no axis restricts anything.
    pub fn is_unrestricted(&self) -> bool {
        self.book_ids.is_empty() && self.author_ids.is_empty() && self.category_ids.is_empty()
    }
}

/// One row of a search response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub page_id: u32,
    pub book_id: String,
    pub book_title: String,
    pub author: Option<String>,
    pub death_date: Option<i32>,
    pub category_name: Option<String>,
    pub page_num: u32,
    /// Plain text plus `<mark>…</mark>` around matches - no other markup.
    /// The renderer must still HTML-escape the surrounding text.
    pub snippet_html: String,
    /// Relevance score. Higher is more relevant; equal scores are ordered by
    /// `(book_id, page_num)` ascending.
    pub rank: f64,
}

/// Store-level counters, for `inspect` and for scoring.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreStats {
    pub books: usize,
    pub pages: usize,
    pub terms: usize,
    pub total_tokens: u64,
}

impl StoreStats {
    /// Average page length in tokens, for BM25 length normalization.
    pub fn avg_page_tokens(&self) -> f64 {
        if self.pages == 0 {
            0.0
        } else {
            self.total_tokens as f64 / self.pages as f64
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_span_clamps_to_raw_len() {
        // Normalized "ab" derived from raw "a-b-" with the dashes deleted.
        let map = PositionMap::new(vec![0, 2]);
        assert_eq!(map.raw_span(0, 1, 4), (0, 2));
        assert_eq!(map.raw_span(0, 2, 4), (0, 4));
        assert_eq!(map.raw_span(1, 2, 4), (2, 4));
    }

    #[test]
    fn filter_unrestricted() {
        assert!(SearchFilter::default().is_unrestricted());
        let f = SearchFilter {
            book_ids: vec!["x".into()],
            ..Default::default()
        };
        assert!(!f.is_unrestricted());
    }

    #[test]
    fn avg_page_tokens_handles_empty_store() {
        assert_eq!(StoreStats::default().avg_page_tokens(), 0.0);
        let stats = StoreStats {
            books: 1,
            pages: 4,
            terms: 10,
            total_tokens: 100,
        };
        assert!((stats.avg_page_tokens() - 25.0).abs() < f64::EPSILON);
    }
}
