// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Arabic-aware full-text search with diacritic-preserving snippets.
//!
//! Classical Arabic texts are written with vocalization; nobody types their
//! searches that way. This crate indexes diacritic-stripped text, matches
//! against it, and then shows you the *original* orthography in the result
//! snippets - the bridge between the two being a per-page position map
//! recorded at normalization time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ normalize.rs │────▶│   store/     │◀────│  query.rs    │
//! │ (normalize,  │     │ (IndexStore, │     │ (build_query │
//! │  tokenize)   │     │  segments)   │     │  → MatchExpr)│
//! └──────────────┘     └──────┬───────┘     └──────┬───────┘
//!                             │                    │
//!                             ▼                    ▼
//!                      ┌──────────────┐     ┌──────────────┐
//!                      │ executor.rs  │────▶│  snippet.rs  │
//!                      │ (evaluate,   │     │ (position-map│
//!                      │  BM25 rank)  │     │  highlights) │
//!                      └──────────────┘     └──────────────┘
//! ```
//!
//! Ingestion flows left to right: pages are normalized, persisted as
//! per-book segments, and their postings spliced into the in-memory
//! inverted index. Queries flow top to bottom: the same normalizer shapes
//! the query, the executor evaluates it against the postings, and the
//! snippet generator maps the matches back onto the raw text.
//!
//! [`SearchEngine`] wires it all together; most callers only need it.
//!
//! # Usage
//!
//! ```no_run
//! use bahith::{BookMeta, NormalizeConfig, SearchEngine, SearchOptions};
//!
//! let engine = SearchEngine::open("bahith-data", NormalizeConfig::default())?;
//! engine.ingest_book(
//!     BookMeta { id: "quran".into(), title: "القرآن الكريم".into(), ..Default::default() },
//!     &[(1, "بسم الله الرحمن الرحيم".into())],
//! )?;
//!
//! let results = engine.search("الله", &SearchOptions::default())?;
//! # Ok::<(), bahith::SearchError>(())
//! ```
//!
//! # Guarantees
//!
//! - Normalization is total, deterministic, idempotent, and never expands
//!   the text; the position map is strictly increasing and complete.
//! - Book replacement is atomic: a concurrent reader sees the old book or
//!   the new one, never a mix, and a failed ingest changes nothing.
//! - Result order is deterministic: score descending, then
//!   `(book_id, page_num)` ascending.
//! - Empty result sets are successes; errors mean malformed filters or
//!   storage faults.

// Module declarations
mod engine;
mod error;
mod executor;
mod normalize;
mod query;
mod snippet;
pub mod store;
mod types;

// Re-exports for public API
pub use engine::{HistoryEntry, SearchEngine, SearchOptions};
pub use error::{QueryError, SearchError, StorageError};
pub use executor::{execute, execute_with_scorer, Bm25, MatchSpan, RankedPage, Scorer, DEFAULT_LIMIT};
pub use normalize::{normalize, normalize_with, tokenize, Normalized, NormalizeConfig, Token};
pub use query::{build_query, CompiledFilter, MatchExpression, QueryOptions, TextExpr, MIN_QUERY_CHARS};
pub use snippet::{snippet, DEFAULT_WINDOW, HIGHLIGHT_CLOSE, HIGHLIGHT_OPEN};
pub use store::{IndexStore, StoreView, TermIndex};
pub use types::{
    BookMeta, Page, PageId, PositionMap, Posting, PostingList, PrecisionMode, SearchFilter,
    SearchResult, StoreStats,
};
