// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The search facade: query in, ranked highlighted rows out.
//!
//! `SearchEngine` wires the pipeline - build the match expression, execute
//! it, join book metadata, extract snippets - and owns the one piece of
//! state that belongs to search itself rather than to the corpus: the recent
//! query history. Everything else delegates to the store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{SearchError, StorageError};
use crate::executor::{execute, DEFAULT_LIMIT};
use crate::normalize::NormalizeConfig;
use crate::query::{build_query, QueryOptions};
use crate::snippet::{snippet, DEFAULT_WINDOW};
use crate::store::IndexStore;
use crate::types::{BookMeta, PrecisionMode, SearchFilter, SearchResult, StoreStats};

/// How many history entries survive.
const HISTORY_CAP: usize = 50;

/// Everything a search call can be told.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub precision: PrecisionMode,
    pub filter: SearchFilter,
    /// Maximum rows returned.
    pub limit: usize,
    /// When false, matches inside footnote blocks are ignored.
    pub include_footnotes: bool,
    /// Snippet context, in normalized characters.
    pub window: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            precision: PrecisionMode::default(),
            filter: SearchFilter::default(),
            limit: DEFAULT_LIMIT,
            include_footnotes: true,
            window: DEFAULT_WINDOW,
        }
    }
}

/// One remembered search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: String,
    pub hits: usize,
}

/// The top-level search interface.
pub struct SearchEngine {
    store: Arc<IndexStore>,
    history: Mutex<Vec<HistoryEntry>>,
    history_path: PathBuf,
}

impl SearchEngine {
    /// Open the engine (and its store) rooted at `root`.
    pub fn open(root: impl AsRef<Path>, config: NormalizeConfig) -> Result<Self, StorageError> {
        let root = root.as_ref();
        let store = Arc::new(IndexStore::open(root, config)?);
        let history_path = root.join("history.json");
        let history = load_history(&history_path);
        Ok(SearchEngine {
            store,
            history: Mutex::new(history),
            history_path,
        })
    }

    /// The underlying store, for callers that need record access.
    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Full-text search across the indexed corpus.
    ///
    /// Empty result sets are `Ok(vec![])` - short queries, non-matching
    /// filters, and zero-hit searches are all successes. Errors mean the
    /// request was malformed ([`SearchError::Query`]) or storage failed
    /// ([`SearchError::Storage`]).
    pub fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let expr = build_query(
            query,
            opts.precision,
            &opts.filter,
            &QueryOptions {
                include_footnotes: opts.include_footnotes,
            },
            &self.store.config(),
        )?;

        let ranked = execute(&self.store, &expr, opts.limit)?;

        let mut rows = Vec::with_capacity(ranked.len());
        for hit in ranked {
            // Pages arrive as already-committed snapshots; no store locks
            // are held while snippets are cut.
            let snippet_html = snippet(&hit.page, &hit.spans, opts.window);
            rows.push(SearchResult {
                page_id: hit.page_id.get(),
                book_id: hit.page.book_id.clone(),
                book_title: hit.meta.title,
                author: hit.meta.author_name,
                death_date: hit.meta.death_date,
                category_name: hit.meta.category_name,
                page_num: hit.page.page_num,
                snippet_html,
                rank: hit.score,
            });
        }

        if !query.trim().is_empty() {
            self.record_search(query.trim(), rows.len());
        }
        tracing::debug!(query, hits = rows.len(), "search executed");
        Ok(rows)
    }

    // =========================================================================
    // CORPUS MANAGEMENT
    // =========================================================================

    /// Ingest or replace a book.
    pub fn ingest_book(
        &self,
        meta: BookMeta,
        pages: &[(u32, String)],
    ) -> Result<(), StorageError> {
        self.store.ingest_book(meta, pages)
    }

    /// Remove a book.
    pub fn remove_book(&self, book_id: &str) -> Result<(), StorageError> {
        self.store.remove_book(book_id)
    }

    /// Re-derive all normalized text and postings from raw content.
    pub fn rebuild(&self) -> Result<(), StorageError> {
        self.store.rebuild()
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    // =========================================================================
    // HISTORY
    // =========================================================================

    /// Most recent distinct queries, newest first.
    pub fn recent_searches(&self, limit: usize) -> Vec<HistoryEntry> {
        let history = self.history.lock();
        let mut seen = std::collections::HashSet::new();
        history
            .iter()
            .filter(|e| seen.insert(e.query.clone()))
            .take(limit)
            .cloned()
            .collect()
    }

    fn record_search(&self, query: &str, hits: usize) {
        let mut history = self.history.lock();
        history.insert(
            0,
            HistoryEntry {
                query: query.to_string(),
                hits,
            },
        );
        history.truncate(HISTORY_CAP);

        // History is a convenience, not corpus state: persistence failures
        // are logged and swallowed.
        match serde_json::to_vec_pretty(&*history) {
            Ok(bytes) => {
                if let Err(e) = fs::write(&self.history_path, bytes) {
                    tracing::warn!(error = %e, "failed to persist search history");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode search history"),
        }
    }
}

fn load_history(path: &Path) -> Vec<HistoryEntry> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discarding unreadable search history");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;

    fn seeded_engine(dir: &Path) -> SearchEngine {
        let engine = SearchEngine::open(dir, NormalizeConfig::default()).unwrap();
        engine
            .ingest_book(
                BookMeta {
                    id: "quran".into(),
                    title: "القرآن الكريم".into(),
                    ..Default::default()
                },
                &[
                    (1, "بِسْمِ اللَّهِ الرَّحْمَنِ الرَّحِيمِ".into()),
                    (2, "الْحَمْدُ لِلَّهِ رَبِّ الْعَالَمِينَ".into()),
                ],
            )
            .unwrap();
        engine
    }

    #[test]
    fn search_returns_joined_highlighted_rows() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded_engine(dir.path());

        // "الله" is a token on page 1 only; page 2 has the distinct token
        // "لله".
        let rows = engine.search("الله", &SearchOptions::default()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.book_id, "quran");
        assert_eq!(row.book_title, "القرآن الكريم");
        assert_eq!(row.page_num, 1);
        assert!(row.rank > 0.0);
        // The snippet carries the vocalized original.
        assert!(row.snippet_html.contains("<mark>اللَّهِ</mark>"));
    }

    #[test]
    fn empty_results_are_ok_not_err() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded_engine(dir.path());

        assert!(engine
            .search("لايوجد", &SearchOptions::default())
            .unwrap()
            .is_empty());
        assert!(engine.search("ا", &SearchOptions::default()).unwrap().is_empty());

        let opts = SearchOptions {
            filter: SearchFilter {
                book_ids: vec!["other-book".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(engine.search("الله", &opts).unwrap().is_empty());
    }

    #[test]
    fn malformed_filter_is_a_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded_engine(dir.path());

        let opts = SearchOptions {
            filter: SearchFilter {
                book_ids: vec!["".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        match engine.search("الله", &opts) {
            Err(SearchError::Query(QueryError::InvalidFilterId { kind: "book", .. })) => {}
            other => panic!("expected InvalidFilterId, got {other:?}"),
        }
    }

    #[test]
    fn history_dedups_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded_engine(dir.path());

        engine.search("الله", &SearchOptions::default()).unwrap();
        engine.search("الحمد", &SearchOptions::default()).unwrap();
        engine.search("الله", &SearchOptions::default()).unwrap();

        let recent = engine.recent_searches(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].query, "الله");
        assert_eq!(recent[1].query, "الحمد");
    }

    #[test]
    fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = seeded_engine(dir.path());
            engine.search("العالمين", &SearchOptions::default()).unwrap();
        }
        let engine = SearchEngine::open(dir.path(), NormalizeConfig::default()).unwrap();
        let recent = engine.recent_searches(10);
        assert_eq!(recent[0].query, "العالمين");
        assert_eq!(recent[0].hits, 1);
    }

    #[test]
    fn phrase_mode_flows_through() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded_engine(dir.path());

        let opts = SearchOptions {
            precision: PrecisionMode::Phrase,
            ..Default::default()
        };
        let rows = engine.search("الرحمن الرحيم", &opts).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].page_num, 1);

        let rows = engine.search("الرحيم الرحمن", &opts).unwrap();
        assert!(rows.is_empty());
    }
}
