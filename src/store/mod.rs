// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The index store: durable pages plus the derived inverted index.
//!
//! One store instance owns everything under its root directory. Books are
//! persisted as one segment file each (see [`segment`]); the inverted index
//! is rebuilt from segments at open and maintained incrementally afterwards.
//! There is no global mutable handle anywhere - callers construct a store,
//! share it by reference, and the process entry point owns its lifetime.
//!
//! # Concurrency
//!
//! Single writer per book, many readers:
//!
//! - `ingest_book`/`remove_book` serialize on a per-book mutex, so two
//!   imports of the same book cannot interleave while different books
//!   proceed independently.
//! - All normalization and segment I/O happens *outside* the state lock;
//!   the new book is spliced in under one short write lock. A concurrent
//!   reader sees the fully-old or the fully-new book, never a mix.
//! - Queries only take read locks and never block each other.
//!
//! # Failure
//!
//! Ingest is all-or-nothing: the segment write is atomic (temp file +
//! rename), and the in-memory splice happens only after the write succeeds.
//! A failed ingest leaves the previously committed state untouched.

pub mod postings;
pub mod segment;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::StorageError;
use crate::normalize::{normalize_with, tokenize, NormalizeConfig, Token};
use crate::types::{BookMeta, Page, PageId, PostingList, StoreStats};

pub use postings::{MemoryIndex, TermIndex};
pub use segment::{read_segment, segment_file_name, write_segment, Segment};

/// Minimum run of underscores that marks the Shamela footnote separator.
const FOOTNOTE_RULE_MIN: usize = 8;

// =============================================================================
// STATE
// =============================================================================

struct BookRecord {
    meta: BookMeta,
    /// Page ids in page-number order.
    page_ids: Vec<PageId>,
}

#[derive(Default)]
struct StoreState {
    books: HashMap<String, BookRecord>,
    pages: HashMap<PageId, Arc<Page>>,
    index: MemoryIndex,
    next_page_id: u32,
}

impl StoreState {
    /// Drop a book and all its pages/postings. No-op for unknown ids.
    fn remove_book(&mut self, book_id: &str) {
        let Some(record) = self.books.remove(book_id) else {
            return;
        };
        let mut removed: HashSet<PageId> = HashSet::with_capacity(record.page_ids.len());
        let mut token_total = 0u64;
        for id in record.page_ids {
            if let Some(page) = self.pages.remove(&id) {
                token_total += u64::from(page.token_count);
            }
            removed.insert(id);
        }
        self.index.remove_pages(&removed, token_total);
    }

    /// Replace a book wholesale: old pages out, new pages in, fresh ids.
    fn replace_book(&mut self, meta: BookMeta, pages: Vec<(Page, Vec<Token>)>) {
        self.remove_book(&meta.id);

        let mut page_ids = Vec::with_capacity(pages.len());
        for (page, tokens) in pages {
            let id = PageId(self.next_page_id);
            self.next_page_id += 1;
            self.index.insert_page(id, &tokens);
            self.pages.insert(id, Arc::new(page));
            page_ids.push(id);
        }
        self.books.insert(meta.id.clone(), BookRecord { meta, page_ids });
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Durable, concurrently-readable index store.
pub struct IndexStore {
    books_dir: PathBuf,
    config: NormalizeConfig,
    state: RwLock<StoreState>,
    book_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IndexStore {
    /// Open (or create) a store rooted at `root`.
    ///
    /// Every segment under `root/books` is read and CRC-verified, and the
    /// inverted index is rebuilt from them. A segment written under a
    /// different normalization configuration is re-derived from its raw
    /// content and rewritten, keeping index and queries consistent.
    pub fn open(root: impl AsRef<Path>, config: NormalizeConfig) -> Result<Self, StorageError> {
        let books_dir = root.as_ref().join("books");
        fs::create_dir_all(&books_dir)?;

        let mut paths: Vec<PathBuf> = fs::read_dir(&books_dir)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "seg"))
            .collect();
        paths.sort();

        let mut state = StoreState::default();
        for path in paths {
            let mut seg = read_segment(&path)?;
            if seg.config != config {
                tracing::warn!(
                    book = %seg.meta.id,
                    "segment normalization flag differs from configuration, re-deriving"
                );
                let raw: Vec<(u32, String)> = seg
                    .pages
                    .iter()
                    .map(|p| (p.page_num, p.raw.clone()))
                    .collect();
                let derived = derive_pages(&seg.meta.id, &raw, &config);
                seg = Segment {
                    config,
                    meta: seg.meta,
                    pages: derived.iter().map(|(p, _)| p.clone()).collect(),
                };
                write_segment(&path, &seg)?;
                state.replace_book(seg.meta.clone(), derived);
                continue;
            }
            let derived = seg
                .pages
                .into_iter()
                .map(|p| {
                    let tokens = tokenize(&p.normalized);
                    (p, tokens)
                })
                .collect();
            state.replace_book(seg.meta, derived);
        }

        let store = IndexStore {
            books_dir,
            config,
            state: RwLock::new(state),
            book_locks: Mutex::new(HashMap::new()),
        };
        let stats = store.stats();
        tracing::info!(
            books = stats.books,
            pages = stats.pages,
            terms = stats.terms,
            "index store opened"
        );
        Ok(store)
    }

    /// The normalization configuration this store was opened with. Queries
    /// must be normalized with the same one.
    pub fn config(&self) -> NormalizeConfig {
        self.config
    }

    fn segment_path(&self, book_id: &str) -> PathBuf {
        self.books_dir.join(segment_file_name(book_id))
    }

    fn book_lock(&self, book_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.book_locks.lock();
        locks
            .entry(book_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // =========================================================================
    // INGESTION
    // =========================================================================

    /// Ingest (or re-ingest) a book: normalize every page, persist the
    /// segment, splice the postings in. Replaces any existing pages and
    /// postings for the book as one atomic unit.
    pub fn ingest_book(
        &self,
        meta: BookMeta,
        pages: &[(u32, String)],
    ) -> Result<(), StorageError> {
        let lock = self.book_lock(&meta.id);
        let _guard = lock.lock();

        let derived = derive_pages(&meta.id, pages, &self.config);
        let seg = Segment {
            config: self.config,
            meta: meta.clone(),
            pages: derived.iter().map(|(p, _)| p.clone()).collect(),
        };
        write_segment(&self.segment_path(&meta.id), &seg)?;

        let page_count = derived.len();
        self.state.write().replace_book(meta.clone(), derived);
        tracing::info!(book = %meta.id, pages = page_count, "book ingested");
        Ok(())
    }

    /// Delete a book's pages and postings. Removing an unknown book is a
    /// no-op, not an error.
    pub fn remove_book(&self, book_id: &str) -> Result<(), StorageError> {
        let lock = self.book_lock(book_id);
        let _guard = lock.lock();

        match fs::remove_file(self.segment_path(book_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.state.write().remove_book(book_id);
        tracing::info!(book = %book_id, "book removed");
        Ok(())
    }

    /// Re-derive everything from raw content alone: normalized text,
    /// position maps, postings, segments. Used after a normalization
    /// configuration change, or to recover derived state.
    pub fn rebuild(&self) -> Result<(), StorageError> {
        let book_ids: Vec<String> = self.state.read().books.keys().cloned().collect();
        for book_id in book_ids {
            let lock = self.book_lock(&book_id);
            let _guard = lock.lock();

            let Some((meta, raw)) = self.raw_pages(&book_id) else {
                continue;
            };
            let derived = derive_pages(&book_id, &raw, &self.config);
            let seg = Segment {
                config: self.config,
                meta: meta.clone(),
                pages: derived.iter().map(|(p, _)| p.clone()).collect(),
            };
            write_segment(&self.segment_path(&book_id), &seg)?;
            self.state.write().replace_book(meta, derived);
        }
        tracing::info!("index rebuilt from raw content");
        Ok(())
    }

    fn raw_pages(&self, book_id: &str) -> Option<(BookMeta, Vec<(u32, String)>)> {
        let state = self.state.read();
        let record = state.books.get(book_id)?;
        let raw = record
            .page_ids
            .iter()
            .filter_map(|id| state.pages.get(id))
            .map(|p| (p.page_num, p.raw.clone()))
            .collect();
        Some((record.meta.clone(), raw))
    }

    // =========================================================================
    // READ SURFACE
    // =========================================================================

    /// Postings for a normalized token. Reflects committed ingestions only.
    pub fn lookup(&self, term: &str) -> Option<PostingList> {
        self.state.read().index.lookup(term)
    }

    /// A committed page record.
    pub fn page(&self, id: PageId) -> Option<Arc<Page>> {
        self.state.read().pages.get(&id).cloned()
    }

    /// Metadata for a book.
    pub fn book_meta(&self, book_id: &str) -> Option<BookMeta> {
        self.state.read().books.get(book_id).map(|r| r.meta.clone())
    }

    /// Page record together with its book's metadata.
    pub fn resolve(&self, id: PageId) -> Option<(Arc<Page>, BookMeta)> {
        let state = self.state.read();
        let page = state.pages.get(&id)?.clone();
        let meta = state.books.get(&page.book_id)?.meta.clone();
        Some((page, meta))
    }

    /// All registered books, ordered by id.
    pub fn books(&self) -> Vec<BookMeta> {
        let state = self.state.read();
        let mut metas: Vec<BookMeta> = state.books.values().map(|r| r.meta.clone()).collect();
        metas.sort_by(|a, b| a.id.cmp(&b.id));
        metas
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        StoreStats {
            books: state.books.len(),
            pages: state.pages.len(),
            terms: state.index.term_count(),
            total_tokens: state.index.total_tokens(),
        }
    }
}

// =============================================================================
// CONSISTENT READ VIEWS
// =============================================================================

/// A consistent view of one committed store state.
///
/// Every call on one view observes the same generation: a book replaced
/// mid-query can never show up half-old, half-new, or half-gone. Obtained
/// through [`IndexStore::with_view`], which holds the read lock for the
/// view's lifetime.
pub struct StoreView<'a> {
    state: &'a StoreState,
}

impl StoreView<'_> {
    /// Postings for a normalized token.
    pub fn lookup(&self, term: &str) -> Option<PostingList> {
        self.state.index.lookup(term)
    }

    pub fn doc_freq(&self, term: &str) -> usize {
        self.state.index.doc_freq(term)
    }

    pub fn total_pages(&self) -> usize {
        self.state.index.total_pages()
    }

    pub fn avg_page_tokens(&self) -> f64 {
        self.state.index.avg_page_tokens()
    }

    /// Page record together with its book's metadata.
    pub fn resolve(&self, id: PageId) -> Option<(Arc<Page>, BookMeta)> {
        let page = self.state.pages.get(&id)?.clone();
        let meta = self.state.books.get(&page.book_id)?.meta.clone();
        Some((page, meta))
    }
}

impl IndexStore {
    /// Run `f` against one consistent committed state.
    ///
    /// Writers block while `f` runs, so keep it free of I/O; page records
    /// come out as `Arc` snapshots that stay valid (and immutable) after the
    /// view is gone, which is what lets snippet generation run lock-free.
    pub fn with_view<R>(&self, f: impl FnOnce(&StoreView<'_>) -> R) -> R {
        let state = self.state.read();
        f(&StoreView { state: &*state })
    }
}

// =============================================================================
// PAGE DERIVATION
// =============================================================================

/// Build page records (and their tokens) from raw content.
///
/// Duplicate page numbers keep the last occurrence; output is in page-number
/// order.
fn derive_pages(
    book_id: &str,
    pages: &[(u32, String)],
    config: &NormalizeConfig,
) -> Vec<(Page, Vec<Token>)> {
    let mut by_num: BTreeMap<u32, &String> = BTreeMap::new();
    for (num, raw) in pages {
        by_num.insert(*num, raw);
    }

    by_num
        .into_iter()
        .map(|(page_num, raw)| {
            let n = normalize_with(raw, config);
            let tokens = tokenize(&n.text);
            let page = Page {
                book_id: book_id.to_string(),
                page_num,
                footnote_start: footnote_start(&n.text),
                token_count: tokens.len() as u32,
                raw: raw.clone(),
                normalized: n.text,
                map: n.map,
            };
            (page, tokens)
        })
        .collect()
}

/// Character offset where the footnote block begins, if the page carries the
/// Shamela convention of a separator line made of underscores.
fn footnote_start(normalized: &str) -> Option<u32> {
    let mut char_idx: u32 = 0;
    let mut line_start: u32 = 0;
    let mut underscores: usize = 0;
    let mut other = false;

    for c in normalized.chars() {
        if c == '\n' {
            if !other && underscores >= FOOTNOTE_RULE_MIN {
                return Some(line_start);
            }
            line_start = char_idx + 1;
            underscores = 0;
            other = false;
        } else if c == '_' {
            underscores += 1;
        } else if !c.is_whitespace() {
            other = true;
        }
        char_idx += 1;
    }
    if !other && underscores >= FOOTNOTE_RULE_MIN {
        Some(line_start)
    } else {
        None
    }
}

// =============================================================================
// TESTS
// =============================================================================
