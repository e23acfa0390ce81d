// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Match-expression evaluation and ranking.
//!
//! The executor resolves each term to its postings, combines them per the
//! expression shape (union, intersection, ordered adjacency), applies the
//! filter predicates through book metadata, scores the survivors, and
//! returns a deterministically ordered, truncated list - unsnipped. The
//! whole evaluation runs against one consistent store view, so a book being
//! replaced concurrently is seen fully-old or fully-new, never torn; the
//! returned pages are `Arc` snapshots, so snippet extraction afterwards
//! holds no store locks at all.
//!
//! Ranking is BM25 over the matched terms: higher score = more relevant,
//! ties broken by `(book_id, page_num)` ascending. The formula sits behind
//! [`Scorer`] so the weighting can be swapped without touching query
//! construction or snippets.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StorageError;
use crate::query::{MatchExpression, TextExpr};
use crate::store::{IndexStore, StoreView};
use crate::types::{BookMeta, Page, PageId};

/// Default result-set size.
pub const DEFAULT_LIMIT: usize = 50;

// =============================================================================
// SCORING
// =============================================================================

/// Pluggable relevance weighting. Higher = more relevant.
pub trait Scorer: Send + Sync {
    /// Score one term's contribution to one page.
    fn term_score(
        &self,
        tf: f64,
        doc_freq: usize,
        total_pages: usize,
        page_tokens: f64,
        avg_tokens: f64,
    ) -> f64;
}

/// BM25 term weighting with standard parameters.
#[derive(Debug, Clone)]
pub struct Bm25 {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization.
    pub b: f64,
}

impl Default for Bm25 {
    fn default() -> Self {
        Bm25 { k1: 1.2, b: 0.75 }
    }
}

impl Scorer for Bm25 {
    fn term_score(
        &self,
        tf: f64,
        doc_freq: usize,
        total_pages: usize,
        page_tokens: f64,
        avg_tokens: f64,
    ) -> f64 {
        if tf == 0.0 {
            return 0.0;
        }
        // Smoothed IDF: ln((N - df + 0.5) / (df + 0.5) + 1)
        let n = total_pages as f64;
        let df = doc_freq as f64;
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

        let avg = avg_tokens.max(1.0);
        let tf_component =
            (tf * (self.k1 + 1.0)) / (tf + self.k1 * (1.0 - self.b + self.b * page_tokens / avg));
        idf * tf_component
    }
}

// =============================================================================
// RESULT SHAPE
// =============================================================================

/// A matched span in normalized character space: `[offset, offset + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    pub offset: u32,
    pub len: u32,
}

/// One ranked page, before snippet extraction.
///
/// Carries the page record and book metadata as snapshots taken under the
/// evaluation's view, so downstream stages never have to go back to the
/// store.
#[derive(Debug, Clone)]
pub struct RankedPage {
    pub page_id: PageId,
    pub page: Arc<Page>,
    pub meta: BookMeta,
    /// Relevance score; higher is better.
    pub score: f64,
    /// Every matched occurrence, in normalized character offsets, sorted.
    pub spans: Vec<MatchSpan>,
}

/// Per-page accumulation during evaluation.
#[derive(Debug, Clone, Default)]
struct PageHits {
    spans: Vec<MatchSpan>,
    /// Term → frequency on this page, for scoring.
    term_freqs: HashMap<String, u32>,
}

impl PageHits {
    fn merge(&mut self, other: PageHits) {
        self.spans.extend(other.spans);
        for (term, tf) in other.term_freqs {
            *self.term_freqs.entry(term).or_insert(0) += tf;
        }
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

/// Caches page/meta resolution across the terms of one query, so the filter
/// predicates resolve each page once rather than once per occurrence.
struct EvalCtx<'a, 'v> {
    view: &'a StoreView<'v>,
    expr: &'a MatchExpression,
    resolved: HashMap<PageId, Option<(Arc<Page>, BookMeta)>>,
}

impl<'a, 'v> EvalCtx<'a, 'v> {
    fn new(view: &'a StoreView<'v>, expr: &'a MatchExpression) -> Self {
        EvalCtx {
            view,
            expr,
            resolved: HashMap::new(),
        }
    }

    fn resolve(&mut self, id: PageId) -> Option<&(Arc<Page>, BookMeta)> {
        let view = self.view;
        self.resolved
            .entry(id)
            .or_insert_with(|| view.resolve(id))
            .as_ref()
    }

    /// Does this page pass the filter axes (and exist at all)?
    fn page_passes(&mut self, id: PageId) -> bool {
        let expr = self.expr;
        match self.resolve(id) {
            Some((_, meta)) => expr.filter.accepts(meta),
            None => false,
        }
    }

    /// Is this occurrence visible under the footnote predicate?
    fn occurrence_visible(&mut self, id: PageId, offset: u32) -> bool {
        if self.expr.include_footnotes {
            return true;
        }
        match self.resolve(id) {
            Some((page, _)) => page.footnote_start.map_or(true, |fs| offset < fs),
            None => false,
        }
    }

    /// All visible occurrences of one term, grouped by page, filtered.
    fn term_occurrences(&mut self, term: &str) -> HashMap<PageId, PageHits> {
        let Some(list) = self.view.lookup(term) else {
            return HashMap::new();
        };
        let len = term.chars().count() as u32;

        let mut pages: HashMap<PageId, PageHits> = HashMap::new();
        for posting in &list.postings {
            if !self.page_passes(posting.page_id) {
                continue;
            }
            if !self.occurrence_visible(posting.page_id, posting.offset) {
                continue;
            }
            let hits = pages.entry(posting.page_id).or_default();
            hits.spans.push(MatchSpan {
                offset: posting.offset,
                len,
            });
            *hits.term_freqs.entry(term.to_string()).or_insert(0) += 1;
        }
        pages
    }

    /// Ordered positions of one term on one page (already filtered).
    fn term_positions(&mut self, term: &str) -> HashMap<PageId, Vec<(u32, u32)>> {
        let Some(list) = self.view.lookup(term) else {
            return HashMap::new();
        };
        let mut pages: HashMap<PageId, Vec<(u32, u32)>> = HashMap::new();
        for posting in &list.postings {
            if !self.page_passes(posting.page_id) {
                continue;
            }
            if !self.occurrence_visible(posting.page_id, posting.offset) {
                continue;
            }
            pages
                .entry(posting.page_id)
                .or_default()
                .push((posting.pos, posting.offset));
        }
        pages
    }

    fn eval(&mut self, expr: &TextExpr) -> HashMap<PageId, PageHits> {
        match expr {
            TextExpr::Empty => HashMap::new(),
            TextExpr::Term(term) => self.term_occurrences(term),
            TextExpr::Or(branches) => {
                let mut union: HashMap<PageId, PageHits> = HashMap::new();
                for branch in branches {
                    for (id, hits) in self.eval(branch) {
                        union.entry(id).or_default().merge(hits);
                    }
                }
                union
            }
            TextExpr::And(branches) => {
                let mut iter = branches.iter();
                let Some(first) = iter.next() else {
                    return HashMap::new();
                };
                let mut acc = self.eval(first);
                for branch in iter {
                    let next = self.eval(branch);
                    acc.retain(|id, _| next.contains_key(id));
                    if acc.is_empty() {
                        return acc;
                    }
                    for (id, hits) in next {
                        if let Some(existing) = acc.get_mut(&id) {
                            existing.merge(hits);
                        }
                    }
                }
                acc
            }
            TextExpr::Phrase(terms) => self.eval_phrase(terms),
        }
    }

    /// Ordered adjacency: terms at consecutive token positions, in order.
    fn eval_phrase(&mut self, terms: &[String]) -> HashMap<PageId, PageHits> {
        let Some(first) = terms.first() else {
            return HashMap::new();
        };
        let first_positions = self.term_positions(first);
        let rest: Vec<HashMap<PageId, Vec<(u32, u32)>>> = terms[1..]
            .iter()
            .map(|t| self.term_positions(t))
            .collect();

        let term_lens: Vec<u32> = terms.iter().map(|t| t.chars().count() as u32).collect();
        let mut result: HashMap<PageId, PageHits> = HashMap::new();

        'pages: for (page_id, starts) in first_positions {
            // Every term must be on the page at all.
            for positions in &rest {
                if !positions.contains_key(&page_id) {
                    continue 'pages;
                }
            }

            let mut hits = PageHits::default();
            for &(start_pos, start_offset) in &starts {
                let mut end_offset = start_offset + term_lens[0];
                let mut ok = true;
                for (i, positions) in rest.iter().enumerate() {
                    let want = start_pos + 1 + i as u32;
                    match positions[&page_id].iter().find(|(p, _)| *p == want) {
                        Some(&(_, offset)) => end_offset = offset + term_lens[i + 1],
                        None => {
                            ok = false;
                            break;
                        }
                    }
                }
                if ok {
                    hits.spans.push(MatchSpan {
                        offset: start_offset,
                        len: end_offset - start_offset,
                    });
                    // One run counts once toward each constituent term.
                    for term in terms {
                        *hits.term_freqs.entry(term.clone()).or_insert(0) += 1;
                    }
                }
            }
            if !hits.spans.is_empty() {
                result.insert(page_id, hits);
            }
        }
        result
    }
}

// =============================================================================
// EXECUTION
// =============================================================================

/// Evaluate a match expression with the default BM25 weighting.
pub fn execute(
    store: &IndexStore,
    expr: &MatchExpression,
    limit: usize,
) -> Result<Vec<RankedPage>, StorageError> {
    execute_with_scorer(store, expr, limit, &Bm25::default())
}

/// Evaluate a match expression and rank with the given scorer.
///
/// An empty candidate set is a normal `Ok(vec![])`. Store failures, should
/// the index backend produce them, propagate unchanged - there is no retry
/// here.
pub fn execute_with_scorer(
    store: &IndexStore,
    expr: &MatchExpression,
    limit: usize,
    scorer: &dyn Scorer,
) -> Result<Vec<RankedPage>, StorageError> {
    if expr.text.is_empty() {
        return Ok(Vec::new());
    }

    let ranked = store.with_view(|view| {
        let mut ctx = EvalCtx::new(view, expr);
        let candidates = ctx.eval(&expr.text);
        if candidates.is_empty() {
            return Vec::new();
        }

        let total_pages = view.total_pages();
        let avg_tokens = view.avg_page_tokens();

        let mut ranked: Vec<RankedPage> = Vec::with_capacity(candidates.len());
        for (page_id, hits) in candidates {
            let Some((page, meta)) = ctx.resolve(page_id).cloned() else {
                continue;
            };
            let page_tokens = f64::from(page.token_count);
            // Sum in term order: float addition isn't associative, and map
            // iteration order must not leak into the ranking.
            let mut term_freqs: Vec<(&String, &u32)> = hits.term_freqs.iter().collect();
            term_freqs.sort_by(|a, b| a.0.cmp(b.0));
            let mut score = 0.0;
            for (term, tf) in term_freqs {
                score += scorer.term_score(
                    f64::from(*tf),
                    view.doc_freq(term),
                    total_pages,
                    page_tokens,
                    avg_tokens,
                );
            }
            let mut spans = hits.spans;
            spans.sort_by_key(|s| (s.offset, s.len));
            spans.dedup();
            ranked.push(RankedPage {
                page_id,
                page,
                meta,
                score,
                spans,
            });
        }

        // Deterministic order: score descending, then (book_id, page_num)
        // ascending.
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.page.book_id.cmp(&b.page.book_id))
                .then_with(|| a.page.page_num.cmp(&b.page.page_num))
        });
        ranked.truncate(limit);
        ranked
    });

    Ok(ranked)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizeConfig;
    use crate::query::{build_query, QueryOptions};
    use crate::types::{BookMeta, PrecisionMode, SearchFilter};

    fn quran_store(dir: &std::path::Path) -> IndexStore {
        let store = IndexStore::open(dir, NormalizeConfig::default()).unwrap();
        store
            .ingest_book(
                BookMeta {
                    id: "quran".into(),
                    title: "القرآن الكريم".into(),
                    ..Default::default()
                },
                &[
                    (1, "بسم الله الرحمن الرحيم".into()),
                    (2, "الحمد لله رب العالمين".into()),
                ],
            )
            .unwrap();
        store
    }

    fn run(
        store: &IndexStore,
        query: &str,
        mode: PrecisionMode,
        filter: &SearchFilter,
    ) -> Vec<RankedPage> {
        let expr = build_query(
            query,
            mode,
            filter,
            &QueryOptions::default(),
            &store.config(),
        )
        .unwrap();
        execute(store, &expr, DEFAULT_LIMIT).unwrap()
    }

    fn page_nums(ranked: &[RankedPage]) -> Vec<u32> {
        ranked.iter().map(|r| r.page.page_num).collect()
    }

    #[test]
    fn any_matches_single_page() {
        let dir = tempfile::tempdir().unwrap();
        let store = quran_store(dir.path());
        let hits = run(&store, "الله", PrecisionMode::Any, &SearchFilter::default());
        assert_eq!(page_nums(&hits), vec![1]);
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[0].meta.title, "القرآن الكريم");
    }

    #[test]
    fn all_requires_every_term_on_one_page() {
        let dir = tempfile::tempdir().unwrap();
        let store = quran_store(dir.path());
        let hits = run(
            &store,
            "الحمد الرحمن",
            PrecisionMode::All,
            &SearchFilter::default(),
        );
        assert!(hits.is_empty());

        // Same terms, ANY semantics: both pages match.
        let hits = run(
            &store,
            "الحمد الرحمن",
            PrecisionMode::Any,
            &SearchFilter::default(),
        );
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn phrase_requires_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = quran_store(dir.path());

        let hits = run(
            &store,
            "الرحمن الرحيم",
            PrecisionMode::Phrase,
            &SearchFilter::default(),
        );
        assert_eq!(page_nums(&hits), vec![1]);
        // The phrase span covers both words.
        assert_eq!(hits[0].spans.len(), 1);

        let hits = run(
            &store,
            "الرحيم الرحمن",
            PrecisionMode::Phrase,
            &SearchFilter::default(),
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn book_filter_excludes_everything_else() {
        let dir = tempfile::tempdir().unwrap();
        let store = quran_store(dir.path());
        let filter = SearchFilter {
            book_ids: vec!["other-book".into()],
            ..Default::default()
        };
        let hits = run(&store, "الله", PrecisionMode::Any, &filter);
        assert!(hits.is_empty());
    }

    #[test]
    fn author_and_category_filters_go_through_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path(), NormalizeConfig::default()).unwrap();
        store
            .ingest_book(
                BookMeta {
                    id: "bukhari".into(),
                    title: "صحيح البخاري".into(),
                    author_id: Some("bukhari".into()),
                    author_name: Some("الإمام البخاري".into()),
                    death_date: Some(256),
                    category_id: Some(1),
                    category_name: Some("كتب السنة".into()),
                },
                &[(1, "انما الاعمال بالنيات".into())],
            )
            .unwrap();

        let by_author = SearchFilter {
            author_ids: vec!["bukhari".into()],
            ..Default::default()
        };
        assert_eq!(run(&store, "الاعمال", PrecisionMode::All, &by_author).len(), 1);

        let wrong_author = SearchFilter {
            author_ids: vec!["muslim".into()],
            ..Default::default()
        };
        assert!(run(&store, "الاعمال", PrecisionMode::All, &wrong_author).is_empty());

        let by_category = SearchFilter {
            category_ids: vec![1],
            ..Default::default()
        };
        assert_eq!(run(&store, "الاعمال", PrecisionMode::All, &by_category).len(), 1);
    }

    #[test]
    fn short_query_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = quran_store(dir.path());
        let hits = run(&store, "ا", PrecisionMode::Any, &SearchFilter::default());
        assert!(hits.is_empty());
    }

    #[test]
    fn limit_one_is_deterministic_under_ties() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path(), NormalizeConfig::default()).unwrap();
        // Two pages with identical content: identical scores.
        store
            .ingest_book(
                BookMeta {
                    id: "a-book".into(),
                    title: "أ".into(),
                    ..Default::default()
                },
                &[(1, "نص مكرر".into())],
            )
            .unwrap();
        store
            .ingest_book(
                BookMeta {
                    id: "b-book".into(),
                    title: "ب".into(),
                    ..Default::default()
                },
                &[(1, "نص مكرر".into())],
            )
            .unwrap();

        let expr = build_query(
            "مكرر نص",
            PrecisionMode::All,
            &SearchFilter::default(),
            &QueryOptions::default(),
            &store.config(),
        )
        .unwrap();

        let first = execute(&store, &expr, 1).unwrap();
        assert_eq!(first.len(), 1);
        // Tie-break: book id ascending, so "a-book" wins, every time.
        assert_eq!(first[0].page.book_id, "a-book");
        for _ in 0..5 {
            let again = execute(&store, &expr, 1).unwrap();
            assert_eq!(again[0].page_id, first[0].page_id);
        }
    }

    #[test]
    fn rarer_terms_rank_their_pages_higher() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path(), NormalizeConfig::default()).unwrap();
        store
            .ingest_book(
                BookMeta {
                    id: "corpus".into(),
                    title: "مجموع".into(),
                    ..Default::default()
                },
                &[
                    (1, "شائع نادر".into()),
                    (2, "شائع".into()),
                    (3, "شائع".into()),
                    (4, "شائع".into()),
                ],
            )
            .unwrap();

        let hits = run(
            &store,
            "شائع نادر",
            PrecisionMode::Any,
            &SearchFilter::default(),
        );
        // Page 1 carries the rare term: it must come first.
        assert_eq!(page_nums(&hits)[0], 1);
    }

    #[test]
    fn footnote_occurrences_can_be_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path(), NormalizeConfig::default()).unwrap();
        store
            .ingest_book(
                BookMeta {
                    id: "matn".into(),
                    title: "متن".into(),
                    ..Default::default()
                },
                &[(1, "المتن الاصلي\n__________\nتعليق في الحاشية".into())],
            )
            .unwrap();

        let with = build_query(
            "الحاشية",
            PrecisionMode::All,
            &SearchFilter::default(),
            &QueryOptions {
                include_footnotes: true,
            },
            &store.config(),
        )
        .unwrap();
        assert_eq!(execute(&store, &with, DEFAULT_LIMIT).unwrap().len(), 1);

        let without = build_query(
            "الحاشية",
            PrecisionMode::All,
            &SearchFilter::default(),
            &QueryOptions {
                include_footnotes: false,
            },
            &store.config(),
        )
        .unwrap();
        assert!(execute(&store, &without, DEFAULT_LIMIT).unwrap().is_empty());

        // Body text stays searchable either way.
        let body = build_query(
            "المتن",
            PrecisionMode::All,
            &SearchFilter::default(),
            &QueryOptions {
                include_footnotes: false,
            },
            &store.config(),
        )
        .unwrap();
        assert_eq!(execute(&store, &body, DEFAULT_LIMIT).unwrap().len(), 1);
    }
}
