// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Query construction: user input → an inert match expression.
//!
//! The builder normalizes the query with the same configuration the index
//! was built with (anything else silently breaks recall), applies the
//! two-character minimum, tokenizes, and shapes the terms according to the
//! precision mode:
//!
//! - `Any`  - "some words": OR over single-term matches
//! - `All`  - "all words": AND over single-term matches
//! - `Phrase` - "consecutive words": ordered token adjacency
//!
//! Filters ride along: ids within one axis are OR'd, the axes are AND'd with
//! each other and with the text predicate. The output is a plain value -
//! nothing happens until the executor evaluates it.
//!
//! A query that is too short or tokenizes to nothing builds an [`TextExpr::Empty`]
//! expression, which the executor answers with an empty result set. The only
//! error here is a malformed filter id.

use std::collections::HashSet;

use crate::error::QueryError;
use crate::normalize::{normalize_with, tokenize, NormalizeConfig};
use crate::types::{BookMeta, PrecisionMode, SearchFilter};

/// Minimum length of the *normalized* query, in characters.
///
/// Shorter queries match half the corpus and help nobody; they yield an
/// empty result, not an error.
pub const MIN_QUERY_CHARS: usize = 2;

/// Longest accepted filter id. Anything past this is not an id from this
/// system.
const MAX_FILTER_ID_LEN: usize = 256;

// =============================================================================
// EXPRESSION TYPES
// =============================================================================

/// The full-text predicate: a boolean tree over normalized terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextExpr {
    /// Matches nothing. Produced for short or term-less queries.
    Empty,
    /// A page matches if it contains the term.
    Term(String),
    /// Every branch must match the page.
    And(Vec<TextExpr>),
    /// At least one branch must match the page.
    Or(Vec<TextExpr>),
    /// Terms must occur consecutively, in order.
    Phrase(Vec<String>),
}

impl TextExpr {
    /// True if this expression can never match anything.
    pub fn is_empty(&self) -> bool {
        matches!(self, TextExpr::Empty)
    }
}

/// Validated, set-shaped filter, ready for membership checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledFilter {
    book_ids: HashSet<String>,
    author_ids: HashSet<String>,
    category_ids: HashSet<u32>,
}

impl CompiledFilter {
    /// Does this book pass every filter axis?
    ///
    /// An empty axis restricts nothing; a book without an author or category
    /// fails a restricted axis (it cannot prove membership).
    pub fn accepts(&self, meta: &BookMeta) -> bool {
        if !self.book_ids.is_empty() && !self.book_ids.contains(&meta.id) {
            return false;
        }
        if !self.author_ids.is_empty() {
            match &meta.author_id {
                Some(id) if self.author_ids.contains(id) => {}
                _ => return false,
            }
        }
        if !self.category_ids.is_empty() {
            match meta.category_id {
                Some(id) if self.category_ids.contains(&id) => {}
                _ => return false,
            }
        }
        true
    }

    /// True when no axis restricts anything.
    pub fn is_unrestricted(&self) -> bool {
        self.book_ids.is_empty() && self.author_ids.is_empty() && self.category_ids.is_empty()
    }

    /// Restricted-to book ids, if that axis is active.
    pub fn book_ids(&self) -> Option<&HashSet<String>> {
        if self.book_ids.is_empty() {
            None
        } else {
            Some(&self.book_ids)
        }
    }
}

/// Auxiliary query options, passed through as extra predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// When false, occurrences inside a page's footnote block are ignored.
    pub include_footnotes: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            include_footnotes: true,
        }
    }
}

/// The complete, inert match expression handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchExpression {
    pub text: TextExpr,
    pub filter: CompiledFilter,
    pub include_footnotes: bool,
}

// =============================================================================
// BUILDING
// =============================================================================

/// Build a match expression from user input.
///
/// `config` must be the store's normalization configuration. Pure: no side
/// effects, no index access. Errors only on malformed filter ids.
pub fn build_query(
    query: &str,
    mode: PrecisionMode,
    filter: &SearchFilter,
    options: &QueryOptions,
    config: &NormalizeConfig,
) -> Result<MatchExpression, QueryError> {
    let filter = compile_filter(filter)?;

    let normalized = normalize_with(query, config).text;
    let text = if normalized.trim().chars().count() < MIN_QUERY_CHARS {
        TextExpr::Empty
    } else {
        let terms: Vec<String> = tokenize(&normalized).into_iter().map(|t| t.term).collect();
        shape_terms(terms, mode)
    };

    Ok(MatchExpression {
        text,
        filter,
        include_footnotes: options.include_footnotes,
    })
}

fn shape_terms(terms: Vec<String>, mode: PrecisionMode) -> TextExpr {
    match terms.len() {
        0 => TextExpr::Empty,
        1 => {
            let mut terms = terms;
            TextExpr::Term(terms.remove(0))
        }
        _ => match mode {
            PrecisionMode::Any => TextExpr::Or(terms.into_iter().map(TextExpr::Term).collect()),
            PrecisionMode::All => TextExpr::And(terms.into_iter().map(TextExpr::Term).collect()),
            PrecisionMode::Phrase => TextExpr::Phrase(terms),
        },
    }
}

fn compile_filter(filter: &SearchFilter) -> Result<CompiledFilter, QueryError> {
    let mut compiled = CompiledFilter::default();
    for id in &filter.book_ids {
        validate_id("book", id)?;
        compiled.book_ids.insert(id.clone());
    }
    for id in &filter.author_ids {
        validate_id("author", id)?;
        compiled.author_ids.insert(id.clone());
    }
    compiled.category_ids.extend(filter.category_ids.iter().copied());
    Ok(compiled)
}

/// Filter ids come from UI state; a blank, overlong, or control-laden id is
/// a malformed request, not an empty result.
fn validate_id(kind: &'static str, id: &str) -> Result<(), QueryError> {
    let malformed = id.trim().is_empty()
        || id.len() > MAX_FILTER_ID_LEN
        || id.chars().any(char::is_control);
    if malformed {
        return Err(QueryError::InvalidFilterId {
            kind,
            id: id.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
