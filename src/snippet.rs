// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Highlight-snippet extraction.
//!
//! Matching happened on diacritic-stripped text, but nobody wants to *read*
//! diacritic-stripped text. Every matched span arrives in normalized
//! character space and leaves in raw byte space, via the page's position
//! map - so the excerpt shows the original orthography, vowel marks and
//! all, with the matched substrings wrapped in a single fixed marker pair.
//!
//! The output is plain text plus `<mark>…</mark>` - no other markup. A
//! renderer can trust the markers and must HTML-escape the rest.

use crate::executor::MatchSpan;
use crate::types::Page;

/// Default snippet window, in normalized characters.
pub const DEFAULT_WINDOW: u32 = 64;

/// The one marker pair a snippet may contain.
pub const HIGHLIGHT_OPEN: &str = "<mark>";
pub const HIGHLIGHT_CLOSE: &str = "</mark>";

const ELLIPSIS: &str = "...";

/// Extract a highlighted excerpt of `page.raw` around the matches.
///
/// `spans` are normalized character spans, sorted by offset (the executor
/// guarantees this). The window is `window` normalized characters of context
/// around the first match, translated to the corresponding raw span;
/// overlapping highlights inside the window are merged into one marked
/// region. With no spans, the page's opening text is returned unhighlighted
/// - the caller chose to show the page anyway.
pub fn snippet(page: &Page, spans: &[MatchSpan], window: u32) -> String {
    let norm_len = page.map.len() as u32;
    let raw_len = page.raw.len();
    if norm_len == 0 {
        return String::new();
    }

    let Some(first) = spans.first() else {
        return leading_text(page, window);
    };

    // Window in normalized character space, centered on the first match.
    let half = window / 2;
    let win_start = first.offset.saturating_sub(half);
    let win_end = (first.offset + first.len + half).min(norm_len);

    // Clip spans to the window and merge overlaps/adjacency.
    let mut clipped: Vec<(u32, u32)> = Vec::new();
    for span in spans {
        let start = span.offset.max(win_start);
        let end = (span.offset + span.len).min(win_end);
        if start >= end {
            continue;
        }
        match clipped.last_mut() {
            Some((_, prev_end)) if start <= *prev_end => *prev_end = (*prev_end).max(end),
            _ => clipped.push((start, end)),
        }
    }

    let mut out = String::new();
    if win_start > 0 {
        out.push_str(ELLIPSIS);
    }

    let mut cursor = win_start;
    for (start, end) in clipped {
        if start > cursor {
            let (lo, hi) = page.map.raw_span(cursor as usize, start as usize, raw_len);
            out.push_str(&page.raw[lo..hi]);
        }
        let (lo, hi) = page.map.raw_span(start as usize, end as usize, raw_len);
        out.push_str(HIGHLIGHT_OPEN);
        out.push_str(&page.raw[lo..hi]);
        out.push_str(HIGHLIGHT_CLOSE);
        cursor = end;
    }
    if cursor < win_end {
        let (lo, hi) = page.map.raw_span(cursor as usize, win_end as usize, raw_len);
        out.push_str(&page.raw[lo..hi]);
    }

    if win_end < norm_len {
        out.push_str(ELLIPSIS);
    }
    out
}

/// Unhighlighted opening of the page, used when there is nothing to mark.
fn leading_text(page: &Page, window: u32) -> String {
    let norm_len = page.map.len() as u32;
    let end = window.min(norm_len);
    let (lo, hi) = page.map.raw_span(0, end as usize, page.raw.len());
    let mut out = page.raw[lo..hi].to_string();
    if end < norm_len {
        out.push_str(ELLIPSIS);
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================
