// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Terminal display utilities for the bahith CLI.
//!
//! Search hits render as a compact card: title line with author and death
//! date, page reference, then the snippet with the `<mark>` regions turned
//! into ANSI reverse-video so matches pop in the terminal. Colors respect
//! `NO_COLOR` and non-TTY pipelines - piping to a file gives clean text
//! with the markers stripped.

use std::io::IsTerminal;

use bahith::{BookMeta, SearchResult, StoreStats, HIGHLIGHT_CLOSE, HIGHLIGHT_OPEN};

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const REVERSE: &str = "\x1b[7m";
const RESET: &str = "\x1b[0m";

/// Should output carry ANSI codes?
pub fn use_colors() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}

fn styled(code: &str, text: &str) -> String {
    if use_colors() {
        format!("{code}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Replace the snippet's `<mark>` pair with terminal highlighting (or strip
/// it entirely when colors are off).
pub fn render_snippet(snippet_html: &str) -> String {
    if use_colors() {
        snippet_html
            .replace(HIGHLIGHT_OPEN, REVERSE)
            .replace(HIGHLIGHT_CLOSE, RESET)
    } else {
        snippet_html
            .replace(HIGHLIGHT_OPEN, "")
            .replace(HIGHLIGHT_CLOSE, "")
    }
}

/// Print one search hit.
pub fn print_result(index: usize, result: &SearchResult) {
    let mut title_line = format!("{}. {}", index + 1, styled(BOLD, &result.book_title));
    if let Some(author) = &result.author {
        title_line.push_str(" - ");
        title_line.push_str(author);
        if let Some(death) = result.death_date {
            title_line.push_str(&format!(" (ت {death})"));
        }
    }
    println!("{title_line}");

    let mut meta_line = format!("   ص {}", result.page_num);
    if let Some(category) = &result.category_name {
        meta_line.push_str(&format!(" · {category}"));
    }
    meta_line.push_str(&format!(" · {:.2}", result.rank));
    println!("{}", styled(DIM, &meta_line));

    println!("   {}", render_snippet(&result.snippet_html));
    println!();
}

/// Print the inspect summary.
pub fn print_stats(stats: &StoreStats, books: &[BookMeta]) {
    println!("{}", styled(BOLD, "store"));
    println!("  books:  {}", stats.books);
    println!("  pages:  {}", stats.pages);
    println!("  terms:  {}", stats.terms);
    println!("  tokens: {}", stats.total_tokens);
    if !books.is_empty() {
        println!();
        println!("{}", styled(BOLD, "books"));
        for book in books {
            let mut line = format!("  {} - {}", book.id, book.title);
            if let Some(author) = &book.author_name {
                line.push_str(&format!(" ({author})"));
            }
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_strips_markers_without_colors() {
        // Not a terminal under the test harness, so markers are stripped.
        if !use_colors() {
            let rendered = render_snippet("قال <mark>الله</mark> تعالي");
            assert_eq!(rendered, "قال الله تعالي");
        }
    }
}
