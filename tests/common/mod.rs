//! Shared test utilities and fixtures.

#![allow(dead_code)]

use bahith::{BookMeta, NormalizeConfig, SearchEngine, SearchFilter, SearchOptions, SearchResult};
use std::path::Path;

/// The two-page fixture the whole query surface is exercised against.
pub fn quran_pages() -> Vec<(u32, String)> {
    vec![
        (1, "بسم الله الرحمن الرحيم".to_string()),
        (2, "الحمد لله رب العالمين".to_string()),
    ]
}

pub fn quran_meta() -> BookMeta {
    BookMeta {
        id: "quran".into(),
        title: "القرآن الكريم".into(),
        ..Default::default()
    }
}

pub fn bukhari_meta() -> BookMeta {
    BookMeta {
        id: "sahih_bukhari".into(),
        title: "صحيح البخاري".into(),
        author_id: Some("bukhari".into()),
        author_name: Some("الإمام البخاري".into()),
        death_date: Some(256),
        category_id: Some(1),
        category_name: Some("كتب السنة".into()),
    }
}

/// Open an engine over `dir` and seed the Quran fixture.
pub fn seeded_engine(dir: &Path) -> SearchEngine {
    let engine = SearchEngine::open(dir, NormalizeConfig::default()).expect("open engine");
    engine
        .ingest_book(quran_meta(), &quran_pages())
        .expect("ingest fixture");
    engine
}

/// Search with defaults except for the given precision.
pub fn search_precision(
    engine: &SearchEngine,
    query: &str,
    precision: bahith::PrecisionMode,
) -> Vec<SearchResult> {
    engine
        .search(
            query,
            &SearchOptions {
                precision,
                ..Default::default()
            },
        )
        .expect("search")
}

/// Search restricted to the given book ids.
pub fn search_in_books(
    engine: &SearchEngine,
    query: &str,
    book_ids: &[&str],
) -> Vec<SearchResult> {
    engine
        .search(
            query,
            &SearchOptions {
                filter: SearchFilter {
                    book_ids: book_ids.iter().map(|s| s.to_string()).collect(),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .expect("search")
}
