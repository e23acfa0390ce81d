// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The bahith binary: the process entry point that owns the store lifecycle.
//!
//! The library never opens, closes, or logs on its own; this binary does.
//! `RUST_LOG` controls verbosity the usual way.

use std::error::Error;
use std::fs;

use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use bahith::{BookMeta, NormalizeConfig, SearchEngine, SearchFilter, SearchOptions};

mod cli;
use cli::{display, Cli, Commands};

/// A book file as handed to `bahith ingest`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookFile {
    id: String,
    title: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    death_date: Option<i32>,
    #[serde(default)]
    category_id: Option<u32>,
    #[serde(default)]
    category_name: Option<String>,
    pages: Vec<PageEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageEntry {
    page_num: u32,
    content: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = NormalizeConfig {
        aggressive: cli.aggressive,
    };
    let engine = SearchEngine::open(&cli.store, config)?;

    match cli.command {
        Commands::Ingest { file } => {
            let book: BookFile = serde_json::from_slice(&fs::read(&file)?)?;
            let pages: Vec<(u32, String)> = book
                .pages
                .into_iter()
                .map(|p| (p.page_num, p.content))
                .collect();
            let meta = BookMeta {
                id: book.id.clone(),
                title: book.title,
                author_id: book.author_id,
                author_name: book.author_name,
                death_date: book.death_date,
                category_id: book.category_id,
                category_name: book.category_name,
            };
            engine.ingest_book(meta, &pages)?;
            println!("ingested {} ({} pages)", book.id, pages.len());
        }

        Commands::Remove { book_id } => {
            engine.remove_book(&book_id)?;
            println!("removed {book_id}");
        }

        Commands::Search {
            query,
            books,
            authors,
            categories,
            precision,
            limit,
            no_footnotes,
            json,
        } => {
            let filter = SearchFilter {
                book_ids: split_ids(books.as_deref()),
                author_ids: split_ids(authors.as_deref()),
                category_ids: parse_category_ids(categories.as_deref())?,
            };
            let opts = SearchOptions {
                precision: precision.into(),
                filter,
                limit,
                include_footnotes: !no_footnotes,
                ..Default::default()
            };
            let results = engine.search(&query, &opts)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("no results");
            } else {
                for (i, result) in results.iter().enumerate() {
                    display::print_result(i, result);
                }
                println!("{} result(s)", results.len());
            }
        }

        Commands::Inspect => {
            let stats = engine.stats();
            let books = engine.store().books();
            display::print_stats(&stats, &books);
        }

        Commands::Rebuild => {
            engine.rebuild()?;
            let stats = engine.stats();
            println!("rebuilt: {} pages, {} terms", stats.pages, stats.terms);
        }

        Commands::History { limit } => {
            for entry in engine.recent_searches(limit) {
                println!("{} ({} hits)", entry.query, entry.hits);
            }
        }
    }

    Ok(())
}

fn split_ids(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Category ids are numeric; anything else is a malformed filter, reported
/// before the query even runs.
fn parse_category_ids(raw: Option<&str>) -> Result<Vec<u32>, Box<dyn Error>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u32>()
                .map_err(|_| format!("invalid category id: {p:?}").into())
        })
        .collect()
}
