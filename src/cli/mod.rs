// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! CLI definitions for the bahith command-line interface.
//!
//! Six subcommands: `ingest` to add or replace a book, `remove` to delete
//! one, `search` to query the corpus, `inspect` for store statistics,
//! `rebuild` to re-derive everything from raw content, and `history` for
//! recent queries. The store directory and the normalization flag are
//! global, because they describe the index itself rather than any one
//! command.

pub mod display;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use bahith::PrecisionMode;

#[derive(Parser)]
#[command(
    name = "bahith",
    about = "Arabic-aware full-text search over book corpora",
    version
)]
pub struct Cli {
    /// Store directory (created on first ingest)
    #[arg(long, default_value = "bahith-data", global = true)]
    pub store: PathBuf,

    /// Use aggressive normalization (teh marbuta and hamza folds).
    ///
    /// Must match the flag the index was built with; a mismatch triggers a
    /// re-derivation of every segment at open.
    #[arg(long, global = true)]
    pub aggressive: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Search precision, mirroring the classic "some / all / consecutive words"
/// selector.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PrecisionArg {
    /// Match pages containing at least one word
    Some,
    /// Match pages containing every word (default)
    All,
    /// Match the words as a consecutive phrase
    Phrase,
}

impl From<PrecisionArg> for PrecisionMode {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Some => PrecisionMode::Any,
            PrecisionArg::All => PrecisionMode::All,
            PrecisionArg::Phrase => PrecisionMode::Phrase,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest (or replace) a book from a JSON file
    Ingest {
        /// Book file: metadata plus a pages array (see docs for the shape)
        file: PathBuf,
    },

    /// Remove a book and its index entries
    Remove {
        /// Book id as given at ingest
        book_id: String,
    },

    /// Search the indexed corpus
    Search {
        /// Search query
        query: String,

        /// Restrict to these book ids (comma-separated)
        #[arg(long)]
        books: Option<String>,

        /// Restrict to these author ids (comma-separated)
        #[arg(long)]
        authors: Option<String>,

        /// Restrict to these category ids (comma-separated)
        #[arg(long)]
        categories: Option<String>,

        /// Precision mode
        #[arg(long, value_enum, default_value = "all")]
        precision: PrecisionArg,

        /// Maximum number of results
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Skip matches inside footnote blocks
        #[arg(long)]
        no_footnotes: bool,

        /// Emit results as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Show store statistics and registered books
    Inspect,

    /// Re-derive normalized text and postings from raw content
    Rebuild,

    /// Show recent searches
    History {
        /// Maximum entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}
