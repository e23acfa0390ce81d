// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Arabic text normalization with a position map back to the original text.
//!
//! Matching happens on normalized text; display happens on the original.
//! The position map is what connects the two: for every character of the
//! normalized output it records the byte offset of the source character it
//! came from, so a match found at normalized offset `o` can be highlighted
//! in the fully-vocalized original without guessing how many diacritics were
//! in between.
//!
//! The pipeline runs in a fixed order, and every stage either deletes a
//! character or substitutes it one-for-one - nothing is reordered or
//! duplicated, which is exactly what keeps the position map honest:
//!
//! 1. Strip tashkeel (fatha, damma, kasra, their nunation forms, shadda,
//!    sukun, superscript alef)
//! 2. Strip tatweel (the decorative elongation character)
//! 3. Unify alef variants (أ إ آ ٱ → ا)
//! 4. Alef maksura → ya (ى → ي)
//! 5. Aggressive folds, gated by [`NormalizeConfig::aggressive`]:
//!    teh marbuta → heh (ة → ه) and the hamza carriers (ؤ → و, ئ → ي).
//!    More recall, less precision - and whatever you pick, pick the same
//!    thing for the index and the query or recall breaks silently.
//!
//! Non-Arabic characters pass through untouched. The function is total,
//! deterministic, and idempotent: normalizing already-normalized text is the
//! identity with an identity map.

use crate::types::PositionMap;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Normalization configuration, chosen once per index build.
///
/// The same configuration must be applied to indexed content and to queries.
/// The store persists the flag in every segment and re-derives the book when
/// a segment on disk disagrees with the configured value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeConfig {
    /// Fold teh marbuta to heh and hamza-carrying waw/ya to their bare
    /// carriers. Off by default: it widens recall at the cost of precision.
    pub aggressive: bool,
}

impl NormalizeConfig {
    /// Encode as a segment flag byte.
    pub fn to_flag(self) -> u8 {
        u8::from(self.aggressive)
    }

    /// Decode from a segment flag byte.
    pub fn from_flag(flag: u8) -> Self {
        NormalizeConfig {
            aggressive: flag & 1 != 0,
        }
    }
}

// =============================================================================
// CHARACTER CLASSES
// =============================================================================

/// Tatweel (kashida): decorative elongation, no phonetic value.
const TATWEEL: char = '\u{0640}';

/// Is this one of the marks the normalizer deletes?
///
/// The set is fixed: fathatan, dammatan, kasratan, fatha, damma, kasra,
/// shadda, sukun (U+064B..U+0652) plus superscript alef (U+0670).
#[inline]
fn is_tashkeel(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{0652}' | '\u{0670}')
}

/// Apply the substitution stages to a single retained character.
#[inline]
fn fold(c: char, config: &NormalizeConfig) -> char {
    match c {
        // Alef with hamza above/below, madda above, wasla → bare alef
        '\u{0623}' | '\u{0625}' | '\u{0622}' | '\u{0671}' => '\u{0627}',
        // Alef maksura → ya
        '\u{0649}' => '\u{064A}',
        // Aggressive folds: teh marbuta → heh, waw/ya hamza → bare carrier
        '\u{0629}' if config.aggressive => '\u{0647}',
        '\u{0624}' if config.aggressive => '\u{0648}',
        '\u{0626}' if config.aggressive => '\u{064A}',
        _ => c,
    }
}

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Normalized text together with its position map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// The search-normalized text.
    pub text: String,
    /// Byte offset into the source text for every character of `text`.
    pub map: PositionMap,
}

/// Normalize with the default (non-aggressive) configuration.
pub fn normalize(text: &str) -> Normalized {
    normalize_with(text, &NormalizeConfig::default())
}

/// Normalize `text` for search, producing the normalized form and the
/// position map back into `text`.
///
/// Total and pure: there is no failure mode, and empty input yields empty
/// output with an empty map.
pub fn normalize_with(text: &str, config: &NormalizeConfig) -> Normalized {
    let mut out = String::with_capacity(text.len());
    let mut map = Vec::with_capacity(text.len() / 2);

    for (byte_offset, c) in text.char_indices() {
        // Deletion stages: the source index is skipped, not mapped.
        if is_tashkeel(c) || c == TATWEEL {
            continue;
        }
        out.push(fold(c, config));
        map.push(byte_offset as u32);
    }

    Normalized {
        text: out,
        map: PositionMap::new(map),
    }
}

// =============================================================================
// TOKENIZATION
// =============================================================================

/// A token of normalized text, with its ordinal and character offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token text (a slice of the normalized text, owned).
    pub term: String,
    /// Token ordinal within the text. Phrase matching is adjacency of
    /// ordinals, so punctuation between words doesn't break a phrase.
    pub pos: u32,
    /// Character offset of the token's first character in the normalized
    /// text. This is what postings carry and what snippets map back through
    /// the position map.
    pub offset: u32,
}

/// Split normalized text into tokens at non-alphanumeric boundaries.
///
/// unicode61-style: any alphanumeric run is a token, everything else is a
/// separator. Arabic letters are alphabetic, so this degrades to whitespace
/// splitting on clean prose while still shedding punctuation.
///
/// Used for both index construction and query parsing - the two sides must
/// agree on token boundaries or nothing matches.
pub fn tokenize(normalized: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut term = String::new();
    let mut start = 0u32;
    let mut pos = 0u32;

    for (char_offset, c) in normalized.chars().enumerate() {
        if c.is_alphanumeric() {
            if term.is_empty() {
                start = char_offset as u32;
            }
            term.push(c);
        } else if !term.is_empty() {
            tokens.push(Token {
                term: std::mem::take(&mut term),
                pos,
                offset: start,
            });
            pos += 1;
        }
    }
    if !term.is_empty() {
        tokens.push(Token {
            term,
            pos,
            offset: start,
        });
    }

    tokens
}

// =============================================================================
// TESTS
// =============================================================================
