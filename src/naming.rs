//! Archive name derivation
//!
//! Turns a resolved `(title, year)` pair into a deterministic name of the form
//! `<Title> (<tag>) (<year>)`, omitting the year segment when it is unknown.

use crate::types::{ArchiveName, UNKNOWN_YEAR};

/// Roman numerals a naive title-caser mangles, shortest first
///
/// Title-casing turns "III" into "Iii"; each entry restores one numeral. The
/// order matters only for readers: matching is done on whole words.
const ROMAN_NUMERALS: &[(&str, &str)] = &[
    ("ii", "II"),
    ("iv", "IV"),
    ("vi", "VI"),
    ("ix", "IX"),
    ("iii", "III"),
    ("vii", "VII"),
    ("viii", "VIII"),
];

/// Builds archive names with a fixed provenance tag
#[derive(Clone, Debug)]
pub struct NameNormalizer {
    tag: String,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new("W_P")
    }
}

impl NameNormalizer {
    /// Create a normalizer that embeds `tag` in every name
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    /// Provenance tag in use
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Derive the archive name for a title and year
    ///
    /// Pure: the same inputs always give the same name.
    pub fn normalize(&self, title: &str, year: &str) -> ArchiveName {
        let title = restore_roman_numerals(&title_case(&filter_title(title)));
        let title = if title.is_empty() {
            crate::types::FALLBACK_TITLE.to_string()
        } else {
            title
        };

        let name = if year == UNKNOWN_YEAR || year.is_empty() {
            format!("{} ({})", title, self.tag)
        } else {
            format!("{} ({}) ({})", title, self.tag, year)
        };

        ArchiveName::from_normalized(strip_unsafe(&name))
    }
}

/// Keep letters, digits and whitespace; collapse whitespace runs
fn filter_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Uppercase the first letter of every cased run, lowercase the rest
///
/// A letter starts a new word when the character before it is not a letter,
/// so "2nd" becomes "2Nd" the same way a classic title-caser does.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_is_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

fn restore_roman_numerals(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let lower = word.to_lowercase();
            ROMAN_NUMERALS
                .iter()
                .find(|(numeral, _)| *numeral == lower)
                .map(|(_, fixed)| (*fixed).to_string())
                .unwrap_or_else(|| word.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_unsafe(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ':' | '/' | '\\'))
        .collect()
}
