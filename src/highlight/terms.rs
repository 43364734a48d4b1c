//! Terms: search phrases and their compiled patterns
//!
//! A term is a phrase plus match-mode flags. The flags are folded into a
//! single compiled regex once, at construction; everything downstream only
//! ever runs `find_ranges` over flow text.
//!
//! # Pattern construction
//! - `regex`: the phrase is used verbatim, otherwise it is escaped
//! - `case`: case-sensitive when set
//! - `diacritics`: diacritic-sensitive when set, otherwise every Latin letter
//!   becomes a class of its accented variants
//! - `stem`: every word is cut to its stem and followed by `\w*`
//! - `whole`: `\b` at each end of the phrase that is a word character
//!
//! Whitespace runs in non-regex phrases match any whitespace run, so a
//! phrase still matches when the page breaks it across lines.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::EngineError;

// =============================================================================
// Types
// =============================================================================

/// Match-mode flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchMode {
    pub regex: bool,
    pub case: bool,
    pub stem: bool,
    pub whole: bool,
    pub diacritics: bool,
}

/// Stable, selector-safe term id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermToken(pub String);

impl TermToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TermToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Term as supplied by a collaborator (phrase + flags)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermDefinition {
    pub phrase: String,
    #[serde(default)]
    pub mode: MatchMode,
}

/// A compiled search term
#[derive(Debug, Clone)]
pub struct Term {
    phrase: String,
    mode: MatchMode,
    token: TermToken,
    /// `None` for degenerate (empty) phrases
    pattern: Option<Regex>,
    hue: usize,
    cycle: usize,
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for Term {}

impl Term {
    /// Compile a term. Fails only for an invalid regex phrase.
    pub fn new(phrase: &str, mode: MatchMode) -> Result<Self, EngineError> {
        let pattern = match pattern_source(phrase, mode) {
            Some(source) => Some(
                RegexBuilder::new(&source)
                    .case_insensitive(!mode.case)
                    .build()
                    .map_err(|source| EngineError::InvalidPattern {
                        phrase: phrase.to_string(),
                        source,
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            phrase: phrase.to_string(),
            mode,
            token: derive_token(phrase, mode),
            pattern,
            hue: 0,
            cycle: 0,
        })
    }

    /// Compile a term with default flags
    pub fn literal(phrase: &str) -> Result<Self, EngineError> {
        Self::new(phrase, MatchMode::default())
    }

    pub fn from_definition(def: &TermDefinition) -> Result<Self, EngineError> {
        Self::new(&def.phrase, def.mode)
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn token(&self) -> &TermToken {
        &self.token
    }

    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// Index into the hue list
    pub fn hue(&self) -> usize {
        self.hue
    }

    /// How many times the hue list wrapped before this term
    pub fn cycle(&self) -> usize {
        self.cycle
    }

    pub(crate) fn assign_slot(&mut self, position: usize, hue_count: usize) {
        let hue_count = hue_count.max(1);
        self.hue = position % hue_count;
        self.cycle = position / hue_count;
    }

    /// Non-overlapping, non-empty matches in text order
    pub fn find_ranges<'t>(&'t self, text: &'t str) -> impl Iterator<Item = Range<usize>> + 't {
        self.pattern
            .iter()
            .flat_map(move |re| re.find_iter(text))
            .map(|m| m.range())
            .filter(|r| !r.is_empty())
    }
}

/// Assign hue slots by list position
pub fn assign_hues(terms: &mut [Term], hue_count: usize) {
    for (i, term) in terms.iter_mut().enumerate() {
        term.assign_slot(i, hue_count);
    }
}

// =============================================================================
// Pattern construction
// =============================================================================

/// Minimum length of a stem, in chars
const MIN_STEM_LEN: usize = 3;

/// Suffixes removed by stemming, longest first
const STEM_SUFFIXES: &[&str] = &["ies", "ing", "est", "ed", "es", "er", "ly", "y", "s"];

/// Accent equivalence classes (lowercase)
const DIACRITIC_CLASSES: &[&str] = &[
    "aàáâãäåāăąǎ",
    "cçćĉċč",
    "dďđ",
    "eèéêëēĕėęě",
    "gĝğġģ",
    "hĥħ",
    "iìíîïĩīĭįı",
    "jĵ",
    "kķ",
    "lĺļľŀł",
    "nñńņňŉ",
    "oòóôõöøōŏőǒ",
    "rŕŗř",
    "sśŝşš",
    "tţťŧ",
    "uùúûüũūŭůűųǔ",
    "wŵ",
    "yýÿŷ",
    "zźżž",
];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn pattern_source(phrase: &str, mode: MatchMode) -> Option<String> {
    if phrase.trim().is_empty() {
        return None;
    }

    let body = if mode.regex {
        format!("(?:{})", phrase)
    } else {
        let mut body = String::new();
        let mut in_space = false;
        for segment in phrase.trim().split_word_bounds() {
            if segment.chars().all(char::is_whitespace) {
                if !in_space {
                    body.push_str(r"\s+");
                }
                in_space = true;
                continue;
            }
            in_space = false;
            if mode.stem && segment.chars().any(char::is_alphanumeric) {
                push_literal(&mut body, stem_word(segment), mode);
                body.push_str(r"\w*");
            } else {
                push_literal(&mut body, segment, mode);
            }
        }
        body
    };

    if !mode.whole {
        return Some(body);
    }
    let trimmed = phrase.trim();
    let starts_word = mode.regex || trimmed.chars().next().is_some_and(is_word_char);
    let ends_word = mode.regex || trimmed.chars().last().is_some_and(is_word_char);
    Some(format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        body,
        if ends_word { r"\b" } else { "" },
    ))
}

fn push_literal(out: &mut String, text: &str, mode: MatchMode) {
    for c in text.chars() {
        match (mode.diacritics, diacritic_class(c)) {
            (false, Some(class)) => {
                out.push('[');
                out.push_str(&class);
                out.push(']');
            }
            _ => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
    }
}

/// Accent class for a letter, in the letter's case
fn diacritic_class(c: char) -> Option<String> {
    let lower = c.to_lowercase().next()?;
    let class = DIACRITIC_CLASSES.iter().find(|class| class.contains(lower))?;
    if c.is_uppercase() {
        Some(class.chars().flat_map(char::to_uppercase).collect())
    } else {
        Some(class.to_string())
    }
}

/// Cut a common English suffix, keeping at least `MIN_STEM_LEN` chars
fn stem_word(word: &str) -> &str {
    for suffix in STEM_SUFFIXES {
        if word.len() <= suffix.len() {
            continue;
        }
        let cut = word.len() - suffix.len();
        if !word.is_char_boundary(cut) || !word[cut..].eq_ignore_ascii_case(suffix) {
            continue;
        }
        let stem = &word[..cut];
        if stem.chars().count() < MIN_STEM_LEN {
            continue;
        }
        // "running" -> "run", "stopped" -> "stop"
        if matches!(*suffix, "ing" | "ed" | "er" | "est") && stem.chars().count() > MIN_STEM_LEN {
            let mut tail = stem.chars().rev();
            if let (Some(last), Some(prev)) = (tail.next(), tail.next()) {
                if last == prev && last.is_ascii_alphabetic() && !"aeiou".contains(last.to_ascii_lowercase()) {
                    return &stem[..stem.len() - last.len_utf8()];
                }
            }
        }
        return stem;
    }
    word
}

fn derive_token(phrase: &str, mode: MatchMode) -> TermToken {
    let mut slug = String::new();
    for c in phrase.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
        if slug.len() >= 24 {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "term" } else { slug };

    let mut hasher = DefaultHasher::new();
    phrase.hash(&mut hasher);
    mode.hash(&mut hasher);
    TermToken(format!("{}-{:08x}", slug, hasher.finish() as u32))
}

// =============================================================================
// Tests
// =============================================================================
