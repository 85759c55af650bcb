//! Crisis screening for outgoing user messages.
//!
//! Text is folded to a comparison form (canonical decomposition, combining
//! marks dropped, lowercased) and checked for any fragment of a fixed
//! Greek/English table. Matching is by substring so inflected forms and
//! compounds are caught without stemming; unrelated words that contain a
//! fragment will also match.

use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fragments stored already folded: lowercase, no accents, sigma always `σ`.
pub const CRISIS_KEYWORDS: &[&str] = &[
    // Greek
    "αυτοκτον",
    "πεθανω",
    "τελοσ",
    "χαπια",
    "κοψω",
    "σκοτω",
    "κρεμαστω",
    "πηδηξω",
    "δεν αντεχω",
    "κουραστηκα",
    "ματαιο",
    "σκοταδι",
    "αιμα",
    "φλεβες",
    "τελειωσω",
    "εξαφανιστω",
    "πονοσ",
    "απελπισια",
    // English
    "suicid",
    "kill myself",
    "die",
    "end it",
    "overdose",
    "pills",
    "hang myself",
    "jump",
    "cannot go on",
    "tired of living",
    "hopeless",
    "cutting",
    "veins",
    "hurt myself",
    "pain",
    "despair",
];

/// Outcome of screening one message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrisisScan {
    /// Fragments found, in table order
    pub matched: Vec<&'static str>,
}

impl CrisisScan {
    pub fn is_crisis(&self) -> bool {
        !self.matched.is_empty()
    }
}

/// Folds text into the form the keyword table is written in.
///
/// Uses canonical (NFD) decomposition only, so compatibility characters such
/// as ligatures keep their identity.
pub fn normalize(text: &str) -> String {
    let stripped: String = text.nfd().filter(|c| !is_combining_mark(*c)).collect();
    // to_lowercase picks ς or σ from context; fold both to one form.
    stripped
        .to_lowercase()
        .chars()
        .map(|c| if c == 'ς' { 'σ' } else { c })
        .collect()
}

/// Returns true when any crisis fragment occurs in `text`.
pub fn detect_crisis(text: &str) -> bool {
    let folded = normalize(text);
    CRISIS_KEYWORDS.iter().any(|keyword| folded.contains(keyword))
}

/// Like [`detect_crisis`] but reports every fragment that matched.
pub fn scan(text: &str) -> CrisisScan {
    let folded = normalize(text);
    let matched = CRISIS_KEYWORDS
        .iter()
        .copied()
        .filter(|keyword| folded.contains(keyword))
        .collect();
    CrisisScan { matched }
}
