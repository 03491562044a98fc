// =============================================================================
// text_scanner.rs — THE CHEAP LOOKS BEFORE THE EXPENSIVE ONES
// =============================================================================
//
// Before we unleash forty regexes on a document, we ask simpler questions:
//
// 1. memchr - does the word RESUELVE or ACUERDA appear AT ALL? If not,
//    there is no operative section to locate and the section regexes can
//    stay in their cages. SIMD byte search is a lot cheaper than finding
//    out the hard way.
//
// 2. Aho-Corasick - does this look like a court judgment rather than an
//    administrative resolution? FALLO, FALLAMOS, SENTENCIA and friends,
//    all at once, single pass, any case.
//
// 3. Aho-Corasick again - a crude outcome vocabulary count. It decides
//    nothing, but when a document comes back UNCLASSIFIED the log line
//    saying "it said desestimar four times" is very useful.
//
// Plus a handful of char/byte offset helpers, because every window size in
// this domain is measured in characters and every Rust slice in bytes, and
// Spanish has accents.
// =============================================================================

use aho_corasick::{AhoCorasick, MatchKind};
use std::sync::LazyLock;
use tracing::debug;

use crate::models::Category;

/// Markers of a court judgment. Their presence routes the fallback resolver
/// through the verdict-extraction tier first.
static JUDICIAL_MARKERS: &[&str] = &[
    "FALLO",
    "FALLAMOS",
    "AUDIENCIA NACIONAL",
    "TRIBUNAL SUPREMO",
    "SENTENCIA",
];

static JUDICIAL_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(JUDICIAL_MARKERS)
        .expect("Failed to build judicial marker automaton")
});

/// Outcome vocabulary, tagged by the category it leans towards.
/// Leftmost-longest keeps "desestima" from also counting as "estima".
static OUTCOME_VOCABULARY: &[(&str, Category)] = &[
    ("desestimación", Category::Denied),
    ("desestimado", Category::Denied),
    ("desestimar", Category::Denied),
    ("desestima", Category::Denied),
    ("estimación", Category::Granted),
    ("estimado", Category::Granted),
    ("estimar", Category::Granted),
    ("estima", Category::Granted),
    ("archivado", Category::Archived),
    ("archivar", Category::Archived),
    ("archiva", Category::Archived),
    ("archivo", Category::Archived),
];

static OUTCOME_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostLongest)
        .build(OUTCOME_VOCABULARY.iter().map(|(word, _)| *word))
        .expect("Failed to build outcome vocabulary automaton")
});

/// Does the text contain an operative-section keyword in the case the
/// strict locator requires? Cheap gate in front of the section regexes.
pub fn has_section_keyword(text: &str) -> bool {
    let bytes = text.as_bytes();
    memchr::memmem::find(bytes, b"RESUELVE").is_some()
        || memchr::memmem::find(bytes, b"ACUERDA").is_some()
}

/// True if the text carries any judicial marker, in any ASCII case.
pub fn has_judicial_markers(text: &str) -> bool {
    JUDICIAL_AUTOMATON.is_match(text)
}

/// Raw outcome-word counts for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordProfile {
    pub granted: usize,
    pub denied: usize,
    pub archived: usize,
}

impl KeywordProfile {
    pub fn total(&self) -> usize {
        self.granted + self.denied + self.archived
    }

    /// The most frequent outcome word family. Ties go to DENIED, then
    /// GRANTED, then ARCHIVED.
    pub fn dominant(&self) -> Option<Category> {
        if self.total() == 0 {
            return None;
        }
        let ranked = [
            (self.denied, Category::Denied),
            (self.granted, Category::Granted),
            (self.archived, Category::Archived),
        ];
        ranked
            .iter()
            .fold(None, |best: Option<(usize, Category)>, &(count, category)| match best {
                Some((best_count, _)) if best_count >= count => best,
                _ => Some((count, category)),
            })
            .map(|(_, category)| category)
    }
}

/// Count outcome vocabulary in a single pass. Diagnostic only.
pub fn keyword_profile(text: &str) -> KeywordProfile {
    let mut profile = KeywordProfile::default();
    for m in OUTCOME_AUTOMATON.find_iter(text) {
        match OUTCOME_VOCABULARY[m.pattern().as_usize()].1 {
            Category::Granted => profile.granted += 1,
            Category::Denied => profile.denied += 1,
            Category::Archived => profile.archived += 1,
            Category::Unclassified => {}
        }
    }

    debug!(
        granted = profile.granted,
        denied = profile.denied,
        archived = profile.archived,
        "Outcome vocabulary profile"
    );

    profile
}

// -----------------------------------------------------------------------------
// Char/byte offset helpers
// -----------------------------------------------------------------------------

/// Byte offset reached after advancing `n` chars from byte offset `from`,
/// or `None` if fewer than `n` chars remain. `from` must be a char boundary.
pub fn advance_chars(text: &str, from: usize, n: usize) -> Option<usize> {
    if n == 0 {
        return Some(from);
    }
    let rest = text.get(from..)?;
    let mut iter = rest.char_indices();
    match iter.nth(n - 1) {
        Some((idx, ch)) => Some(from + idx + ch.len_utf8()),
        None => None,
    }
}

/// Like [`advance_chars`] but clamps to the end of the text.
pub fn advance_chars_clamped(text: &str, from: usize, n: usize) -> usize {
    advance_chars(text, from, n).unwrap_or(text.len())
}

/// The first `n` chars of `text`.
pub fn head_chars(text: &str, n: usize) -> &str {
    &text[..advance_chars_clamped(text, 0, n)]
}

/// The last `n` chars of `text`.
pub fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_keyword_is_case_sensitive() {
        assert!(has_section_keyword("La Sala RESUELVE:\nPRIMERO."));
        assert!(has_section_keyword("ACUERDA"));
        assert!(!has_section_keyword("la comisión resuelve lo siguiente"));
        assert!(!has_section_keyword(""));
    }

    #[test]
    fn test_judicial_markers_any_case() {
        assert!(has_judicial_markers("En nombre del Rey, FALLAMOS: estimar"));
        assert!(has_judicial_markers("Sentencia de la Audiencia Nacional"));
        assert!(!has_judicial_markers("La Sala de Supervisión Regulatoria"));
    }

    #[test]
    fn test_keyword_profile_does_not_double_count() {
        let profile = keyword_profile("Se desestima el recurso. Desestimar la solicitud.");
        assert_eq!(profile.denied, 2);
        assert_eq!(profile.granted, 0);
        assert_eq!(profile.dominant(), Some(Category::Denied));
    }

    #[test]
    fn test_keyword_profile_tie_prefers_denied() {
        let profile = keyword_profile("estimar y desestimar y archivar");
        assert_eq!(profile.total(), 3);
        assert_eq!(profile.dominant(), Some(Category::Denied));
        assert_eq!(keyword_profile("nada que ver").dominant(), None);
    }

    #[test]
    fn test_char_helpers_respect_multibyte() {
        let text = "ÚNICO. Desestimación";
        assert_eq!(head_chars(text, 5), "ÚNICO");
        assert_eq!(tail_chars(text, 4), "ción");
        assert_eq!(tail_chars(text, 500), text);
        assert_eq!(head_chars(text, 0), "");
        assert_eq!(advance_chars(text, 0, 1), Some("Ú".len()));
        assert_eq!(advance_chars(text, 0, 500), None);
        assert_eq!(advance_chars_clamped(text, 0, 500), text.len());
    }
}
