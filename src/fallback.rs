// =============================================================================
// fallback.rs — WHEN THERE IS NO RESUELVE
// =============================================================================
//
// Some documents have no operative section we can find. Court judgments
// say FALLAMOS instead. Scanned PDFs lose their headings. Short procedural
// acts just say what happens in a paragraph.
//
// For those we run a cascade, most specific first, and stop at the first
// tier that produces anything:
//
//   1. JUDICIAL      if the text looks like a judgment, cut out the verdict
//                    passage after FALLO/FALLAMOS and run the category
//                    tables over it.
//   2. TAIL          category tables over the last N characters.
//   3. IDIOM         a short list of unambiguous phrases, whole text.
//   4. LAST RESORT   bare verb stems, whole text.
//
// Everything here is LOW confidence and section_found = false. No exception.
// =============================================================================

use regex::Regex;
use tracing::debug;

use crate::category_matcher::{CategoryMatch, CategoryMatcher};
use crate::error::PatternError;
use crate::models::{Category, ClassificationResult, Confidence};
use crate::patterns::{self, PatternFlags};
use crate::text_scanner::{advance_chars, advance_chars_clamped, has_judicial_markers, tail_chars};

/// Minimum and maximum characters of a verdict passage.
const MIN_VERDICT_CHARS: usize = 50;
const MAX_VERDICT_CHARS: usize = 1500;

pub const JUDICIAL_TAG: &str = "[JUDICIAL] ";
pub const LAST_RESORT_TAG: &str = "[LAST RESORT] ";

/// Which tier of the cascade produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTier {
    Judicial,
    Tail,
    Idiom,
    LastResort,
}

struct LastResortProbe {
    category: Category,
    pattern: Regex,
    /// Reject a hit when this matches right after it.
    veto: Option<Regex>,
}

pub struct FallbackResolver {
    matcher: CategoryMatcher,
    tail_window: usize,
    verdict_marker: Regex,
    verdict_terminator: Regex,
    idioms: CategoryMatcher,
    last_resort: Vec<LastResortProbe>,
}

impl FallbackResolver {
    /// `matcher` is the category matcher of the active pattern set;
    /// `tail_window` is measured in characters.
    pub fn new(matcher: CategoryMatcher, tail_window: usize) -> Result<Self, PatternError> {
        let folded = PatternFlags::CASE_INSENSITIVE;

        let last_resort = patterns::LAST_RESORT_PROBES
            .iter()
            .map(|(category, probe, veto)| -> Result<LastResortProbe, PatternError> {
                Ok(LastResortProbe {
                    category: *category,
                    pattern: patterns::compile("last_resort", probe, folded)?,
                    veto: veto
                        .map(|v| patterns::compile("last_resort", v, folded))
                        .transpose()?,
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;

        Ok(Self {
            matcher,
            tail_window,
            verdict_marker: patterns::compile("judicial", patterns::VERDICT_MARKER, folded)?,
            verdict_terminator: patterns::compile("judicial", patterns::VERDICT_TERMINATOR, folded)?,
            idioms: CategoryMatcher::from_tables(&patterns::IDIOM_TABLES, folded)?,
            last_resort,
        })
    }

    pub fn tail_window(&self) -> usize {
        self.tail_window
    }

    /// Run the cascade over normalized text.
    pub fn resolve(&self, text: &str) -> ClassificationResult {
        self.resolve_traced(text).0
    }

    /// Like [`resolve`](Self::resolve), also reporting which tier answered.
    pub fn resolve_traced(&self, text: &str) -> (ClassificationResult, Option<FallbackTier>) {
        if has_judicial_markers(text) {
            if let Some(hit) = self.verdict_window(text).and_then(|w| self.matcher.find(w)) {
                return Self::hit(hit, JUDICIAL_TAG, FallbackTier::Judicial);
            }
        }

        if let Some(hit) = self.matcher.find(tail_chars(text, self.tail_window)) {
            return Self::hit(hit, "", FallbackTier::Tail);
        }

        if let Some(hit) = self.idioms.find(text) {
            return Self::hit(hit, "", FallbackTier::Idiom);
        }

        if let Some(hit) = self.last_resort(text) {
            return Self::hit(hit, LAST_RESORT_TAG, FallbackTier::LastResort);
        }

        debug!(chars = text.chars().count(), "Fallback cascade exhausted");
        (ClassificationResult::unclassified(), None)
    }

    fn hit(
        hit: CategoryMatch,
        tag: &str,
        tier: FallbackTier,
    ) -> (ClassificationResult, Option<FallbackTier>) {
        debug!(category = %hit.category, tier = ?tier, matched = %hit.matched_text, "Fallback match");
        (
            ClassificationResult::new(
                hit.category,
                Confidence::Low,
                format!("{tag}{}", hit.matched_text),
                false,
            ),
            Some(tier),
        )
    }

    /// The passage following the first usable FALLO/FALLAMOS marker: at
    /// least 50 characters (or whatever is left), at most 1500, ending at
    /// a closing formula if one appears in that window.
    pub fn verdict_window<'a>(&self, text: &'a str) -> Option<&'a str> {
        for marker in self.verdict_marker.find_iter(text) {
            let skipped: usize = text[marker.end()..]
                .chars()
                .take_while(|c| *c == ':' || c.is_whitespace())
                .map(char::len_utf8)
                .sum();
            let start = marker.end() + skipped;
            if start == text.len() {
                continue;
            }

            let Some(min_end) = advance_chars(text, start, MIN_VERDICT_CHARS) else {
                // Short trailing verdict: take all of it.
                return Some(&text[start..]);
            };
            let max_end = advance_chars_clamped(text, start, MAX_VERDICT_CHARS);
            match self.verdict_terminator.find_at(text, min_end) {
                Some(t) if t.start() <= max_end => return Some(&text[start..t.start()]),
                _ if max_end == text.len() => return Some(&text[start..]),
                _ => continue,
            }
        }
        None
    }

    fn last_resort(&self, text: &str) -> Option<CategoryMatch> {
        self.last_resort.iter().find_map(|probe| {
            probe
                .pattern
                .find_iter(text)
                .find(|m| match &probe.veto {
                    Some(veto) => !veto.is_match(&text[m.end()..]),
                    None => true,
                })
                .map(|m| CategoryMatch {
                    category: probe.category,
                    matched_text: m.as_str().to_string(),
                })
        })
    }
}
