// =============================================================================
// section_locator.rs — FINDING THE PART THAT ACTUALLY DECIDES SOMETHING
// =============================================================================
//
// A resolution is forty pages of background, arguments and legal grounds,
// followed by a few lines under an all-caps RESUELVE or ACUERDA heading that
// say what actually happens. Those few lines are the operative section, and
// they are the only part of the document that is allowed to be confident.
//
// Three tiers, tried in order:
//
//   STRICT     heading on its own line, then a numbered first point
//              (PRIMERO, ÚNICO, 1º, I. ...). Runs to a closing formula.
//   FLEXIBLE   heading on its own line, then at least 50 characters of
//              whatever. Runs to a looser closing formula.
//   INLINE     heading followed by a decision verb on the same line
//              ("RESUELVE estimar ..."). V4 tables only.
//
// Documents quote earlier resolutions, so RESUELVE can appear several times.
// The LAST occurrence is the one that belongs to this document.
//
// The regex engine has no lookaround, so the closing formula is found with a
// second search starting where the section is allowed to end.
// =============================================================================

use regex::Regex;
use tracing::trace;

use crate::error::PatternError;
use crate::models::PatternSetVersion;
use crate::patterns::{self, PatternFlags};
use crate::text_scanner::{advance_chars, advance_chars_clamped, has_section_keyword, head_chars};

/// Minimum characters of content for the flexible and inline tiers.
const MIN_FLEXIBLE_CHARS: usize = 50;
/// Maximum characters of content for the inline tier.
const MAX_INLINE_CHARS: usize = 800;
/// Window for the unnumbered first-point heuristic.
const MIN_FIRST_POINT_CHARS: usize = 50;
const MAX_FIRST_POINT_CHARS: usize = 500;

/// Which locator tier produced a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorTier {
    Strict,
    Flexible,
    Inline,
}

/// A located operative section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperativeSection {
    /// `RESUELVE` or `ACUERDA`.
    pub label: String,
    /// Cleaned section body.
    pub content: String,
    pub tier: LocatorTier,
    /// Byte offset of the heading match in the normalized text.
    pub start: usize,
}

pub struct SectionLocator {
    version: PatternSetVersion,
    opener: Regex,
    strict_ordinal: Regex,
    strict_sentinels: Regex,
    flexible_sentinels: Regex,
    inline_opener: Option<Regex>,
    first_point_ordinal: Regex,
    next_point_line: Regex,
    next_point_any: Regex,
    heading_line: Regex,
    blank_runs: Regex,
}

impl SectionLocator {
    pub fn new(version: PatternSetVersion) -> Result<Self, PatternError> {
        let exact = PatternFlags::CASE_SENSITIVE;
        let dotall = PatternFlags {
            case_insensitive: false,
            dot_matches_new_line: true,
        };
        let folded = PatternFlags::CASE_INSENSITIVE;

        let inline_opener = match version {
            PatternSetVersion::V3 => None,
            PatternSetVersion::V4 => Some(patterns::compile("section", patterns::INLINE_OPENER, dotall)?),
        };

        Ok(Self {
            version,
            opener: patterns::compile("section", patterns::SECTION_OPENER, exact)?,
            strict_ordinal: patterns::compile("section", patterns::strict_ordinal(version), exact)?,
            strict_sentinels: patterns::compile("section", patterns::STRICT_SENTINELS, exact)?,
            flexible_sentinels: patterns::compile("section", patterns::FLEXIBLE_SENTINELS, exact)?,
            inline_opener,
            first_point_ordinal: patterns::compile(
                "first_point",
                patterns::FIRST_POINT_ORDINAL,
                folded,
            )?,
            next_point_line: patterns::compile(
                "first_point",
                &format!("^(?:{})", patterns::NEXT_POINT_ORDINAL),
                folded,
            )?,
            next_point_any: patterns::compile("first_point", patterns::NEXT_POINT_ORDINAL, folded)?,
            heading_line: patterns::compile("first_point", r"^[A-ZÁÉÍÓÚÑ]{4,}\.?\s", exact)?,
            blank_runs: patterns::compile("section", r"\n{3,}", exact)?,
        })
    }

    pub fn version(&self) -> PatternSetVersion {
        self.version
    }

    /// Locate the operative section of already-normalized text.
    pub fn locate(&self, text: &str) -> Option<OperativeSection> {
        if !has_section_keyword(text) {
            return None;
        }

        let section = self
            .locate_strict(text)
            .or_else(|| self.locate_flexible(text))?;

        trace!(
            label = %section.label,
            tier = ?section.tier,
            start = section.start,
            "Operative section located"
        );

        Some(section)
    }

    fn locate_strict(&self, text: &str) -> Option<OperativeSection> {
        let mut last = None;

        for caps in self.opener.captures_iter(text) {
            let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let content_start = whole.end();
            if !self.strict_ordinal.is_match(&text[content_start..]) {
                continue;
            }

            // The first line of the point always belongs to the section;
            // closing formulas count from the line after it.
            let search_from = match memchr::memchr(b'\n', &text.as_bytes()[content_start..]) {
                Some(offset) => content_start + offset + 1,
                None => text.len(),
            };
            let end = self
                .strict_sentinels
                .find_at(text, search_from)
                .map(|m| m.start())
                .unwrap_or(text.len());

            last = Some(self.clean(
                label.as_str(),
                &text[content_start..end],
                LocatorTier::Strict,
                whole.start(),
            ));
        }

        last
    }

    fn locate_flexible(&self, text: &str) -> Option<OperativeSection> {
        // (start, tier rank, section); later rank wins on equal start.
        let mut best: Option<(usize, u8, OperativeSection)> = None;
        let mut consider = |start: usize, rank: u8, section: OperativeSection| {
            let replace = match &best {
                Some((best_start, best_rank, _)) => (start, rank) >= (*best_start, *best_rank),
                None => true,
            };
            if replace {
                best = Some((start, rank, section));
            }
        };

        for caps in self.opener.captures_iter(text) {
            let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let content_start = whole.end();
            let Some(min_end) = advance_chars(text, content_start, MIN_FLEXIBLE_CHARS) else {
                continue;
            };
            let end = self
                .flexible_sentinels
                .find_at(text, min_end)
                .map(|m| m.start())
                .unwrap_or(text.len());

            let section = self.clean(
                label.as_str(),
                &text[content_start..end],
                LocatorTier::Flexible,
                whole.start(),
            );
            consider(whole.start(), 0, section);
        }

        if let Some(inline) = &self.inline_opener {
            for caps in inline.captures_iter(text) {
                let (Some(whole), Some(label), Some(verb)) = (caps.get(0), caps.get(1), caps.get(2))
                else {
                    continue;
                };
                let rest_start = whole.end();
                let Some(min_end) = advance_chars(text, rest_start, MIN_FLEXIBLE_CHARS) else {
                    continue;
                };
                let max_end = advance_chars_clamped(text, rest_start, MAX_INLINE_CHARS);
                let end = match self.flexible_sentinels.find_at(text, min_end) {
                    Some(m) if m.start() <= max_end => m.start(),
                    _ if max_end == text.len() => text.len(),
                    _ => continue,
                };

                let section = self.clean(
                    label.as_str(),
                    &text[verb.start()..end],
                    LocatorTier::Inline,
                    whole.start(),
                );
                consider(whole.start(), 1, section);
            }
        }

        best.map(|(_, _, section)| section)
    }

    fn clean(&self, label: &str, content: &str, tier: LocatorTier, start: usize) -> OperativeSection {
        OperativeSection {
            label: label.to_uppercase(),
            content: self.blank_runs.replace_all(content.trim(), "\n\n").into_owned(),
            tier,
            start,
        }
    }

    /// The first operative point of a section.
    ///
    /// Numbered sections run from the first ordinal up to the line that
    /// opens the second point (or an all-caps heading). Unnumbered
    /// sections take 50 to 500 characters up to the next ordinal, and
    /// failing that the first 500 characters.
    pub fn first_point<'a>(&self, content: &'a str) -> &'a str {
        if self.first_point_ordinal.is_match(content) {
            let mut end = content.len();
            let mut line_start = match memchr::memchr(b'\n', content.as_bytes()) {
                Some(idx) => idx + 1,
                None => return content.trim(),
            };
            while line_start < content.len() {
                let line = &content[line_start..];
                if self.next_point_line.is_match(line) || self.heading_line.is_match(line) {
                    end = line_start - 1;
                    break;
                }
                line_start = match memchr::memchr(b'\n', line.as_bytes()) {
                    Some(idx) => line_start + idx + 1,
                    None => content.len(),
                };
            }
            return content[..end].trim();
        }

        if let Some(min_end) = advance_chars(content, 0, MIN_FIRST_POINT_CHARS) {
            let max_end = advance_chars_clamped(content, 0, MAX_FIRST_POINT_CHARS);
            match self.next_point_any.find_at(content, min_end) {
                Some(m) if m.start() <= max_end => return content[..m.start()].trim(),
                _ if max_end == content.len() => return content.trim(),
                _ => {}
            }
        }

        head_chars(content, MAX_FIRST_POINT_CHARS).trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4() -> SectionLocator {
        SectionLocator::new(PatternSetVersion::V4).unwrap()
    }

    #[test]
    fn test_strict_section_runs_to_closing_formula() {
        let text = "ANTECEDENTES\nlo que sea\nRESUELVE:\nPRIMERO. Desestimar el conflicto.\n\
                    SEGUNDO. Notificar a las partes.\nNotifíquese a los interesados.";
        let section = v4().locate(text).unwrap();
        assert_eq!(section.label, "RESUELVE");
        assert_eq!(section.tier, LocatorTier::Strict);
        assert_eq!(
            section.content,
            "PRIMERO. Desestimar el conflicto.\nSEGUNDO. Notificar a las partes."
        );
    }

    #[test]
    fn test_last_occurrence_wins() {
        let text = "Como ya se dijo en la resolución previa, que\nRESUELVE:\n\
                    PRIMERO. Estimar el recurso.\nNotifíquese.\n\
                    Ahora la Sala\nRESUELVE:\nPRIMERO. Desestimar el recurso.\nComuníquese.";
        let section = v4().locate(text).unwrap();
        assert_eq!(section.content, "PRIMERO. Desestimar el recurso.");
    }

    #[test]
    fn test_heading_is_case_sensitive() {
        let text = "la Sala resuelve:\nPRIMERO. Desestimar el conflicto de acceso a la red.";
        assert!(v4().locate(text).is_none());
    }

    #[test]
    fn test_mixed_case_ordinal_needs_v4() {
        let text = "ACUERDA\nPrimero. Archivar las actuaciones.\nComuníquese.";
        assert_eq!(v4().locate(text).unwrap().tier, LocatorTier::Strict);

        let v3 = SectionLocator::new(PatternSetVersion::V3).unwrap();
        // Too short for the flexible tier as well.
        assert!(v3.locate(text).is_none());
    }

    #[test]
    fn test_flexible_section_without_ordinal() {
        let text = "ACUERDA\nDeclarar concluso el procedimiento iniciado a instancia de la \
                    empresa interesada por desistimiento.\nMadrid, 3 de marzo de 2024";
        let section = v4().locate(text).unwrap();
        assert_eq!(section.tier, LocatorTier::Flexible);
        assert!(section.content.starts_with("Declarar concluso"));
        assert!(section.content.ends_with("desistimiento."));
    }

    #[test]
    fn test_inline_opener() {
        let text = "Por todo lo anterior, la Sala RESUELVE estimar el conflicto planteado por \
                    la empresa contra la distribuidora en todos sus términos.\nNotifíquese.";
        let section = v4().locate(text).unwrap();
        assert_eq!(section.tier, LocatorTier::Inline);
        assert!(section.content.starts_with("estimar el conflicto"));
        assert!(!section.content.contains("Notifíquese"));

        let v3 = SectionLocator::new(PatternSetVersion::V3).unwrap();
        assert!(v3.locate(text).is_none());
    }

    #[test]
    fn test_no_heading_no_section() {
        assert!(v4().locate("").is_none());
        assert!(v4().locate("Texto sin ninguna parte dispositiva.").is_none());
    }

    #[test]
    fn test_first_point_stops_at_second_ordinal() {
        let content = "PRIMERO. Desestimar el conflicto\ninterpuesto por la empresa.\n\
                       SEGUNDO. Estimar lo demás.";
        assert_eq!(
            v4().first_point(content),
            "PRIMERO. Desestimar el conflicto\ninterpuesto por la empresa."
        );
    }

    #[test]
    fn test_first_point_single_line() {
        assert_eq!(v4().first_point("ÚNICO. Archivar."), "ÚNICO. Archivar.");
    }

    #[test]
    fn test_first_point_without_ordinal_uses_window() {
        let content = "Declarar que la solicitud presentada cumple los requisitos exigidos. \
                       Segundo, comunicar la presente.";
        let point = v4().first_point(content);
        assert!(point.ends_with("exigidos."));

        let short = "Archivar.";
        assert_eq!(v4().first_point(short), "Archivar.");

        let long = "a".repeat(900);
        assert_eq!(v4().first_point(&long).chars().count(), 500);
    }
}
