// =============================================================================
// normalizer.rs — PDF EXTRACTION DAMAGE CONTROL
// =============================================================================
//
// PDF text extraction produces text the way a blender produces soup. Page
// numbers glued to the first line, three kinds of dash, five kinds of quote,
// and runs of spaces where the layout engine was trying to justify a column.
//
// This module takes that soup and gives the pattern tables something they
// can actually match against. It is pure, total, and idempotent: running
// it twice is the same as running it once.
// =============================================================================

use regex::Regex;
use std::sync::LazyLock;

/// Bare page numbers on the very first lines.
static LEADING_PAGE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A(?:\d+\s*\n)+").expect("valid leading page regex"));

/// A page number glued in front of the first ordinal.
static LEADING_PAGE_ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A\d+\s+(ÚNICO|PRIMERO|Único|Primero)").expect("valid leading ordinal regex")
});

/// Horizontal whitespace runs. Line breaks are structure and survive.
static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid horizontal space regex"));

static BLANK_LINE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));

/// Normalize extracted document text before any pattern sees it.
///
/// - typographic dashes and quotes become their ASCII forms
/// - CRLF, CR and form feeds become `\n`; other control characters go away
/// - leading page numbers are stripped
/// - horizontal whitespace runs collapse to one space
/// - three or more consecutive line breaks collapse to two
/// - `…` becomes `...`
///
/// Never fails. Empty in, empty out.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{201C}' | '\u{201D}' | '\u{00AB}' | '\u{00BB}' => out.push('"'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{2026}' => out.push_str("..."),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\u{000C}' => out.push('\n'),
            '\n' | '\t' => out.push(ch),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    let out = LEADING_PAGE_LINE.replace(&out, "");
    let out = LEADING_PAGE_ORDINAL.replace(&out, "$1");
    let out = HORIZONTAL_SPACE.replace_all(&out, " ");
    let out = BLANK_LINE_RUNS.replace_all(&out, "\n\n");

    out.into_owned()
}
