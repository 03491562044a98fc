// =============================================================================
// patterns.rs — THE PHRASEBOOK
// =============================================================================
//
// Every way a Spanish regulator has ever said "yes", "no" or "we're done
// here", written down as a regex. Two generations of the phrasebook live
// here side by side:
//
//   V3   the compact one. Singular and plural objects, a couple of verb
//        conjugations, and that's it.
//   V4   the consolidated one. Adds the polarity traps (confirming a denial
//        is a denial, annulling a denial is a grant), judicial wording,
//        participles, and a lot of administrative boilerplate that used to
//        fall through to UNCLASSIFIED.
//
// Order matters twice. The groups are evaluated ARCHIVED, then DENIED, then
// GRANTED; within a group, patterns are tried in the order written. The
// first match wins and nobody asks the remaining patterns for an opinion.
//
// Conjugations: "desestim(?:ar|an|a|en|e|amos)" looks redundant until you
// remember the leftmost-first alternation. Plural forms ("desestiman")
// MUST be listed or "se desestiman los conflictos" quietly skips the DENIED
// group and lands in GRANTED through the "estim..." patterns. The leading
// \b on every GRANTED "estim" pattern is the second line of defence against
// the same thing.
// =============================================================================

use regex::{Regex, RegexBuilder};

use crate::error::PatternError;
use crate::models::{Category, PatternSetVersion};

/// A named, ordered list of raw patterns that all vote for one category.
#[derive(Debug, Clone, Copy)]
pub struct PatternTable {
    pub category: Category,
    pub patterns: &'static [&'static str],
}

/// Compilation flags for a pattern group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternFlags {
    pub case_insensitive: bool,
    /// Let `.` cross line breaks. V4 tables rely on it; V3 tables don't.
    pub dot_matches_new_line: bool,
}

impl PatternFlags {
    pub const CASE_INSENSITIVE: PatternFlags = PatternFlags {
        case_insensitive: true,
        dot_matches_new_line: false,
    };

    pub const CASE_INSENSITIVE_DOTALL: PatternFlags = PatternFlags {
        case_insensitive: true,
        dot_matches_new_line: true,
    };

    pub const CASE_SENSITIVE: PatternFlags = PatternFlags {
        case_insensitive: false,
        dot_matches_new_line: false,
    };
}

/// Compile one pattern, attributing failures to `group`.
pub fn compile(group: &str, pattern: &str, flags: PatternFlags) -> Result<Regex, PatternError> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.case_insensitive)
        .dot_matches_new_line(flags.dot_matches_new_line)
        .build()
        .map_err(|source| PatternError::Invalid {
            group: group.to_string(),
            pattern: pattern.to_string(),
            source,
        })
}

/// Compile an entire table, failing on the first bad pattern.
pub fn compile_all(
    group: &str,
    patterns: &[&str],
    flags: PatternFlags,
) -> Result<Vec<Regex>, PatternError> {
    patterns
        .iter()
        .map(|p| compile(group, p, flags))
        .collect()
}

/// Category tables in evaluation order for the given version.
pub fn category_tables(version: PatternSetVersion) -> [PatternTable; 3] {
    match version {
        PatternSetVersion::V3 => [
            PatternTable { category: Category::Archived, patterns: V3_ARCHIVED },
            PatternTable { category: Category::Denied, patterns: V3_DENIED },
            PatternTable { category: Category::Granted, patterns: V3_GRANTED },
        ],
        PatternSetVersion::V4 => [
            PatternTable { category: Category::Archived, patterns: V4_ARCHIVED },
            PatternTable { category: Category::Denied, patterns: V4_DENIED },
            PatternTable { category: Category::Granted, patterns: V4_GRANTED },
        ],
    }
}

pub fn category_flags(version: PatternSetVersion) -> PatternFlags {
    match version {
        PatternSetVersion::V3 => PatternFlags::CASE_INSENSITIVE,
        PatternSetVersion::V4 => PatternFlags::CASE_INSENSITIVE_DOTALL,
    }
}

// -----------------------------------------------------------------------------
// Section location
// -----------------------------------------------------------------------------

/// The decision keyword on its own line, then at least one line break.
/// Group 1 is the keyword. Case-sensitive: only the all-caps heading counts.
pub const SECTION_OPENER: &str = r"(?:^|\n)\s*(ACUERDA|RESUELVE)\s*[:.]?\s*\n+";

/// Ordinal that must open the content of a strict section (anchored).
pub fn strict_ordinal(version: PatternSetVersion) -> &'static str {
    match version {
        PatternSetVersion::V3 => r"^(?:PRIMERO|ÚNICO|ÚNICA|PRIMERA|SEGUNDO|1º|1\.|I\.)",
        PatternSetVersion::V4 => {
            r"^(?:PRIMERO|ÚNICO|ÚNICA|PRIMERA|SEGUNDO|Primero|Único|Única|Primera|Segundo|1º|1\.|I\.)[.\-:\s]"
        }
    }
}

/// Where a strict section stops.
pub const STRICT_SENTINELS: &str =
    r"Comuníquese|El presente acuerdo|El presente resolución|Madrid,|Notifíquese|COMISIÓN NACIONAL";

/// Where a flexible section stops.
pub const FLEXIBLE_SENTINELS: &str = r"Comuníquese|El presente|Madrid,|Notifíquese";

/// Keyword directly followed by a decision verb on the same line. V4 only.
pub const INLINE_OPENER: &str =
    r"\b(ACUERDA|RESUELVE)\s+(declarar|desestimar|estimar|archivar|inadmitir|aceptar|informar|tener)";

/// Start of the first operative point.
pub const FIRST_POINT_ORDINAL: &str = r"^(?:ÚNICO|ÚNICA|PRIMERO|PRIMERA|1º|1\.|I\.)";

/// Start of the second operative point.
pub const NEXT_POINT_ORDINAL: &str = r"SEGUNDO|SEGUNDA|2º|2\.|II\.";

// -----------------------------------------------------------------------------
// Judicial verdicts
// -----------------------------------------------------------------------------

pub const VERDICT_MARKER: &str = r"FALLAMOS|FALLO";

pub const VERDICT_TERMINATOR: &str = r"Notifíquese|Así\s+(?:por\s+esta|lo\s+pronunciamos)|firmamos";

// -----------------------------------------------------------------------------
// Whole-document idioms, tried after the tail window comes up empty.
// Case-insensitive, single-line.
// -----------------------------------------------------------------------------

pub const IDIOM_TABLES: [PatternTable; 3] = [
    PatternTable {
        category: Category::Granted,
        patterns: &[
            r"\b(?:se\s+)?estima\s+(?:el\s+)?(?:recurso|conflicto)",
            r"anulamos\s+(?:la\s+)?resolución",
            r"reconocer\s+(?:el\s+)?derecho",
        ],
    },
    PatternTable {
        category: Category::Denied,
        patterns: &[
            r"(?:se\s+)?desestima\s+(?:el\s+)?(?:recurso|conflicto)",
            r"confirmamos\s+(?:la\s+)?resolución",
            r"no\s+ha\s+lugar",
        ],
    },
    PatternTable {
        category: Category::Archived,
        patterns: &[
            r"archivo\s+del\s+procedimiento",
            r"procedimiento\s+(?:ha\s+)?concluido",
            r"declarar?\s+concluso",
            r"informar\s+a\s+.{5,50}\s+que",
            r"dar\s+traslado",
            r"se\s+acomoda\s+a\s+(?:la\s+)?(?:citada\s+)?resolución",
        ],
    },
];

/// Bare verb stems, the very last thing tried. Each entry optionally
/// carries a pattern that must NOT follow the match ("estima que ...",
/// "estima conveniente ..." are opinions, not outcomes).
pub const LAST_RESORT_PROBES: [(Category, &str, Option<&str>); 3] = [
    (Category::Denied, r"\bdesestim(?:ar?|e|ó|ado)\b", None),
    (
        Category::Granted,
        r"\bestim(?:ar?|e|ó|ado)\b",
        Some(r"^\s*(?:que|conveniente)"),
    ),
    (
        Category::Archived,
        r"\b(?:archiv(?:ar?|e|ó|ado)|conclus[oa]|inadmit)\b",
        None,
    ),
];

// -----------------------------------------------------------------------------
// V4 category tables
// -----------------------------------------------------------------------------

static V4_ARCHIVED: &[&str] = &[
    r"declarar?\s+(?:el\s+)?(?:procedimiento\s+)?conclu(?:so|ido)",
    r"declare\s+concluso",
    r"aceptar?\s+(?:de\s+plano\s+)?(?:el\s+)?desistimiento",
    r"aceptar,?\s+conforme\s+al\s+artículo\s+94",
    r"archivar?\s+(?:las\s+|el\s+)?(?:actuaciones|procedimiento)",
    r"archivo\s+(?:de\s+las\s+)?actuaciones",
    r"proceder\s+al\s+archivo",
    r"desaparición\s+(?:sobrevenida\s+)?(?:de\s+(?:su\s+)?)?objeto",
    r"declarar?\s+la\s+desaparición",
    r"pérdida\s+(?:sobrevenida\s+)?(?:del?\s+)?(?:su\s+)?objeto",
    r"falta\s+de\s+objeto",
    r"\binadmit(?:ir|e|en|ida|idas|ido|idos)\b(?:\s+a\s+trámite)?",
    r"tener\s+por\s+desistid[oa]s?",
    r"declarar?\s+la\s+falta\s+de\s+competencia",
    r"falta\s+de\s+competencia\s+de\s+esta\s+comisión",
    r"terminación\s+(?:del\s+)?procedimiento",
    r"declarar?\s+(?:la\s+)?(?:terminación|finalización)",
    r"declarar?\s+finalizado\s+(?:el\s+)?procedimiento",
    r"considerar\s+que.{0,100}no\s+se\s+ha\s+(?:producido|detectado)",
    r"considerar\s+que.{0,50}a\s+la\s+vista.{0,50}no",
    r"no\s+procede\s+(?:la\s+)?(?:suspensión|actuación)",
    r"declarar?\s+(?:la\s+)?infrautilización",
    r"informar\s+a\s+.{5,80}\s+que",
    r"dar\s+traslado",
    r"corregir\s+(?:el\s+)?(?:párrafo|error)",
    r"aclarar\s+(?:que\s+)?(?:la\s+)?(?:referencia|resolución)",
    r"declarar?\s+completa\s+(?:la\s+)?solicitud",
    r"considerar\s+que,?\s+conforme\s+a\s+(?:la\s+)?información",
    r"considerar\s+que\s+(?:el\s+)?(?:reparto|reconocimiento)",
    r"remitir\s+(?:el\s+)?(?:expediente|actuaciones)",
];

static V4_DENIED: &[&str] = &[
    r"desestim(?:ar|an|a|en|e|amos)(?:\s+\S+){0,5}\s+(?:el\s+|los\s+|las\s+|la\s+)?(?:presente\s+)?(?:conflictos?|recursos?|reclamaci(?:ón|ones)|solicitud(?:es)?|pretensi(?:ón|ones))",
    r"desestim(?:ar|an|a|en|e)\s+(?:íntegramente\s+)?(?:el\s+)?(?:presente\s+)?(?:conflicto|recurso|reclamación)",
    r"desestim(?:ar|an|a|en|e)\s+(?:los\s+)?conflictos",
    r"desestim(?:ar|an|a|en|e)\s+(?:las\s+)?(?:reclamaciones|solicitudes|pretensiones)",
    r"(?:conflictos?|recursos?|reclamaci(?:ón|ones)|solicitud(?:es)?)\s+(?:\S+\s+){0,3}desestimad[oa]s?",
    r"(?:ÚNICO|PRIMERO)[.\s:\-]+\s*desestim(?:ar|an|a|en|e)",
    r"no\s+(?:ha\s+)?lugar\s+(?:a\s+)?(?:la\s+)?(?:estimación|reclamación)",
    r"desestimación\s+(?:de\s+)?(?:los?\s+)?(?:conflictos?|recursos?)",
    r"desestimar?,?\s+sin\s+perjuicio",
    r"declarar\s+conforme\s+a\s+derecho\s+(?:la\s+)?(?:denegación|respuesta|comunicación|actuación)",
    r"confirmar?\s+la\s+(?:denegación|actuación|comunicación)",
    r"denegar\s+(?:la\s+)?(?:autorización|petición|solicitud|acceso)",
    r"denegar\s+a\s+\w+",
    r"queda\s+justificada\s+(?:la\s+)?denegación",
    r"(?:fallo|fallamos).{0,100}desestim(?:ar|amos|a)",
    r"(?:fallo|fallamos).{0,100}confirm(?:ar|amos|a)\s+(?:la\s+)?resolución",
];

static V4_GRANTED: &[&str] = &[
    r"\bestim(?:ar|an|a|en|e|amos)(?:,?\s*[^.]{0,100}?,?)?\s*(?:el\s+|los\s+|las\s+|la\s+)?(?:conflictos?|recursos?|reclamaci(?:ón|ones)|solicitud(?:es)?)",
    r"\bestim(?:ar|an|a|en|e)\s+(?:parcialmente\s+)?(?:íntegramente\s+)?(?:el\s+)?(?:presente\s+)?(?:conflicto|recurso|reclamación)",
    r"\bestim(?:ar|an|a|en|e)\s+(?:la\s+)?pretensión",
    r"\bestim(?:ar|an|a|en|e)\s+(?:el\s+)?escrito\s+de\s+disconformidad",
    r"\bestim(?:ar|an|a|en|e)\s+(?:parcialmente\s+)?(?:los\s+)?conflictos",
    r"\bestim(?:ar|an|a|en|e)\s+(?:las\s+)?(?:reclamaciones|solicitudes)",
    r"\bestim(?:ar|an|a|en|e),?\s+exclusivamente",
    r"\bestimación\s+(?:parcial\s+)?(?:de\s+)?(?:los?\s+)?(?:conflictos?|recursos?)",
    r"declarar?\s+(?:la\s+)?(?:nulidad|vulneración)",
    r"ordenar?\s+a\s+.{5,50}\s+(?:que|el\s+cumplimiento)",
    r"dejar?\s+sin\s+efecto",
    r"requerir?\s+a\s+.{5,50}\s+(?:que|para\s+que)",
    r"reconocer\s+(?:el\s+)?derecho",
    r"reconocer\s+a\s+(?:la\s+)?(?:empresa|sociedad|particular|fundación|distribuidora)",
    r#"reconocer\s+a\s+[A-Z"'\[(]"#,
    r"(?:se\s+)?reconoce\s+el\s+derecho",
    r"anul(?:ar|amos)\s+(?:el\s+)?(?:la\s+)?(?:comunicación|resolución|acto|denegación|contenido)",
    r"declarar?\s+no\s+(?:conforme|ajustad[oa]s?)\s+a\s+derecho",
    r"(?:se\s+)?considera\s+sin\s+efecto",
    r"hacer\s+efectivo\s+el\s+derecho",
    r"declarar?\s+el\s+derecho\s+de",
    r"dar\s+conformidad\s+(?:previa\s+)?(?:a\s+)?(?:la\s+)?(?:decisión|operación|solicitud)",
    r"declarar?\s+que\s+(?:las\s+)?condiciones.{5,500}dan\s+(?:adecuado\s+)?cumplimiento",
    r"(?:fallo|fallamos).{0,100}\bestim(?:ar|amos|a)",
    r"(?:fallo|fallamos).{0,100}anul(?:ar|amos|a)\s+(?:la\s+)?resolución",
    r"resolver\s+(?:las\s+)?discrepancias",
    r"resolver\s+(?:el\s+)?conflicto.{0,50}(?:declarando|a\s+favor)",
    r"al\s+objeto\s+de\s+garantizar",
];

// -----------------------------------------------------------------------------
// V3 category tables
// -----------------------------------------------------------------------------

static V3_ARCHIVED: &[&str] = &[
    r"declarar?\s+concluso",
    r"aceptar?\s+(?:de\s+plano\s+)?(?:el\s+)?desistimiento",
    r"archivar?\s+(?:las\s+)?actuaciones",
    r"archivo\s+(?:de\s+las\s+)?actuaciones",
    r"desaparición\s+(?:sobrevenida\s+)?(?:de\s+(?:su\s+)?)?objeto",
    r"declarar?\s+la\s+desaparición",
    r"pérdida\s+(?:sobrevenida\s+)?(?:de\s+)?objeto",
    r"falta\s+de\s+objeto",
    r"\binadmit(?:ir|e|en|ida|ido)\b(?:\s+a\s+trámite)?",
    r"tener\s+por\s+desistid[oa]",
];

static V3_DENIED: &[&str] = &[
    r"desestim(?:ar|an|a|en|e)\s+(?:el\s+)?(?:conflicto|recurso|reclamación|solicitud)",
    r"desestim(?:ar|an|a|en|e)\s+(?:los\s+)?conflictos",
    r"desestim(?:ar|an|a|en|e)\s+(?:las\s+)?(?:reclamaciones|solicitudes)",
    r"no\s+(?:ha\s+)?lugar\s+(?:a\s+)?(?:la\s+)?(?:estimación|reclamación)",
    r"desestimación\s+(?:de\s+)?(?:los?\s+)?(?:conflictos?|recursos?)",
    r"desestimar?,?\s+sin\s+perjuicio",
];

static V3_GRANTED: &[&str] = &[
    r"\bestim(?:ar|an|a|en|e)\s+(?:parcialmente\s+)?(?:el\s+)?(?:conflicto|recurso|reclamación|solicitud)",
    r"\bestim(?:ar|an|a|en|e)\s+(?:parcialmente\s+)?(?:los\s+)?conflictos",
    r"\bestim(?:ar|an|a|en|e)\s+(?:las\s+)?(?:reclamaciones|solicitudes)",
    r"\bestimación\s+(?:parcial\s+)?(?:de\s+)?(?:los?\s+)?(?:conflictos?|recursos?)",
    r"declarar?\s+(?:la\s+)?(?:nulidad|vulneración)",
    r"ordenar?\s+a\s+.{5,50}\s+(?:que|el\s+cumplimiento)",
    r"dejar?\s+sin\s+efecto",
    r"requerir?\s+a\s+.{5,50}\s+(?:que|para\s+que)",
];
