// =============================================================================
// parties.rs — WHO IS FIGHTING WHOM
// =============================================================================
//
// Case titles follow no grammar. Some say "Conflicto de acceso instado por X
// frente a Y", some say "CATR X - Y", some say "X / Y", and some just name
// one company and hope you know the rest. This module guesses the claimant
// and the respondent from a title and folds the big grid operators' many
// spellings onto one name each.
//
// It is a heuristic companion to the classifier, not part of it. When it
// guesses wrong the decision is still right.
// =============================================================================

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Claimant and respondent as read off a case title. Either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parties {
    pub claimant: String,
    pub respondent: String,
}

impl Parties {
    fn new(claimant: &str, respondent: &str) -> Self {
        Self {
            claimant: normalize_company(claimant),
            respondent: normalize_company(respondent),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.claimant.is_empty() && self.respondent.is_empty()
    }
}

/// Spellings seen in titles, mapped to the name we report. Checked in
/// order, so longer and more specific spellings come first.
const COMPANY_ALIASES: &[(&[&str], &str)] = &[
    (
        &[
            "RED ELECTRICA DE ESPANA",
            "RED ELECTRICA DE ESPAÑA",
            "RED ELÉCTRICA DE ESPAÑA",
            "REE.",
        ],
        "REE",
    ),
    (
        &[
            "EDISTRIBUCIÓN REDES DIGITALES",
            "EDISTRIBUCION REDES DIGITALES",
            "E-DISTRIBUCIÓN REDES DIGITALES",
            "E-DISTRIBUCION REDES DIGITALES",
            "EDISTRIBUCIÓN",
            "EDISTRIBUCION",
        ],
        "E-DISTRIBUCIÓN",
    ),
    (
        &[
            "I-DE REDES ELÉCTRICAS INTELIGENTES",
            "I-DE REDES ELECTRICAS INTELIGENTES",
        ],
        "I-DE",
    ),
    (
        &["UFD DISTRIBUCIÓN ELECTRICIDAD", "UFD DISTRIBUCION ELECTRICIDAD"],
        "UFD",
    ),
    (
        &["IBERDROLA DISTRIBUCIÓN ELÉCTRICA", "IBERDROLA DISTRIBUCION ELECTRICA"],
        "IBERDROLA DISTRIBUCIÓN",
    ),
    (&["IBERDROLA S"], "IBERDROLA"),
    (
        &[
            "ENAGÁS TRANSPORTE Y ENAGÁS GTS",
            "ENAGÁS TRANSPORTES",
            "ENAGÁS TRANSPORTE",
            "ENAGÁS GTS",
            "ENAGAS S",
            "ENAGAS",
        ],
        "ENAGÁS",
    ),
    (
        &["ENDESA DISTRIBUCIÓN ELÉCTRICA", "ENDESA DISTRIBUCIÓN"],
        "ENDESA",
    ),
    (
        &["NATURGY IBERIA", "GAS NATURAL FENOSA", "UNIÓN FENOSA DISTRIBUCIÓN"],
        "NATURGY",
    ),
    (&["VIESGO DISTRIBUCIÓN ELÉCTRICA"], "VIESGO"),
    (&["IDE"], "I-DE"),
];

/// Operators a title may name without any separator grammar at all.
const KNOWN_RESPONDENTS: &[&str] = &[
    "REE",
    "UFD",
    "I-DE",
    "E-DISTRIBUCIÓN",
    "IBERDROLA",
    "ENDESA",
    "ENAGÁS",
    "VIESGO",
];

fn build(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("party pattern is a valid regex")
}

/// A spelling matches as a whole phrase, not inside a longer word.
static ALIAS_MATCHERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    COMPANY_ALIASES
        .iter()
        .flat_map(|(spellings, canonical)| {
            spellings.iter().map(move |s| {
                (build(&format!(r"(?:^|\W){}(?:\W|$)", regex::escape(s))), *canonical)
            })
        })
        .collect()
});

/// "Trailing text from the operator's name onwards", per operator.
static RESPONDENT_TAILS: LazyLock<Vec<(&'static str, Regex, Regex)>> = LazyLock::new(|| {
    KNOWN_RESPONDENTS
        .iter()
        .map(|name| {
            let escaped = regex::escape(name);
            (
                *name,
                build(&format!(r"(?:^|\W){escaped}(?:\W|$)")),
                build(&format!(r"\s*[-/]?\s*\b{escaped}.*$")),
            )
        })
        .collect()
});

static YEAR_ONLY: LazyLock<Regex> = LazyLock::new(|| build(r"^\d{4}-?\s*\.?$"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| build(r"\s+"));
static SL_SUFFIX: LazyLock<Regex> = LazyLock::new(|| build(r"\s*S\.?L\.?U?\.?\s*$"));
static SA_SUFFIX: LazyLock<Regex> = LazyLock::new(|| build(r"\s*S\.?A\.?U?\.?\s*$"));

static FILED_BY: LazyLock<Regex> = LazyLock::new(|| {
    build(
        r"(?:INSTADO|INTERPUESTO|PRESENTADO)\s+POR\s+(.+?)\s+(?:FRENTE\s+A|CONTRA)\s+(.+?)(?:\s*[-,.]|$)",
    )
});
static RESPONDENT_QUALIFIER: LazyLock<Regex> =
    LazyLock::new(|| build(r"\s+(?:EN|PARA|POR|SOBRE)\b|\s+RELAT"));
static VERSUS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        build(r"\s+VS\.?\s+"),
        build(r"\s+FRENTE\s+A\s+"),
        build(r"\s+CONTRA\s+"),
    ]
});
static CASE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| build(r"^(?:CATR|CONFLICTO(?:\s+DE\s+ACCESO(?:\s+A\s+LA\s+RED)?)?)\s+"));
static TRAILING_DETAIL: LazyLock<Regex> = LazyLock::new(|| build(r"\s+[-(]"));
static CATR_PREFIX: LazyLock<Regex> = LazyLock::new(|| build(r"^CATR\s+"));
static CATR_PAIR: LazyLock<Regex> =
    LazyLock::new(|| build(r"^CATR\s+(.+?)\s{2,}-\s*(.+?)(?:\s+[-(]|$)"));
static NUMBERED_SLASH: LazyLock<Regex> = LazyLock::new(|| build(r"/\s*\d"));

/// Fold a company name onto its canonical spelling.
///
/// Known operators map to their short name; anything else loses a trailing
/// S.L./S.A./S.L.U./S.A.U. Bare years (a common scraping artefact) become
/// the empty string.
pub fn normalize_company(name: &str) -> String {
    let collapsed = WHITESPACE.replace_all(name.trim(), " ");
    if collapsed.is_empty() || YEAR_ONLY.is_match(&collapsed) {
        return String::new();
    }

    if let Some((_, canonical)) = ALIAS_MATCHERS.iter().find(|(re, _)| re.is_match(&collapsed)) {
        return canonical.to_string();
    }

    let stripped = SL_SUFFIX.replace(&collapsed, "");
    let stripped = SA_SUFFIX.replace(&stripped, "");
    stripped.trim().to_string()
}

/// Read claimant and respondent off a case title.
pub fn extract_parties(title: &str) -> Parties {
    let title = title.trim();
    if title.is_empty() {
        return Parties::default();
    }

    // "... instado por X frente a Y, en relación con ..."
    if let Some(caps) = FILED_BY.captures(title) {
        let respondent = RESPONDENT_QUALIFIER
            .split(&caps[2])
            .next()
            .unwrap_or_default();
        return Parties::new(&caps[1], respondent);
    }

    // "X vs. Y", "X frente a Y", "X contra Y"
    for separator in VERSUS.iter() {
        let mut halves = separator.splitn(title, 2);
        if let (Some(left), Some(right)) = (halves.next(), halves.next()) {
            let claimant = CASE_PREFIX.replace(left, "");
            let respondent = TRAILING_DETAIL.split(right).next().unwrap_or_default();
            return Parties::new(&claimant, respondent);
        }
    }

    // "CATR X  - Y (expediente ...)"
    if CATR_PREFIX.is_match(title) {
        if let Some(caps) = CATR_PAIR.captures(title) {
            return Parties::new(&caps[1], &caps[2]);
        }
        for (name, mentions, tail) in RESPONDENT_TAILS.iter() {
            if mentions.is_match(title) {
                let claimant = CATR_PREFIX.replace(title, "");
                let claimant = tail.replace(&claimant, "");
                return Parties::new(&claimant, name);
            }
        }
    }

    // "X / Y", but not "expediente 12/2021"
    if title.contains('/') && !NUMBERED_SLASH.is_match(title) {
        for separator in [" / ", "/ ", " /", "/"] {
            if let Some(idx) = title.find(separator) {
                let claimant = &title[..idx];
                let mut respondent = &title[idx + separator.len()..];
                for cut in [" -", " ("] {
                    if let Some(end) = respondent.find(cut) {
                        respondent = &respondent[..end];
                    }
                }
                return Parties::new(claimant, respondent);
            }
        }
    }

    // A known operator named anywhere is assumed to be the respondent.
    for (name, mentions, tail) in RESPONDENT_TAILS.iter() {
        if mentions.is_match(title) {
            let claimant = tail.replace(title, "");
            let claimant = CASE_PREFIX.replace(&claimant, "");
            if !claimant.trim().is_empty() {
                return Parties::new(&claimant, name);
            }
        }
    }

    Parties::new(&CASE_PREFIX.replace(title, ""), "")
}
