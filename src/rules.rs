// =============================================================================
// rules.rs — THE SECOND OPINION
// =============================================================================
//
// A small, independent classifier made of named rules. Each rule is one
// positive pattern, a category, a priority, and an optional list of veto
// patterns that cancel it when present anywhere in the text.
//
// Rules are evaluated in descending priority; equal priorities keep the
// order they were declared in. The first rule that fires decides.
//
// The rule set is data: the defaults live here, but a JSON file with the
// same shape can replace them wholesale. Every definition is validated when
// the engine is built. A bad regex or a category we can't represent is a
// construction error, not a silent skip at classification time.
//
// Rules never see a whole document. Patterns like "resuelve ... desestim"
// fire on any quoted earlier decision, so the caller hands them either the
// located operative section or a bounded verdict passage (below).
// =============================================================================

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::RuleError;
use crate::models::Category;
use crate::text_scanner::advance_chars;

static RULING_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:FALLO|RESUELVE|RESOLUCIÓN)[:\s]*").expect("valid ruling opener regex")
});
static RULING_CLOSER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)NOTIFÍQUESE").expect("valid ruling closer regex"));
static CONCLUSION_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Por\s+todo\s+lo\s+anterior[,\s]*").expect("valid conclusion opener regex")
});
static CONCLUSION_CLOSER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.").expect("valid conclusion closer regex"));

const RULING_CHARS: (usize, usize) = (100, 2000);
const CONCLUSION_CHARS: (usize, usize) = (50, 1000);

/// The passage rules are evaluated on when no operative section was
/// located: 100 to 2000 characters after FALLO/RESUELVE/RESOLUCIÓN up to
/// "Notifíquese" (or the end), else 50 to 1000 characters after "Por todo
/// lo anterior" up to the next full stop. The last qualifying opener wins.
pub fn verdict_passage(text: &str) -> Option<&str> {
    bounded_passage(text, &RULING_OPENER, &RULING_CLOSER, RULING_CHARS)
        .or_else(|| bounded_passage(text, &CONCLUSION_OPENER, &CONCLUSION_CLOSER, CONCLUSION_CHARS))
}

fn bounded_passage<'t>(
    text: &'t str,
    opener: &Regex,
    closer: &Regex,
    (min_chars, max_chars): (usize, usize),
) -> Option<&'t str> {
    opener
        .find_iter(text)
        .filter_map(|open| {
            let start = open.end();
            let earliest_end = advance_chars(text, start, min_chars)?;
            let end = closer
                .find_at(text, earliest_end)
                .map(|m| m.start())
                .unwrap_or(text.len());
            let passage = &text[start..end];
            if passage.chars().count() > max_chars {
                return None;
            }
            Some(passage.trim()).filter(|p| !p.is_empty())
        })
        .last()
}

/// A rule definition as written by a human.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSpec {
    pub name: String,
    pub pattern: String,
    /// `GRANTED`/`DENIED`/`ARCHIVED` or the source-language labels.
    pub category: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub negative_patterns: Vec<String>,
}

impl RuleSpec {
    pub fn new(name: &str, pattern: &str, category: &str, priority: i32) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            category: category.to_string(),
            priority,
            negative_patterns: Vec::new(),
        }
    }

    pub fn with_negatives(mut self, negatives: &[&str]) -> Self {
        self.negative_patterns = negatives.iter().map(|n| n.to_string()).collect();
        self
    }
}

/// The built-in rule set.
pub fn default_rule_specs() -> Vec<RuleSpec> {
    vec![
        RuleSpec::new(
            "desestimacion_total",
            r"se\s+desestima\s+(la\s+)?(reclamación|solicitud|recurso)",
            "DENIED",
            10,
        ),
        RuleSpec::new("desestimacion_fallo", r"(fallo|resuelve).*desestim", "DENIED", 10),
        RuleSpec::new(
            "estimacion_total",
            r"se\s+estima\s+(la\s+)?(reclamación|solicitud|recurso)",
            "GRANTED",
            10,
        )
        .with_negatives(&[r"no\s+se\s+estima", r"se\s+desestima"]),
        RuleSpec::new("estimacion_fallo", r"(fallo|resuelve).*estim", "GRANTED", 9)
            .with_negatives(&[r"(fallo|resuelve).*desestim"]),
        RuleSpec::new("archivo_actuaciones", r"archivar?\s+(las\s+)?actuaciones", "ARCHIVED", 10),
        RuleSpec::new("archivo_expediente", r"archivo\s+del\s+expediente", "ARCHIVED", 10),
    ]
}

/// A validated, compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    category: Category,
    priority: i32,
    pattern: Regex,
    negatives: Vec<Regex>,
}

fn compile_rule_pattern(rule: &str, pattern: &str) -> Result<Regex, RuleError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| RuleError::InvalidPattern {
            rule: rule.to_string(),
            pattern: pattern.to_string(),
            source,
        })
}

impl Rule {
    pub fn from_spec(spec: &RuleSpec) -> Result<Self, RuleError> {
        let category = match spec.category.parse::<Category>() {
            Ok(Category::Unclassified) | Err(_) => {
                return Err(RuleError::UnsupportedCategory {
                    rule: spec.name.clone(),
                    label: spec.category.clone(),
                })
            }
            Ok(category) => category,
        };

        Ok(Self {
            name: spec.name.clone(),
            category,
            priority: spec.priority,
            pattern: compile_rule_pattern(&spec.name, &spec.pattern)?,
            negatives: spec
                .negative_patterns
                .iter()
                .map(|n| compile_rule_pattern(&spec.name, n))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The positive match, if the rule fires and no veto applies.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        let hit = self.pattern.find(text)?;
        if self.negatives.iter().any(|n| n.is_match(text)) {
            return None;
        }
        Some(hit.as_str())
    }

    pub fn matches(&self, text: &str) -> bool {
        self.find(text).is_some()
    }
}

/// The winning rule for a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    pub rule: String,
    pub category: Category,
    pub matched_text: String,
}

#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    /// Validate and order a rule set.
    pub fn new(specs: &[RuleSpec]) -> Result<Self, RuleError> {
        let mut rules = specs
            .iter()
            .map(Rule::from_spec)
            .collect::<Result<Vec<_>, _>>()?;
        // Stable: equal priorities keep declaration order.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self { rules })
    }

    pub fn with_defaults() -> Result<Self, RuleError> {
        Self::new(&default_rule_specs())
    }

    /// Load a JSON array of [`RuleSpec`]s.
    pub fn from_json_file(path: &Path) -> Result<Self, RuleError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let specs: Vec<RuleSpec> = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), rules = specs.len(), "Loaded rule definitions");
        Self::new(&specs)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Category of the first rule that fires.
    pub fn classify(&self, text: &str) -> Option<Category> {
        self.classify_match(text).map(|hit| hit.category)
    }

    /// The first rule that fires, with the text its positive pattern matched.
    pub fn classify_match(&self, text: &str) -> Option<RuleHit> {
        self.rules.iter().find_map(|rule| {
            rule.find(text).map(|matched| RuleHit {
                rule: rule.name.clone(),
                category: rule.category,
                matched_text: matched.to_string(),
            })
        })
    }

    /// The first firing rule's category plus the names of every rule
    /// that fires, in evaluation order.
    pub fn classify_with_details(&self, text: &str) -> (Option<Category>, Vec<String>) {
        let fired: Vec<&Rule> = self.rules.iter().filter(|r| r.matches(text)).collect();
        (
            fired.first().map(|r| r.category),
            fired.iter().map(|r| r.name.clone()).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> RuleEngine {
        RuleEngine::with_defaults().unwrap()
    }

    #[test]
    fn test_total_denial() {
        assert_eq!(defaults().classify("Se desestima la reclamación"), Some(Category::Denied));
    }

    #[test]
    fn test_ruling_rules() {
        let engine = defaults();
        assert_eq!(engine.classify("RESUELVE: estimar el conflicto"), Some(Category::Granted));
        assert_eq!(engine.classify("RESUELVE: desestimar el conflicto"), Some(Category::Denied));
    }

    #[test]
    fn test_vetoed_grant_does_not_fire() {
        let text = "se estima la solicitud en parte, pero se desestima el recurso";
        assert_eq!(defaults().classify(text), None);
    }

    #[test]
    fn test_no_rule_applies() {
        assert_eq!(defaults().classify("nada que ver"), None);
        assert_eq!(defaults().classify(""), None);
    }

    #[test]
    fn test_classify_with_details_lists_every_firing_rule() {
        let (category, fired) =
            defaults().classify_with_details("Se desestima la solicitud y archivar las actuaciones");
        assert_eq!(category, Some(Category::Denied));
        assert_eq!(fired, vec!["desestimacion_total", "archivo_actuaciones"]);
    }

    #[test]
    fn test_classify_match_reports_rule_and_text() {
        let hit = defaults().classify_match("Procede archivar las actuaciones.").unwrap();
        assert_eq!(hit.rule, "archivo_actuaciones");
        assert_eq!(hit.category, Category::Archived);
        assert_eq!(hit.matched_text, "archivar las actuaciones");
    }

    #[test]
    fn test_priority_then_declaration_order() {
        let specs = vec![
            RuleSpec::new("low", "recurso", "GRANTED", 1),
            RuleSpec::new("high_a", "recurso", "DENIED", 5),
            RuleSpec::new("high_b", "recurso", "ARCHIVED", 5),
        ];
        let engine = RuleEngine::new(&specs).unwrap();
        let names: Vec<&str> = engine.rules().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["high_a", "high_b", "low"]);
        assert_eq!(engine.classify("el recurso"), Some(Category::Denied));
    }

    #[test]
    fn test_partial_grant_category_is_rejected() {
        let specs = vec![RuleSpec::new("estimacion_parcial", r"estim(ar|a)\s+parcialmente", "ESTIMADO_PARCIAL", 8)];
        let err = RuleEngine::new(&specs).unwrap_err();
        assert!(matches!(err, RuleError::UnsupportedCategory { ref label, .. } if label == "ESTIMADO_PARCIAL"));
    }

    #[test]
    fn test_unclassified_is_not_a_rule_category() {
        let specs = vec![RuleSpec::new("x", "x", "UNCLASSIFIED", 1)];
        assert!(matches!(
            RuleEngine::new(&specs),
            Err(RuleError::UnsupportedCategory { .. })
        ));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let specs = vec![RuleSpec::new("broken", "(fallo", "DENIED", 1)];
        assert!(matches!(
            RuleEngine::new(&specs),
            Err(RuleError::InvalidPattern { ref rule, .. }) if rule == "broken"
        ));
    }

    #[test]
    fn test_specs_deserialize_from_json() {
        let json = r#"[
            {"name": "a", "pattern": "desestim", "category": "DESESTIMADO", "priority": 3},
            {"name": "b", "pattern": "estim", "category": "ESTIMADO",
             "negative_patterns": ["desestim"]}
        ]"#;
        let specs: Vec<RuleSpec> = serde_json::from_str(json).unwrap();
        assert_eq!(specs[1].priority, 0);
        let engine = RuleEngine::new(&specs).unwrap();
        assert_eq!(engine.classify("se desestima"), Some(Category::Denied));
        assert_eq!(engine.classify("se estima"), Some(Category::Granted));
    }

    const DENIAL: &str = "Se desestima el recurso interpuesto por la sociedad reclamante contra la \
                          comunicación de la distribuidora de la zona.";
    const GRANT: &str = "Se estima el recurso interpuesto por la sociedad reclamante contra la \
                         comunicación de la distribuidora de la zona.";

    #[test]
    fn test_verdict_passage_runs_to_notification() {
        let text = format!("Antecedentes de hecho.\nFALLO:\n{DENIAL}\nNotifíquese a las partes.");
        assert_eq!(verdict_passage(&text), Some(DENIAL));
    }

    #[test]
    fn test_latest_verdict_passage_wins() {
        let text = format!("FALLO:\n{DENIAL}\nNotifíquese.\nFALLO:\n{GRANT}\nNotifíquese.");
        assert_eq!(verdict_passage(&text), Some(GRANT));
    }

    #[test]
    fn test_conclusion_passage() {
        let text = "Vistos los antecedentes. Por todo lo anterior, se desestima la reclamación \
                    presentada por la distribuidora. Firmado.";
        assert_eq!(
            verdict_passage(text),
            Some("se desestima la reclamación presentada por la distribuidora")
        );
    }

    #[test]
    fn test_short_or_missing_passage() {
        assert_eq!(verdict_passage("FALLO: se desestima."), None);
        assert_eq!(verdict_passage("Visto lo anterior, se desestima la reclamación."), None);
        assert_eq!(verdict_passage(""), None);
    }
}
