// =============================================================================
// engine.rs — ONE DOCUMENT IN, ONE VERDICT OUT
// =============================================================================
//
// The consolidated classifier. Normalize, locate the operative section,
// match its first point (HIGH), then the whole section (MEDIUM). No section
// at all? Hand the document to the fallback cascade (LOW).
//
// Alongside it, optionally, is the rule engine. Rules only ever see the
// operative section, or a bounded verdict passage when there is none, and
// they never overrule a match in the first operative point. Rules-first
// means: before the section body, before the fallback cascade.
//
// Classification is total. Every &str gets a fully populated result, and
// the same input always gets the same result. Both engines are immutable
// after construction and can be shared across threads as-is.
// =============================================================================

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::category_matcher::CategoryMatcher;
use crate::config::Config;
use crate::error::{EngineError, PatternError};
use crate::fallback::{FallbackResolver, FallbackTier};
use crate::models::{Category, ClassificationResult, Confidence, PatternSetVersion};
use crate::normalizer::normalize;
use crate::rules::{verdict_passage, RuleEngine, RuleHit};
use crate::section_locator::{OperativeSection, SectionLocator};
use crate::text_scanner::{head_chars, keyword_profile};

/// Characters of the first point kept as an audit trail when a located
/// section matches nothing.
const UNMATCHED_EXCERPT_CHARS: usize = 100;

/// How a result was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionPath {
    /// Matched in the first operative point.
    FirstPoint,
    /// Matched elsewhere in the operative section.
    Section,
    /// Section located, nothing matched inside it.
    SectionUnmatched,
    /// No section; a fallback tier answered.
    Fallback(FallbackTier),
    /// A rule of the rule engine decided. Carries the rule name.
    Rule(String),
    /// Nothing matched anywhere.
    Exhausted,
}

/// A result plus the path that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub result: ClassificationResult,
    pub path: DecisionPath,
}

/// The pattern-table classifier.
pub struct ClassificationEngine {
    version: PatternSetVersion,
    locator: SectionLocator,
    matcher: CategoryMatcher,
    fallback: FallbackResolver,
}

impl ClassificationEngine {
    /// Compile every table of `version`. Fails only on a broken built-in
    /// pattern.
    pub fn new(version: PatternSetVersion) -> Result<Self, PatternError> {
        Self::with_tail_window(version, version.default_tail_window())
    }

    pub fn with_tail_window(
        version: PatternSetVersion,
        tail_window: usize,
    ) -> Result<Self, PatternError> {
        let matcher = CategoryMatcher::new(version)?;
        Ok(Self {
            version,
            locator: SectionLocator::new(version)?,
            fallback: FallbackResolver::new(matcher.clone(), tail_window)?,
            matcher,
        })
    }

    pub fn version(&self) -> PatternSetVersion {
        self.version
    }

    /// Classify raw document text.
    pub fn classify(&self, text: &str) -> ClassificationResult {
        self.decide(text).result
    }

    /// Classify raw document text, reporting the decision path.
    pub fn decide(&self, text: &str) -> Decision {
        let text = normalize(text);
        let section = self.locate_normalized(&text);
        self.decide_normalized(&text, section.as_ref(), None)
    }

    /// Locate the operative section of already-normalized text.
    pub fn locate_normalized(&self, text: &str) -> Option<OperativeSection> {
        self.locator.locate(text)
    }

    fn decide_normalized(
        &self,
        text: &str,
        section: Option<&OperativeSection>,
        rules: Option<&RuleEngine>,
    ) -> Decision {
        match section {
            Some(section) => self.decide_in_section(section, rules),
            None => self.decide_without_section(text, rules),
        }
    }

    fn decide_in_section(&self, section: &OperativeSection, rules: Option<&RuleEngine>) -> Decision {
        let first_point = self.locator.first_point(&section.content);

        if let Some(hit) = self.matcher.find(first_point) {
            debug!(category = %hit.category, tier = ?section.tier, "Matched in first point");
            return Decision {
                result: ClassificationResult::new(hit.category, Confidence::High, hit.matched_text, true),
                path: DecisionPath::FirstPoint,
            };
        }

        if let Some(hit) = rules.and_then(|r| r.classify_match(&section.content)) {
            return rule_decision(hit, true);
        }

        if let Some(hit) = self.matcher.find(&section.content) {
            debug!(category = %hit.category, tier = ?section.tier, "Matched in section body");
            return Decision {
                result: ClassificationResult::new(hit.category, Confidence::Medium, hit.matched_text, true),
                path: DecisionPath::Section,
            };
        }

        debug!(
            label = %section.label,
            dominant = ?keyword_profile(&section.content).dominant(),
            "Section found but no category matched"
        );
        Decision {
            result: ClassificationResult::new(
                Category::Unclassified,
                Confidence::Low,
                head_chars(first_point, UNMATCHED_EXCERPT_CHARS),
                true,
            ),
            path: DecisionPath::SectionUnmatched,
        }
    }

    fn decide_without_section(&self, text: &str, rules: Option<&RuleEngine>) -> Decision {
        warn!(
            chars = text.chars().count(),
            "No RESUELVE/ACUERDA section found, using fallback"
        );

        if let Some(hit) = rules.and_then(|r| verdict_passage(text).and_then(|p| r.classify_match(p))) {
            return rule_decision(hit, false);
        }

        let (result, tier) = self.fallback.resolve_traced(text);
        let path = match tier {
            Some(tier) => DecisionPath::Fallback(tier),
            None => {
                let profile = keyword_profile(text);
                debug!(
                    dominant = ?profile.dominant(),
                    total = profile.total(),
                    "Document left unclassified"
                );
                DecisionPath::Exhausted
            }
        };
        Decision { result, path }
    }
}

/// MEDIUM inside a located section, LOW on a verdict passage.
fn rule_decision(hit: RuleHit, section_found: bool) -> Decision {
    let confidence = if section_found { Confidence::Medium } else { Confidence::Low };
    debug!(rule = %hit.rule, category = %hit.category, section_found, "Rule engine decided");
    Decision {
        result: ClassificationResult::new(hit.category, confidence, hit.matched_text, section_found),
        path: DecisionPath::Rule(hit.rule),
    }
}

/// The ensemble: pattern tables with the rule engine slotted in after the
/// first operative point.
pub struct DecisionEngine {
    primary: ClassificationEngine,
    rules: Option<RuleEngine>,
}

impl DecisionEngine {
    pub fn new(primary: ClassificationEngine, rules: Option<RuleEngine>) -> Self {
        Self { primary, rules }
    }

    /// Pattern tables only.
    pub fn primary_only(version: PatternSetVersion) -> Result<Self, PatternError> {
        Ok(Self::new(ClassificationEngine::new(version)?, None))
    }

    /// Build from configuration: pattern set, tail window, rules-first and
    /// an optional rule file.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let primary =
            ClassificationEngine::with_tail_window(config.pattern_set, config.effective_tail_window())?;
        let rules = if config.rules_first {
            Some(match &config.rules_path {
                Some(path) => RuleEngine::from_json_file(path)?,
                None => RuleEngine::with_defaults()?,
            })
        } else {
            None
        };
        debug!(
            pattern_set = %config.pattern_set,
            rules_first = rules.is_some(),
            "Decision engine ready"
        );
        Ok(Self::new(primary, rules))
    }

    pub fn primary(&self) -> &ClassificationEngine {
        &self.primary
    }

    pub fn classify(&self, text: &str) -> ClassificationResult {
        self.decide(text).result
    }

    pub fn decide(&self, text: &str) -> Decision {
        let normalized = normalize(text);
        let section = self.primary.locate_normalized(&normalized);
        self.primary
            .decide_normalized(&normalized, section.as_ref(), self.rules.as_ref())
    }
}

/// Classify many in-memory documents in parallel. Output order matches
/// input order.
pub fn classify_batch(engine: &DecisionEngine, texts: &[&str]) -> Vec<ClassificationResult> {
    texts.par_iter().map(|text| engine.classify(text)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::JUDICIAL_TAG;

    fn engine() -> ClassificationEngine {
        ClassificationEngine::new(PatternSetVersion::V4).unwrap()
    }

    fn ensemble() -> DecisionEngine {
        DecisionEngine::new(engine(), Some(RuleEngine::with_defaults().unwrap()))
    }

    #[test]
    fn test_confirming_a_denial_without_section() {
        let result = engine().classify("confirmar la denegación de acceso a la red");
        assert_eq!(result.category, Category::Denied);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(!result.section_found);
    }

    #[test]
    fn test_annulment_in_first_point_is_granted_high() {
        let text = "RESUELVE:\nPRIMERO. Anular la resolución impugnada y reconocer el derecho \
                    de la reclamante.\nNotifíquese.";
        let result = engine().classify(text);
        assert_eq!(result.category, Category::Granted);
        assert_eq!(result.confidence, Confidence::High);
        assert!(result.section_found);
    }

    #[test]
    fn test_singular_and_plural_denials_in_section() {
        for point in ["ÚNICO. Se desestima el conflicto.", "ÚNICO. Se desestiman los conflictos acumulados."] {
            let text = format!("RESUELVE:\n{point}\nNotifíquese.");
            let result = engine().classify(&text);
            assert_eq!(result.category, Category::Denied, "{point}");
            assert_eq!(result.confidence, Confidence::High);
        }
    }

    #[test]
    fn test_last_resuelve_decides() {
        let text = "La resolución recurrida\nRESUELVE:\nPRIMERO. Estimar el recurso.\nNotifíquese.\n\
                    Fundamentos de derecho.\nRESUELVE:\nPRIMERO. Desestimar el recurso.\nComuníquese.";
        let result = engine().classify(text);
        assert_eq!(result.category, Category::Denied);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_fallback_exhaustion() {
        let result = engine().classify("Documento sin contenido decisorio alguno.");
        assert_eq!(result, ClassificationResult::new(Category::Unclassified, Confidence::Low, "", false));
    }

    #[test]
    fn test_judicial_verdict() {
        let decision = engine().decide("FALLAMOS: Que debemos estimar y estimamos el recurso");
        assert_eq!(decision.result.category, Category::Granted);
        assert_eq!(decision.result.confidence, Confidence::Low);
        assert!(decision.result.matched_text.starts_with(JUDICIAL_TAG));
        assert_eq!(decision.path, DecisionPath::Fallback(FallbackTier::Judicial));
    }

    #[test]
    fn test_archival_precedence_in_first_point() {
        let text = "RESUELVE:\nPRIMERO. Desestimar la solicitud y archivar las actuaciones.\nNotifíquese.";
        let result = engine().classify(text);
        assert_eq!(result.category, Category::Archived);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_section_body_match_is_medium() {
        let text = "RESUELVE:\nPRIMERO. Tener por recibida la documentación aportada.\n\
                    SEGUNDO. Desestimar el recurso interpuesto.\nNotifíquese.";
        let decision = engine().decide(text);
        assert_eq!(decision.result.category, Category::Denied);
        assert_eq!(decision.result.confidence, Confidence::Medium);
        assert_eq!(decision.path, DecisionPath::Section);
    }

    #[test]
    fn test_section_found_but_unmatched() {
        let text = "RESUELVE:\nPRIMERO. Tomar conocimiento del informe remitido por la entidad.\nNotifíquese.";
        let decision = engine().decide(text);
        assert_eq!(decision.path, DecisionPath::SectionUnmatched);
        assert_eq!(decision.result.category, Category::Unclassified);
        assert_eq!(decision.result.confidence, Confidence::Low);
        assert!(decision.result.section_found);
        assert_eq!(
            decision.result.matched_text,
            "PRIMERO. Tomar conocimiento del informe remitido por la entidad."
        );
    }

    #[test]
    fn test_empty_input() {
        let result = engine().classify("");
        assert_eq!(result, ClassificationResult::unclassified());
    }

    #[test]
    fn test_located_section_is_never_low_when_classified() {
        let samples = [
            "RESUELVE:\nPRIMERO. Estimar el conflicto.\nNotifíquese.",
            "ACUERDA\nÚNICO.- Declarar concluso el procedimiento.\nComuníquese.",
            "RESUELVE:\nPRIMERO. Tener por recibido.\nSEGUNDO. Denegar la autorización solicitada.\nNotifíquese.",
        ];
        for text in samples {
            let result = engine().classify(text);
            assert!(result.section_found, "{text}");
            assert!(result.is_classified(), "{text}");
            assert!(result.confidence >= Confidence::Medium, "{text}");
        }
    }

    #[test]
    fn test_idempotent_and_normalization_invariant() {
        let e = engine();
        let samples = [
            "21\nRESUELVE:\r\nPRIMERO.  –  Desestimar   el recurso.\r\nNotifíquese.",
            "FALLAMOS: Que debemos estimar y estimamos el recurso",
            "nada",
            "",
        ];
        for text in samples {
            let first = e.classify(text);
            assert_eq!(e.classify(text), first);
            assert_eq!(e.classify(&normalize(text)), first);
        }
    }

    #[test]
    fn test_v3_tables() {
        let v3 = ClassificationEngine::new(PatternSetVersion::V3).unwrap();
        let result = v3.classify("RESUELVE:\nPRIMERO. Desestimar el conflicto.\nNotifíquese.");
        assert_eq!(result.category, Category::Denied);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(v3.version(), PatternSetVersion::V3);
    }

    #[test]
    fn test_rules_first_without_section_is_low() {
        let decision = ensemble().decide(
            "Vistos los antecedentes. Por todo lo anterior, se desestima la reclamación \
             presentada por la distribuidora. Firmado.",
        );
        assert_eq!(decision.path, DecisionPath::Rule("desestimacion_total".to_string()));
        assert_eq!(decision.result.category, Category::Denied);
        assert_eq!(decision.result.confidence, Confidence::Low);
        assert_eq!(decision.result.matched_text, "se desestima la reclamación");
        assert!(!decision.result.section_found);
    }

    #[test]
    fn test_rules_first_with_section_is_medium() {
        let decision = ensemble().decide(
            "ACUERDA\nPRIMERO.- Tener por recibida la documentación aportada.\n\
             SEGUNDO.- Proceder al archivo del expediente.\nComuníquese.",
        );
        assert_eq!(decision.path, DecisionPath::Rule("archivo_expediente".to_string()));
        assert_eq!(decision.result.category, Category::Archived);
        assert_eq!(decision.result.confidence, Confidence::Medium);
        assert!(decision.result.section_found);
    }

    #[test]
    fn test_ensemble_defers_to_primary_when_no_rule_fires() {
        let decision = ensemble().decide("RESUELVE:\nPRIMERO. Desestimar el recurso.\nNotifíquese.");
        assert_eq!(decision.path, DecisionPath::FirstPoint);
        assert_eq!(decision.result.confidence, Confidence::High);
    }

    #[test]
    fn test_rules_ignore_wording_outside_the_section() {
        let text = "ANTECEDENTES\nLa resolución de 2022 resuelve desestimar la solicitud...\n\
                    RESUELVE:\nPRIMERO. Estimar el conflicto interpuesto...\nNotifíquese.";
        let decision = ensemble().decide(text);
        assert_eq!(decision.path, DecisionPath::FirstPoint);
        assert_eq!(decision.result.category, Category::Granted);
        assert_eq!(decision.result.confidence, Confidence::High);
    }

    #[test]
    fn test_first_point_outranks_rules_inside_the_section() {
        let text = "RESUELVE:\nPRIMERO. Confirmar la denegación de acceso a la red comunicada por la \
                    distribuidora, que resuelve estimar parcialmente.\nNotifíquese.";
        let decision = ensemble().decide(text);
        assert_eq!(decision.path, DecisionPath::FirstPoint);
        assert_eq!(decision.result.category, Category::Denied);
        assert_eq!(decision.result.confidence, Confidence::High);
    }

    #[test]
    fn test_default_engine_uses_last_inline_section() {
        let engine = DecisionEngine::from_config(&Config::default()).unwrap();
        let text = "Antecedentes.\n\
                    La Sala RESUELVE desestimar el recurso de alzada interpuesto por la sociedad \
                    frente a la distribuidora de la zona.\nNotifíquese.\n\
                    Fundamentos de derecho.\n\
                    La Comisión RESUELVE estimar el recurso interpuesto por la reclamante frente a \
                    la distribuidora de la zona.\nNotifíquese.";
        let decision = engine.decide(text);
        assert_eq!(decision.path, DecisionPath::FirstPoint);
        assert_eq!(decision.result.category, Category::Granted);
        assert_eq!(decision.result.confidence, Confidence::High);
        assert!(decision.result.section_found);
    }

    #[test]
    fn test_default_engine_keeps_section_properties() {
        let engine = DecisionEngine::from_config(&Config::default()).unwrap();
        let cases = [
            (
                "La resolución recurrida\nRESUELVE:\nPRIMERO. Estimar el recurso.\nNotifíquese.\n\
                 Fundamentos de derecho.\nRESUELVE:\nPRIMERO. Desestimar el recurso.\nComuníquese.",
                Category::Denied,
            ),
            (
                "RESUELVE:\nPRIMERO. Desestimar la solicitud y archivar las actuaciones.\nNotifíquese.",
                Category::Archived,
            ),
            (
                "RESUELVE:\nPRIMERO. Confirmar la denegación de acceso a la red.\nNotifíquese.",
                Category::Denied,
            ),
            (
                "RESUELVE:\nPRIMERO. Anular la resolución impugnada y reconocer el derecho \
                 de la reclamante.\nNotifíquese.",
                Category::Granted,
            ),
            ("RESUELVE:\nÚNICO. Se desestima el conflicto.\nNotifíquese.", Category::Denied),
            ("RESUELVE:\nÚNICO. Se desestiman los conflictos acumulados.\nNotifíquese.", Category::Denied),
        ];
        for (text, expected) in cases {
            let decision = engine.decide(text);
            assert_eq!(decision.path, DecisionPath::FirstPoint, "{text}");
            assert_eq!(decision.result.category, expected, "{text}");
            assert_eq!(decision.result.confidence, Confidence::High, "{text}");
        }
    }

    #[test]
    fn test_default_engine_keeps_fallback_properties() {
        let engine = DecisionEngine::from_config(&Config::default()).unwrap();

        let judicial = engine.decide("FALLAMOS: Que debemos estimar y estimamos el recurso");
        assert_eq!(judicial.path, DecisionPath::Fallback(FallbackTier::Judicial));
        assert_eq!(judicial.result.category, Category::Granted);
        assert_eq!(judicial.result.confidence, Confidence::Low);

        let nothing = engine.classify("Documento sin contenido decisorio alguno.");
        assert_eq!(nothing, ClassificationResult::new(Category::Unclassified, Confidence::Low, "", false));
        assert_eq!(engine.classify(""), ClassificationResult::unclassified());
    }

    #[test]
    fn test_from_config_without_rules() {
        let config = Config {
            rules_first: false,
            ..Config::default()
        };
        let engine = DecisionEngine::from_config(&config).unwrap();
        let decision = engine.decide("Visto lo anterior, se desestima la reclamación presentada.");
        assert!(matches!(decision.path, DecisionPath::Fallback(_)));
        assert_eq!(decision.result.category, Category::Denied);
    }

    #[test]
    fn test_classify_batch_preserves_order() {
        let engine = DecisionEngine::primary_only(PatternSetVersion::V4).unwrap();
        let texts = [
            "RESUELVE:\nPRIMERO. Estimar el conflicto.\nNotifíquese.",
            "",
            "RESUELVE:\nPRIMERO. Archivar las actuaciones.\nNotifíquese.",
        ];
        let results = classify_batch(&engine, &texts);
        let categories: Vec<Category> = results.iter().map(|r| r.category).collect();
        assert_eq!(
            categories,
            vec![Category::Granted, Category::Unclassified, Category::Archived]
        );
    }
}
