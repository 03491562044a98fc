// =============================================================================
// category_matcher.rs — FIRST MATCH WINS
// =============================================================================
//
// Given a scope (a first point, a whole section, a verdict window, a tail),
// walk the category groups in precedence order and return the first pattern
// that fires, together with the literal text it fired on.
//
// There is no scoring and there is no voting. The precedence order IS the
// disambiguation policy: a passage that both archives and denies is archived.
// =============================================================================

use regex::Regex;

use crate::error::PatternError;
use crate::models::{Category, PatternSetVersion};
use crate::patterns::{self, PatternFlags, PatternTable};

/// The category and the exact substring that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMatch {
    pub category: Category,
    pub matched_text: String,
}

/// Ordered category groups, compiled once.
#[derive(Debug, Clone)]
pub struct CategoryMatcher {
    groups: Vec<(Category, Vec<Regex>)>,
}

impl CategoryMatcher {
    /// The category tables for a pattern-set version.
    pub fn new(version: PatternSetVersion) -> Result<Self, PatternError> {
        Self::from_tables(&patterns::category_tables(version), patterns::category_flags(version))
    }

    /// Any ordered set of tables. Order of `tables` is evaluation order.
    pub fn from_tables(tables: &[PatternTable], flags: PatternFlags) -> Result<Self, PatternError> {
        let groups = tables
            .iter()
            .map(|table| {
                patterns::compile_all(table.category.as_str(), table.patterns, flags)
                    .map(|compiled| (table.category, compiled))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { groups })
    }

    /// First match in precedence order, or `None`.
    pub fn find(&self, scope: &str) -> Option<CategoryMatch> {
        if scope.is_empty() {
            return None;
        }
        self.groups.iter().find_map(|(category, group)| {
            group.iter().find_map(|re| {
                re.find(scope).map(|m| CategoryMatch {
                    category: *category,
                    matched_text: m.as_str().to_string(),
                })
            })
        })
    }

    pub fn pattern_count(&self) -> usize {
        self.groups.iter().map(|(_, group)| group.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4() -> CategoryMatcher {
        CategoryMatcher::new(PatternSetVersion::V4).unwrap()
    }

    #[test]
    fn test_confirming_a_denial_is_denied() {
        let m = v4().find("confirmar la denegación de acceso a la red").unwrap();
        assert_eq!(m.category, Category::Denied);
        assert_eq!(m.matched_text, "confirmar la denegación");
    }

    #[test]
    fn test_annulling_and_recognizing_is_granted() {
        let m = v4()
            .find("anular la resolución impugnada y reconocer el derecho de la reclamante")
            .unwrap();
        assert_eq!(m.category, Category::Granted);
    }

    #[test]
    fn test_singular_and_plural_denials() {
        let matcher = v4();
        for text in ["se desestima el conflicto", "se desestiman los conflictos"] {
            assert_eq!(matcher.find(text).unwrap().category, Category::Denied, "{text}");
        }
    }

    #[test]
    fn test_archival_takes_precedence_over_denial() {
        let m = v4()
            .find("Desestimar la solicitud y archivar las actuaciones")
            .unwrap();
        assert_eq!(m.category, Category::Archived);
        assert_eq!(m.matched_text, "archivar las actuaciones");
    }

    #[test]
    fn test_denial_takes_precedence_over_grant() {
        let m = v4()
            .find("Estimar parcialmente lo pedido y desestimar el recurso en lo demás")
            .unwrap();
        assert_eq!(m.category, Category::Denied);
    }

    #[test]
    fn test_no_match_and_empty_scope() {
        assert!(v4().find("").is_none());
        assert!(v4().find("Texto descriptivo sin pronunciamiento").is_none());
    }

    #[test]
    fn test_v3_tables_are_smaller() {
        let v3 = CategoryMatcher::new(PatternSetVersion::V3).unwrap();
        assert!(v3.pattern_count() < v4().pattern_count());
        // The polarity traps only exist in V4.
        assert!(v3.find("confirmar la denegación de acceso").is_none());
    }

    #[test]
    fn test_custom_table_order_is_respected() {
        let tables = [
            PatternTable { category: Category::Granted, patterns: &[r"estimar"] },
            PatternTable { category: Category::Denied, patterns: &[r"desestimar"] },
        ];
        let matcher = CategoryMatcher::from_tables(&tables, PatternFlags::CASE_INSENSITIVE).unwrap();
        assert_eq!(matcher.find("desestimar").unwrap().category, Category::Granted);
    }
}
