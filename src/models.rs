// =============================================================================
// models.rs — THE VOCABULARY OF ADMINISTRATIVE DESTINY
// =============================================================================
//
// Every decision document ends up in exactly one of four boxes. Three of
// them are real legal outcomes. The fourth is where documents go when the
// drafting was creative enough to defeat every pattern we own.
//
// These types are deliberately small and closed. There is no "partially
// granted" box, no "sort of denied", no free-form string that a typo could
// turn into a fifth category. If it isn't in the enum, it isn't an outcome.
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::parties::{extract_parties, Parties};

/// The legal outcome of a decision, from the claimant's point of view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// The claim, appeal or conflict was upheld (ESTIMADO).
    Granted,
    /// The claim was rejected, or a prior denial was confirmed (DESESTIMADO).
    Denied,
    /// The proceeding ended without a ruling on the merits (ARCHIVADO):
    /// withdrawal, loss of object, inadmission, lack of competence.
    Archived,
    /// Nothing we know how to read matched.
    Unclassified,
}

impl Category {
    /// The three real outcomes, in the precedence order used when
    /// several of them could match the same passage.
    pub const OUTCOMES: [Category; 3] = [Category::Archived, Category::Denied, Category::Granted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Granted => "GRANTED",
            Category::Denied => "DENIED",
            Category::Archived => "ARCHIVED",
            Category::Unclassified => "UNCLASSIFIED",
        }
    }

    /// The label used by the issuing body's own documents.
    pub fn source_label(&self) -> &'static str {
        match self {
            Category::Granted => "ESTIMADO",
            Category::Denied => "DESESTIMADO",
            Category::Archived => "ARCHIVADO",
            Category::Unclassified => "NO_CLASIFICADO",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = ModelError;

    /// Accepts both the English labels and the source-language labels.
    /// The retired partial-grant label is rejected rather than folded
    /// into one of the real outcomes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_uppercase();
        Category::OUTCOMES
            .into_iter()
            .chain([Category::Unclassified])
            .find(|c| c.as_str() == label || c.source_label() == label)
            .ok_or(ModelError::UnknownCategory(label))
    }
}

/// How structurally grounded a classification is.
///
/// Ordered: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    /// Any fallback path, or no match at all.
    Low,
    /// Matched somewhere inside a located operative section.
    Medium,
    /// Matched inside the first operative point of a located section.
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which generation of the pattern tables to classify with.
///
/// `V3` is the compact table set; `V4` is the consolidated one with the
/// polarity traps, judicial wording and the inline section opener.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum PatternSetVersion {
    V3,
    #[default]
    V4,
}

impl PatternSetVersion {
    /// Characters of document tail searched by the fallback resolver.
    pub fn default_tail_window(&self) -> usize {
        match self {
            PatternSetVersion::V3 => 2000,
            PatternSetVersion::V4 => 3000,
        }
    }
}

impl fmt::Display for PatternSetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternSetVersion::V3 => write!(f, "v3"),
            PatternSetVersion::V4 => write!(f, "v4"),
        }
    }
}

impl FromStr for PatternSetVersion {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v3" | "3" => Ok(PatternSetVersion::V3),
            "v4" | "4" => Ok(PatternSetVersion::V4),
            other => Err(ModelError::UnknownPatternSet(other.to_string())),
        }
    }
}

/// The outcome of classifying one document. Always fully populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationResult {
    pub category: Category,
    pub confidence: Confidence,
    /// The literal passage that triggered the classification. Fallback
    /// tiers prefix it with a trace tag such as `[JUDICIAL]`.
    pub matched_text: String,
    /// True only if an operative section was structurally located,
    /// regardless of whether a category then matched inside it.
    pub section_found: bool,
}

impl ClassificationResult {
    pub fn new(
        category: Category,
        confidence: Confidence,
        matched_text: impl Into<String>,
        section_found: bool,
    ) -> Self {
        Self {
            category,
            confidence,
            matched_text: matched_text.into(),
            section_found,
        }
    }

    /// The worst case: nothing located, nothing matched.
    pub fn unclassified() -> Self {
        Self::new(Category::Unclassified, Confidence::Low, "", false)
    }

    pub fn is_classified(&self) -> bool {
        self.category != Category::Unclassified
    }
}

impl fmt::Display for ClassificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, section_found={}) - \"{}\"",
            self.category,
            self.confidence,
            self.section_found,
            self.matched_text.chars().take(60).collect::<String>()
        )
    }
}

/// One case file as listed by the issuing body.
///
/// Created when a document reference is ingested, classified exactly once,
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Opaque case identifier, e.g. `CFT/DE/014/24`. Unique.
    pub id: String,

    /// Free-text title. Usually encodes claimant and respondent.
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub date: Option<NaiveDate>,

    /// Where the resolution PDF lives. Owned by the retrieval side; we
    /// only carry it around.
    #[serde(default)]
    pub resolution_url: Option<String>,

    #[serde(default)]
    pub classification: Option<ClassificationResult>,
}

impl CaseRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            date: None,
            resolution_url: None,
            classification: None,
        }
    }

    pub fn with_resolution_url(mut self, url: impl Into<String>) -> Self {
        self.resolution_url = Some(url.into());
        self
    }

    /// Set the classification fields. A record is classified once; a second
    /// attempt is refused instead of silently overwriting the first answer.
    pub fn apply_classification(&mut self, result: ClassificationResult) -> Result<(), ModelError> {
        if self.classification.is_some() {
            return Err(ModelError::AlreadyClassified(self.id.clone()));
        }
        self.classification = Some(result);
        Ok(())
    }

    pub fn category(&self) -> Option<Category> {
        self.classification.as_ref().map(|c| c.category)
    }

    /// Claimant and respondent, guessed from the title.
    pub fn parties(&self) -> Parties {
        extract_parties(&self.title)
    }
}

impl fmt::Display for CaseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.classification {
            Some(result) => write!(f, "[{}] {} - {}", self.id, self.title, result),
            None => write!(f, "[{}] {} - (unclassified)", self.id, self.title),
        }
    }
}
