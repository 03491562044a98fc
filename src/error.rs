// =============================================================================
// error.rs — EVERYTHING THAT CAN GO WRONG, ENUMERATED
// =============================================================================
//
// Classification itself never fails: every input string gets a result, even
// if that result is "no idea". What can fail is everything around it:
// compiling a pattern table, loading a rule file, talking to a web server
// that would rather not talk to us, and writing a record twice.
// =============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// A pattern in one of the built-in tables failed to compile. Surfaced at
/// construction time, never during classification.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid pattern in group {group} ({pattern:?}): {source}")]
    Invalid {
        group: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {rule}: invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule {rule}: unsupported category {label:?}")]
    UnsupportedCategory { rule: String, label: String },

    #[error("rule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rule file parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown category label: {0}")]
    UnknownCategory(String),

    #[error("unknown pattern set: {0}")]
    UnknownPatternSet(String),

    #[error("case {0} is already classified")]
    AlreadyClassified(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate case id: {0}")]
    Duplicate(String),

    #[error("case not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("case {0} has no resolution url")]
    MissingUrl(String),

    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("circuit breaker {0} is open")]
    CircuitOpen(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    /// Worth another attempt: transport errors, throttling, server errors.
    /// A 404 or a broken URL will not get better by asking again.
    pub fn is_retryable(&self) -> bool {
        match self {
            RetrievalError::Http(_) => true,
            RetrievalError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("case list {path}: {source}")]
    CaseList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("case list parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Building a decision engine from configuration.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Rule(#[from] RuleError),
}
