// =============================================================================
// config.rs — KNOBS, DIALS AND THE OCCASIONAL LEVER
// =============================================================================
//
// Everything tunable lives here, and everything here can be overridden with
// an environment variable prefixed VERDICT_ENGINE_. A .env file in the
// working directory is honoured if present.
//
// Defaults are chosen so that a bare `cargo run` with a case list does
// something sensible, and so that we stay polite towards a public
// regulator's web server: one request every two seconds, a handful in
// flight, and a circuit breaker that backs off when they've had enough.
// =============================================================================

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;
use crate::models::{CaseRecord, PatternSetVersion};

/// A browser-like default. Some document servers refuse anything that
/// looks like a script.
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // INPUTS
    // =========================================================================

    /// JSON array of case records to fetch and classify.
    pub cases_path: Option<PathBuf>,

    /// Directory of pre-extracted `<case id>.txt` files. When set, documents
    /// are read from disk instead of fetched.
    pub text_dir: Option<PathBuf>,

    // =========================================================================
    // CLASSIFICATION
    // =========================================================================

    /// Which generation of the pattern tables to use. Default: v4.
    pub pattern_set: PatternSetVersion,

    /// Run the rule engine before the primary engine. Default: true.
    pub rules_first: bool,

    /// JSON rule definitions replacing the built-in rule set.
    pub rules_path: Option<PathBuf>,

    /// Overrides the pattern set's fallback tail window, in characters.
    pub tail_window_chars: Option<usize>,

    // =========================================================================
    // RETRIEVAL
    // Be nice. It's a public body's web server, not a load test target.
    // =========================================================================

    /// Minimum spacing between outbound requests. Default: 2000 ms.
    pub request_delay: Duration,

    pub request_timeout: Duration,

    /// Retries per document after the first attempt. Default: 3.
    pub max_retries: u32,

    /// Documents fetched concurrently. Default: 4.
    pub fetch_concurrency: usize,

    /// LRU entries of extracted text, keyed by absolute URL. Default: 256.
    pub text_cache_size: usize,

    /// Bound of the fetch → classify channel. Default: 1024.
    pub channel_capacity: usize,

    pub user_agent: String,

    /// Base for relative resolution URLs.
    pub base_url: String,

    /// The pdftotext binary. Default: `pdftotext` from PATH.
    pub pdftotext_bin: String,

    // =========================================================================
    // CIRCUIT BREAKER PARAMETERS
    // =========================================================================

    /// Consecutive failures before the breaker trips. Default: 5.
    pub circuit_breaker_failure_threshold: u32,

    /// How long the breaker stays open before a probe. Default: 60 seconds.
    pub circuit_breaker_reset_timeout: Duration,

    /// Successful probes in half-open state before closing. Default: 2.
    pub circuit_breaker_success_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cases_path: None,
            text_dir: None,
            pattern_set: PatternSetVersion::default(),
            rules_first: true,
            rules_path: None,
            tail_window_chars: None,
            request_delay: Duration::from_millis(2000),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            fetch_concurrency: 4,
            text_cache_size: 256,
            channel_capacity: 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            base_url: "https://www.cnmc.es".to_string(),
            pdftotext_bin: "pdftotext".to_string(),
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_reset_timeout: Duration::from_secs(60),
            circuit_breaker_success_threshold: 2,
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// Unparsable values fall back to the default instead of aborting.
    pub fn from_env() -> Self {
        // A missing .env is the normal case.
        let _ = dotenvy::dotenv();

        let defaults = Config::default();

        let pattern_set = match env_opt("VERDICT_ENGINE_PATTERN_SET") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Unknown pattern set, using default");
                defaults.pattern_set
            }),
            None => defaults.pattern_set,
        };

        Config {
            // Inputs
            cases_path: env_opt("VERDICT_ENGINE_CASES_PATH").map(PathBuf::from),
            text_dir: env_opt("VERDICT_ENGINE_TEXT_DIR").map(PathBuf::from),

            // Classification
            pattern_set,
            rules_first: parse_bool(&env_or_default("VERDICT_ENGINE_RULES_FIRST", "true"))
                .unwrap_or(defaults.rules_first),
            rules_path: env_opt("VERDICT_ENGINE_RULES_PATH").map(PathBuf::from),
            tail_window_chars: env_opt("VERDICT_ENGINE_TAIL_WINDOW_CHARS")
                .and_then(|v| v.parse().ok()),

            // Retrieval
            request_delay: Duration::from_millis(
                env_or_default("VERDICT_ENGINE_REQUEST_DELAY_MS", "2000").parse().unwrap_or(2000)
            ),
            request_timeout: Duration::from_secs(
                env_or_default("VERDICT_ENGINE_REQUEST_TIMEOUT_SECS", "30").parse().unwrap_or(30)
            ),
            max_retries: env_or_default("VERDICT_ENGINE_MAX_RETRIES", "3")
                .parse().unwrap_or(3),
            fetch_concurrency: env_or_default("VERDICT_ENGINE_FETCH_CONCURRENCY", "4")
                .parse().unwrap_or(4),
            text_cache_size: env_or_default("VERDICT_ENGINE_TEXT_CACHE_SIZE", "256")
                .parse().unwrap_or(256),
            channel_capacity: env_or_default("VERDICT_ENGINE_CHANNEL_CAPACITY", "1024")
                .parse().unwrap_or(1024),
            user_agent: env_or_default("VERDICT_ENGINE_USER_AGENT", DEFAULT_USER_AGENT),
            base_url: env_or_default("VERDICT_ENGINE_BASE_URL", &defaults.base_url),
            pdftotext_bin: env_or_default("VERDICT_ENGINE_PDFTOTEXT_BIN", &defaults.pdftotext_bin),

            // Circuit breaker
            circuit_breaker_failure_threshold: env_or_default(
                "VERDICT_ENGINE_CB_FAILURE_THRESHOLD", "5"
            ).parse().unwrap_or(5),
            circuit_breaker_reset_timeout: Duration::from_secs(
                env_or_default("VERDICT_ENGINE_CB_RESET_TIMEOUT_SECS", "60").parse().unwrap_or(60)
            ),
            circuit_breaker_success_threshold: env_or_default(
                "VERDICT_ENGINE_CB_SUCCESS_THRESHOLD", "2"
            ).parse().unwrap_or(2),
        }
    }

    /// Tail window actually in effect: the override, or the pattern set's own.
    pub fn effective_tail_window(&self) -> usize {
        self.tail_window_chars
            .unwrap_or_else(|| self.pattern_set.default_tail_window())
    }

    /// Reject values that parse but can't work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero_checks: [(&'static str, usize); 3] = [
            ("VERDICT_ENGINE_FETCH_CONCURRENCY", self.fetch_concurrency),
            ("VERDICT_ENGINE_TEXT_CACHE_SIZE", self.text_cache_size),
            ("VERDICT_ENGINE_CHANNEL_CAPACITY", self.channel_capacity),
        ];
        for (var, value) in zero_checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue { var, value: value.to_string() });
            }
        }
        if self.tail_window_chars == Some(0) {
            return Err(ConfigError::InvalidValue {
                var: "VERDICT_ENGINE_TAIL_WINDOW_CHARS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Read the case list from `cases_path`. No path means no cases.
    pub fn load_cases(&self) -> Result<Vec<CaseRecord>, ConfigError> {
        match &self.cases_path {
            Some(path) => load_cases(path),
            None => Ok(Vec::new()),
        }
    }
}

/// Parse a JSON array of case records.
pub fn load_cases(path: &Path) -> Result<Vec<CaseRecord>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::CaseList {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read an environment variable with a default fallback.
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating empty as unset.
fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.pattern_set, PatternSetVersion::V4);
        assert!(config.rules_first);
        assert_eq!(config.effective_tail_window(), 3000);
        assert_eq!(config.request_delay, Duration::from_millis(2000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tail_window_override() {
        let config = Config {
            pattern_set: PatternSetVersion::V3,
            ..Config::default()
        };
        assert_eq!(config.effective_tail_window(), 2000);

        let config = Config {
            tail_window_chars: Some(1200),
            ..config
        };
        assert_eq!(config.effective_tail_window(), 1200);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = Config {
            channel_capacity: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { var: "VERDICT_ENGINE_CHANNEL_CAPACITY", .. })
        ));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_missing_case_list_path_is_empty() {
        assert!(Config::default().load_cases().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_case_list_is_an_error() {
        let err = load_cases(Path::new("/nonexistent/verdict-engine/cases.json")).unwrap_err();
        assert!(matches!(err, ConfigError::CaseList { .. }));
    }
}
