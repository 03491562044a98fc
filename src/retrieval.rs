// =============================================================================
// retrieval.rs — GETTING THE WORDS OUT OF THE PDF
// =============================================================================
//
// The classifier only ever sees a string. This module is how a case record
// becomes one:
//
//   HttpDocumentFetcher     download the resolution PDF (politely: one
//                           request per delay window, bounded retries, a
//                           circuit breaker, an LRU of extracted text) and
//                           hand the bytes to a TextExtractor.
//   PdftotextExtractor      pipe the bytes through poppler's `pdftotext`.
//   DirectoryTextProvider   read `<id>.txt` files somebody extracted earlier.
//
// A provider answers Ok(None) when there is simply no text to classify.
// Errors are for when asking went wrong.
// =============================================================================

use std::future::Future;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::error::RetrievalError;
use crate::models::CaseRecord;

/// Source of document text for a case.
pub trait DocumentTextProvider: Send + Sync {
    fn get_text(
        &self,
        case: &CaseRecord,
    ) -> impl Future<Output = Result<Option<String>, RetrievalError>> + Send;
}

/// Turns a PDF binary into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, pdf: Vec<u8>) -> impl Future<Output = Result<String, RetrievalError>> + Send;
}

// =============================================================================
// pdftotext
// =============================================================================

/// Runs `pdftotext -layout - -`, PDF on stdin, text on stdout.
#[derive(Debug, Clone)]
pub struct PdftotextExtractor {
    bin: String,
}

impl PdftotextExtractor {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

impl TextExtractor for PdftotextExtractor {
    async fn extract(&self, pdf: Vec<u8>) -> Result<String, RetrievalError> {
        let mut child = Command::new(&self.bin)
            .args(["-layout", "-enc", "UTF-8", "-", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RetrievalError::Extraction("pdftotext stdin unavailable".to_string()))?;

        // Feed stdin while stdout drains, or a large PDF deadlocks on a
        // full pipe.
        let writer = tokio::spawn(async move {
            let written = stdin.write_all(&pdf).await;
            drop(stdin);
            written
        });

        let output = child.wait_with_output().await?;
        if let Ok(Err(e)) = writer.await {
            debug!(error = %e, "pdftotext closed stdin early");
        }

        if !output.status.success() {
            return Err(RetrievalError::Extraction(format!(
                "{} exited with {}: {}",
                self.bin,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// =============================================================================
// HTTP
// =============================================================================

pub struct HttpDocumentFetcher<E> {
    client: reqwest::Client,
    base: Url,
    extractor: E,
    breaker: CircuitBreaker,
    /// Extracted text keyed by absolute URL.
    cache: Mutex<LruCache<String, String>>,
    /// Earliest instant the next request may leave.
    next_slot: tokio::sync::Mutex<Instant>,
    request_delay: Duration,
    max_retries: u32,
}

impl<E: TextExtractor> HttpDocumentFetcher<E> {
    pub fn new(config: &Config, extractor: E) -> Result<Self, RetrievalError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/pdf,*/*;q=0.8"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-ES,es;q=0.9"));

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        let base = Url::parse(&config.base_url).map_err(|source| RetrievalError::InvalidUrl {
            url: config.base_url.clone(),
            source,
        })?;

        let capacity = NonZeroUsize::new(config.text_cache_size).unwrap_or(NonZeroUsize::MIN);

        info!(
            base = %base,
            delay_ms = config.request_delay.as_millis() as u64,
            max_retries = config.max_retries,
            cache = capacity.get(),
            "Document fetcher ready"
        );

        Ok(Self {
            client,
            base,
            extractor,
            breaker: CircuitBreaker::from_config("document-server", config),
            cache: Mutex::new(LruCache::new(capacity)),
            next_slot: tokio::sync::Mutex::new(Instant::now()),
            request_delay: config.request_delay,
            max_retries: config.max_retries,
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Absolute URL for a possibly relative resolution link.
    pub fn resolve_url(&self, raw: &str) -> Result<Url, RetrievalError> {
        self.base.join(raw.trim()).map_err(|source| RetrievalError::InvalidUrl {
            url: raw.to_string(),
            source,
        })
    }

    /// Sleep until this request's slot, then book the next one.
    async fn wait_turn(&self) {
        let mut next = self.next_slot.lock().await;
        if *next > Instant::now() {
            tokio::time::sleep_until(*next).await;
        }
        *next = Instant::now() + self.request_delay;
    }

    async fn try_fetch(&self, url: &Url) -> Result<Vec<u8>, RetrievalError> {
        if !self.breaker.allow_request() {
            return Err(RetrievalError::CircuitOpen(self.breaker.name().to_string()));
        }
        self.wait_turn().await;

        let response = match self.client.get(url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                self.breaker.record_failure();
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let err = RetrievalError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            };
            if err.is_retryable() {
                self.breaker.record_failure();
            }
            return Err(err);
        }

        match response.bytes().await {
            Ok(body) => {
                self.breaker.record_success();
                Ok(body.to_vec())
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e.into())
            }
        }
    }

    /// Download with bounded retries and exponential backoff.
    pub async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, RetrievalError> {
        let mut attempt = 0u32;
        loop {
            match self.try_fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.max_retries && e.is_retryable() => {
                    let backoff = self.request_delay.saturating_mul(1 << attempt.min(6));
                    attempt += 1;
                    warn!(
                        url = %url,
                        attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<E: TextExtractor> DocumentTextProvider for HttpDocumentFetcher<E> {
    async fn get_text(&self, case: &CaseRecord) -> Result<Option<String>, RetrievalError> {
        let raw = case
            .resolution_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| RetrievalError::MissingUrl(case.id.clone()))?;
        let url = self.resolve_url(raw)?;
        let key = url.to_string();

        let cached = self.cache.lock().get(&key).cloned();
        if let Some(text) = cached {
            debug!(id = %case.id, url = %key, "Text cache hit");
            return Ok(Some(text));
        }

        let body = self.fetch_bytes(&url).await?;
        if !body.starts_with(b"%PDF") {
            warn!(id = %case.id, url = %key, "Response does not look like a PDF, extracting anyway");
        }

        let text = self.extractor.extract(body).await?;
        if text.trim().is_empty() {
            debug!(id = %case.id, "Extractor produced no text");
            return Ok(None);
        }

        self.cache.lock().put(key, text.clone());
        Ok(Some(text))
    }
}

// =============================================================================
// Pre-extracted text on disk
// =============================================================================

/// Reads `<dir>/<id>.txt`, with path-hostile characters in the id
/// replaced by `_`.
#[derive(Debug, Clone)]
pub struct DirectoryTextProvider {
    dir: PathBuf,
}

impl DirectoryTextProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", file_stem_for(id)))
    }
}

/// `CFT/DE/014/24` becomes `CFT_DE_014_24`.
pub fn file_stem_for(id: &str) -> String {
    id.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

impl DocumentTextProvider for DirectoryTextProvider {
    async fn get_text(&self, case: &CaseRecord) -> Result<Option<String>, RetrievalError> {
        let path = self.path_for(&case.id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                Ok(Some(text).filter(|t| !t.trim().is_empty()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(id = %case.id, path = %path.display(), "No text file");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Treats the "PDF" as UTF-8 text.
    struct PlainExtractor;

    impl TextExtractor for PlainExtractor {
        async fn extract(&self, pdf: Vec<u8>) -> Result<String, RetrievalError> {
            Ok(String::from_utf8_lossy(&pdf).into_owned())
        }
    }

    fn fetcher(config: &Config) -> HttpDocumentFetcher<PlainExtractor> {
        HttpDocumentFetcher::new(config, PlainExtractor).unwrap()
    }

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("verdict-engine-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_file_stem_for() {
        assert_eq!(file_stem_for("CFT/DE/014/24"), "CFT_DE_014_24");
        assert_eq!(file_stem_for(" a b:c "), "a_b_c");
        assert_eq!(file_stem_for("exp-01.v2"), "exp-01.v2");
    }

    #[tokio::test]
    async fn test_directory_provider_reads_and_skips() {
        let dir = scratch_dir();
        std::fs::write(dir.join("CFT_DE_001_23.txt"), "RESUELVE\nPRIMERO.- Desestimar.").unwrap();
        std::fs::write(dir.join("blank.txt"), "  \n").unwrap();
        let provider = DirectoryTextProvider::new(&dir);

        let text = provider
            .get_text(&CaseRecord::new("CFT/DE/001/23", ""))
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("RESUELVE\nPRIMERO.- Desestimar."));

        assert_eq!(provider.get_text(&CaseRecord::new("blank", "")).await.unwrap(), None);
        assert_eq!(provider.get_text(&CaseRecord::new("missing", "")).await.unwrap(), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_resolve_url_against_base() {
        let f = fetcher(&Config::default());
        assert_eq!(
            f.resolve_url("/sites/default/files/resolucion.pdf").unwrap().as_str(),
            "https://www.cnmc.es/sites/default/files/resolucion.pdf"
        );
        assert_eq!(
            f.resolve_url("https://example.org/a.pdf").unwrap().as_str(),
            "https://example.org/a.pdf"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = Config {
            base_url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            HttpDocumentFetcher::new(&config, PlainExtractor),
            Err(RetrievalError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_url_is_an_error() {
        let f = fetcher(&Config::default());
        let err = f.get_text(&CaseRecord::new("x", "")).await.unwrap_err();
        assert!(matches!(err, RetrievalError::MissingUrl(ref id) if id == "x"));
    }

    #[tokio::test]
    async fn test_cached_text_skips_the_network() {
        let f = fetcher(&Config::default());
        f.cache.lock().put(
            "https://www.cnmc.es/docs/r1.pdf".to_string(),
            "texto en caché".to_string(),
        );
        let case = CaseRecord::new("r1", "").with_resolution_url("/docs/r1.pdf");
        assert_eq!(f.get_text(&case).await.unwrap().as_deref(), Some("texto en caché"));
    }

    #[tokio::test]
    async fn test_requests_are_spaced() {
        let config = Config {
            request_delay: Duration::from_millis(40),
            ..Config::default()
        };
        let f = fetcher(&config);
        let start = Instant::now();
        f.wait_turn().await;
        f.wait_turn().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_unreachable_server_feeds_the_breaker() {
        let config = Config {
            base_url: "http://127.0.0.1:9/".to_string(),
            request_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(2),
            max_retries: 1,
            circuit_breaker_failure_threshold: 2,
            ..Config::default()
        };
        let f = fetcher(&config);
        let case = CaseRecord::new("r", "").with_resolution_url("/r.pdf");

        assert!(matches!(f.get_text(&case).await, Err(RetrievalError::Http(_))));
        // First attempt plus one retry: two failures trip the breaker.
        assert!(matches!(f.get_text(&case).await, Err(RetrievalError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn test_missing_pdftotext_binary() {
        let extractor = PdftotextExtractor::new("/nonexistent/pdftotext-binary");
        assert!(matches!(
            extractor.extract(b"%PDF-1.4".to_vec()).await,
            Err(RetrievalError::Io(_))
        ));
    }

    #[test]
    fn test_retryable_errors() {
        let status = |s| RetrievalError::Status { status: s, url: String::new() };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!RetrievalError::MissingUrl("x".into()).is_retryable());
    }
}
