// ═══════════════════════════════════════════════════════════════
// METRICS COLLECTOR - Counting what the batch did
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters shared by the fetch tasks and the classifier thread.
// Nothing here takes a lock. At the end of a run the snapshot is
// serialized into the run report and logged as JSON.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::engine::{Decision, DecisionPath};
use crate::models::{Category, Confidence};

/// What gets serialized at the end of a run.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub documents_seen: u64,
    pub documents_fetched: u64,
    pub documents_skipped: u64,
    pub fetch_failures: u64,
    pub classified: u64,
    pub granted: u64,
    pub denied: u64,
    pub archived: u64,
    pub unclassified: u64,
    pub high_confidence: u64,
    pub medium_confidence: u64,
    pub low_confidence: u64,
    pub sections_found: u64,
    pub rule_decisions: u64,
    pub fallback_decisions: u64,
    pub store_errors: u64,
    pub elapsed_seconds: u64,
    pub documents_per_minute: f64,
}

impl MetricsSnapshot {
    /// Share of classified documents that ended up in a real category.
    pub fn coverage(&self) -> f64 {
        if self.classified == 0 {
            return 0.0;
        }
        (self.classified - self.unclassified) as f64 / self.classified as f64
    }
}

/// Thread-safe atomic metrics collector.
pub struct MetricsCollector {
    documents_seen: AtomicU64,
    documents_fetched: AtomicU64,
    documents_skipped: AtomicU64,
    fetch_failures: AtomicU64,
    granted: AtomicU64,
    denied: AtomicU64,
    archived: AtomicU64,
    unclassified: AtomicU64,
    high: AtomicU64,
    medium: AtomicU64,
    low: AtomicU64,
    sections_found: AtomicU64,
    rule_decisions: AtomicU64,
    fallback_decisions: AtomicU64,
    store_errors: AtomicU64,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            documents_seen: AtomicU64::new(0),
            documents_fetched: AtomicU64::new(0),
            documents_skipped: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            granted: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            archived: AtomicU64::new(0),
            unclassified: AtomicU64::new(0),
            high: AtomicU64::new(0),
            medium: AtomicU64::new(0),
            low: AtomicU64::new(0),
            sections_found: AtomicU64::new(0),
            rule_decisions: AtomicU64::new(0),
            fallback_decisions: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_seen(&self) {
        self.documents_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fetched(&self) {
        self.documents_fetched.fetch_add(1, Ordering::Relaxed);
    }

    /// A document with no text. Never reaches the classifier.
    pub fn increment_skipped(&self) {
        self.documents_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fetch_failures(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_store_errors(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one decision by category, confidence and the route it took.
    pub fn record_decision(&self, decision: &Decision) {
        let result = &decision.result;
        let category_counter = match result.category {
            Category::Granted => &self.granted,
            Category::Denied => &self.denied,
            Category::Archived => &self.archived,
            Category::Unclassified => &self.unclassified,
        };
        category_counter.fetch_add(1, Ordering::Relaxed);

        let confidence_counter = match result.confidence {
            Confidence::High => &self.high,
            Confidence::Medium => &self.medium,
            Confidence::Low => &self.low,
        };
        confidence_counter.fetch_add(1, Ordering::Relaxed);

        if result.section_found {
            self.sections_found.fetch_add(1, Ordering::Relaxed);
        }
        match decision.path {
            DecisionPath::Rule(_) => {
                self.rule_decisions.fetch_add(1, Ordering::Relaxed);
            }
            DecisionPath::Fallback(_) => {
                self.fallback_decisions.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let elapsed = self.start_time.elapsed();
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        let granted = load(&self.granted);
        let denied = load(&self.denied);
        let archived = load(&self.archived);
        let unclassified = load(&self.unclassified);
        let classified = granted + denied + archived + unclassified;

        let minutes = elapsed.as_secs_f64() / 60.0;
        let documents_per_minute = if minutes > 0.0 {
            classified as f64 / minutes
        } else {
            0.0
        };

        MetricsSnapshot {
            documents_seen: load(&self.documents_seen),
            documents_fetched: load(&self.documents_fetched),
            documents_skipped: load(&self.documents_skipped),
            fetch_failures: load(&self.fetch_failures),
            classified,
            granted,
            denied,
            archived,
            unclassified,
            high_confidence: load(&self.high),
            medium_confidence: load(&self.medium),
            low_confidence: load(&self.low),
            sections_found: load(&self.sections_found),
            rule_decisions: load(&self.rule_decisions),
            fallback_decisions: load(&self.fallback_decisions),
            store_errors: load(&self.store_errors),
            elapsed_seconds: elapsed.as_secs(),
            documents_per_minute,
        }
    }
}
