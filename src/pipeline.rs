// =============================================================================
// pipeline.rs — THE BATCH RUN
// =============================================================================
//
// Two halves joined by a bounded crossbeam channel:
//
//   FETCH     async, at most `fetch_concurrency` documents in flight. The
//             provider does its own rate limiting and retries. Documents
//             with no text are counted and skipped here; the classifier
//             never sees them.
//
//   CLASSIFY  one blocking worker. It drains the channel in small batches,
//             classifies each batch in parallel on rayon, and writes every
//             result into the case store exactly once.
//
// A shutdown signal stops new fetches. Whatever already made it into the
// channel is still classified; in-flight fetches are dropped and their
// cases stay unclassified.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{Decision, DecisionEngine};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::models::CaseRecord;
use crate::parties::extract_parties;
use crate::retrieval::DocumentTextProvider;
use crate::store::CaseStore;

/// Documents classified per rayon batch.
const CLASSIFY_BATCH: usize = 32;

/// A document whose text is ready for the classifier.
#[derive(Debug)]
struct FetchedDocument {
    id: String,
    title: String,
    text: String,
}

/// Everything a batch run produced.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Stopped early by the shutdown signal.
    pub cancelled: bool,
    /// This run's cases as stored, classified or not.
    pub records: Vec<CaseRecord>,
    pub metrics: MetricsSnapshot,
}

/// Fetch, classify and store a list of cases.
pub async fn run_batch<P, S>(
    engine: Arc<DecisionEngine>,
    provider: Arc<P>,
    store: Arc<S>,
    cases: Vec<CaseRecord>,
    config: &Config,
    mut shutdown: watch::Receiver<bool>,
) -> BatchReport
where
    P: DocumentTextProvider + 'static,
    S: CaseStore + 'static,
{
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let metrics = Arc::new(MetricsCollector::new());
    info!(%run_id, cases = cases.len(), concurrency = config.fetch_concurrency, "Batch run starting");

    // Register every case first so the store owns the full list.
    let mut run_ids = Vec::with_capacity(cases.len());
    let mut pending = Vec::with_capacity(cases.len());
    for case in cases {
        let id = case.id.clone();
        let already_classified = case.classification.is_some();
        match store.insert(case.clone()) {
            Ok(()) => {
                run_ids.push(id);
                if !already_classified {
                    pending.push(case);
                }
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Case not added to store");
                metrics.increment_store_errors();
            }
        }
    }

    let (tx, rx) = crossbeam_channel::bounded::<FetchedDocument>(config.channel_capacity.max(1));

    let classifier = {
        let engine = engine.clone();
        let store = store.clone();
        let metrics = metrics.clone();
        tokio::task::spawn_blocking(move || classify_loop(&engine, store.as_ref(), &metrics, rx))
    };

    let fetches = stream::iter(pending)
        .map(|case| {
            let provider = provider.clone();
            let metrics = metrics.clone();
            async move {
                metrics.increment_seen();
                let text = provider.get_text(&case).await;
                (case, text)
            }
        })
        .buffer_unordered(config.fetch_concurrency.max(1));
    tokio::pin!(fetches);

    let mut cancelled = *shutdown.borrow();
    let mut watching = true;

    while !cancelled {
        tokio::select! {
            next = fetches.next() => {
                let Some((case, text)) = next else { break };
                match text {
                    Ok(Some(text)) => {
                        metrics.increment_fetched();
                        let doc = FetchedDocument { id: case.id, title: case.title, text };
                        if !send_document(&tx, doc).await {
                            error!("Classifier worker is gone, stopping fetches");
                            break;
                        }
                    }
                    Ok(None) => {
                        metrics.increment_skipped();
                        debug!(id = %case.id, "No text, skipping");
                    }
                    Err(e) => {
                        metrics.increment_fetch_failures();
                        warn!(id = %case.id, error = %e, "Could not get document text");
                    }
                }
            }
            changed = shutdown.changed(), if watching => {
                match changed {
                    Ok(()) if *shutdown.borrow() => {
                        warn!(%run_id, "Shutdown requested, no further documents will be fetched");
                        cancelled = true;
                    }
                    Ok(()) => {}
                    // Sender gone: nobody can ask us to stop any more.
                    Err(_) => watching = false,
                }
            }
        }
    }

    // Closing the channel lets the worker drain what is queued and exit.
    drop(fetches);
    drop(tx);
    if let Err(e) = classifier.await {
        error!(error = %e, "Classifier worker panicked");
    }

    let report = BatchReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        cancelled,
        records: run_ids.iter().filter_map(|id| store.get(id)).collect(),
        metrics: metrics.snapshot(),
    };
    info!(
        %run_id,
        classified = report.metrics.classified,
        unclassified = report.metrics.unclassified,
        skipped = report.metrics.documents_skipped,
        failures = report.metrics.fetch_failures,
        cancelled,
        "Batch run finished"
    );
    match serde_json::to_string(&report.metrics) {
        Ok(json) => info!(%run_id, metrics = %json, "Batch metrics"),
        Err(e) => warn!(%run_id, error = %e, "Could not serialize batch metrics"),
    }
    report
}

/// Hand a document to the classifier without blocking the runtime.
/// False once the worker has hung up.
async fn send_document(tx: &Sender<FetchedDocument>, mut doc: FetchedDocument) -> bool {
    loop {
        match tx.try_send(doc) {
            Ok(()) => return true,
            Err(TrySendError::Full(back)) => {
                doc = back;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

fn classify_loop<S: CaseStore + ?Sized>(
    engine: &DecisionEngine,
    store: &S,
    metrics: &MetricsCollector,
    rx: Receiver<FetchedDocument>,
) {
    let mut batch = Vec::with_capacity(CLASSIFY_BATCH);

    while let Ok(first) = rx.recv() {
        batch.push(first);
        while batch.len() < CLASSIFY_BATCH {
            match rx.try_recv() {
                Ok(doc) => batch.push(doc),
                Err(_) => break,
            }
        }

        let decisions: Vec<Decision> = batch.par_iter().map(|doc| engine.decide(&doc.text)).collect();

        for (doc, decision) in batch.drain(..).zip(decisions) {
            metrics.record_decision(&decision);
            let parties = extract_parties(&doc.title);
            info!(
                id = %doc.id,
                category = %decision.result.category,
                confidence = %decision.result.confidence,
                section_found = decision.result.section_found,
                path = ?decision.path,
                claimant = %parties.claimant,
                respondent = %parties.respondent,
                "Classified"
            );
            if let Err(e) = store.record_classification(&doc.id, decision.result) {
                warn!(id = %doc.id, error = %e, "Could not store classification");
                metrics.increment_store_errors();
            }
        }
    }
    debug!("Classifier worker drained, exiting");
}
