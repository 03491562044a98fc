// ██╗   ██╗███████╗██████╗ ██████╗ ██╗ ██████╗████████╗
// ██║   ██║██╔════╝██╔══██╗██╔══██╗██║██╔════╝╚══██╔══╝
// ██║   ██║█████╗  ██████╔╝██║  ██║██║██║        ██║
// ╚██╗ ██╔╝██╔══╝  ██╔══██╗██║  ██║██║██║        ██║
//  ╚████╔╝ ███████╗██║  ██║██████╔╝██║╚██████╗   ██║
//   ╚═══╝  ╚══════╝╚═╝  ╚═╝╚═════╝ ╚═╝ ╚═════╝   ╚═╝
//
// E N G I N E
//
// Two ways in:
//
//   resolution-verdict-engine                 batch mode: fetch and classify
//                                             the case list from config
//   resolution-verdict-engine a.txt b.txt     classify local text files and
//                                             print one JSON line each

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use resolution_verdict_engine::classify_batch;
use resolution_verdict_engine::config::Config;
use resolution_verdict_engine::engine::DecisionEngine;
use resolution_verdict_engine::pipeline::run_batch;
use resolution_verdict_engine::retrieval::{DirectoryTextProvider, HttpDocumentFetcher, PdftotextExtractor};
use resolution_verdict_engine::store::MemoryCaseStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("VERDICT_ENGINE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Logs go to stderr; stdout carries results.
    if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_current_span(false)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .init();
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env();
    config.validate()?;
    let engine = Arc::new(DecisionEngine::from_config(&config).context("building decision engine")?);
    info!(
        pattern_set = %config.pattern_set,
        rules_first = config.rules_first,
        tail_window = config.effective_tail_window(),
        "Verdict engine initialized"
    );

    let files: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if !files.is_empty() {
        return classify_files(&engine, &files);
    }

    let cases = config.load_cases()?;
    if cases.is_empty() {
        warn!("No cases to classify. Set VERDICT_ENGINE_CASES_PATH or pass text files as arguments");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => error!(error = %err, "Signal listener error"),
        }
    });

    let store = Arc::new(MemoryCaseStore::new());
    let report = match &config.text_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Reading pre-extracted text");
            let provider = Arc::new(DirectoryTextProvider::new(dir));
            run_batch(engine, provider, store.clone(), cases, &config, shutdown_rx).await
        }
        None => {
            let fetcher = Arc::new(HttpDocumentFetcher::new(
                &config,
                PdftotextExtractor::new(config.pdftotext_bin.clone()),
            )?);
            let report = run_batch(engine, fetcher.clone(), store.clone(), cases, &config, shutdown_rx).await;
            let breaker = fetcher.breaker().snapshot();
            info!(
                state = %breaker.state,
                trips = breaker.trips,
                rejected = breaker.rejected_requests,
                "Document server circuit breaker"
            );
            report
        }
    };

    for (category, count) in store.category_counts() {
        info!(%category, count, "Category total");
    }
    info!(coverage = format!("{:.1}%", report.metrics.coverage() * 100.0), "Run coverage");

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Classify local files in parallel and print one JSON object per file.
fn classify_files(engine: &DecisionEngine, files: &[PathBuf]) -> anyhow::Result<()> {
    let texts = files
        .iter()
        .map(|path| {
            std::fs::read(path)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .with_context(|| format!("reading {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<String>>>()?;
    let borrowed: Vec<&str> = texts.iter().map(String::as_str).collect();

    for (path, result) in files.iter().zip(classify_batch(engine, &borrowed)) {
        let line = serde_json::json!({
            "file": path.display().to_string(),
            "result": result,
        });
        println!("{line}");
    }
    Ok(())
}
