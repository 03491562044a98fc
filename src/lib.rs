// =============================================================================
// lib.rs — RESOLUTION VERDICT ENGINE
// =============================================================================
//
// Reads administrative decision documents and says how they ended:
// GRANTED, DENIED, ARCHIVED, or UNCLASSIFIED when the drafting wins.
//
// Pure classification lives in normalizer → section_locator →
// category_matcher → fallback → engine, with rules as an optional first
// opinion. Everything async (fetching PDFs, batching, the case store)
// sits around it and never inside it.
// =============================================================================

pub mod category_matcher;
pub mod circuit_breaker;
pub mod config;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod parties;
pub mod patterns;
pub mod pipeline;
pub mod retrieval;
pub mod rules;
pub mod section_locator;
pub mod store;
pub mod text_scanner;

pub use engine::{classify_batch, ClassificationEngine, Decision, DecisionEngine, DecisionPath};
pub use models::{CaseRecord, Category, ClassificationResult, Confidence, PatternSetVersion};
