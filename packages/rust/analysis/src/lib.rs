//! Pluggable page-analysis rules.
//!
//! The pipeline consumes the [`AnalysisRules`] capability and is agnostic to
//! the rules' internals: a rule set receives page content and returns raw
//! per-category sub-scores plus findings. [`HeuristicRules`] is the built-in
//! implementation; external-model-backed rule sets plug in behind the same
//! trait.

mod heuristics;

use std::future::Future;

use serde::{Deserialize, Serialize};

use seolens_shared::{Category, Result, Severity, SubScores};

pub use heuristics::HeuristicRules;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Structured page data handed to a rule set.
#[derive(Debug, Clone)]
pub struct PageContent {
    /// The page URL.
    pub url: String,
    /// Raw HTML body.
    pub html: String,
    /// HTTP status the page was fetched with.
    pub status: u16,
}

/// A raw finding produced by a rule set, before canonicalization.
/// The issue aggregator assigns stable ids and de-duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFinding {
    pub severity: Severity,
    pub category: Category,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_elements: Vec<String>,
}

/// Result of analyzing one page.
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    /// Raw sub-scores in [0, 100], before issue penalties.
    pub sub_scores: SubScores,
    /// Findings for the issue aggregator.
    pub findings: Vec<RawFinding>,
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// The analysis capability the pipeline consumes. Async because rule sets
/// may call out to external content models.
pub trait AnalysisRules: Send + Sync + 'static {
    /// Analyze one page's content.
    fn analyze(&self, page: &PageContent) -> impl Future<Output = Result<PageAnalysis>> + Send;

    /// Human-readable rule-set name for tracing.
    fn name(&self) -> &str;
}
