//! Score calculator: per-page and per-audit weighted rollups.
//!
//! Scoring is a pure function of its inputs. Re-running it on an unchanged
//! issue set yields bit-identical scores; caching and test reproducibility
//! depend on this.

use seolens_shared::{
    Category, Issue, Page, Result, ScoreSet, ScoreWeights, Severity, SubScores,
};

/// Points deducted from a category's raw sub-score per issue.
const CRITICAL_PENALTY: f64 = 15.0;
const WARNING_PENALTY: f64 = 5.0;
const INFO_PENALTY: f64 = 1.0;

/// Computes page- and audit-level scores from raw sub-scores and issues.
#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    weights: ScoreWeights,
}

impl ScoreCalculator {
    /// Create a calculator. Weights must sum to 1.0; validated here so a
    /// misconfigured instance can never exist.
    pub fn new(weights: ScoreWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// Final scores for one page: each category's raw sub-score minus the
    /// severity penalties of that category's issues, clamped to [0, 100],
    /// with the overall as the weighted average.
    pub fn page_scores(&self, raw: &SubScores, issues: &[Issue]) -> ScoreSet {
        let structure = apply_penalties(raw.structure, Category::Structure, issues);
        let content = apply_penalties(raw.content, Category::Content, issues);
        let eeat = apply_penalties(raw.eeat, Category::Eeat, issues);
        let schema = apply_penalties(raw.schema, Category::Schema, issues);

        ScoreSet {
            overall: round1(self.weighted(structure, content, eeat, schema)),
            structure: round1(structure),
            content: round1(content),
            eeat: round1(eeat),
            schema: round1(schema),
        }
    }

    /// Audit-level scores: the unweighted mean of each sub-score across
    /// pages, with the overall recomputed by the weighted formula from those
    /// means. The overall is NOT the mean of page overalls — that would
    /// weight categories twice.
    pub fn audit_scores(&self, pages: &[Page]) -> ScoreSet {
        if pages.is_empty() {
            return ScoreSet::default();
        }

        let n = pages.len() as f64;
        let structure = round1(pages.iter().map(|p| p.scores.structure).sum::<f64>() / n);
        let content = round1(pages.iter().map(|p| p.scores.content).sum::<f64>() / n);
        let eeat = round1(pages.iter().map(|p| p.scores.eeat).sum::<f64>() / n);
        let schema = round1(pages.iter().map(|p| p.scores.schema).sum::<f64>() / n);

        ScoreSet {
            overall: round1(self.weighted(structure, content, eeat, schema)),
            structure,
            content,
            eeat,
            schema,
        }
    }

    fn weighted(&self, structure: f64, content: f64, eeat: f64, schema: f64) -> f64 {
        structure * self.weights.structure
            + content * self.weights.content
            + eeat * self.weights.eeat
            + schema * self.weights.schema
    }
}

fn apply_penalties(raw: f64, category: Category, issues: &[Issue]) -> f64 {
    let penalty: f64 = issues
        .iter()
        .filter(|i| i.category == category)
        .map(|i| match i.severity {
            Severity::Critical => CRITICAL_PENALTY,
            Severity::Warning => WARNING_PENALTY,
            Severity::Info => INFO_PENALTY,
        })
        .sum();
    (raw - penalty).clamp(0.0, 100.0)
}

/// Round to one decimal for stable serialization.
fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
