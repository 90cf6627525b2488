//! Core domain types for seolens audits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AuditId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for audit identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(pub Uuid);

impl AuditId {
    /// Generate a new time-sortable audit identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AuditId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Stages and status
// ---------------------------------------------------------------------------

/// One phase of the audit pipeline. Stage order is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Crawling,
    Analyzing,
    Scoring,
    Recommending,
    Comparing,
}

impl Stage {
    /// The canonical stage order. `progress.stages_completed` is always a
    /// prefix of this slice.
    pub const ORDER: [Stage; 5] = [
        Stage::Crawling,
        Stage::Analyzing,
        Stage::Scoring,
        Stage::Recommending,
        Stage::Comparing,
    ];

    /// Position of this stage in the canonical order.
    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|s| *s == self).unwrap_or(0)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Crawling => "crawling",
            Stage::Analyzing => "analyzing",
            Stage::Scoring => "scoring",
            Stage::Recommending => "recommending",
            Stage::Comparing => "comparing",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "crawling" => Ok(Stage::Crawling),
            "analyzing" => Ok(Stage::Analyzing),
            "scoring" => Ok(Stage::Scoring),
            "recommending" => Ok(Stage::Recommending),
            "comparing" => Ok(Stage::Comparing),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// Lifecycle status of an audit. Advances strictly forward; `Completed` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Crawling,
    Analyzing,
    Scoring,
    Recommending,
    Comparing,
    Completed,
    Failed,
}

impl AuditStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, AuditStatus::Completed | AuditStatus::Failed)
    }

    /// Ordinal used to enforce forward-only transitions (`Failed` is reachable
    /// from anywhere).
    pub fn rank(self) -> u8 {
        match self {
            AuditStatus::Pending => 0,
            AuditStatus::Crawling => 1,
            AuditStatus::Analyzing => 2,
            AuditStatus::Scoring => 3,
            AuditStatus::Recommending => 4,
            AuditStatus::Comparing => 5,
            AuditStatus::Completed => 6,
            AuditStatus::Failed => 7,
        }
    }
}

impl From<Stage> for AuditStatus {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Crawling => AuditStatus::Crawling,
            Stage::Analyzing => AuditStatus::Analyzing,
            Stage::Scoring => AuditStatus::Scoring,
            Stage::Recommending => AuditStatus::Recommending,
            Stage::Comparing => AuditStatus::Comparing,
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Crawling => "crawling",
            AuditStatus::Analyzing => "analyzing",
            AuditStatus::Scoring => "scoring",
            AuditStatus::Recommending => "recommending",
            AuditStatus::Comparing => "comparing",
            AuditStatus::Completed => "completed",
            AuditStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "completed" => Ok(AuditStatus::Completed),
            "failed" => Ok(AuditStatus::Failed),
            other => other.parse::<Stage>().map(AuditStatus::from),
        }
    }
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Issue severity. Ordering matters: `Info < Warning < Critical`, so the
/// worst severity on a page is simply the max.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Analysis category an issue belongs to. Each category maps to one
/// sub-score on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Structure,
    Content,
    Eeat,
    Schema,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Structure => "structure",
            Category::Content => "content",
            Category::Eeat => "eeat",
            Category::Schema => "schema",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step of a remediation plan attached to an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixStep {
    pub step: u32,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub explanation: String,
}

/// A discrete, categorized finding on a page. Immutable once created.
///
/// The id is a stable key derived from `(page_id, category, normalized
/// title)`, so repeated analysis passes produce identical ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub severity: Severity,
    pub category: Category,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_elements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fix_plan: Vec<FixStep>,
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// Raw per-category scores in [0, 100] as produced by an analysis rule set,
/// before issue penalties are applied.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SubScores {
    pub structure: f64,
    pub content: f64,
    pub eeat: f64,
    pub schema: f64,
}

/// Final scores for a page or audit: four sub-scores plus the weighted
/// overall, all in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreSet {
    pub overall: f64,
    pub structure: f64,
    pub content: f64,
    pub eeat: f64,
    pub schema: f64,
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Overall page verdict, derived from the worst severity among its issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Pass,
    Warning,
    Fail,
}

impl PageStatus {
    /// Derive the status from an issue set: fail if any critical, warning if
    /// any warning, else pass.
    pub fn from_issues(issues: &[Issue]) -> Self {
        match issues.iter().map(|i| i.severity).max() {
            Some(Severity::Critical) => PageStatus::Fail,
            Some(Severity::Warning) => PageStatus::Warning,
            _ => PageStatus::Pass,
        }
    }
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PageStatus::Pass => "pass",
            PageStatus::Warning => "warning",
            PageStatus::Fail => "fail",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PageStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pass" => Ok(PageStatus::Pass),
            "warning" => Ok(PageStatus::Warning),
            "fail" => Ok(PageStatus::Fail),
            other => Err(format!("unknown page status: {other}")),
        }
    }
}

/// A single audited page, owned exclusively by its audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Unique page identifier (UUID v7).
    pub id: String,
    /// Owning audit.
    pub audit_id: AuditId,
    /// Original page URL.
    pub url: String,
    /// Stable path within the site (e.g., `blog/post-1`).
    pub path: String,
    /// Page title, if one was extracted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Final scores after penalties.
    pub scores: ScoreSet,
    /// Canonical issues found on this page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    /// When the page was last fetched.
    pub last_crawled: DateTime<Utc>,
    /// Verdict derived from the issue set.
    pub status: PageStatus,
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Pipeline progress embedded in the audit record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditProgress {
    /// Percentage in [0, 100], monotonically non-decreasing within one audit.
    pub percentage: f64,
    /// The stage currently executing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    /// Strict prefix of [`Stage::ORDER`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages_completed: Vec<Stage>,
}

/// Issue rollups, recomputed by summing over all current pages (never
/// drifted incrementally).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total_pages: usize,
    pub issues_found: usize,
    pub critical_issues: usize,
    pub warning_issues: usize,
    pub recommendations: usize,
}

/// One end-to-end analysis run for a target domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    pub id: AuditId,
    /// Normalized start URL.
    pub url: String,
    /// Host of the start URL.
    pub domain: String,
    pub status: AuditStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: AuditProgress,
    pub scores: ScoreSet,
    pub stats: AuditStats,
    /// Subdomains observed while crawling (not crawled themselves).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subdomains: Vec<String>,
    /// Competitor URLs supplied at start.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub competitor_urls: Vec<String>,
    /// Ranking produced by the comparing stage, if it ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<CompetitiveReport>,
    /// Reason recorded when the audit reached `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Store version counter for optimistic concurrency. Bumped on every
    /// persisted update; writers must present the version they read.
    #[serde(default)]
    pub version: u64,
}

impl Audit {
    /// Create a fresh audit in `Pending`.
    pub fn new(url: String, domain: String, competitor_urls: Vec<String>) -> Self {
        Self {
            id: AuditId::new(),
            url,
            domain,
            status: AuditStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            progress: AuditProgress::default(),
            scores: ScoreSet::default(),
            stats: AuditStats::default(),
            subdomains: Vec::new(),
            competitor_urls,
            comparison: None,
            failure_reason: None,
            version: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Competitive comparison
// ---------------------------------------------------------------------------

/// The scored result of an independently completed audit, used only as
/// comparison input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorSnapshot {
    pub url: String,
    pub scores: ScoreSet,
}

/// One row of a competitive ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorRank {
    /// 1-based rank, ordered by overall score descending.
    pub rank: u32,
    pub url: String,
    pub scores: ScoreSet,
    /// Whether this row is the audited subject itself.
    pub is_subject: bool,
}

/// Deterministic ranking of the subject against its competitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitiveReport {
    pub entries: Vec<CompetitorRank>,
    /// The subject's 1-based rank within `entries`.
    pub subject_rank: u32,
}

// ---------------------------------------------------------------------------
// Progress events
// ---------------------------------------------------------------------------

/// Counters attached to a progress event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_processed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues_found: Option<usize>,
}

/// An append-only record of pipeline advancement delivered to observers.
/// For one audit, successive events never decrease in `percentage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub audit_id: AuditId,
    pub timestamp: DateTime<Utc>,
    pub status: AuditStatus,
    pub percentage: f64,
    #[serde(default)]
    pub delta: ProgressDelta,
    pub terminal: bool,
    /// Explanatory reason on failed terminals (e.g., `cancelled`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ProgressEvent {
    /// Reconstruct the "current snapshot" event from a persisted audit.
    /// Emitted to subscribers that attach after the audit started.
    pub fn snapshot_of(audit: &Audit) -> Self {
        Self {
            audit_id: audit.id.clone(),
            timestamp: Utc::now(),
            status: audit.status,
            percentage: audit.progress.percentage,
            delta: ProgressDelta {
                pages_processed: Some(audit.stats.total_pages),
                issues_found: Some(audit.stats.issues_found),
            },
            terminal: audit.status.is_terminal(),
            reason: audit.failure_reason.clone(),
        }
    }
}
