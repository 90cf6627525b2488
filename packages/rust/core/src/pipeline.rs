//! Audit pipeline state machine.
//!
//! Drives one audit through `crawling → analyzing → scoring → recommending →
//! comparing → completed`, persisting every state change through the store's
//! optimistic-update contract and emitting progress events as it goes.
//!
//! Stage order is fixed. A stage-level failure transitions the audit to
//! `failed` with a terminal event carrying the reason; no stage is retried
//! here. Per-page failures are absorbed into `fail`-status pages and never
//! abort the audit. Cancellation is cooperative: a shared flag checked at
//! every stage and page boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use seolens_analysis::{AnalysisRules, PageContent};
use seolens_collector::{CrawlCollector, CrawlObserver, url_to_path};
use seolens_shared::{
    Audit, AuditId, AuditStatus, CompetitorSnapshot, FixStep, Issue, Page, PageStatus,
    PipelineSettings, ProgressDelta, ProgressEvent, Result, ScoreSet, SeolensError, Severity,
    Stage, StageWeights, SubScores,
};
use seolens_storage::AuditStore;

use crate::compare;
use crate::issues;
use crate::progress::ProgressPublisher;
use crate::score::ScoreCalculator;

/// One audit's in-memory working state for a page: the persisted record plus
/// the raw HTML and rule sub-scores that never hit the store.
struct PageWork {
    page: Page,
    html: Option<String>,
    raw: SubScores,
}

/// Executes one audit pipeline run. Constructed per-run by the facade.
pub struct PipelineRunner<S, C, R> {
    pub(crate) store: Arc<S>,
    pub(crate) collector: Arc<C>,
    pub(crate) rules: Arc<R>,
    pub(crate) publisher: Arc<ProgressPublisher>,
    pub(crate) stage_weights: StageWeights,
    pub(crate) calculator: ScoreCalculator,
    pub(crate) settings: PipelineSettings,
    pub(crate) cancel: Arc<AtomicBool>,
}

impl<S, C, R> PipelineRunner<S, C, R>
where
    S: AuditStore,
    C: CrawlCollector,
    R: AnalysisRules,
{
    /// Run the pipeline to a terminal state. Errors never escape: every
    /// failure path ends in a persisted `failed` audit and a terminal event.
    #[instrument(skip_all, fields(audit_id = %audit_id))]
    pub async fn run(&self, audit_id: &AuditId) {
        let mut audit = match self.store.get_audit(audit_id).await {
            Ok(Some(audit)) => audit,
            Ok(None) => {
                warn!("audit vanished before the pipeline started");
                return;
            }
            Err(e) => {
                warn!(error = %e, "could not load audit, pipeline aborted");
                return;
            }
        };

        match self.run_stages(&mut audit).await {
            Ok(()) => {}
            Err(SeolensError::Cancelled) => self.fail(&mut audit, "cancelled").await,
            Err(e) => self.fail(&mut audit, &e.to_string()).await,
        }
    }

    async fn run_stages(&self, audit: &mut Audit) -> Result<()> {
        let start = Instant::now();
        info!(url = %audit.url, competitors = audit.competitor_urls.len(), "starting audit");

        let mut work = self.stage_crawling(audit).await?;
        self.stage_analyzing(audit, &mut work).await?;
        self.stage_scoring(audit, &mut work).await?;
        self.stage_recommending(audit, &mut work).await?;
        self.stage_comparing(audit).await?;
        self.complete(audit).await?;

        info!(
            pages = audit.stats.total_pages,
            issues = audit.stats.issues_found,
            overall = audit.scores.overall,
            elapsed_ms = start.elapsed().as_millis(),
            "audit complete"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Crawl the target and materialize page records. Fetch failures become
    /// `fail`-status pages with a synthetic unreachable issue; zero pages
    /// fetched is a stage failure.
    async fn stage_crawling(&self, audit: &mut Audit) -> Result<Vec<PageWork>> {
        self.enter_stage(audit, Stage::Crawling).await?;

        let start_url = Url::parse(&audit.url).map_err(|e| {
            SeolensError::stage_failure(Stage::Crawling, format!("bad audit url: {e}"))
        })?;

        let observer = CrawlProgress {
            publisher: self.publisher.clone(),
            audit_id: audit.id.clone(),
            weights: self.stage_weights,
            last_tenths: AtomicU64::new((audit.progress.percentage * 10.0) as u64),
        };

        let outcome = self
            .collector
            .collect(&start_url, &observer)
            .await
            .map_err(|e| SeolensError::stage_failure(Stage::Crawling, e.to_string()))?;
        self.check_cancel()?;

        if outcome.pages.is_empty() {
            return Err(SeolensError::stage_failure(
                Stage::Crawling,
                "zero pages crawled",
            ));
        }

        let mut work: Vec<PageWork> = Vec::with_capacity(outcome.pages.len());
        for fetched in outcome.pages {
            let page = Page {
                id: Uuid::now_v7().to_string(),
                audit_id: audit.id.clone(),
                url: fetched.url,
                path: fetched.path,
                title: fetched.title,
                scores: ScoreSet::default(),
                issues: vec![],
                last_crawled: fetched.fetched_at,
                status: PageStatus::Pass,
            };
            work.push(PageWork {
                page,
                html: Some(fetched.html),
                raw: SubScores::default(),
            });
        }

        for failure in outcome.failures {
            let id = Uuid::now_v7().to_string();
            let issue = issues::unreachable_page_issue(&id, &failure.reason);
            let path = Url::parse(&failure.url)
                .map(|u| url_to_path(&u))
                .unwrap_or_else(|_| failure.url.clone());
            let page = Page {
                id,
                audit_id: audit.id.clone(),
                url: failure.url,
                path,
                title: None,
                scores: ScoreSet::default(),
                issues: vec![issue],
                last_crawled: Utc::now(),
                status: PageStatus::Fail,
            };
            work.push(PageWork {
                page,
                html: None,
                raw: SubScores::default(),
            });
        }

        for w in &work {
            self.store.upsert_page(&w.page).await?;
        }

        audit.subdomains = outcome.subdomains;
        audit.stats = issues::audit_stats(work.iter().map(|w| &w.page));

        let delta = ProgressDelta {
            pages_processed: Some(audit.stats.total_pages),
            issues_found: Some(audit.stats.issues_found),
        };
        self.complete_stage(audit, Stage::Crawling, delta).await?;
        Ok(work)
    }

    /// Fan page analysis out to a bounded number of concurrent tasks and
    /// join them. A single page's failure marks that page, not the audit.
    async fn stage_analyzing(&self, audit: &mut Audit, work: &mut [PageWork]) -> Result<()> {
        self.enter_stage(audit, Stage::Analyzing).await?;

        let semaphore = Arc::new(Semaphore::new(self.settings.page_concurrency));
        let mut handles = Vec::new();

        for (idx, w) in work.iter().enumerate() {
            // Unreachable pages carry no HTML and skip analysis.
            let Some(html) = w.html.clone() else { continue };
            let content = PageContent {
                url: w.page.url.clone(),
                html,
                status: 200,
            };
            let rules = self.rules.clone();
            let sem = semaphore.clone();

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                let result = rules.analyze(&content).await;
                (idx, result)
            }));
        }

        let total = handles.len().max(1);
        let mut processed = 0usize;

        for handle in handles {
            self.check_cancel()?;

            let (idx, result) = handle.await.map_err(|e| {
                SeolensError::stage_failure(Stage::Analyzing, format!("analysis task died: {e}"))
            })?;

            {
                let w = &mut work[idx];
                match result {
                    Ok(analysis) => {
                        w.raw = analysis.sub_scores;
                        w.page.issues = issues::canonicalize(&w.page.id, analysis.findings);
                    }
                    Err(e) => {
                        warn!(url = %w.page.url, error = %e, "page analysis failed");
                        w.page.issues =
                            vec![issues::analysis_failed_issue(&w.page.id, &e.to_string())];
                    }
                }
                w.page.status = PageStatus::from_issues(&w.page.issues);
                self.store.upsert_page(&w.page).await?;
            }

            processed += 1;
            audit.stats = issues::audit_stats(work.iter().map(|w| &w.page));

            let frac = processed as f64 / total as f64;
            let delta = ProgressDelta {
                pages_processed: Some(processed),
                issues_found: Some(audit.stats.issues_found),
            };
            self.emit(audit, Some(frac), delta).await?;
        }

        let delta = ProgressDelta {
            pages_processed: Some(processed),
            issues_found: Some(audit.stats.issues_found),
        };
        self.complete_stage(audit, Stage::Analyzing, delta).await
    }

    /// Apply the score calculator to every page, then roll the audit-level
    /// scores up from the page sub-score means.
    async fn stage_scoring(&self, audit: &mut Audit, work: &mut [PageWork]) -> Result<()> {
        self.enter_stage(audit, Stage::Scoring).await?;

        for w in work.iter_mut() {
            self.check_cancel()?;
            w.page.scores = self.calculator.page_scores(&w.raw, &w.page.issues);
            self.store.upsert_page(&w.page).await?;
        }

        let pages: Vec<Page> = work.iter().map(|w| w.page.clone()).collect();
        audit.scores = self.calculator.audit_scores(&pages);

        self.complete_stage(audit, Stage::Scoring, ProgressDelta::default())
            .await
    }

    /// Attach remediation plans to actionable issues.
    async fn stage_recommending(&self, audit: &mut Audit, work: &mut [PageWork]) -> Result<()> {
        self.enter_stage(audit, Stage::Recommending).await?;

        for w in work.iter_mut() {
            self.check_cancel()?;

            let mut changed = false;
            for issue in w.page.issues.iter_mut() {
                if issue.severity != Severity::Info && issue.fix_plan.is_empty() {
                    let plan = build_fix_plan(issue);
                    issue.fix_plan = plan;
                    changed = true;
                }
            }
            if changed {
                self.store.upsert_page(&w.page).await?;
            }
        }

        audit.stats = issues::audit_stats(work.iter().map(|w| &w.page));
        self.complete_stage(audit, Stage::Recommending, ProgressDelta::default())
            .await
    }

    /// Rank the audit against already-audited competitor snapshots. With no
    /// competitors the stage is skipped but still recorded in
    /// `stages_completed` so percentage math stays consistent.
    async fn stage_comparing(&self, audit: &mut Audit) -> Result<()> {
        self.check_cancel()?;

        if audit.competitor_urls.is_empty() {
            audit.status = AuditStatus::Comparing;
            audit.progress.current_stage = None;
            audit.progress.stages_completed.push(Stage::Comparing);
            return self.emit(audit, None, ProgressDelta::default()).await;
        }

        self.enter_stage(audit, Stage::Comparing).await?;

        let mut snapshots = Vec::new();
        for competitor in &audit.competitor_urls {
            let domain = Url::parse(competitor)
                .ok()
                .and_then(|u| u.host_str().map(str::to_lowercase));
            let Some(domain) = domain else {
                warn!(url = %competitor, "competitor url has no host, skipping");
                continue;
            };
            match self.store.get_snapshot(&domain).await? {
                Some(snapshot) => snapshots.push(snapshot),
                None => {
                    warn!(%domain, "competitor has not been audited yet, skipping");
                }
            }
        }

        let subject = CompetitorSnapshot {
            url: audit.url.clone(),
            scores: audit.scores,
        };
        audit.comparison = Some(compare::rank(subject, snapshots));

        self.complete_stage(audit, Stage::Comparing, ProgressDelta::default())
            .await
    }

    /// Terminal success: persist `completed`, record this audit's snapshot
    /// for future comparisons, and publish the terminal event.
    async fn complete(&self, audit: &mut Audit) -> Result<()> {
        audit.status = AuditStatus::Completed;
        audit.completed_at = Some(Utc::now());
        audit.progress.current_stage = None;

        let pct = self
            .stage_weights
            .percentage(&audit.progress.stages_completed, None);
        audit.progress.percentage = audit.progress.percentage.max(pct);

        self.persist(audit).await?;

        let snapshot = CompetitorSnapshot {
            url: audit.url.clone(),
            scores: audit.scores,
        };
        self.store.record_snapshot(&audit.domain, &snapshot).await?;

        self.publisher.publish(ProgressEvent {
            audit_id: audit.id.clone(),
            timestamp: Utc::now(),
            status: audit.status,
            percentage: audit.progress.percentage,
            delta: ProgressDelta {
                pages_processed: Some(audit.stats.total_pages),
                issues_found: Some(audit.stats.issues_found),
            },
            terminal: true,
            reason: None,
        });
        Ok(())
    }

    /// Terminal failure: persist `failed` with the reason and publish the
    /// terminal event. Partial progress stays visible.
    async fn fail(&self, audit: &mut Audit, reason: &str) {
        warn!(reason, "audit failed");

        audit.status = AuditStatus::Failed;
        audit.failure_reason = Some(reason.to_string());
        audit.completed_at = Some(Utc::now());
        audit.progress.current_stage = None;

        let mut attempts = 0;
        loop {
            match self.store.update_audit(audit, audit.version).await {
                Ok(v) => {
                    audit.version = v;
                    break;
                }
                Err(SeolensError::StoreConflict { .. })
                    if attempts < self.settings.store_retry_limit =>
                {
                    attempts += 1;
                    match self.store.get_audit(&audit.id).await {
                        Ok(Some(fresh)) => audit.version = fresh.version,
                        _ => break,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "could not persist terminal failure");
                    break;
                }
            }
        }

        self.publisher.publish(ProgressEvent {
            audit_id: audit.id.clone(),
            timestamp: Utc::now(),
            status: AuditStatus::Failed,
            percentage: audit.progress.percentage,
            delta: ProgressDelta {
                pages_processed: Some(audit.stats.total_pages),
                issues_found: Some(audit.stats.issues_found),
            },
            terminal: true,
            reason: Some(reason.to_string()),
        });
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(SeolensError::Cancelled);
        }
        Ok(())
    }

    async fn enter_stage(&self, audit: &mut Audit, stage: Stage) -> Result<()> {
        self.check_cancel()?;
        audit.status = stage.into();
        audit.progress.current_stage = Some(stage);
        info!(stage = %stage, "entering stage");
        self.emit(audit, Some(0.0), ProgressDelta::default()).await
    }

    async fn complete_stage(
        &self,
        audit: &mut Audit,
        stage: Stage,
        delta: ProgressDelta,
    ) -> Result<()> {
        audit.progress.stages_completed.push(stage);
        audit.progress.current_stage = None;
        self.emit(audit, None, delta).await
    }

    /// Recompute the percentage (monotone), persist the audit, then publish.
    /// Persist-before-publish keeps late-joiner snapshots consistent with
    /// what subscribers have already seen.
    async fn emit(&self, audit: &mut Audit, frac: Option<f64>, delta: ProgressDelta) -> Result<()> {
        let current = match (audit.progress.current_stage, frac) {
            (Some(stage), Some(frac)) => Some((stage, frac)),
            _ => None,
        };
        let pct = self
            .stage_weights
            .percentage(&audit.progress.stages_completed, current);
        if pct > audit.progress.percentage {
            audit.progress.percentage = pct;
        }

        self.persist(audit).await?;

        self.publisher.publish(ProgressEvent {
            audit_id: audit.id.clone(),
            timestamp: Utc::now(),
            status: audit.status,
            percentage: audit.progress.percentage,
            delta,
            terminal: false,
            reason: None,
        });
        Ok(())
    }

    /// Optimistic update with bounded retry. A conflict means another writer
    /// (cancellation) touched the record: reload, and bail out as cancelled
    /// if the audit was terminated under us.
    async fn persist(&self, audit: &mut Audit) -> Result<()> {
        let mut attempts = 0;
        loop {
            match self.store.update_audit(audit, audit.version).await {
                Ok(version) => {
                    audit.version = version;
                    return Ok(());
                }
                Err(SeolensError::StoreConflict { .. }) => {
                    attempts += 1;
                    if attempts > self.settings.store_retry_limit {
                        return Err(SeolensError::stage_failure(
                            audit.progress.current_stage.unwrap_or(Stage::Crawling),
                            "store conflict retries exhausted",
                        ));
                    }
                    let fresh = self
                        .store
                        .get_audit(&audit.id)
                        .await?
                        .ok_or_else(|| SeolensError::not_found(audit.id.to_string()))?;
                    if fresh.status.is_terminal() {
                        return Err(SeolensError::Cancelled);
                    }
                    audit.version = fresh.version;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Bridges crawl callbacks onto the progress stream. Crawl-time events are
/// published without a store write; the stage-completion event that follows
/// always persists at a percentage at or above anything published here.
struct CrawlProgress {
    publisher: Arc<ProgressPublisher>,
    audit_id: AuditId,
    weights: StageWeights,
    /// Monotone high-water mark, in tenths of a percent.
    last_tenths: AtomicU64,
}

impl CrawlObserver for CrawlProgress {
    fn page_fetched(&self, _url: &str, fetched: usize, discovered: usize) {
        // The BFS frontier keeps growing, so the fraction estimate can dip;
        // clamp to the high-water mark to keep the stream monotone.
        let frac = fetched as f64 / discovered.max(fetched).max(1) as f64;
        let pct = self.weights.percentage(&[], Some((Stage::Crawling, frac)));
        let tenths = (pct * 10.0) as u64;
        let prev = self.last_tenths.fetch_max(tenths, Ordering::Relaxed);
        let pct = tenths.max(prev) as f64 / 10.0;

        self.publisher.publish(ProgressEvent {
            audit_id: self.audit_id.clone(),
            timestamp: Utc::now(),
            status: AuditStatus::Crawling,
            percentage: pct,
            delta: ProgressDelta {
                pages_processed: Some(fetched),
                issues_found: None,
            },
            terminal: false,
            reason: None,
        });
    }
}

/// Deterministic remediation steps derived from an issue's own guidance.
fn build_fix_plan(issue: &Issue) -> Vec<FixStep> {
    let locate = if issue.affected_elements.is_empty() {
        "Locate the affected markup in the page source".to_string()
    } else {
        format!(
            "Inspect the affected elements: {}",
            issue.affected_elements.join(", ")
        )
    };

    vec![
        FixStep {
            step: 1,
            action: locate,
            code: None,
            explanation: issue.description.clone(),
        },
        FixStep {
            step: 2,
            action: issue.recommendation.clone(),
            code: None,
            explanation: format!(
                "Resolves the {} {} finding \"{}\".",
                issue.severity, issue.category, issue.title
            ),
        },
    ]
}
