//! Orchestration facade: the public entry point wiring collector, rules,
//! store, scheduler, and publisher into audit runs.
//!
//! Guarantees:
//! - at most one pipeline run per normalized url + competitor set at a time
//!   (a second `start_audit` while one is in flight returns the in-flight
//!   id);
//! - total concurrent audits bounded by a semaphore worker pool;
//! - cancellation is cooperative and idempotent on terminal audits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use url::Url;

use seolens_analysis::AnalysisRules;
use seolens_collector::CrawlCollector;
use seolens_shared::{
    AppConfig, Audit, AuditId, AuditStatus, Page, PipelineSettings, ProgressEvent, Result,
    SeolensError, StageWeights,
};
use seolens_storage::AuditStore;

use crate::pipeline::PipelineRunner;
use crate::progress::{ProgressPublisher, ProgressStream};
use crate::score::ScoreCalculator;

/// The audit engine. Cheap to clone; all state is behind `Arc`.
pub struct AuditEngine<S, C, R> {
    inner: Arc<EngineInner<S, C, R>>,
}

impl<S, C, R> Clone for AuditEngine<S, C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct EngineInner<S, C, R> {
    store: Arc<S>,
    collector: Arc<C>,
    rules: Arc<R>,
    publisher: Arc<ProgressPublisher>,
    stage_weights: StageWeights,
    calculator: ScoreCalculator,
    settings: PipelineSettings,
    audit_slots: Arc<Semaphore>,
    running: Mutex<RunningState>,
}

/// In-flight bookkeeping: request-coalescing keys and cancellation flags.
#[derive(Default)]
struct RunningState {
    by_key: HashMap<String, AuditId>,
    cancel_flags: HashMap<String, Arc<AtomicBool>>,
}

impl<S, C, R> AuditEngine<S, C, R>
where
    S: AuditStore,
    C: CrawlCollector,
    R: AnalysisRules,
{
    /// Build an engine. Stage and score weight invariants are validated
    /// here, so a misconfigured engine can never start an audit.
    pub fn new(store: Arc<S>, collector: Arc<C>, rules: Arc<R>, config: &AppConfig) -> Result<Self> {
        config.stage_weights.validate()?;
        let calculator = ScoreCalculator::new(config.score_weights)?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                store,
                collector,
                rules,
                publisher: Arc::new(ProgressPublisher::new()),
                stage_weights: config.stage_weights,
                calculator,
                settings: config.pipeline.clone(),
                audit_slots: Arc::new(Semaphore::new(config.pipeline.max_concurrent_audits)),
                running: Mutex::new(RunningState::default()),
            }),
        })
    }

    /// Start an audit for `url`, optionally benchmarking against competitor
    /// URLs. Returns the new audit id — or, if an identical request is
    /// already in flight, the existing in-flight id.
    pub async fn start_audit(&self, url: &str, competitor_urls: &[String]) -> Result<AuditId> {
        let (normalized, domain) = normalize_audit_url(url)?;

        let mut competitors = Vec::with_capacity(competitor_urls.len());
        for competitor in competitor_urls {
            let (normalized, _) = normalize_audit_url(competitor)?;
            competitors.push(normalized);
        }
        competitors.sort();
        competitors.dedup();

        let key = coalesce_key(&normalized, &competitors);
        let audit = Audit::new(normalized, domain, competitors);
        let cancel = Arc::new(AtomicBool::new(false));

        // Reserve the coalescing key before any I/O so a concurrent
        // identical request observes this run.
        {
            let mut running = self.inner.running.lock().expect("engine lock poisoned");
            if let Some(existing) = running.by_key.get(&key) {
                debug!(audit_id = %existing, "coalescing onto in-flight audit");
                return Ok(existing.clone());
            }
            running.by_key.insert(key.clone(), audit.id.clone());
            running
                .cancel_flags
                .insert(audit.id.to_string(), cancel.clone());
        }

        if let Err(e) = self.inner.store.insert_audit(&audit).await {
            let mut running = self.inner.running.lock().expect("engine lock poisoned");
            running.by_key.remove(&key);
            running.cancel_flags.remove(&audit.id.to_string());
            return Err(e);
        }

        self.inner
            .publisher
            .register(ProgressEvent::snapshot_of(&audit));

        info!(audit_id = %audit.id, url = %audit.url, "audit accepted");

        let inner = self.inner.clone();
        let audit_id = audit.id.clone();
        let id_for_task = audit.id.clone();
        tokio::spawn(async move {
            let _permit = inner
                .audit_slots
                .acquire()
                .await
                .expect("audit semaphore closed");

            let runner = PipelineRunner {
                store: inner.store.clone(),
                collector: inner.collector.clone(),
                rules: inner.rules.clone(),
                publisher: inner.publisher.clone(),
                stage_weights: inner.stage_weights,
                calculator: inner.calculator.clone(),
                settings: inner.settings.clone(),
                cancel,
            };
            runner.run(&id_for_task).await;

            let mut running = inner.running.lock().expect("engine lock poisoned");
            running.by_key.remove(&key);
            running.cancel_flags.remove(&id_for_task.to_string());
        });

        Ok(audit_id)
    }

    /// Fetch an audit by id.
    pub async fn get_audit(&self, id: &AuditId) -> Result<Audit> {
        self.inner
            .store
            .get_audit(id)
            .await?
            .ok_or_else(|| SeolensError::not_found(id.to_string()))
    }

    /// List all audits, newest first.
    pub async fn list_audits(&self) -> Result<Vec<Audit>> {
        self.inner.store.list_audits().await
    }

    /// Read-only access to a completed audit's full page/issue graph, for
    /// report exporters.
    pub async fn get_pages(&self, id: &AuditId) -> Result<Vec<Page>> {
        // Surface NotFound for unknown ids rather than an empty page list.
        self.get_audit(id).await?;
        self.inner.store.list_pages(id).await
    }

    /// Request cancellation. Running pipelines observe the flag at the next
    /// page or stage boundary; audits that are already terminal are left
    /// untouched (idempotent).
    pub async fn cancel_audit(&self, id: &AuditId) -> Result<()> {
        let flag = {
            let running = self.inner.running.lock().expect("engine lock poisoned");
            running.cancel_flags.get(&id.to_string()).cloned()
        };

        if let Some(flag) = flag {
            flag.store(true, Ordering::Relaxed);
            info!(audit_id = %id, "cancellation requested");
            return Ok(());
        }

        // No live pipeline: resolve directly against the store.
        let mut audit = self.get_audit(id).await?;
        if audit.status.is_terminal() {
            return Ok(());
        }

        let mut attempts = 0;
        loop {
            audit.status = AuditStatus::Failed;
            audit.failure_reason = Some("cancelled".into());
            audit.completed_at = Some(Utc::now());
            match self.inner.store.update_audit(&audit, audit.version).await {
                Ok(_) => break,
                Err(SeolensError::StoreConflict { .. })
                    if attempts < self.inner.settings.store_retry_limit =>
                {
                    attempts += 1;
                    audit = self.get_audit(id).await?;
                    if audit.status.is_terminal() {
                        return Ok(());
                    }
                }
                Err(e) => return Err(e),
            }
        }

        self.inner
            .publisher
            .publish(ProgressEvent::snapshot_of(&audit));
        Ok(())
    }

    /// Subscribe to an audit's progress stream. Live audits stream from the
    /// publisher; finished (or never-started) audits yield one snapshot
    /// reconstructed from the store.
    pub async fn subscribe(&self, id: &AuditId) -> Result<ProgressStream> {
        if let Some(stream) = self.inner.publisher.subscribe(id) {
            return Ok(stream);
        }
        let audit = self.get_audit(id).await?;
        Ok(ProgressStream::snapshot_only(ProgressEvent::snapshot_of(
            &audit,
        )))
    }
}

/// Validate and normalize an audit URL: absolute, http(s), with a host.
/// Fragment is dropped; the host doubles as the audit's domain.
fn normalize_audit_url(raw: &str) -> Result<(String, String)> {
    let mut url = Url::parse(raw.trim()).map_err(|e| {
        SeolensError::invalid_input(format!("'{raw}' is not an absolute URL: {e}"))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SeolensError::invalid_input(format!(
            "'{raw}': only http and https URLs can be audited"
        )));
    }

    let domain = url
        .host_str()
        .ok_or_else(|| SeolensError::invalid_input(format!("'{raw}' has no host")))?
        .to_lowercase();

    url.set_fragment(None);
    Ok((url.to_string(), domain))
}

fn coalesce_key(url: &str, competitors: &[String]) -> String {
    format!("{url}|{}", competitors.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use seolens_analysis::{PageAnalysis, PageContent, RawFinding};
    use seolens_collector::{CrawlObserver, CrawlOutcome, FetchedPage, PageFailure};
    use seolens_shared::{Category, PageStatus, Severity, Stage, SubScores};
    use seolens_storage::MemoryStore;

    // -- stubs --------------------------------------------------------------

    /// Serves a fixed set of pages; optional per-page delay and failures.
    struct StubCollector {
        pages: Vec<(&'static str, &'static str)>,
        failures: Vec<&'static str>,
        delay_ms: u64,
    }

    impl CrawlCollector for StubCollector {
        async fn collect(
            &self,
            start_url: &Url,
            observer: &dyn CrawlObserver,
        ) -> seolens_shared::Result<CrawlOutcome> {
            let mut pages = Vec::new();
            for (i, (path, html)) in self.pages.iter().enumerate() {
                if self.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
                }
                let url = start_url.join(path).expect("join path");
                pages.push(FetchedPage {
                    url: url.to_string(),
                    path: (*path).to_string(),
                    title: Some((*path).to_string()),
                    status: 200,
                    html: (*html).to_string(),
                    content_hash: format!("hash-{i}"),
                    fetched_at: Utc::now(),
                    links: vec![],
                });
                observer.page_fetched(url.as_str(), pages.len(), self.pages.len());
            }
            let failures = self
                .failures
                .iter()
                .map(|path| PageFailure {
                    url: start_url.join(path).expect("join path").to_string(),
                    reason: "HTTP 404".into(),
                })
                .collect();
            Ok(CrawlOutcome {
                pages,
                failures,
                subdomains: vec![],
                pages_skipped: 0,
                duration: Duration::from_millis(1),
            })
        }
    }

    /// Flags findings keyed by markers in the HTML; raw sub-scores all 100.
    struct MarkerRules {
        delay_ms: u64,
    }

    impl AnalysisRules for MarkerRules {
        async fn analyze(&self, page: &PageContent) -> seolens_shared::Result<PageAnalysis> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            let mut findings = Vec::new();
            if page.html.contains("CRITICAL_MARKER") {
                findings.push(RawFinding {
                    severity: Severity::Critical,
                    category: Category::Structure,
                    title: "Missing title tag".into(),
                    description: "no title".into(),
                    recommendation: "add a title".into(),
                    affected_elements: vec![],
                });
            }
            if page.html.contains("WARNING_MARKER") {
                findings.push(RawFinding {
                    severity: Severity::Warning,
                    category: Category::Content,
                    title: "Light content".into(),
                    description: "short page".into(),
                    recommendation: "write more".into(),
                    affected_elements: vec![],
                });
            }
            Ok(PageAnalysis {
                sub_scores: SubScores {
                    structure: 100.0,
                    content: 100.0,
                    eeat: 100.0,
                    schema: 100.0,
                },
                findings,
            })
        }

        fn name(&self) -> &str {
            "marker"
        }
    }

    type TestEngine = AuditEngine<MemoryStore, StubCollector, MarkerRules>;

    fn engine_with(collector: StubCollector, rules: MarkerRules) -> TestEngine {
        AuditEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(collector),
            Arc::new(rules),
            &AppConfig::default(),
        )
        .expect("engine config valid")
    }

    fn three_page_collector(delay_ms: u64) -> StubCollector {
        StubCollector {
            pages: vec![
                ("a", "<html>CRITICAL_MARKER</html>"),
                ("b", "<html>WARNING_MARKER</html>"),
                ("c", "<html>clean page</html>"),
            ],
            failures: vec![],
            delay_ms,
        }
    }

    async fn drain_to_terminal(stream: &mut ProgressStream) -> ProgressEvent {
        let mut prev_pct = -1.0f64;
        let mut last = None;
        while let Some(event) = stream.recv().await {
            assert!(
                event.percentage >= prev_pct,
                "percentage regressed: {} -> {}",
                prev_pct,
                event.percentage
            );
            prev_pct = event.percentage;
            last = Some(event);
        }
        let last = last.expect("stream yielded at least one event");
        assert!(last.terminal, "stream ended without a terminal event");
        last
    }

    // -- end-to-end ---------------------------------------------------------

    #[tokio::test]
    async fn end_to_end_three_page_audit() {
        let engine = engine_with(three_page_collector(0), MarkerRules { delay_ms: 0 });

        let id = engine
            .start_audit("https://example.com/", &[])
            .await
            .unwrap();

        let mut stream = engine.subscribe(&id).await.unwrap();
        let terminal = drain_to_terminal(&mut stream).await;
        assert_eq!(terminal.status, AuditStatus::Completed);
        assert_eq!(terminal.percentage, 100.0);

        let audit = engine.get_audit(&id).await.unwrap();
        assert_eq!(audit.status, AuditStatus::Completed);
        assert_eq!(audit.stats.total_pages, 3);
        assert_eq!(audit.stats.critical_issues, 1);
        assert_eq!(audit.stats.warning_issues, 1);
        assert_eq!(audit.stats.issues_found, 2);
        assert!(audit.completed_at.is_some());

        // Sub-score means: structure (85+100+100)/3, content (100+95+100)/3,
        // the rest untouched; overall by the weighted formula over the means.
        assert_eq!(audit.scores.structure, 95.0);
        assert_eq!(audit.scores.content, 98.3);
        assert_eq!(audit.scores.eeat, 100.0);
        assert_eq!(audit.scores.schema, 100.0);
        assert_eq!(audit.scores.overall, 98.0);

        // Stage bookkeeping: the full canonical order, nothing else.
        assert_eq!(audit.progress.stages_completed, Stage::ORDER.to_vec());
        assert_eq!(audit.progress.percentage, 100.0);

        let pages = engine.get_pages(&id).await.unwrap();
        assert_eq!(pages.len(), 3);
        let critical_page = pages.iter().find(|p| p.path == "a").unwrap();
        assert_eq!(critical_page.status, PageStatus::Fail);
        assert!(!critical_page.issues[0].fix_plan.is_empty());
        let clean_page = pages.iter().find(|p| p.path == "c").unwrap();
        assert_eq!(clean_page.status, PageStatus::Pass);
    }

    #[tokio::test]
    async fn fetch_failures_become_fail_pages_not_audit_failures() {
        let collector = StubCollector {
            pages: vec![("ok", "<html>clean</html>")],
            failures: vec!["broken"],
            delay_ms: 0,
        };
        let engine = engine_with(collector, MarkerRules { delay_ms: 0 });

        let id = engine
            .start_audit("https://example.com/", &[])
            .await
            .unwrap();
        let mut stream = engine.subscribe(&id).await.unwrap();
        let terminal = drain_to_terminal(&mut stream).await;
        assert_eq!(terminal.status, AuditStatus::Completed);

        let pages = engine.get_pages(&id).await.unwrap();
        assert_eq!(pages.len(), 2);
        let broken = pages.iter().find(|p| p.path == "broken").unwrap();
        assert_eq!(broken.status, PageStatus::Fail);
        assert_eq!(broken.issues[0].title, "Page unreachable");
        assert!(broken.issues[0].description.contains("HTTP 404"));
    }

    #[tokio::test]
    async fn zero_pages_crawled_fails_the_audit() {
        let collector = StubCollector {
            pages: vec![],
            failures: vec![],
            delay_ms: 0,
        };
        let engine = engine_with(collector, MarkerRules { delay_ms: 0 });

        let id = engine
            .start_audit("https://example.com/", &[])
            .await
            .unwrap();
        let mut stream = engine.subscribe(&id).await.unwrap();
        let terminal = drain_to_terminal(&mut stream).await;

        assert_eq!(terminal.status, AuditStatus::Failed);
        assert!(terminal.reason.as_deref().unwrap().contains("zero pages"));

        let audit = engine.get_audit(&id).await.unwrap();
        assert_eq!(audit.status, AuditStatus::Failed);
    }

    // -- input validation ---------------------------------------------------

    #[tokio::test]
    async fn rejects_invalid_urls_before_creating_state() {
        let engine = engine_with(three_page_collector(0), MarkerRules { delay_ms: 0 });

        for bad in ["not a url", "example.com/no-scheme", "ftp://example.com/"] {
            let err = engine.start_audit(bad, &[]).await.unwrap_err();
            assert!(
                matches!(err, SeolensError::InvalidInput { .. }),
                "{bad} should be rejected"
            );
        }
        assert!(engine.list_audits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_audit_is_not_found() {
        let engine = engine_with(three_page_collector(0), MarkerRules { delay_ms: 0 });
        let missing = AuditId::new();
        assert!(matches!(
            engine.get_audit(&missing).await.unwrap_err(),
            SeolensError::NotFound { .. }
        ));
        assert!(matches!(
            engine.subscribe(&missing).await.unwrap_err(),
            SeolensError::NotFound { .. }
        ));
    }

    // -- coalescing ---------------------------------------------------------

    #[tokio::test]
    async fn concurrent_identical_requests_coalesce() {
        let engine = engine_with(three_page_collector(20), MarkerRules { delay_ms: 0 });

        let id1 = engine
            .start_audit("https://example.com/", &[])
            .await
            .unwrap();
        // Equivalent after normalization.
        let id2 = engine.start_audit("https://example.com", &[]).await.unwrap();
        assert_eq!(id1, id2);

        // A different competitor set is a different audit.
        let id3 = engine
            .start_audit("https://example.com/", &["https://rival.com/".into()])
            .await
            .unwrap();
        assert_ne!(id1, id3);

        // After the run finishes, an identical request starts a new audit.
        let mut stream = engine.subscribe(&id1).await.unwrap();
        drain_to_terminal(&mut stream).await;
        // The pipeline task clears its coalescing key just after the
        // terminal event; give it a beat.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let id4 = engine
            .start_audit("https://example.com/", &[])
            .await
            .unwrap();
        assert_ne!(id1, id4);
    }

    // -- progress stream ----------------------------------------------------

    #[tokio::test]
    async fn late_subscriber_gets_snapshot_then_consistent_events() {
        let engine = engine_with(three_page_collector(30), MarkerRules { delay_ms: 50 });

        let id = engine
            .start_audit("https://example.com/", &[])
            .await
            .unwrap();

        // Let the pipeline make some progress before attaching.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut stream = engine.subscribe(&id).await.unwrap();
        let snapshot = stream.recv().await.unwrap();
        assert!(!snapshot.terminal, "pipeline finished before we attached");

        // Every event after the snapshot stays at or above it: no gaps, no
        // regressions, ending at the terminal.
        let mut prev = snapshot.percentage;
        while let Some(event) = stream.recv().await {
            assert!(event.percentage >= prev);
            prev = event.percentage;
        }
        assert_eq!(prev, 100.0);
    }

    #[tokio::test]
    async fn subscriber_after_completion_gets_terminal_snapshot() {
        let engine = engine_with(three_page_collector(0), MarkerRules { delay_ms: 0 });

        let id = engine
            .start_audit("https://example.com/", &[])
            .await
            .unwrap();
        let mut stream = engine.subscribe(&id).await.unwrap();
        drain_to_terminal(&mut stream).await;

        // A fresh subscription replays the persisted terminal state.
        let mut late = engine.subscribe(&id).await.unwrap();
        let snapshot = late.recv().await.unwrap();
        assert!(snapshot.terminal);
        assert_eq!(snapshot.status, AuditStatus::Completed);
        assert_eq!(snapshot.percentage, 100.0);
        assert!(late.recv().await.is_none());
    }

    // -- cancellation -------------------------------------------------------

    #[tokio::test]
    async fn cancel_mid_analyzing_yields_cancelled_terminal() {
        let engine = engine_with(three_page_collector(0), MarkerRules { delay_ms: 100 });

        let id = engine
            .start_audit("https://example.com/", &[])
            .await
            .unwrap();

        // Wait until the pipeline is inside analyzing, then cancel.
        let mut stream = engine.subscribe(&id).await.unwrap();
        loop {
            let event = stream.recv().await.expect("pipeline still running");
            if event.status == AuditStatus::Analyzing {
                break;
            }
        }
        engine.cancel_audit(&id).await.unwrap();

        let terminal = drain_to_terminal(&mut stream).await;
        assert_eq!(terminal.status, AuditStatus::Failed);
        assert_eq!(terminal.reason.as_deref(), Some("cancelled"));

        let audit = engine.get_audit(&id).await.unwrap();
        assert_eq!(audit.status, AuditStatus::Failed);
        assert_eq!(audit.failure_reason.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_on_terminal_audits() {
        let engine = engine_with(three_page_collector(0), MarkerRules { delay_ms: 0 });

        let id = engine
            .start_audit("https://example.com/", &[])
            .await
            .unwrap();
        let mut stream = engine.subscribe(&id).await.unwrap();
        drain_to_terminal(&mut stream).await;

        // Audit is completed; cancelling must be a no-op, repeatedly.
        engine.cancel_audit(&id).await.unwrap();
        engine.cancel_audit(&id).await.unwrap();
        let audit = engine.get_audit(&id).await.unwrap();
        assert_eq!(audit.status, AuditStatus::Completed);
    }

    // -- comparison ---------------------------------------------------------

    #[tokio::test]
    async fn comparing_ranks_against_recorded_snapshots() {
        // Shared store: the first audit records the competitor snapshot the
        // second audit compares against.
        let store = Arc::new(MemoryStore::new());
        let config = AppConfig::default();

        let rival_engine: TestEngine = AuditEngine::new(
            store.clone(),
            Arc::new(three_page_collector(0)),
            Arc::new(MarkerRules { delay_ms: 0 }),
            &config,
        )
        .unwrap();
        let rival_id = rival_engine
            .start_audit("https://rival.com/", &[])
            .await
            .unwrap();
        let mut stream = rival_engine.subscribe(&rival_id).await.unwrap();
        drain_to_terminal(&mut stream).await;

        // Subject crawls clean pages only, so it outranks the rival.
        let subject_engine: TestEngine = AuditEngine::new(
            store.clone(),
            Arc::new(StubCollector {
                pages: vec![("a", "<html>clean</html>"), ("b", "<html>clean</html>")],
                failures: vec![],
                delay_ms: 0,
            }),
            Arc::new(MarkerRules { delay_ms: 0 }),
            &config,
        )
        .unwrap();
        let subject_id = subject_engine
            .start_audit("https://subject.com/", &["https://rival.com/".into()])
            .await
            .unwrap();
        let mut stream = subject_engine.subscribe(&subject_id).await.unwrap();
        let terminal = drain_to_terminal(&mut stream).await;
        assert_eq!(terminal.status, AuditStatus::Completed);

        let audit = subject_engine.get_audit(&subject_id).await.unwrap();
        let report = audit.comparison.expect("comparison ran");
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.subject_rank, 1);
        assert!(report.entries[0].is_subject);
        assert_eq!(report.entries[1].url, "https://rival.com/");
    }

    #[tokio::test]
    async fn comparing_skips_but_records_stage_without_competitors() {
        let engine = engine_with(three_page_collector(0), MarkerRules { delay_ms: 0 });

        let id = engine
            .start_audit("https://example.com/", &[])
            .await
            .unwrap();
        let mut stream = engine.subscribe(&id).await.unwrap();
        drain_to_terminal(&mut stream).await;

        let audit = engine.get_audit(&id).await.unwrap();
        // Skipped stage still counts toward the stage prefix and percentage.
        assert!(audit.progress.stages_completed.contains(&Stage::Comparing));
        assert_eq!(audit.progress.percentage, 100.0);
        assert!(audit.comparison.is_none());
    }
}
