//! Audit state store: the single writer-of-record for audits, pages, and
//! competitor snapshots.
//!
//! The [`AuditStore`] trait is the update contract the pipeline consumes;
//! audit mutations go through [`AuditStore::update_audit`], an optimistic
//! update keyed by the record's version counter so concurrent
//! cancel-vs-progress races fail safely and the losing writer retries
//! against fresh state.
//!
//! Two implementations ship here: [`LibsqlStore`] (durable, libSQL-backed)
//! and [`MemoryStore`] (mutex-guarded maps, for tests and ephemeral runs).

mod memory;
mod migrations;

use std::future::Future;
use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, params};

use seolens_shared::{
    Audit, AuditId, AuditProgress, CompetitorSnapshot, Page, Result, SeolensError,
};

pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// AuditStore trait
// ---------------------------------------------------------------------------

/// CRUD over audit/page/snapshot records with optimistic-concurrency update
/// support. Consumed by the pipeline; never implemented there.
pub trait AuditStore: Send + Sync + 'static {
    /// Insert a new audit record. The record's `version` is stored as-is.
    fn insert_audit(&self, audit: &Audit) -> impl Future<Output = Result<()>> + Send;

    /// Fetch an audit by id.
    fn get_audit(&self, id: &AuditId) -> impl Future<Output = Result<Option<Audit>>> + Send;

    /// List all audits, newest first.
    fn list_audits(&self) -> impl Future<Output = Result<Vec<Audit>>> + Send;

    /// Optimistically update an audit. Succeeds only if the stored version
    /// equals `expected_version`; returns the new version on success and
    /// [`SeolensError::StoreConflict`] when another writer got there first.
    fn update_audit(
        &self,
        audit: &Audit,
        expected_version: u64,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Delete an audit and cascade to its pages.
    fn delete_audit(&self, id: &AuditId) -> impl Future<Output = Result<()>> + Send;

    /// Insert or update a page (keyed by `audit_id + path`).
    fn upsert_page(&self, page: &Page) -> impl Future<Output = Result<()>> + Send;

    /// List an audit's pages ordered by path.
    fn list_pages(&self, audit_id: &AuditId) -> impl Future<Output = Result<Vec<Page>>> + Send;

    /// Record the scored snapshot of a completed audit, keyed by domain.
    fn record_snapshot(
        &self,
        domain: &str,
        snapshot: &CompetitorSnapshot,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch the latest snapshot for a domain, if one exists.
    fn get_snapshot(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Option<CompetitorSnapshot>>> + Send;
}

// ---------------------------------------------------------------------------
// LibsqlStore
// ---------------------------------------------------------------------------

/// Durable store handle wrapping a libSQL database.
pub struct LibsqlStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl LibsqlStore {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SeolensError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SeolensError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SeolensError::Storage(e.to_string()))?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    SeolensError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }
}

impl AuditStore for LibsqlStore {
    async fn insert_audit(&self, audit: &Audit) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO audits (id, url, domain, status, created_at, completed_at,
                                     percentage, current_stage, stages_completed_json,
                                     scores_json, stats_json, subdomains_json,
                                     competitor_urls_json, comparison_json, failure_reason,
                                     version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                audit_param_values(audit, audit.version)?,
            )
            .await
            .map_err(|e| SeolensError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_audit(&self, id: &AuditId) -> Result<Option<Audit>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {AUDIT_COLUMNS} FROM audits WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| SeolensError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_audit(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(SeolensError::Storage(e.to_string())),
        }
    }

    async fn list_audits(&self) -> Result<Vec<Audit>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {AUDIT_COLUMNS} FROM audits ORDER BY created_at DESC"),
                params![],
            )
            .await
            .map_err(|e| SeolensError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_audit(&row)?);
        }
        Ok(results)
    }

    async fn update_audit(&self, audit: &Audit, expected_version: u64) -> Result<u64> {
        let new_version = expected_version + 1;
        let affected = self
            .conn
            .execute(
                "UPDATE audits SET url = ?2, domain = ?3, status = ?4, created_at = ?5,
                                   completed_at = ?6, percentage = ?7, current_stage = ?8,
                                   stages_completed_json = ?9, scores_json = ?10,
                                   stats_json = ?11, subdomains_json = ?12,
                                   competitor_urls_json = ?13, comparison_json = ?14,
                                   failure_reason = ?15, version = ?16
                 WHERE id = ?1 AND version = ?17",
                {
                    let mut p = audit_param_values(audit, new_version)?;
                    p.push(libsql::Value::Integer(expected_version as i64));
                    p
                },
            )
            .await
            .map_err(|e| SeolensError::Storage(e.to_string()))?;

        if affected == 0 {
            // Distinguish a version race from a missing record.
            return match self.get_audit(&audit.id).await? {
                Some(_) => Err(SeolensError::StoreConflict {
                    id: audit.id.to_string(),
                    expected: expected_version,
                }),
                None => Err(SeolensError::not_found(audit.id.to_string())),
            };
        }
        Ok(new_version)
    }

    async fn delete_audit(&self, id: &AuditId) -> Result<()> {
        // Explicit cascade: pages first, then the audit row.
        self.conn
            .execute(
                "DELETE FROM pages WHERE audit_id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| SeolensError::Storage(e.to_string()))?;
        self.conn
            .execute("DELETE FROM audits WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| SeolensError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn upsert_page(&self, page: &Page) -> Result<()> {
        let scores_json = to_json(&page.scores)?;
        let issues_json = to_json(&page.issues)?;
        self.conn
            .execute(
                "INSERT INTO pages (id, audit_id, url, path, title, status, scores_json,
                                    issues_json, last_crawled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(audit_id, path) DO UPDATE SET
                   url = excluded.url,
                   title = excluded.title,
                   status = excluded.status,
                   scores_json = excluded.scores_json,
                   issues_json = excluded.issues_json,
                   last_crawled = excluded.last_crawled",
                params![
                    page.id.as_str(),
                    page.audit_id.to_string(),
                    page.url.as_str(),
                    page.path.as_str(),
                    page.title.as_deref(),
                    page.status.to_string(),
                    scores_json.as_str(),
                    issues_json.as_str(),
                    page.last_crawled.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| SeolensError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn list_pages(&self, audit_id: &AuditId) -> Result<Vec<Page>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, audit_id, url, path, title, status, scores_json, issues_json,
                        last_crawled
                 FROM pages WHERE audit_id = ?1 ORDER BY path",
                params![audit_id.to_string()],
            )
            .await
            .map_err(|e| SeolensError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_page(&row)?);
        }
        Ok(results)
    }

    async fn record_snapshot(&self, domain: &str, snapshot: &CompetitorSnapshot) -> Result<()> {
        let scores_json = to_json(&snapshot.scores)?;
        self.conn
            .execute(
                "INSERT INTO competitor_snapshots (domain, url, scores_json, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(domain) DO UPDATE SET
                   url = excluded.url,
                   scores_json = excluded.scores_json,
                   recorded_at = excluded.recorded_at",
                params![
                    domain,
                    snapshot.url.as_str(),
                    scores_json.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| SeolensError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_snapshot(&self, domain: &str) -> Result<Option<CompetitorSnapshot>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, scores_json FROM competitor_snapshots WHERE domain = ?1",
                params![domain],
            )
            .await
            .map_err(|e| SeolensError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let url: String = row
                    .get(0)
                    .map_err(|e| SeolensError::Storage(e.to_string()))?;
                let scores_json: String = row
                    .get(1)
                    .map_err(|e| SeolensError::Storage(e.to_string()))?;
                Ok(Some(CompetitorSnapshot {
                    url,
                    scores: from_json(&scores_json)?,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(SeolensError::Storage(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const AUDIT_COLUMNS: &str = "id, url, domain, status, created_at, completed_at, percentage, \
     current_stage, stages_completed_json, scores_json, stats_json, subdomains_json, \
     competitor_urls_json, comparison_json, failure_reason, version";

/// Positional values matching [`AUDIT_COLUMNS`].
fn audit_param_values(audit: &Audit, version: u64) -> Result<Vec<libsql::Value>> {
    Ok(vec![
        libsql::Value::Text(audit.id.to_string()),
        libsql::Value::Text(audit.url.clone()),
        libsql::Value::Text(audit.domain.clone()),
        libsql::Value::Text(audit.status.to_string()),
        libsql::Value::Text(audit.created_at.to_rfc3339()),
        match &audit.completed_at {
            Some(t) => libsql::Value::Text(t.to_rfc3339()),
            None => libsql::Value::Null,
        },
        libsql::Value::Real(audit.progress.percentage),
        match audit.progress.current_stage {
            Some(s) => libsql::Value::Text(s.to_string()),
            None => libsql::Value::Null,
        },
        libsql::Value::Text(to_json(&audit.progress.stages_completed)?),
        libsql::Value::Text(to_json(&audit.scores)?),
        libsql::Value::Text(to_json(&audit.stats)?),
        libsql::Value::Text(to_json(&audit.subdomains)?),
        libsql::Value::Text(to_json(&audit.competitor_urls)?),
        match &audit.comparison {
            Some(c) => libsql::Value::Text(to_json(c)?),
            None => libsql::Value::Null,
        },
        match &audit.failure_reason {
            Some(r) => libsql::Value::Text(r.clone()),
            None => libsql::Value::Null,
        },
        libsql::Value::Integer(version as i64),
    ])
}

fn row_to_audit(row: &Row) -> Result<Audit> {
    let get_text = |i: i32| -> Result<String> {
        row.get::<String>(i)
            .map_err(|e| SeolensError::Storage(e.to_string()))
    };
    let get_opt = |i: i32| -> Option<String> { row.get::<String>(i).ok() };

    let status = get_text(3)?
        .parse()
        .map_err(|e: String| SeolensError::Storage(e))?;
    let current_stage = match get_opt(7) {
        Some(s) => Some(s.parse().map_err(|e: String| SeolensError::Storage(e))?),
        None => None,
    };

    Ok(Audit {
        id: get_text(0)?
            .parse()
            .map_err(|e: uuid::Error| SeolensError::Storage(e.to_string()))?,
        url: get_text(1)?,
        domain: get_text(2)?,
        status,
        created_at: parse_timestamp(&get_text(4)?)?,
        completed_at: match get_opt(5) {
            Some(t) => Some(parse_timestamp(&t)?),
            None => None,
        },
        progress: AuditProgress {
            percentage: row
                .get::<f64>(6)
                .map_err(|e| SeolensError::Storage(e.to_string()))?,
            current_stage,
            stages_completed: from_json(&get_text(8)?)?,
        },
        scores: from_json(&get_text(9)?)?,
        stats: from_json(&get_text(10)?)?,
        subdomains: from_json(&get_text(11)?)?,
        competitor_urls: from_json(&get_text(12)?)?,
        comparison: match get_opt(13) {
            Some(c) => Some(from_json(&c)?),
            None => None,
        },
        failure_reason: get_opt(14),
        version: row
            .get::<u64>(15)
            .map_err(|e| SeolensError::Storage(e.to_string()))?,
    })
}

fn row_to_page(row: &Row) -> Result<Page> {
    let get_text = |i: i32| -> Result<String> {
        row.get::<String>(i)
            .map_err(|e| SeolensError::Storage(e.to_string()))
    };

    Ok(Page {
        id: get_text(0)?,
        audit_id: get_text(1)?
            .parse()
            .map_err(|e: uuid::Error| SeolensError::Storage(e.to_string()))?,
        url: get_text(2)?,
        path: get_text(3)?,
        title: row.get::<String>(4).ok(),
        status: get_text(5)?
            .parse()
            .map_err(|e: String| SeolensError::Storage(e))?,
        scores: from_json(&get_text(6)?)?,
        issues: from_json(&get_text(7)?)?,
        last_crawled: parse_timestamp(&get_text(8)?)?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SeolensError::Storage(format!("bad timestamp '{s}': {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| SeolensError::Storage(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| SeolensError::Storage(e.to_string()))
}
