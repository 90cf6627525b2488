//! In-memory [`AuditStore`] implementation.
//!
//! Backs tests and ephemeral runs. Honors the same optimistic-concurrency
//! contract as the durable store: updates must present the version they
//! read, and lose with a conflict otherwise.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use seolens_shared::{Audit, AuditId, CompetitorSnapshot, Page, Result, SeolensError};

use crate::AuditStore;

/// Mutex-guarded map store. Cheap to clone via `Arc` at the call site.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    audits: HashMap<String, Audit>,
    /// audit id → path → page, so listing comes back path-ordered like the
    /// durable store's `ORDER BY path`.
    pages: HashMap<String, BTreeMap<String, Page>>,
    snapshots: HashMap<String, CompetitorSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for MemoryStore {
    async fn insert_audit(&self, audit: &Audit) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.audits.insert(audit.id.to_string(), audit.clone());
        Ok(())
    }

    async fn get_audit(&self, id: &AuditId) -> Result<Option<Audit>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.audits.get(&id.to_string()).cloned())
    }

    async fn list_audits(&self) -> Result<Vec<Audit>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut audits: Vec<Audit> = inner.audits.values().cloned().collect();
        audits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(audits)
    }

    async fn update_audit(&self, audit: &Audit, expected_version: u64) -> Result<u64> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let key = audit.id.to_string();
        let stored = inner
            .audits
            .get_mut(&key)
            .ok_or_else(|| SeolensError::not_found(&key))?;

        if stored.version != expected_version {
            return Err(SeolensError::StoreConflict {
                id: key,
                expected: expected_version,
            });
        }

        let new_version = expected_version + 1;
        let mut updated = audit.clone();
        updated.version = new_version;
        *stored = updated;
        Ok(new_version)
    }

    async fn delete_audit(&self, id: &AuditId) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let key = id.to_string();
        inner.audits.remove(&key);
        inner.pages.remove(&key);
        Ok(())
    }

    async fn upsert_page(&self, page: &Page) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner
            .pages
            .entry(page.audit_id.to_string())
            .or_default()
            .insert(page.path.clone(), page.clone());
        Ok(())
    }

    async fn list_pages(&self, audit_id: &AuditId) -> Result<Vec<Page>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .pages
            .get(&audit_id.to_string())
            .map(|pages| pages.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn record_snapshot(&self, domain: &str, snapshot: &CompetitorSnapshot) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.snapshots.insert(domain.to_string(), snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(&self, domain: &str) -> Result<Option<CompetitorSnapshot>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.snapshots.get(domain).cloned())
    }
}
