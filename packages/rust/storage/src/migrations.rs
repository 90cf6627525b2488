//! SQL migration definitions for the seolens database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: audits, pages, competitor_snapshots",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Audit records. Nested structures (scores, stats, comparison) are stored
-- as JSON columns; the version column backs optimistic updates.
CREATE TABLE IF NOT EXISTS audits (
    id                    TEXT PRIMARY KEY,
    url                   TEXT NOT NULL,
    domain                TEXT NOT NULL,
    status                TEXT NOT NULL,
    created_at            TEXT NOT NULL,
    completed_at          TEXT,
    percentage            REAL NOT NULL DEFAULT 0,
    current_stage         TEXT,
    stages_completed_json TEXT NOT NULL DEFAULT '[]',
    scores_json           TEXT NOT NULL,
    stats_json            TEXT NOT NULL,
    subdomains_json       TEXT NOT NULL DEFAULT '[]',
    competitor_urls_json  TEXT NOT NULL DEFAULT '[]',
    comparison_json       TEXT,
    failure_reason        TEXT,
    version               INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_audits_domain ON audits(domain);
CREATE INDEX IF NOT EXISTS idx_audits_status ON audits(status);

-- Pages owned by an audit. Issues travel with their page as JSON.
CREATE TABLE IF NOT EXISTS pages (
    id           TEXT PRIMARY KEY,
    audit_id     TEXT NOT NULL REFERENCES audits(id) ON DELETE CASCADE,
    url          TEXT NOT NULL,
    path         TEXT NOT NULL,
    title        TEXT,
    status       TEXT NOT NULL,
    scores_json  TEXT NOT NULL,
    issues_json  TEXT NOT NULL DEFAULT '[]',
    last_crawled TEXT NOT NULL,
    UNIQUE(audit_id, path)
);

CREATE INDEX IF NOT EXISTS idx_pages_audit_id ON pages(audit_id);

-- Scored results of completed audits, keyed by domain, consumed by the
-- comparing stage of later audits.
CREATE TABLE IF NOT EXISTS competitor_snapshots (
    domain      TEXT PRIMARY KEY,
    url         TEXT NOT NULL,
    scores_json TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
