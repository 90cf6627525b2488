//! Issue aggregation: converts raw findings into canonical issues and
//! derives audit-level rollups.
//!
//! The de-duplication key is `(page_id, category, normalized title)`. When
//! two findings collide, the higher severity wins; equal severity keeps the
//! first-seen finding.

use sha2::{Digest, Sha256};

use seolens_analysis::RawFinding;
use seolens_shared::{AuditStats, Category, Issue, Page, Severity};

/// Convert raw findings to canonical, de-duplicated issues.
/// Output order is first-seen order, so aggregation is deterministic.
pub fn canonicalize(page_id: &str, findings: Vec<RawFinding>) -> Vec<Issue> {
    let mut issues: Vec<Issue> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for finding in findings {
        let id = issue_id(page_id, finding.category, &finding.title);

        match index.get(&id) {
            Some(&pos) => {
                // Collision: higher severity replaces, ties keep first-seen.
                if finding.severity > issues[pos].severity {
                    issues[pos] = to_issue(id, finding);
                }
            }
            None => {
                index.insert(id.clone(), issues.len());
                issues.push(to_issue(id, finding));
            }
        }
    }

    issues
}

fn to_issue(id: String, finding: RawFinding) -> Issue {
    Issue {
        id,
        severity: finding.severity,
        category: finding.category,
        title: finding.title,
        description: finding.description,
        recommendation: finding.recommendation,
        ai_suggestion: None,
        affected_elements: finding.affected_elements,
        fix_plan: vec![],
    }
}

/// Stable issue key: SHA-256 over page id, category, and normalized title.
/// Repeated analysis passes produce identical ids.
pub fn issue_id(page_id: &str, category: Category, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(page_id.as_bytes());
    hasher.update([0]);
    hasher.update(category.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(normalize_title(title).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lowercase and collapse internal whitespace.
fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The synthetic issue attached to a page that could not be fetched.
pub fn unreachable_page_issue(page_id: &str, reason: &str) -> Issue {
    let title = "Page unreachable";
    Issue {
        id: issue_id(page_id, Category::Structure, title),
        severity: Severity::Critical,
        category: Category::Structure,
        title: title.to_string(),
        description: format!("The page could not be fetched: {reason}"),
        recommendation: "Ensure the page responds with a 2xx status within the timeout.".into(),
        ai_suggestion: None,
        affected_elements: vec![],
        fix_plan: vec![],
    }
}

/// The synthetic issue attached to a page whose analysis task failed.
pub fn analysis_failed_issue(page_id: &str, reason: &str) -> Issue {
    let title = "Analysis failed";
    Issue {
        id: issue_id(page_id, Category::Content, title),
        severity: Severity::Critical,
        category: Category::Content,
        title: title.to_string(),
        description: format!("Page analysis did not complete: {reason}"),
        recommendation: "Re-run the audit; if the failure persists, inspect the page content."
            .into(),
        ai_suggestion: None,
        affected_elements: vec![],
        fix_plan: vec![],
    }
}

/// Audit stats derived by summing over all current pages. Recomputed in
/// full every time so reprocessed pages can never skew the counters.
pub fn audit_stats<'a, I>(pages: I) -> AuditStats
where
    I: IntoIterator<Item = &'a Page>,
{
    let mut stats = AuditStats::default();

    for page in pages {
        stats.total_pages += 1;
        for issue in &page.issues {
            stats.issues_found += 1;
            match issue.severity {
                Severity::Critical => stats.critical_issues += 1,
                Severity::Warning => stats.warning_issues += 1,
                Severity::Info => {}
            }
            if !issue.recommendation.is_empty() {
                stats.recommendations += 1;
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use seolens_shared::{AuditId, PageStatus, ScoreSet};

    fn finding(severity: Severity, category: Category, title: &str) -> RawFinding {
        RawFinding {
            severity,
            category,
            title: title.into(),
            description: "desc".into(),
            recommendation: "fix it".into(),
            affected_elements: vec![],
        }
    }

    #[test]
    fn issue_ids_are_stable_and_normalized() {
        let a = issue_id("page-1", Category::Content, "Thin Content");
        let b = issue_id("page-1", Category::Content, "  thin   content ");
        let c = issue_id("page-2", Category::Content, "Thin Content");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn higher_severity_wins_collision() {
        let issues = canonicalize(
            "page-1",
            vec![
                finding(Severity::Warning, Category::Content, "Thin content"),
                finding(Severity::Critical, Category::Content, "thin  CONTENT"),
            ],
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
    }

    #[test]
    fn equal_severity_keeps_first_seen() {
        let issues = canonicalize(
            "page-1",
            vec![
                RawFinding {
                    description: "first".into(),
                    ..finding(Severity::Warning, Category::Content, "Thin content")
                },
                RawFinding {
                    description: "second".into(),
                    ..finding(Severity::Warning, Category::Content, "Thin content")
                },
            ],
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].description, "first");
    }

    #[test]
    fn distinct_categories_do_not_collide() {
        let issues = canonicalize(
            "page-1",
            vec![
                finding(Severity::Warning, Category::Content, "Missing heading"),
                finding(Severity::Warning, Category::Structure, "Missing heading"),
            ],
        );
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn stats_sum_over_pages() {
        let audit_id = AuditId::new();
        let mk_page = |path: &str, issues: Vec<Issue>| Page {
            id: path.to_string(),
            audit_id: audit_id.clone(),
            url: format!("https://example.com/{path}"),
            path: path.to_string(),
            title: None,
            scores: ScoreSet::default(),
            issues,
            last_crawled: Utc::now(),
            status: PageStatus::Pass,
        };

        let pages = vec![
            mk_page(
                "a",
                canonicalize(
                    "a",
                    vec![
                        finding(Severity::Critical, Category::Structure, "Missing title tag"),
                        finding(Severity::Info, Category::Eeat, "No publication date"),
                    ],
                ),
            ),
            mk_page(
                "b",
                canonicalize(
                    "b",
                    vec![finding(Severity::Warning, Category::Content, "Light content")],
                ),
            ),
            mk_page("c", vec![]),
        ];

        let stats = audit_stats(&pages);
        assert_eq!(stats.total_pages, 3);
        assert_eq!(stats.issues_found, 3);
        assert_eq!(stats.critical_issues, 1);
        assert_eq!(stats.warning_issues, 1);
        assert_eq!(stats.recommendations, 3);
    }
}
