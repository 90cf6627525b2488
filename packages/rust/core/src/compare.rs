//! Competitive analyzer: cross-domain score comparison and ranking.
//!
//! Runs once per audit, against already-scored competitor snapshots. Never
//! triggers new audits.

use seolens_shared::{CompetitiveReport, CompetitorRank, CompetitorSnapshot};

/// Rank the subject against its competitors: overall descending, ties broken
/// by structure, then content, then lexicographic URL. The ordering is fully
/// deterministic so renderings and tests are stable.
pub fn rank(subject: CompetitorSnapshot, competitors: Vec<CompetitorSnapshot>) -> CompetitiveReport {
    let subject_url = subject.url.clone();

    let mut all: Vec<CompetitorSnapshot> = Vec::with_capacity(competitors.len() + 1);
    all.push(subject);
    all.extend(competitors);

    all.sort_by(|a, b| {
        b.scores
            .overall
            .total_cmp(&a.scores.overall)
            .then_with(|| b.scores.structure.total_cmp(&a.scores.structure))
            .then_with(|| b.scores.content.total_cmp(&a.scores.content))
            .then_with(|| a.url.cmp(&b.url))
    });

    let entries: Vec<CompetitorRank> = all
        .into_iter()
        .enumerate()
        .map(|(i, snap)| CompetitorRank {
            rank: (i + 1) as u32,
            is_subject: snap.url == subject_url,
            url: snap.url,
            scores: snap.scores,
        })
        .collect();

    let subject_rank = entries
        .iter()
        .find(|e| e.is_subject)
        .map(|e| e.rank)
        .unwrap_or(1);

    CompetitiveReport {
        entries,
        subject_rank,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seolens_shared::ScoreSet;

    fn snap(url: &str, overall: f64, structure: f64, content: f64) -> CompetitorSnapshot {
        CompetitorSnapshot {
            url: url.into(),
            scores: ScoreSet {
                overall,
                structure,
                content,
                eeat: 50.0,
                schema: 50.0,
            },
        }
    }

    #[test]
    fn ranks_by_overall_descending() {
        let report = rank(
            snap("https://subject.com/", 70.0, 70.0, 70.0),
            vec![
                snap("https://strong.com/", 90.0, 80.0, 80.0),
                snap("https://weak.com/", 50.0, 60.0, 60.0),
            ],
        );

        let urls: Vec<&str> = report.entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://strong.com/", "https://subject.com/", "https://weak.com/"]
        );
        assert_eq!(report.subject_rank, 2);
        assert!(report.entries[1].is_subject);
        assert_eq!(report.entries[0].rank, 1);
        assert_eq!(report.entries[2].rank, 3);
    }

    #[test]
    fn ties_break_by_structure_then_content_then_url() {
        // Same overall; structure decides.
        let report = rank(
            snap("https://a.com/", 80.0, 60.0, 90.0),
            vec![snap("https://b.com/", 80.0, 70.0, 10.0)],
        );
        assert_eq!(report.entries[0].url, "https://b.com/");

        // Same overall and structure; content decides.
        let report = rank(
            snap("https://a.com/", 80.0, 70.0, 40.0),
            vec![snap("https://b.com/", 80.0, 70.0, 60.0)],
        );
        assert_eq!(report.entries[0].url, "https://b.com/");

        // Full tie; lexicographic URL decides.
        let report = rank(
            snap("https://zebra.com/", 80.0, 70.0, 60.0),
            vec![snap("https://aardvark.com/", 80.0, 70.0, 60.0)],
        );
        assert_eq!(report.entries[0].url, "https://aardvark.com/");
        assert_eq!(report.subject_rank, 2);
    }

    #[test]
    fn subject_alone_ranks_first() {
        let report = rank(snap("https://solo.com/", 42.0, 42.0, 42.0), vec![]);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.subject_rank, 1);
        assert!(report.entries[0].is_subject);
    }

    #[test]
    fn ranking_is_deterministic() {
        let subject = snap("https://s.com/", 75.0, 75.0, 75.0);
        let competitors = vec![
            snap("https://c1.com/", 75.0, 75.0, 75.0),
            snap("https://c2.com/", 75.0, 75.0, 75.0),
        ];
        let a = rank(subject.clone(), competitors.clone());
        let b = rank(subject, competitors);
        assert_eq!(a, b);
    }
}
