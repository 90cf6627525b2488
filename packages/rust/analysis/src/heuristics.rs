//! Built-in heuristic rule set.
//!
//! Selector-driven checks over the parsed document. Every check is
//! deterministic: the same HTML always yields the same sub-scores and the
//! same findings, in the same order.

use scraper::{Html, Selector};
use url::Url;

use seolens_shared::{Category, Result, Severity, SubScores};

use crate::{AnalysisRules, PageAnalysis, PageContent, RawFinding};

/// Default heuristic rule set.
pub struct HeuristicRules;

impl AnalysisRules for HeuristicRules {
    async fn analyze(&self, page: &PageContent) -> Result<PageAnalysis> {
        let doc = Html::parse_document(&page.html);
        let mut findings = Vec::new();

        let structure = check_structure(&doc, &mut findings);
        let content = check_content(&doc, &mut findings);
        let eeat = check_eeat(&doc, &page.url, &mut findings);
        let schema = check_schema(&doc, &mut findings);

        Ok(PageAnalysis {
            sub_scores: SubScores {
                structure,
                content,
                eeat,
                schema,
            },
            findings,
        })
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Tracks a category's running score while its checks append findings.
struct CategoryScore<'a> {
    category: Category,
    score: f64,
    findings: &'a mut Vec<RawFinding>,
}

impl<'a> CategoryScore<'a> {
    fn new(category: Category, findings: &'a mut Vec<RawFinding>) -> Self {
        Self {
            category,
            score: 100.0,
            findings,
        }
    }

    fn flag(
        &mut self,
        severity: Severity,
        deduction: f64,
        title: &str,
        description: String,
        recommendation: &str,
        affected_elements: Vec<String>,
    ) {
        self.score -= deduction;
        self.findings.push(RawFinding {
            severity,
            category: self.category,
            title: title.to_string(),
            description,
            recommendation: recommendation.to_string(),
            affected_elements,
        });
    }

    fn finish(self) -> f64 {
        self.score.clamp(0.0, 100.0)
    }
}

fn sel(s: &str) -> Selector {
    Selector::parse(s).unwrap()
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

fn check_structure(doc: &Html, findings: &mut Vec<RawFinding>) -> f64 {
    let mut cat = CategoryScore::new(Category::Structure, findings);

    // Title tag
    let title_text = doc
        .select(&sel("title"))
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());
    match title_text {
        None => cat.flag(
            Severity::Critical,
            30.0,
            "Missing title tag",
            "The page has no <title> element, so search and answer engines fall back to guessing the topic.".into(),
            "Add a unique, descriptive <title> of roughly 10-60 characters.",
            vec![],
        ),
        Some(t) if t.chars().count() < 10 => cat.flag(
            Severity::Warning,
            10.0,
            "Title too short",
            format!("The title \"{t}\" is under 10 characters."),
            "Expand the title to describe the page topic.",
            vec!["title".into()],
        ),
        Some(t) if t.chars().count() > 60 => cat.flag(
            Severity::Warning,
            10.0,
            "Title too long",
            format!("The title is {} characters; engines truncate around 60.", t.chars().count()),
            "Shorten the title to at most 60 characters.",
            vec!["title".into()],
        ),
        Some(_) => {}
    }

    // Meta description
    let meta_desc = doc
        .select(&sel(r#"meta[name="description"]"#))
        .next()
        .and_then(|el| el.value().attr("content").map(str::to_string))
        .filter(|c| !c.trim().is_empty());
    match meta_desc {
        None => cat.flag(
            Severity::Warning,
            15.0,
            "Missing meta description",
            "No meta description is present; result snippets will be synthesized from arbitrary page text.".into(),
            "Add a meta description of 50-160 characters summarizing the page.",
            vec![],
        ),
        Some(d) => {
            let len = d.chars().count();
            if !(50..=160).contains(&len) {
                cat.flag(
                    Severity::Info,
                    5.0,
                    "Meta description length off-target",
                    format!("The meta description is {len} characters; 50-160 displays best."),
                    "Adjust the meta description length toward 50-160 characters.",
                    vec![],
                );
            }
        }
    }

    // Exactly one H1
    let h1_count = doc.select(&sel("h1")).count();
    if h1_count == 0 {
        cat.flag(
            Severity::Warning,
            15.0,
            "Missing H1 heading",
            "The page has no <h1>, leaving its main topic unmarked.".into(),
            "Add exactly one <h1> naming the page topic.",
            vec![],
        );
    } else if h1_count > 1 {
        let heads: Vec<String> = doc
            .select(&sel("h1"))
            .take(5)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .collect();
        cat.flag(
            Severity::Warning,
            10.0,
            "Multiple H1 headings",
            format!("Found {h1_count} <h1> elements; the main topic is ambiguous."),
            "Keep a single <h1> and demote the rest to <h2>.",
            heads,
        );
    }

    // Heading hierarchy must not skip levels
    let mut last_level = 0u8;
    let mut skips = Vec::new();
    for el in doc.select(&sel("h1, h2, h3, h4, h5, h6")) {
        let level: u8 = el.value().name()[1..].parse().unwrap_or(1);
        if last_level > 0 && level > last_level + 1 {
            skips.push(format!("h{last_level} -> h{level}"));
        }
        last_level = level;
    }
    if !skips.is_empty() {
        cat.flag(
            Severity::Info,
            5.0,
            "Heading levels skipped",
            "The heading outline jumps levels, which weakens the document structure.".into(),
            "Nest headings sequentially without skipping levels.",
            skips,
        );
    }

    // Canonical link
    if doc.select(&sel(r#"link[rel="canonical"]"#)).next().is_none() {
        cat.flag(
            Severity::Info,
            5.0,
            "Missing canonical link",
            "No rel=\"canonical\" link is declared.".into(),
            "Declare a canonical URL to consolidate duplicate variants.",
            vec![],
        );
    }

    // Images without alt text
    let missing_alt: Vec<String> = doc
        .select(&sel("img"))
        .filter(|el| {
            el.value()
                .attr("alt")
                .map(|a| a.trim().is_empty())
                .unwrap_or(true)
        })
        .take(5)
        .map(|el| el.value().attr("src").unwrap_or("(no src)").to_string())
        .collect();
    if !missing_alt.is_empty() {
        cat.flag(
            Severity::Warning,
            10.0,
            "Images missing alt text",
            "One or more images have no alt attribute.".into(),
            "Add descriptive alt text to every content image.",
            missing_alt,
        );
    }

    cat.finish()
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

fn check_content(doc: &Html, findings: &mut Vec<RawFinding>) -> f64 {
    let mut cat = CategoryScore::new(Category::Content, findings);

    let body_text: String = doc
        .select(&sel("body"))
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let word_count = body_text.split_whitespace().count();

    if word_count < 300 {
        cat.flag(
            Severity::Critical,
            30.0,
            "Thin content",
            format!("The page body has only {word_count} words; engines treat pages under 300 words as thin."),
            "Expand the page to at least 300 words of substantive copy.",
            vec![],
        );
    } else if word_count < 600 {
        cat.flag(
            Severity::Warning,
            15.0,
            "Light content",
            format!("The page body has {word_count} words; competitive pages usually carry 600 or more."),
            "Deepen the page with examples, data, or answers to related questions.",
            vec![],
        );
    }

    if doc.select(&sel("p")).next().is_none() {
        cat.flag(
            Severity::Warning,
            10.0,
            "No paragraph markup",
            "The page contains no <p> elements; body copy is unstructured.".into(),
            "Wrap body copy in paragraph elements.",
            vec![],
        );
    }

    if word_count >= 300 && doc.select(&sel("h2")).next().is_none() {
        cat.flag(
            Severity::Info,
            5.0,
            "No section headings",
            "Long-form copy without <h2> sections is hard to skim and to quote.".into(),
            "Break the copy into sections with <h2> headings.",
            vec![],
        );
    }

    cat.finish()
}

// ---------------------------------------------------------------------------
// E-E-A-T (trust and authority signals)
// ---------------------------------------------------------------------------

fn check_eeat(doc: &Html, page_url: &str, findings: &mut Vec<RawFinding>) -> f64 {
    let mut cat = CategoryScore::new(Category::Eeat, findings);

    let has_author = doc.select(&sel(r#"meta[name="author"]"#)).next().is_some()
        || doc.select(&sel(r#"[rel="author"]"#)).next().is_some()
        || doc.select(&sel(".author, .byline")).next().is_some();
    if !has_author {
        cat.flag(
            Severity::Warning,
            15.0,
            "No author attribution",
            "The page carries no visible or machine-readable author.".into(),
            "Attribute the content to a named author with a byline or author meta tag.",
            vec![],
        );
    }

    let has_date = doc.select(&sel("time")).next().is_some()
        || doc
            .select(&sel(r#"meta[property="article:published_time"]"#))
            .next()
            .is_some();
    if !has_date {
        cat.flag(
            Severity::Info,
            10.0,
            "No publication date",
            "Readers and engines cannot tell how fresh the content is.".into(),
            "Mark the publication or last-updated date with a <time> element.",
            vec![],
        );
    }

    // Outbound references to other hosts
    let page_host = Url::parse(page_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));
    let has_outbound = doc.select(&sel("a[href]")).any(|el| {
        el.value()
            .attr("href")
            .and_then(|href| Url::parse(href).ok())
            .and_then(|u| u.host_str().map(str::to_string))
            .is_some_and(|host| Some(&host) != page_host.as_ref())
    });
    if !has_outbound {
        cat.flag(
            Severity::Info,
            10.0,
            "No outbound references",
            "The page cites no external sources.".into(),
            "Link to authoritative external sources that support the content's claims.",
            vec![],
        );
    }

    let has_about = doc.select(&sel("a[href]")).any(|el| {
        el.value()
            .attr("href")
            .is_some_and(|h| h.contains("about") || h.contains("contact"))
    });
    if !has_about {
        cat.flag(
            Severity::Warning,
            10.0,
            "No about or contact link",
            "Nothing on the page leads to information about the publisher.".into(),
            "Link to an about or contact page from the site chrome.",
            vec![],
        );
    }

    cat.finish()
}

// ---------------------------------------------------------------------------
// Schema (structured data)
// ---------------------------------------------------------------------------

fn check_schema(doc: &Html, findings: &mut Vec<RawFinding>) -> f64 {
    let mut cat = CategoryScore::new(Category::Schema, findings);

    let blocks: Vec<String> = doc
        .select(&sel(r#"script[type="application/ld+json"]"#))
        .map(|el| el.text().collect::<String>())
        .collect();

    if blocks.is_empty() {
        cat.flag(
            Severity::Warning,
            25.0,
            "No structured data",
            "The page declares no JSON-LD blocks, so engines must infer entities from prose.".into(),
            "Add JSON-LD structured data describing the page's primary entity.",
            vec![],
        );
        return cat.finish();
    }

    let mut types = Vec::new();
    let mut invalid = 0usize;
    for block in &blocks {
        match serde_json::from_str::<serde_json::Value>(block) {
            Ok(value) => collect_types(&value, &mut types),
            Err(_) => invalid += 1,
        }
    }

    if invalid > 0 {
        cat.flag(
            Severity::Critical,
            30.0,
            "Invalid JSON-LD",
            format!("{invalid} JSON-LD block(s) fail to parse and will be ignored by engines."),
            "Fix the JSON syntax of the structured-data blocks.",
            vec![],
        );
    }

    if types.is_empty() && invalid == 0 {
        cat.flag(
            Severity::Info,
            10.0,
            "Structured data without @type",
            "JSON-LD is present but declares no @type, so it identifies no entity.".into(),
            "Declare an @type (e.g., Organization, Article) on each JSON-LD block.",
            vec![],
        );
    }

    cat.finish()
}

/// Collect every `@type` string in a JSON-LD value, including graphs/arrays.
fn collect_types(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            match map.get("@type") {
                Some(serde_json::Value::String(t)) => out.push(t.clone()),
                Some(serde_json::Value::Array(ts)) => {
                    out.extend(ts.iter().filter_map(|t| t.as_str().map(str::to_string)));
                }
                _ => {}
            }
            for v in map.values() {
                collect_types(v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_types(item, out);
            }
        }
        _ => {}
    }
}
