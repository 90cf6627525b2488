//! Application configuration for seolens.
//!
//! User config lives at `~/.seolens/seolens.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeolensError};
use crate::types::Stage;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "seolens.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".seolens";

// ---------------------------------------------------------------------------
// Config structs (matching seolens.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Crawl defaults.
    #[serde(default)]
    pub crawl: CrawlSettings,

    /// Pipeline concurrency and retry settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Per-stage contribution to the progress percentage.
    #[serde(default)]
    pub stage_weights: StageWeights,

    /// Category weights for the overall score.
    #[serde(default)]
    pub score_weights: ScoreWeights,
}

impl AppConfig {
    /// Validate every section's invariants. Called after loading.
    pub fn validate(&self) -> Result<()> {
        self.stage_weights.validate()?;
        self.score_weights.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Maximum crawl depth from the start URL.
    #[serde(default = "default_crawl_depth")]
    pub depth: u32,

    /// Hard cap on pages fetched per audit.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Maximum concurrent HTTP requests against the target site.
    #[serde(default = "default_crawl_concurrency")]
    pub concurrency: u32,

    /// Minimum ms between requests to the same host.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// URL include glob patterns.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// URL exclude glob patterns.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            depth: default_crawl_depth(),
            max_pages: default_max_pages(),
            concurrency: default_crawl_concurrency(),
            rate_limit_ms: default_rate_limit(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

fn default_crawl_depth() -> u32 {
    3
}
fn default_max_pages() -> usize {
    200
}
fn default_crawl_concurrency() -> u32 {
    4
}
fn default_rate_limit() -> u64 {
    200
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Audits allowed to run in parallel across the whole process.
    #[serde(default = "default_max_concurrent_audits")]
    pub max_concurrent_audits: usize,

    /// Concurrent page-analysis tasks within one audit.
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,

    /// Optimistic-update retries before a stage failure is declared.
    #[serde(default = "default_store_retry_limit")]
    pub store_retry_limit: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_audits: default_max_concurrent_audits(),
            page_concurrency: default_page_concurrency(),
            store_retry_limit: default_store_retry_limit(),
        }
    }
}

impl PipelineSettings {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent_audits == 0 || self.page_concurrency == 0 {
            return Err(SeolensError::config(
                "pipeline concurrency limits must be at least 1",
            ));
        }
        Ok(())
    }
}

fn default_max_concurrent_audits() -> usize {
    4
}
fn default_page_concurrency() -> usize {
    8
}
fn default_store_retry_limit() -> u32 {
    3
}

// ---------------------------------------------------------------------------
// Stage weights
// ---------------------------------------------------------------------------

/// `[stage_weights]` section. Each stage's share of the progress
/// percentage; the five weights must sum to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageWeights {
    #[serde(default = "default_w_crawling")]
    pub crawling: u32,
    #[serde(default = "default_w_analyzing")]
    pub analyzing: u32,
    #[serde(default = "default_w_scoring")]
    pub scoring: u32,
    #[serde(default = "default_w_recommending")]
    pub recommending: u32,
    #[serde(default = "default_w_comparing")]
    pub comparing: u32,
}

impl Default for StageWeights {
    fn default() -> Self {
        Self {
            crawling: default_w_crawling(),
            analyzing: default_w_analyzing(),
            scoring: default_w_scoring(),
            recommending: default_w_recommending(),
            comparing: default_w_comparing(),
        }
    }
}

fn default_w_crawling() -> u32 {
    40
}
fn default_w_analyzing() -> u32 {
    30
}
fn default_w_scoring() -> u32 {
    10
}
fn default_w_recommending() -> u32 {
    10
}
fn default_w_comparing() -> u32 {
    10
}

impl StageWeights {
    /// Weight of a single stage.
    pub fn weight(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Crawling => self.crawling,
            Stage::Analyzing => self.analyzing,
            Stage::Scoring => self.scoring,
            Stage::Recommending => self.recommending,
            Stage::Comparing => self.comparing,
        }
    }

    /// Sum of weights accumulated by the given completed stages.
    pub fn completed_weight(&self, completed: &[Stage]) -> u32 {
        completed.iter().map(|s| self.weight(*s)).sum()
    }

    /// Progress percentage given completed stages plus a fraction of the
    /// current stage. Weights sum to 100, so the result is already in
    /// [0, 100]; rounded to one decimal for stable serialization.
    pub fn percentage(&self, completed: &[Stage], current: Option<(Stage, f64)>) -> f64 {
        let base = f64::from(self.completed_weight(completed));
        let partial = match current {
            Some((stage, frac)) => f64::from(self.weight(stage)) * frac.clamp(0.0, 1.0),
            None => 0.0,
        };
        ((base + partial) * 10.0).round() / 10.0
    }

    /// Weights must sum to exactly 100.
    pub fn validate(&self) -> Result<()> {
        let total: u32 = Stage::ORDER.iter().map(|s| self.weight(*s)).sum();
        if total != 100 {
            return Err(SeolensError::config(format!(
                "stage weights must sum to 100, got {total}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Score weights
// ---------------------------------------------------------------------------

/// `[score_weights]` section. Category weights for the overall score;
/// must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_sw_structure")]
    pub structure: f64,
    #[serde(default = "default_sw_content")]
    pub content: f64,
    #[serde(default = "default_sw_eeat")]
    pub eeat: f64,
    #[serde(default = "default_sw_schema")]
    pub schema: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            structure: default_sw_structure(),
            content: default_sw_content(),
            eeat: default_sw_eeat(),
            schema: default_sw_schema(),
        }
    }
}

fn default_sw_structure() -> f64 {
    0.3
}
fn default_sw_content() -> f64 {
    0.3
}
fn default_sw_eeat() -> f64 {
    0.2
}
fn default_sw_schema() -> f64 {
    0.2
}

impl ScoreWeights {
    /// Weights must sum to 1.0 (within floating-point tolerance).
    pub fn validate(&self) -> Result<()> {
        let total = self.structure + self.content + self.eeat + self.schema;
        if (total - 1.0).abs() > 1e-6 {
            return Err(SeolensError::config(format!(
                "score weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum crawl depth from the start URL.
    pub depth: u32,
    /// Hard cap on pages fetched.
    pub max_pages: usize,
    /// Maximum concurrent HTTP requests.
    pub concurrency: u32,
    /// Rate limit in ms between requests to the same host.
    pub rate_limit_ms: u64,
    /// URL include glob patterns.
    pub include_patterns: Vec<String>,
    /// URL exclude glob patterns.
    pub exclude_patterns: Vec<String>,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            depth: config.crawl.depth,
            max_pages: config.crawl.max_pages,
            concurrency: config.crawl.concurrency,
            rate_limit_ms: config.crawl.rate_limit_ms,
            include_patterns: config.crawl.include_patterns.clone(),
            exclude_patterns: config.crawl.exclude_patterns.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.seolens/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SeolensError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.seolens/seolens.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does
/// not exist. Weight invariants are validated before the config is returned.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SeolensError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        SeolensError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SeolensError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SeolensError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SeolensError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = AppConfig::default();
        config.validate().expect("defaults must be valid");
        assert_eq!(config.crawl.depth, 3);
        assert_eq!(config.pipeline.page_concurrency, 8);
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.stage_weights, StageWeights::default());
        assert_eq!(parsed.crawl.max_pages, 200);
    }

    #[test]
    fn stage_weights_must_sum_to_100() {
        let weights = StageWeights {
            crawling: 50,
            ..StageWeights::default()
        };
        let err = weights.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 100"));
    }

    #[test]
    fn score_weights_must_sum_to_one() {
        let weights = ScoreWeights {
            structure: 0.5,
            ..ScoreWeights::default()
        };
        let err = weights.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn malformed_weights_rejected_at_load() {
        let toml_str = r#"
[stage_weights]
crawling = 90
analyzing = 30
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert!(config.validate().is_err());
    }

    #[test]
    fn percentage_math() {
        let weights = StageWeights::default();
        // Nothing done yet.
        assert_eq!(weights.percentage(&[], None), 0.0);
        // Halfway through crawling.
        assert_eq!(
            weights.percentage(&[], Some((Stage::Crawling, 0.5))),
            20.0
        );
        // Crawling done, analyzing at 1/3.
        assert_eq!(
            weights.percentage(&[Stage::Crawling], Some((Stage::Analyzing, 1.0 / 3.0))),
            50.0
        );
        // Everything done.
        assert_eq!(weights.percentage(&Stage::ORDER, None), 100.0);
        // Fraction is clamped.
        assert_eq!(
            weights.percentage(&[], Some((Stage::Crawling, 7.0))),
            40.0
        );
    }

    #[test]
    fn crawl_config_from_app_config() {
        let app = AppConfig::default();
        let crawl = CrawlConfig::from(&app);
        assert_eq!(crawl.depth, 3);
        assert_eq!(crawl.concurrency, 4);
        assert_eq!(crawl.rate_limit_ms, 200);
    }
}
