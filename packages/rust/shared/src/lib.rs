//! Shared types, error model, and configuration for seolens.
//!
//! This crate is the foundation depended on by all other seolens crates.
//! It provides:
//! - [`SeolensError`] — the unified error type
//! - Domain types ([`Audit`], [`Page`], [`Issue`], [`ProgressEvent`], [`AuditId`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, CrawlSettings, PipelineSettings, ScoreWeights, StageWeights,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, SeolensError};
pub use types::{
    Audit, AuditId, AuditProgress, AuditStats, AuditStatus, Category, CompetitiveReport,
    CompetitorRank, CompetitorSnapshot, FixStep, Issue, Page, PageStatus, ProgressDelta,
    ProgressEvent, ScoreSet, Severity, Stage, SubScores,
};
