//! Audit pipeline and progress/aggregation engine for seolens.
//!
//! This crate sequences audit stages, tracks per-page and per-audit state,
//! computes score and issue rollups, and fans progress events out to
//! subscribers. The crawl collector, analysis rules, and audit store are
//! consumed as capabilities; [`AuditEngine`] wires them into audit runs.

pub mod compare;
pub mod engine;
pub mod issues;
pub mod pipeline;
pub mod progress;
pub mod score;

pub use engine::AuditEngine;
pub use progress::{ProgressPublisher, ProgressStream};
pub use score::ScoreCalculator;
