//! pharmscope-intel — Competitive-intelligence core.
//! - Keyword generation (AI with curated static fallback)
//! - Per-record analysis (AI with heuristic fallback, retry/backoff)
//! - Landscape report assembly and rendering
//! - End-to-end pipeline orchestration with progress events

pub mod analyzer;
pub mod keywords;
pub mod pipeline;
pub mod render;
pub mod report;

pub use analyzer::{AnalysisOrigin, AnalysisResult, Analyzer};
pub use keywords::KeywordGenerator;
pub use pipeline::{Pipeline, RunOutcome, RunProgress};
pub use render::{render_markdown, render_yaml};
pub use report::{assemble, LandscapeReport, ReportError, SponsorGroup};
