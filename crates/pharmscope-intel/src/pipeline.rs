//! End-to-end research pipeline.
//!
//! Orchestrates the full flow for a single research request:
//!   1. Generate search keywords (AI, with static fallback)
//!   2. Collect records from every configured source
//!   3. Analyze each record (AI, with heuristic fallback)
//!   4. Assemble the landscape report
//!
//! Each run is identified by a fresh run id threaded through every
//! stage. Once a request is accepted, collection and analysis failures
//! degrade the report but never abort the run.

use pharmscope_collect::{Collector, MergedDataset, RecordKey, SourceFailure};
use pharmscope_common::{KeywordSet, ResearchRequest};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::analyzer::{AnalysisOrigin, AnalysisResult, Analyzer};
use crate::keywords::KeywordGenerator;
use crate::report::{assemble, LandscapeReport, ReportError};

// ── Progress events ───────────────────────────────────────────────────────────

/// Progress event emitted during a run (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct RunProgress {
    pub run_id: Uuid,
    pub stage: String,
    pub message: String,
    pub records_found: usize,
    pub analyzed: usize,
    pub error: Option<String>,
}

impl RunProgress {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            stage: String::new(),
            message: String::new(),
            records_found: 0,
            analyzed: 0,
            error: None,
        }
    }
}

// ── Run outcome ───────────────────────────────────────────────────────────────

/// Everything a run produced: the report plus the raw dataset and the
/// analysis mapping, which ride along for structured archival.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub report: LandscapeReport,
    pub dataset: MergedDataset,
    pub analyses: BTreeMap<RecordKey, AnalysisResult>,
    pub keywords: KeywordSet,
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn fallback_count(&self) -> usize {
        self.analyses
            .values()
            .filter(|a| a.origin == AnalysisOrigin::Fallback)
            .count()
    }

    pub fn ai_count(&self) -> usize {
        self.analyses.len() - self.fallback_count()
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    keyword_generator: KeywordGenerator,
    collector: Collector,
    analyzer: Analyzer,
}

impl Pipeline {
    pub fn new(keyword_generator: KeywordGenerator, collector: Collector, analyzer: Analyzer) -> Self {
        Self {
            keyword_generator,
            collector,
            analyzer,
        }
    }

    /// Runs the full pipeline for one request.
    ///
    /// Progress events are sent via `progress_tx` if provided. The only
    /// error is an internal totality violation in assembly; degraded
    /// sources and AI fallback are reported through the outcome, not as
    /// errors.
    #[instrument(skip(self, request, progress_tx), fields(topic = %request.topic))]
    pub async fn run_research(
        &self,
        request: ResearchRequest,
        progress_tx: Option<broadcast::Sender<RunProgress>>,
    ) -> Result<RunOutcome, ReportError> {
        let run_id = Uuid::new_v4();
        let t0 = std::time::Instant::now();
        info!(run_id = %run_id, request = %request.summary(), "Starting research run");

        let emit = |stage: &str, msg: &str, mut prog: RunProgress| {
            prog.stage = stage.to_string();
            prog.message = msg.to_string();
            if let Some(ref tx) = progress_tx {
                let _ = tx.send(prog);
            }
        };
        let prog_base = RunProgress::new(run_id);

        // ── 1. Keywords ───────────────────────────────────────────────────────
        emit("keywords", "Generating search keywords…", prog_base.clone());
        let keywords = self.keyword_generator.generate(&request).await;
        info!(run_id = %run_id, keywords = %keywords, "Keywords ready");

        // ── 2. Collection ─────────────────────────────────────────────────────
        emit(
            "collect",
            &format!("Searching sources for: {keywords}"),
            prog_base.clone(),
        );
        let collection = self.collector.collect(&request, &keywords).await;
        let dataset = collection.dataset;
        let failures: Vec<SourceFailure> = collection.failures;
        emit("analyze", &format!("{} records collected, analyzing…", dataset.len()), {
            let mut p = prog_base.clone();
            p.records_found = dataset.len();
            p.error = failures.first().map(|f| f.message.clone());
            p
        });

        // ── 3. Analysis ───────────────────────────────────────────────────────
        let analyses = self.analyzer.analyze(&dataset).await;

        // ── 4. Assembly ───────────────────────────────────────────────────────
        let report = assemble(&request, run_id, &keywords, &dataset, &analyses, &failures)?;

        let outcome = RunOutcome {
            run_id,
            report,
            dataset,
            analyses,
            keywords,
            duration_ms: t0.elapsed().as_millis() as u64,
        };

        info!(
            run_id = %run_id,
            records = outcome.dataset.len(),
            ai = outcome.ai_count(),
            fallback = outcome.fallback_count(),
            failed_sources = outcome.report.source_failures.len(),
            degraded = outcome.report.degraded,
            duration_ms = outcome.duration_ms,
            "Research run complete"
        );
        emit(
            "complete",
            &format!(
                "Done. {} records, {} AI analyses, {} fallback, degraded: {}.",
                outcome.dataset.len(),
                outcome.ai_count(),
                outcome.fallback_count(),
                outcome.report.degraded
            ),
            {
                let mut p = prog_base.clone();
                p.records_found = outcome.dataset.len();
                p.analyzed = outcome.analyses.len();
                p
            },
        );

        Ok(outcome)
    }
}
