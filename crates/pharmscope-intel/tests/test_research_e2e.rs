//! End-to-end pipeline scenarios with scripted model and source mocks.

use async_trait::async_trait;
use pharmscope_collect::{
    Collector, RawRecord, SourceAdapter, SourceError, SourceKind, SourceQuery,
};
use pharmscope_common::retry::RetryPolicy;
use pharmscope_common::ResearchRequest;
use pharmscope_intel::{AnalysisOrigin, Analyzer, KeywordGenerator, Pipeline};
use pharmscope_llm::{AiError, GenerateOptions, Pacer, TextModel};
use std::sync::Arc;
use std::time::Duration;

// ── Mocks ─────────────────────────────────────────────────────────────────────

/// Serves keyword prompts and analysis prompts from fixed scripts.
struct ScriptedModel {
    keyword_reply: Result<&'static str, ()>,
    analysis_reply: Result<&'static str, ()>,
}

impl ScriptedModel {
    fn healthy() -> Self {
        Self {
            keyword_reply: Ok("sotorasib, kras g12c, adagrasib"),
            analysis_reply: Ok(
                r#"{"mechanism": "KRAS G12C inhibitor",
                    "phase_summary": "Phase 2",
                    "sponsor": "Acme",
                    "market_note": "Strong mid-stage position."}"#,
            ),
        }
    }

    fn rate_limited() -> Self {
        Self {
            keyword_reply: Err(()),
            analysis_reply: Err(()),
        }
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn generate(&self, prompt: &str, _opts: &GenerateOptions) -> Result<String, AiError> {
        let reply = if prompt.contains("comma-separated list") {
            &self.keyword_reply
        } else {
            &self.analysis_reply
        };
        match reply {
            Ok(text) => Ok(text.to_string()),
            Err(()) => Err(AiError::RateLimited {
                retry_after_secs: None,
            }),
        }
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

struct FixedAdapter {
    name: &'static str,
    kind: SourceKind,
    records: Vec<RawRecord>,
    fail: bool,
}

#[async_trait]
impl SourceAdapter for FixedAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(
        &self,
        _query: &SourceQuery,
        max_results: usize,
    ) -> Result<Vec<RawRecord>, SourceError> {
        if self.fail {
            return Err(SourceError::Upstream {
                adapter: self.name,
                status: 503,
                message: "every page request failed".into(),
            });
        }
        let mut records = self.records.clone();
        records.truncate(max_results);
        Ok(records)
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn nct001() -> RawRecord {
    let mut r = RawRecord::new(SourceKind::Trial, "NCT001");
    r.set("phase", "PHASE2");
    r.set("sponsor", "Acme");
    r.set("status", "RECRUITING");
    r
}

fn publication(id: &str, journal: &str) -> RawRecord {
    let mut r = RawRecord::new(SourceKind::Publication, id);
    r.set("journal", journal);
    r.set("title", "Observational cohort report");
    r
}

fn regulatory(id: &str, manufacturer: &str) -> RawRecord {
    let mut r = RawRecord::new(SourceKind::Regulatory, id);
    r.set("manufacturer", manufacturer);
    r
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 2,
        multiplier: 2.0,
        jitter: false,
    }
}

fn pipeline(model: ScriptedModel, adapters: Vec<Arc<dyn SourceAdapter>>) -> Pipeline {
    let model: Arc<dyn TextModel> = Arc::new(model);
    let pacer = Arc::new(Pacer::new(Duration::ZERO));
    let keyword_generator = KeywordGenerator::new(
        model.clone(),
        pacer.clone(),
        GenerateOptions::default(),
        fast_retry(),
    );
    let collector = Collector::new(adapters, 10);
    let analyzer = Analyzer::new(model, pacer, GenerateOptions::default(), fast_retry());
    Pipeline::new(keyword_generator, collector, analyzer)
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn healthy_backend_produces_ai_analysis() {
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(FixedAdapter {
        name: "clinicaltrials",
        kind: SourceKind::Trial,
        records: vec![nct001()],
        fail: false,
    })];
    let pipeline = pipeline(ScriptedModel::healthy(), adapters);

    let outcome = pipeline
        .run_research(ResearchRequest::therapeutic_area("KRAS G12C inhibitors"), None)
        .await
        .unwrap();

    assert_eq!(outcome.dataset.len(), 1);
    let analysis = outcome.analyses.values().next().unwrap();
    assert_eq!(analysis.origin, AnalysisOrigin::Ai);
    assert_eq!(analysis.phase_summary, "Phase 2");
    assert!(!outcome.report.degraded);
    assert_eq!(outcome.keywords.terms(), ["sotorasib", "kras g12c", "adagrasib"]);
}

#[tokio::test]
async fn rate_limited_backend_degrades_to_heuristics() {
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(FixedAdapter {
        name: "clinicaltrials",
        kind: SourceKind::Trial,
        records: vec![nct001()],
        fail: false,
    })];
    let pipeline = pipeline(ScriptedModel::rate_limited(), adapters);

    let outcome = pipeline
        .run_research(ResearchRequest::therapeutic_area("KRAS G12C inhibitors"), None)
        .await
        .unwrap();

    // Keywords still generated (static fallback) and analysis is total.
    assert!(!outcome.keywords.is_empty());
    assert_eq!(outcome.analyses.len(), 1);

    let analysis = outcome.analyses.values().next().unwrap();
    assert_eq!(analysis.origin, AnalysisOrigin::Fallback);
    assert_eq!(analysis.phase_summary, "PHASE2");
    assert_eq!(analysis.mechanism, "unspecified");
    assert_eq!(analysis.sponsor, "Acme");
    assert!(outcome.report.degraded);
}

#[tokio::test]
async fn one_failing_source_of_three_still_yields_a_report() {
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(FixedAdapter {
            name: "clinicaltrials",
            kind: SourceKind::Trial,
            records: vec![nct001()],
            fail: false,
        }),
        Arc::new(FixedAdapter {
            name: "pubmed",
            kind: SourceKind::Publication,
            records: vec![],
            fail: true,
        }),
        Arc::new(FixedAdapter {
            name: "openfda",
            kind: SourceKind::Regulatory,
            records: vec![regulatory("lbl-1", "Acme")],
            fail: false,
        }),
    ];
    let pipeline = pipeline(ScriptedModel::healthy(), adapters);

    let outcome = pipeline
        .run_research(ResearchRequest::therapeutic_area("KRAS G12C inhibitors"), None)
        .await
        .unwrap();

    assert_eq!(outcome.dataset.len(), 2);
    assert!(outcome
        .dataset
        .records()
        .iter()
        .all(|r| r.source != SourceKind::Publication));
    assert!(outcome.report.degraded);
    assert_eq!(outcome.report.source_failures.len(), 1);
    assert_eq!(outcome.report.source_failures[0].source, "pubmed");
}

#[tokio::test]
async fn overlapping_pages_dedup_to_one_record() {
    // The same trial surfacing on two pages of the same source.
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(FixedAdapter {
        name: "clinicaltrials",
        kind: SourceKind::Trial,
        records: vec![nct001(), nct001()],
        fail: false,
    })];
    let pipeline = pipeline(ScriptedModel::healthy(), adapters);

    let outcome = pipeline
        .run_research(ResearchRequest::therapeutic_area("KRAS G12C inhibitors"), None)
        .await
        .unwrap();

    assert_eq!(outcome.dataset.len(), 1);
    assert_eq!(outcome.dataset.duplicates_dropped(), 1);
    assert_eq!(outcome.analyses.len(), 1);
}

#[tokio::test]
async fn sponsor_grouping_spans_sources() {
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(FixedAdapter {
            name: "clinicaltrials",
            kind: SourceKind::Trial,
            records: vec![nct001()],
            fail: false,
        }),
        Arc::new(FixedAdapter {
            name: "pubmed",
            kind: SourceKind::Publication,
            records: vec![publication("38000001", "Lancet Oncology")],
            fail: false,
        }),
    ];
    // Rate-limited model so sponsors come from record fields deterministically.
    let pipeline = pipeline(ScriptedModel::rate_limited(), adapters);

    let outcome = pipeline
        .run_research(ResearchRequest::therapeutic_area("KRAS G12C inhibitors"), None)
        .await
        .unwrap();

    let sponsors: Vec<_> = outcome
        .report
        .groups
        .iter()
        .map(|g| g.sponsor.as_str())
        .collect();
    assert_eq!(sponsors, ["Acme", "Lancet Oncology"]);
}

#[tokio::test]
async fn progress_events_cover_all_stages() {
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(FixedAdapter {
        name: "clinicaltrials",
        kind: SourceKind::Trial,
        records: vec![nct001()],
        fail: false,
    })];
    let pipeline = pipeline(ScriptedModel::healthy(), adapters);

    let (tx, mut rx) = tokio::sync::broadcast::channel(16);
    let outcome = pipeline
        .run_research(
            ResearchRequest::therapeutic_area("KRAS G12C inhibitors"),
            Some(tx),
        )
        .await
        .unwrap();

    let mut stages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.run_id, outcome.run_id);
        stages.push(event.stage);
    }
    assert_eq!(stages, ["keywords", "collect", "analyze", "complete"]);
}
