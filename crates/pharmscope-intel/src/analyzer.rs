//! Per-record competitive-intelligence analysis.
//!
//! Each record in the merged dataset gets exactly one `AnalysisResult`.
//! The AI path asks the model for a fixed-shape JSON object; transient
//! failures (including malformed responses, which for analysis are worth
//! another attempt) retry with backoff, and exhaustion degrades to a
//! heuristic synthesized from the record's own fields. A record is never
//! left unanalyzed.

use futures_util::stream::{self, StreamExt};
use pharmscope_collect::{MergedDataset, RawRecord, RecordKey, SourceKind};
use pharmscope_common::retry::{with_retry, RetryPolicy, Transient};
use pharmscope_llm::{AiError, GenerateOptions, Pacer, TextModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

const DEFAULT_CONCURRENCY: usize = 4;
const UNSPECIFIED: &str = "unspecified";

/// How an analysis was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisOrigin {
    Ai,
    Fallback,
}

/// Structured analysis of one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub record: RecordKey,
    pub mechanism: String,
    pub phase_summary: String,
    pub sponsor: String,
    pub market_note: String,
    pub origin: AnalysisOrigin,
}

/// Internal two-branch outcome; `origin` records which branch ran.
enum AnalysisOutcome {
    AiDerived(AnalysisResult),
    Heuristic(AnalysisResult),
}

impl AnalysisOutcome {
    fn into_result(self) -> AnalysisResult {
        match self {
            AnalysisOutcome::AiDerived(r) | AnalysisOutcome::Heuristic(r) => r,
        }
    }
}

/// Substring hints mapping intervention/title text to a mechanism label.
/// First match in table order wins.
const MECHANISM_HINTS: &[(&str, &str)] = &[
    ("checkpoint", "immune checkpoint inhibitor"),
    ("pd-1", "PD-1 checkpoint inhibitor"),
    ("pd-l1", "PD-L1 checkpoint inhibitor"),
    ("car-t", "CAR-T cell therapy"),
    ("antibody-drug conjugate", "antibody-drug conjugate"),
    ("bispecific", "bispecific antibody"),
    ("mab", "monoclonal antibody"),
    ("tinib", "tyrosine kinase inhibitor"),
    ("nib", "kinase inhibitor"),
    ("glp-1", "GLP-1 receptor agonist"),
    ("glutide", "GLP-1 receptor agonist"),
    ("sglt2", "SGLT2 inhibitor"),
    ("gliflozin", "SGLT2 inhibitor"),
    ("gliptin", "DPP-4 inhibitor"),
    ("prazole", "proton pump inhibitor"),
    ("statin", "HMG-CoA reductase inhibitor"),
    ("cept", "fusion protein"),
    ("tide", "peptide therapeutic"),
    ("gene therapy", "gene therapy"),
    ("sirna", "RNA interference therapeutic"),
    ("antisense", "antisense oligonucleotide"),
    ("vaccine", "vaccine"),
];

/// Wrapper that widens `Malformed` to transient: an analysis-format
/// failure is usually a sampling artifact, unlike in keyword parsing.
struct AnalysisCallError(AiError);

impl std::fmt::Display for AnalysisCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Transient for AnalysisCallError {
    fn is_transient(&self) -> bool {
        matches!(self.0, AiError::Malformed(_)) || self.0.is_transient()
    }

    fn retry_after_secs(&self) -> Option<u64> {
        self.0.retry_after_secs()
    }
}

pub struct Analyzer {
    model: Arc<dyn TextModel>,
    pacer: Arc<Pacer>,
    options: GenerateOptions,
    retry: RetryPolicy,
    concurrency: usize,
    /// Wall-clock budget for the whole analysis stage. Records past the
    /// deadline degrade to the heuristic branch instead of calling out.
    deadline: Option<Duration>,
}

impl Analyzer {
    pub fn new(
        model: Arc<dyn TextModel>,
        pacer: Arc<Pacer>,
        options: GenerateOptions,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            model,
            pacer,
            options,
            retry,
            concurrency: DEFAULT_CONCURRENCY,
            deadline: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Analyzes every record in the dataset. Total over the input: the
    /// returned map has exactly one entry per record.
    #[instrument(skip(self, dataset), fields(n_records = dataset.len()))]
    pub async fn analyze(&self, dataset: &MergedDataset) -> BTreeMap<RecordKey, AnalysisResult> {
        let cutoff = self.deadline.map(|d| Instant::now() + d);

        let results: Vec<AnalysisResult> = stream::iter(dataset.records())
            .map(|record| self.analyze_record(record, cutoff))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let fallback_count = results
            .iter()
            .filter(|r| r.origin == AnalysisOrigin::Fallback)
            .count();
        info!(
            analyzed = results.len(),
            fallback = fallback_count,
            "Analysis stage complete"
        );

        results.into_iter().map(|r| (r.record.clone(), r)).collect()
    }

    async fn analyze_record(&self, record: &RawRecord, cutoff: Option<Instant>) -> AnalysisResult {
        let outcome = match self.analyze_ai(record, cutoff).await {
            Ok(result) => AnalysisOutcome::AiDerived(result),
            Err(e) => {
                warn!(record = %record.key(), error = %e, "AI analysis unavailable, synthesizing heuristic");
                AnalysisOutcome::Heuristic(heuristic_analysis(record))
            }
        };
        outcome.into_result()
    }

    async fn analyze_ai(
        &self,
        record: &RawRecord,
        cutoff: Option<Instant>,
    ) -> Result<AnalysisResult, AnalysisCallError> {
        let prompt = build_prompt(record);

        let op = || async {
            let output = if let Some(cutoff) = cutoff {
                let now = Instant::now();
                if now >= cutoff {
                    return Err(AnalysisCallError(AiError::Malformed(
                        "analysis deadline exceeded".to_string(),
                    )));
                }
                self.pacer.pause().await;
                // Abandon an in-flight call at the deadline; the partial
                // run still assembles with this record degraded.
                match tokio::time::timeout_at(cutoff, self.model.generate(&prompt, &self.options))
                    .await
                {
                    Ok(result) => result.map_err(AnalysisCallError)?,
                    Err(_) => {
                        return Err(AnalysisCallError(AiError::Malformed(
                            "analysis deadline exceeded".to_string(),
                        )))
                    }
                }
            } else {
                self.pacer.pause().await;
                self.model
                    .generate(&prompt, &self.options)
                    .await
                    .map_err(AnalysisCallError)?
            };
            // Parse inside the attempt: an unusable reply is transient
            // for analysis and earns another try before falling back.
            parse_analysis(&output).map_err(AnalysisCallError)
        };

        // Past-deadline attempts report as Malformed, which is transient
        // here; cap attempts so exhaustion degrades promptly.
        let parsed = with_retry(&self.retry, op).await?;
        debug!(record = %record.key(), "AI analysis parsed");
        Ok(finish_analysis(record, parsed, AnalysisOrigin::Ai))
    }
}

fn build_prompt(record: &RawRecord) -> String {
    let mut lines = String::new();
    for (key, value) in &record.fields {
        lines.push_str(&format!("{key}: {value}\n"));
    }
    format!(
        "You are a pharmaceutical competitive-intelligence analyst. Analyze this \
         {} record:\n\n{}\n\
         Respond with ONLY a JSON object, no prose and no code fences, shaped as:\n\
         {{\n\
           \"mechanism\": \"mechanism of action, or 'unspecified'\",\n\
           \"phase_summary\": \"development stage in plain words\",\n\
           \"sponsor\": \"sponsoring or manufacturing organisation\",\n\
           \"market_note\": \"one sentence on competitive positioning and market implication\"\n\
         }}",
        record.source.as_str(),
        lines
    )
}

#[derive(Debug, Deserialize)]
struct ParsedAnalysis {
    #[serde(default)]
    mechanism: String,
    #[serde(default)]
    phase_summary: String,
    #[serde(default)]
    sponsor: String,
    #[serde(default)]
    market_note: String,
}

/// Lenient parse of the model's JSON reply: strips code fences, then
/// takes the outermost brace span. A reply with neither a usable
/// mechanism nor a usable phase is malformed.
fn parse_analysis(output: &str) -> Result<ParsedAnalysis, AiError> {
    let cleaned = output
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let start = cleaned.find('{');
    let end = cleaned.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &cleaned[s..=e],
        _ => return Err(AiError::Malformed("no JSON object in response".to_string())),
    };

    let parsed: ParsedAnalysis = serde_json::from_str(json)
        .map_err(|e| AiError::Malformed(format!("unparsable analysis JSON: {e}")))?;

    if parsed.mechanism.trim().is_empty() && parsed.phase_summary.trim().is_empty() {
        return Err(AiError::Malformed(
            "analysis has neither mechanism nor phase".to_string(),
        ));
    }
    Ok(parsed)
}

/// Fills blanks in a parsed analysis from the record itself, so an AI
/// reply that omits the sponsor still yields a complete result.
fn finish_analysis(
    record: &RawRecord,
    parsed: ParsedAnalysis,
    origin: AnalysisOrigin,
) -> AnalysisResult {
    let fallback = heuristic_analysis(record);
    AnalysisResult {
        record: record.key(),
        mechanism: non_blank(parsed.mechanism, fallback.mechanism),
        phase_summary: non_blank(parsed.phase_summary, fallback.phase_summary),
        sponsor: non_blank(parsed.sponsor, fallback.sponsor),
        market_note: non_blank(parsed.market_note, fallback.market_note),
        origin,
    }
}

fn non_blank(preferred: String, fallback: String) -> String {
    let trimmed = preferred.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed.to_string()
    }
}

/// Deterministic analysis from the record's own fields: phase verbatim,
/// mechanism by substring hint, sponsor copied per source kind.
pub fn heuristic_analysis(record: &RawRecord) -> AnalysisResult {
    let phase_summary = record
        .field("phase")
        .map(str::to_string)
        .unwrap_or_else(|| UNSPECIFIED.to_string());

    let mechanism_haystack = [
        record.field("interventions"),
        record.field("title"),
        record.field("substance_name"),
        record.field("generic_name"),
    ]
    .iter()
    .flatten()
    .map(|s| s.to_lowercase())
    .collect::<Vec<_>>()
    .join(" ");
    let mechanism = MECHANISM_HINTS
        .iter()
        .find(|(hint, _)| mechanism_haystack.contains(hint))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| UNSPECIFIED.to_string());

    let sponsor = match record.source {
        SourceKind::Trial => record.field("sponsor"),
        SourceKind::Regulatory => record.field("manufacturer"),
        SourceKind::Publication => record.field("journal"),
    }
    .map(str::to_string)
    .unwrap_or_else(|| "Unknown".to_string());

    let market_note = heuristic_market_note(record, &sponsor);

    AnalysisResult {
        record: record.key(),
        mechanism,
        phase_summary,
        sponsor,
        market_note,
        origin: AnalysisOrigin::Fallback,
    }
}

fn heuristic_market_note(record: &RawRecord, sponsor: &str) -> String {
    match record.source {
        SourceKind::Trial => {
            let status = record.field("status").unwrap_or(UNSPECIFIED);
            let condition = record
                .field("conditions")
                .map(|c| format!(" in {c}"))
                .unwrap_or_default();
            format!("Basic analysis: trial by {sponsor} is in {status} status{condition}.")
        }
        SourceKind::Publication => {
            let year = record
                .field("year")
                .map(|y| format!(" ({y})"))
                .unwrap_or_default();
            format!("Basic analysis: published evidence{year} relevant to the landscape.")
        }
        SourceKind::Regulatory => {
            let brand = record
                .field("brand_name")
                .or_else(|| record.field("generic_name"))
                .unwrap_or("product");
            format!("Basic analysis: {brand} by {sponsor} holds an approved label, marking an established competitor.")
        }
    }
}
