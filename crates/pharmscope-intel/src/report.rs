//! Landscape report assembly.
//!
//! Pure aggregation over the dataset and its analyses: sponsor groups,
//! phase distribution, per-source counts, degraded flag. No I/O and no
//! AI calls; the same inputs assemble to the same report apart from the
//! generation timestamp.

use chrono::{DateTime, Utc};
use pharmscope_collect::{MergedDataset, RecordKey, SourceFailure, SourceKind};
use pharmscope_common::{KeywordSet, ResearchRequest};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;

use crate::analyzer::{AnalysisOrigin, AnalysisResult};

#[derive(Debug, Error)]
pub enum ReportError {
    /// The analysis mapping is not total over the dataset; assembly
    /// refuses to silently drop a record.
    #[error("no analysis for record {0}")]
    MissingAnalysis(RecordKey),
}

/// Analyses for one sponsor, in the dataset's original record order.
#[derive(Debug, Clone, Serialize)]
pub struct SponsorGroup {
    pub sponsor: String,
    pub analyses: Vec<AnalysisResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LandscapeReport {
    pub request: ResearchRequest,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub keywords: KeywordSet,
    /// Record counts per source family.
    pub source_counts: BTreeMap<SourceKind, usize>,
    /// Sponsor groups, largest first, ties by sponsor name.
    pub groups: Vec<SponsorGroup>,
    /// Normalized phase label → record count, most common first.
    pub phase_distribution: Vec<(String, usize)>,
    /// Sources that contributed nothing because their fetch failed.
    pub source_failures: Vec<SourceFailure>,
    pub degraded: bool,
}

/// Assembles the landscape report. Errors only if the analysis mapping
/// misses a dataset record; all other inputs assemble unconditionally.
pub fn assemble(
    request: &ResearchRequest,
    run_id: Uuid,
    keywords: &KeywordSet,
    dataset: &MergedDataset,
    analyses: &BTreeMap<RecordKey, AnalysisResult>,
    failures: &[SourceFailure],
) -> Result<LandscapeReport, ReportError> {
    // Group by sponsor, preserving dataset order within each group and
    // first-seen order across groups before the size sort.
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<SponsorGroup> = Vec::new();
    let mut any_fallback = false;

    for record in dataset.records() {
        let key = record.key();
        let analysis = analyses
            .get(&key)
            .ok_or(ReportError::MissingAnalysis(key))?;
        any_fallback |= analysis.origin == AnalysisOrigin::Fallback;

        let idx = *group_index
            .entry(analysis.sponsor.clone())
            .or_insert_with(|| {
                groups.push(SponsorGroup {
                    sponsor: analysis.sponsor.clone(),
                    analyses: Vec::new(),
                });
                groups.len() - 1
            });
        groups[idx].analyses.push(analysis.clone());
    }

    groups.sort_by(|a, b| {
        b.analyses
            .len()
            .cmp(&a.analyses.len())
            .then_with(|| a.sponsor.cmp(&b.sponsor))
    });

    let phase_distribution = phase_distribution(groups.iter().flat_map(|g| &g.analyses));

    Ok(LandscapeReport {
        request: request.clone(),
        run_id,
        generated_at: Utc::now(),
        keywords: keywords.clone(),
        source_counts: dataset.counts_by_source(),
        groups,
        phase_distribution,
        source_failures: failures.to_vec(),
        degraded: any_fallback || !failures.is_empty(),
    })
}

fn phase_distribution<'a, I>(analyses: I) -> Vec<(String, usize)>
where
    I: Iterator<Item = &'a AnalysisResult>,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for analysis in analyses {
        *counts.entry(normalize_phase(&analysis.phase_summary)).or_insert(0) += 1;
    }
    let mut distribution: Vec<(String, usize)> = counts.into_iter().collect();
    distribution.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    distribution
}

/// Folds registry spellings ("PHASE2", "Phase 2", "phase-2/3") onto one
/// label per phase for the distribution; anything unrecognized counts
/// under its own trimmed text.
pub fn normalize_phase(raw: &str) -> String {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)(?:early[\s_-]*)?phase[\s_-]*(\d)(?:[\s_/-]*(\d))?").unwrap()
    });
    match re.captures(raw) {
        Some(caps) => {
            let first = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            match caps.get(2) {
                Some(second) => format!("Phase {}/{}", first, second.as_str()),
                None => format!("Phase {first}"),
            }
        }
        None => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                "unspecified".to_string()
            } else {
                trimmed.to_string()
            }
        }
    }
}
