//! Report rendering.
//!
//! Stateless formatting of a finished `RunOutcome`: a markdown landscape
//! summary for reading and a YAML document with the raw dataset and
//! per-record analyses for archival. Both consume only the computed
//! values; nothing here touches the network.

use serde::Serialize;
use std::fmt::Write as _;

use crate::pipeline::RunOutcome;

/// Markdown competitive-landscape summary.
pub fn render_markdown(outcome: &RunOutcome) -> String {
    let report = &outcome.report;
    let mut md = String::new();

    let _ = writeln!(md, "# Competitive Landscape: {}", report.request.topic);
    let _ = writeln!(md);
    let _ = writeln!(md, "- **Research kind**: {}", report.request.kind.as_str());
    let _ = writeln!(md, "- **Run**: `{}`", report.run_id);
    let _ = writeln!(
        md,
        "- **Generated**: {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(md, "- **Keywords**: {}", report.keywords);
    let _ = writeln!(md);

    if report.degraded {
        let _ = writeln!(
            md,
            "> ⚠️ Degraded report: {} analyses used heuristic fallback, {} source(s) failed.",
            outcome.fallback_count(),
            report.source_failures.len()
        );
        for failure in &report.source_failures {
            let _ = writeln!(md, "> - {}: {}", failure.source, failure.message);
        }
        let _ = writeln!(md);
    }

    let _ = writeln!(md, "## Records by Source");
    let _ = writeln!(md);
    for (source, count) in &report.source_counts {
        let _ = writeln!(md, "- **{}**: {} records", source.as_str(), count);
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "## Sponsors");
    let _ = writeln!(md);
    for group in &report.groups {
        let _ = writeln!(md, "### {} ({})", group.sponsor, group.analyses.len());
        let _ = writeln!(md);
        for analysis in &group.analyses {
            let origin = match analysis.origin {
                crate::analyzer::AnalysisOrigin::Ai => "ai",
                crate::analyzer::AnalysisOrigin::Fallback => "fallback",
            };
            let _ = writeln!(
                md,
                "- `{}` — {} | {} | {} _[{}]_",
                analysis.record, analysis.mechanism, analysis.phase_summary, analysis.market_note, origin
            );
        }
        let _ = writeln!(md);
    }

    let _ = writeln!(md, "## Phase Distribution");
    let _ = writeln!(md);
    let _ = writeln!(md, "| Phase | Records |");
    let _ = writeln!(md, "|-------|---------|");
    for (phase, count) in &report.phase_distribution {
        let _ = writeln!(md, "| {phase} | {count} |");
    }

    md
}

#[derive(Serialize)]
struct Archive<'a> {
    run_id: &'a uuid::Uuid,
    request: &'a pharmscope_common::ResearchRequest,
    keywords: &'a pharmscope_common::KeywordSet,
    records: &'a [pharmscope_collect::RawRecord],
    analyses: Vec<&'a crate::analyzer::AnalysisResult>,
    degraded: bool,
}

/// YAML archive of the raw dataset and the analysis mapping.
pub fn render_yaml(outcome: &RunOutcome) -> serde_yaml::Result<String> {
    let archive = Archive {
        run_id: &outcome.run_id,
        request: &outcome.report.request,
        keywords: &outcome.keywords,
        records: outcome.dataset.records(),
        analyses: outcome.analyses.values().collect(),
        degraded: outcome.report.degraded,
    };
    serde_yaml::to_string(&archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalysisOrigin, AnalysisResult};
    use crate::report::assemble;
    use pharmscope_collect::{MergedDataset, RawRecord, SourceKind};
    use pharmscope_common::{KeywordSet, ResearchRequest};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn outcome() -> RunOutcome {
        let request = ResearchRequest::therapeutic_area("GLP-1 agonists");
        let keywords = KeywordSet::build(["glp-1", "semaglutide"]).unwrap();

        let mut dataset = MergedDataset::new();
        let mut record = RawRecord::new(SourceKind::Trial, "NCT001");
        record.set("sponsor", "Acme");
        record.set("phase", "PHASE2");
        dataset.insert(record.clone());

        let mut analyses = BTreeMap::new();
        analyses.insert(
            record.key(),
            AnalysisResult {
                record: record.key(),
                mechanism: "GLP-1 receptor agonist".into(),
                phase_summary: "PHASE2".into(),
                sponsor: "Acme".into(),
                market_note: "Mid-stage entrant.".into(),
                origin: AnalysisOrigin::Fallback,
            },
        );

        let run_id = Uuid::new_v4();
        let report = assemble(&request, run_id, &keywords, &dataset, &analyses, &[]).unwrap();
        RunOutcome {
            run_id,
            report,
            dataset,
            analyses,
            keywords,
            duration_ms: 42,
        }
    }

    #[test]
    fn markdown_contains_header_groups_and_phases() {
        let md = render_markdown(&outcome());
        assert!(md.contains("# Competitive Landscape: GLP-1 agonists"));
        assert!(md.contains("### Acme (1)"));
        assert!(md.contains("| Phase 2 | 1 |"));
        assert!(md.contains("Degraded report"));
        assert!(md.contains("glp-1, semaglutide"));
    }

    #[test]
    fn yaml_archive_round_trips_record_ids() {
        let yaml = render_yaml(&outcome()).unwrap();
        assert!(yaml.contains("NCT001"));
        assert!(yaml.contains("degraded: true"));
        assert!(yaml.contains("GLP-1 receptor agonist"));
    }
}
