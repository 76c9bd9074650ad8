//! Multi-source collection.
//!
//! Drives every configured source adapter with the run's keyword set,
//! tolerates per-source failure, and merges the results into one
//! deduplicated dataset. Fetches run concurrently with exactly one
//! in-flight call per source; each adapter rate-limits its own
//! pagination internally.

use futures_util::future::join_all;
use pharmscope_common::{KeywordSet, ResearchKind, ResearchRequest};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::models::{MergedDataset, SourceKind};
use crate::query::SourceQuery;
use crate::sources::SourceAdapter;

/// A source that contributed nothing because its fetch failed.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub kind: SourceKind,
    pub message: String,
}

/// Outcome of one collection pass across all sources.
#[derive(Debug)]
pub struct Collection {
    pub dataset: MergedDataset,
    pub failures: Vec<SourceFailure>,
}

impl Collection {
    /// True when at least one source contributed nothing.
    pub fn degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct Collector {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    max_results: usize,
    /// Per-source result caps by adapter name, overriding `max_results`.
    source_caps: HashMap<String, usize>,
    /// Drop non-active trial records on therapeutic-area runs.
    active_trial_focus: bool,
}

impl Collector {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, max_results: usize) -> Self {
        Self {
            adapters,
            max_results: max_results.max(1),
            source_caps: HashMap::new(),
            active_trial_focus: true,
        }
    }

    pub fn with_source_caps(mut self, caps: HashMap<String, usize>) -> Self {
        self.source_caps = caps;
        self
    }

    pub fn with_active_trial_focus(mut self, enabled: bool) -> Self {
        self.active_trial_focus = enabled;
        self
    }

    /// Collects from every adapter and merges into one dataset.
    ///
    /// A failing adapter is recorded in `failures` and contributes zero
    /// records; the run continues regardless. Merge order is adapter
    /// configuration order, so the dataset is deterministic for a given
    /// set of upstream responses.
    #[instrument(skip(self, request, keywords), fields(n_sources = self.adapters.len()))]
    pub async fn collect(&self, request: &ResearchRequest, keywords: &KeywordSet) -> Collection {
        let query = SourceQuery::new(request, keywords.clone());

        let fetches = self.adapters.iter().map(|adapter| {
            let query = query.clone();
            let cap = self
                .source_caps
                .get(adapter.name())
                .copied()
                .unwrap_or(self.max_results)
                .max(1);
            async move {
                let result = adapter.fetch(&query, cap).await;
                (adapter.name(), adapter.kind(), result)
            }
        });
        let outcomes = join_all(fetches).await;

        let mut dataset = MergedDataset::new();
        let mut failures = Vec::new();
        for (name, kind, result) in outcomes {
            match result {
                Ok(records) => {
                    info!(source = name, n = records.len(), "Source collection complete");
                    dataset.extend(records);
                }
                Err(e) => {
                    warn!(source = name, error = %e, "Source collection failed");
                    failures.push(SourceFailure {
                        source: name.to_string(),
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }

        if self.active_trial_focus && request.kind == ResearchKind::TherapeuticArea {
            let before = dataset.len();
            dataset.retain(|record| record.source != SourceKind::Trial || is_active_trial(record));
            let dropped = before - dataset.len();
            if dropped > 0 {
                info!(dropped, "Filtered non-active trials (active trial focus)");
            }
        }

        info!(
            records = dataset.len(),
            duplicates = dataset.duplicates_dropped(),
            failed_sources = failures.len(),
            "Multi-source collection complete"
        );

        Collection { dataset, failures }
    }
}

/// Recruiting, active or enrolling status marks a trial as active. A trial
/// with no status field cannot be shown active and is dropped with the rest.
fn is_active_trial(record: &crate::models::RawRecord) -> bool {
    record
        .field("status")
        .map(|status| {
            let status = status.to_lowercase();
            ["recruiting", "active", "enrolling"]
                .iter()
                .any(|marker| status.contains(marker))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::models::RawRecord;
    use async_trait::async_trait;

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
                    message: "unavailable".into(),
                });
            }
            let mut records = self.records.clone();
            records.truncate(max_results);
            Ok(records)
        }
    }

    fn trial(id: &str, status: &str, sponsor: &str) -> RawRecord {
        let mut r = RawRecord::new(SourceKind::Trial, id);
        r.set("status", status);
        r.set("sponsor", sponsor);
        r
    }

    fn publication(id: &str) -> RawRecord {
        let mut r = RawRecord::new(SourceKind::Publication, id);
        r.set("title", "paper");
        r
    }

    fn keywords() -> KeywordSet {
        KeywordSet::build(["glp-1", "semaglutide"]).unwrap()
    }

    #[tokio::test]
    async fn failing_source_degrades_without_aborting() {
        let collector = Collector::new(
            vec![
                Arc::new(FixedAdapter {
                    name: "clinicaltrials",
                    kind: SourceKind::Trial,
                    records: vec![trial("NCT001", "RECRUITING", "Acme")],
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
                    records: vec![{
                        let mut r = RawRecord::new(SourceKind::Regulatory, "lbl-1");
                        r.set("manufacturer", "Acme");
                        r
                    }],
                    fail: false,
                }),
            ],
            10,
        );

        let request = ResearchRequest::therapeutic_area("glp-1 agonists");
        let collection = collector.collect(&request, &keywords()).await;

        assert_eq!(collection.dataset.len(), 2);
        assert!(collection.degraded());
        assert_eq!(collection.failures.len(), 1);
        assert_eq!(collection.failures[0].source, "pubmed");
    }

    #[tokio::test]
    async fn duplicate_keys_keep_first_seen_record() {
        let collector = Collector::new(
            vec![Arc::new(FixedAdapter {
                name: "clinicaltrials",
                kind: SourceKind::Trial,
                records: vec![
                    trial("NCT001", "RECRUITING", "Acme"),
                    trial("NCT001", "RECRUITING", "Other"),
                ],
                fail: false,
            })],
            10,
        );

        let request = ResearchRequest::therapeutic_area("nsclc");
        let collection = collector.collect(&request, &keywords()).await;

        assert_eq!(collection.dataset.len(), 1);
        assert_eq!(collection.dataset.records()[0].field("sponsor"), Some("Acme"));
        assert_eq!(collection.dataset.duplicates_dropped(), 1);
        assert!(!collection.degraded());
    }

    #[tokio::test]
    async fn active_trial_focus_filters_therapeutic_area_runs() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(FixedAdapter {
            name: "clinicaltrials",
            kind: SourceKind::Trial,
            records: vec![
                trial("NCT001", "RECRUITING", "Acme"),
                trial("NCT002", "COMPLETED", "Beta"),
                trial("NCT003", "ACTIVE_NOT_RECRUITING", "Gamma"),
            ],
            fail: false,
        })];
        let collector = Collector::new(adapters, 10);

        let request = ResearchRequest::therapeutic_area("nsclc");
        let collection = collector.collect(&request, &keywords()).await;

        let ids: Vec<_> = collection
            .dataset
            .records()
            .iter()
            .map(|r| r.canonical_id.as_str())
            .collect();
        assert_eq!(ids, ["NCT001", "NCT003"]);
    }

    #[tokio::test]
    async fn trial_without_status_is_filtered_on_area_runs() {
        let mut no_status = RawRecord::new(SourceKind::Trial, "NCT004");
        no_status.set("sponsor", "Delta");
        let collector = Collector::new(
            vec![Arc::new(FixedAdapter {
                name: "clinicaltrials",
                kind: SourceKind::Trial,
                records: vec![trial("NCT001", "RECRUITING", "Acme"), no_status],
                fail: false,
            })],
            10,
        );

        let request = ResearchRequest::therapeutic_area("nsclc");
        let collection = collector.collect(&request, &keywords()).await;

        let ids: Vec<_> = collection
            .dataset
            .records()
            .iter()
            .map(|r| r.canonical_id.as_str())
            .collect();
        assert_eq!(ids, ["NCT001"]);
    }

    #[tokio::test]
    async fn pipeline_runs_keep_completed_trials() {
        let collector = Collector::new(
            vec![Arc::new(FixedAdapter {
                name: "clinicaltrials",
                kind: SourceKind::Trial,
                records: vec![
                    trial("NCT001", "RECRUITING", "Acme"),
                    trial("NCT002", "COMPLETED", "Acme"),
                ],
                fail: false,
            })],
            10,
        );

        let request = ResearchRequest::drug_pipeline("semaglutide", None);
        let collection = collector.collect(&request, &keywords()).await;
        assert_eq!(collection.dataset.len(), 2);
    }

    #[tokio::test]
    async fn non_trial_records_are_never_status_filtered() {
        let collector = Collector::new(
            vec![Arc::new(FixedAdapter {
                name: "pubmed",
                kind: SourceKind::Publication,
                records: vec![publication("38000001")],
                fail: false,
            })],
            10,
        );

        let request = ResearchRequest::therapeutic_area("nsclc");
        let collection = collector.collect(&request, &keywords()).await;
        assert_eq!(collection.dataset.len(), 1);
    }

    #[tokio::test]
    async fn max_results_caps_each_source() {
        let records: Vec<RawRecord> = (0..20)
            .map(|i| trial(&format!("NCT{i:03}"), "RECRUITING", "Acme"))
            .collect();
        let collector = Collector::new(
            vec![Arc::new(FixedAdapter {
                name: "clinicaltrials",
                kind: SourceKind::Trial,
                records,
                fail: false,
            })],
            5,
        );

        let request = ResearchRequest::drug_pipeline("acmeximab", None);
        let collection = collector.collect(&request, &keywords()).await;
        assert_eq!(collection.dataset.len(), 5);
    }

    #[tokio::test]
    async fn per_source_cap_overrides_the_default() {
        let records: Vec<RawRecord> = (0..20)
            .map(|i| trial(&format!("NCT{i:03}"), "RECRUITING", "Acme"))
            .collect();
        let collector = Collector::new(
            vec![Arc::new(FixedAdapter {
                name: "clinicaltrials",
                kind: SourceKind::Trial,
                records,
                fail: false,
            })],
            10,
        )
        .with_source_caps(HashMap::from([("clinicaltrials".to_string(), 3)]));

        let request = ResearchRequest::drug_pipeline("acmeximab", None);
        let collection = collector.collect(&request, &keywords()).await;
        assert_eq!(collection.dataset.len(), 3);
    }
}
