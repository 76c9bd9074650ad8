//! ClinicalTrials.gov v2 API client.
//!
//! API docs: https://clinicaltrials.gov/data-api/api
//! Endpoint: {base}/studies with query.term / fields / pageSize / pageToken
//!
//! Produces Trial records with fields:
//!   nct_id, title, status, phase, sponsor, conditions, interventions,
//!   start_date, enrollment

use async_trait::async_trait;
use pharmscope_common::outbound::OutboundClient;
use pharmscope_common::retry::{with_retry, RetryPolicy};
use std::time::Duration;
use tracing::{debug, instrument};

use super::SourceAdapter;
use crate::error::{body_snippet, SourceError};
use crate::models::{RawRecord, SourceKind};
use crate::query::SourceQuery;

const SOURCE_NAME: &str = "clinicaltrials";
const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_REQUEST_DELAY_MS: u64 = 500;

pub const DEFAULT_TRIAL_FIELDS: &[&str] = &[
    "NCTId",
    "BriefTitle",
    "OverallStatus",
    "Phase",
    "Condition",
    "InterventionName",
    "LeadSponsorName",
    "StartDate",
    "EnrollmentCount",
];

pub struct ClinicalTrialsAdapter {
    client: OutboundClient,
    base_url: String,
    fields: Vec<String>,
    page_size: usize,
    request_delay: Duration,
    retry: RetryPolicy,
}

impl ClinicalTrialsAdapter {
    pub fn new(client: OutboundClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            fields: DEFAULT_TRIAL_FIELDS.iter().map(|s| s.to_string()).collect(),
            page_size: DEFAULT_PAGE_SIZE,
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        if !fields.is_empty() {
            self.fields = fields;
        }
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One page of studies plus the token for the next page.
    async fn fetch_page(
        &self,
        term: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<(Vec<serde_json::Value>, Option<String>), SourceError> {
        let url = format!("{}/studies", self.base_url.trim_end_matches('/'));
        let mut params: Vec<(&'static str, String)> = vec![
            ("format", "json".to_string()),
            ("query.term", term.to_string()),
            ("pageSize", page_size.to_string()),
            ("fields", self.fields.join(",")),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let resp = self.client.get(&url)?.query(&params).send().await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            let message = body_snippet(&resp.text().await.unwrap_or_default());
            return Err(SourceError::Upstream {
                adapter: SOURCE_NAME,
                status,
                message,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let studies = body["studies"].as_array().cloned().unwrap_or_default();
        let next = body["nextPageToken"].as_str().map(String::from);
        Ok((studies, next))
    }
}

#[async_trait]
impl SourceAdapter for ClinicalTrialsAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Trial
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    #[instrument(skip(self, query))]
    async fn fetch(
        &self,
        query: &SourceQuery,
        max_results: usize,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let term = query.trials_term();
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        let mut page = 0usize;

        while records.len() < max_results {
            if page > 0 {
                tokio::time::sleep(self.request_delay).await;
            }
            page += 1;

            let remaining = max_results - records.len();
            let page_size = self.page_size.min(remaining);
            let token = page_token.as_deref();
            let (studies, next) =
                with_retry(&self.retry, || self.fetch_page(&term, page_size, token)).await?;

            debug!(page, n = studies.len(), "ClinicalTrials.gov page retrieved");
            for study in &studies {
                if let Some(record) = study_to_record(study) {
                    records.push(record);
                    if records.len() == max_results {
                        break;
                    }
                }
            }

            match next {
                Some(t) if !studies.is_empty() => page_token = Some(t),
                _ => break,
            }
        }

        Ok(records)
    }
}

fn study_to_record(study: &serde_json::Value) -> Option<RawRecord> {
    let proto = &study["protocolSection"];
    let id_mod = &proto["identificationModule"];

    let nct_id = id_mod["nctId"].as_str().unwrap_or("");
    if nct_id.is_empty() {
        return None;
    }

    let mut record = RawRecord::new(SourceKind::Trial, nct_id);
    record.set("nct_id", nct_id);
    record.set("title", id_mod["briefTitle"].as_str().unwrap_or(""));

    let status_mod = &proto["statusModule"];
    record.set("status", status_mod["overallStatus"].as_str().unwrap_or(""));
    record.set(
        "start_date",
        status_mod["startDateStruct"]["date"].as_str().unwrap_or(""),
    );

    let design = &proto["designModule"];
    let phase = design["phases"]
        .as_array()
        .and_then(|phases| phases.first())
        .and_then(|p| p.as_str())
        .unwrap_or("");
    record.set("phase", phase);
    if let Some(count) = design["enrollmentInfo"]["count"].as_u64() {
        record.set("enrollment", count.to_string());
    }

    record.set(
        "sponsor",
        proto["sponsorCollaboratorsModule"]["leadSponsor"]["name"]
            .as_str()
            .unwrap_or(""),
    );
    record.set(
        "conditions",
        join_names(&proto["conditionsModule"]["conditions"], None),
    );
    record.set(
        "interventions",
        join_names(&proto["armsInterventionsModule"]["interventions"], Some("name")),
    );

    Some(record)
}

/// Joins a JSON array of strings (or of objects keyed by `key`) with "; ".
fn join_names(value: &serde_json::Value, key: Option<&str>) -> String {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| match key {
                    Some(k) => v[k].as_str(),
                    None => v.as_str(),
                })
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or_default()
}
