//! openFDA drug-label client.
//!
//! Endpoint: {base}/drug/label.json with search / limit / skip
//!
//! Produces Regulatory records with fields:
//!   id, brand_name, generic_name, manufacturer, substance_name, route,
//!   effective_time

use async_trait::async_trait;
use pharmscope_common::outbound::OutboundClient;
use pharmscope_common::retry::{with_retry, RetryPolicy};
use std::time::Duration;
use tracing::{debug, instrument};

use super::SourceAdapter;
use crate::error::{body_snippet, SourceError};
use crate::models::{RawRecord, SourceKind};
use crate::query::SourceQuery;

const SOURCE_NAME: &str = "openfda";
const DEFAULT_PAGE_SIZE: usize = 50;
// openFDA allows 240 requests/min without a key; stay well under it.
const DEFAULT_REQUEST_DELAY_MS: u64 = 300;

pub struct OpenFdaAdapter {
    client: OutboundClient,
    base_url: String,
    api_key: Option<String>,
    page_size: usize,
    request_delay: Duration,
    retry: RetryPolicy,
}

impl OpenFdaAdapter {
    pub fn new(client: OutboundClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            page_size: DEFAULT_PAGE_SIZE,
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            retry: RetryPolicy::default(),
        }
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

    /// One page of drug labels. openFDA reports "no matches" as a 404
    /// with a NOT_FOUND error body; that is an empty result, not a failure.
    async fn fetch_page(
        &self,
        search: &str,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<serde_json::Value>, SourceError> {
        let url = format!("{}/drug/label.json", self.base_url.trim_end_matches('/'));
        let mut params: Vec<(&'static str, String)> = vec![
            ("search", search.to_string()),
            ("limit", limit.to_string()),
            ("skip", skip.to_string()),
            ("sort", "effective_time:desc".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }

        let resp = self.client.get(&url)?.query(&params).send().await?;
        let status = resp.status().as_u16();
        if status == 404 {
            return Ok(vec![]);
        }
        if status >= 400 {
            let message = body_snippet(&resp.text().await.unwrap_or_default());
            return Err(SourceError::Upstream {
                adapter: SOURCE_NAME,
                status,
                message,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        Ok(body["results"].as_array().cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SourceAdapter for OpenFdaAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Regulatory
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
        let search = query.openfda_search();
        let mut records = Vec::new();
        let mut skip = 0usize;
        let mut page = 0usize;

        while records.len() < max_results {
            if page > 0 {
                tokio::time::sleep(self.request_delay).await;
            }
            page += 1;

            let limit = self.page_size.min(max_results - records.len());
            let results =
                with_retry(&self.retry, || self.fetch_page(&search, limit, skip)).await?;

            debug!(page, n = results.len(), "openFDA page retrieved");
            let n = results.len();
            for result in &results {
                if let Some(record) = label_to_record(result) {
                    records.push(record);
                    if records.len() == max_results {
                        break;
                    }
                }
            }

            // A short page means the result set is exhausted.
            if n < limit {
                break;
            }
            skip += n;
        }

        Ok(records)
    }
}

fn label_to_record(result: &serde_json::Value) -> Option<RawRecord> {
    let id = result["id"].as_str().unwrap_or("");
    if id.is_empty() {
        return None;
    }

    let openfda = &result["openfda"];
    let mut record = RawRecord::new(SourceKind::Regulatory, id);
    record.set("id", id);
    record.set("brand_name", first_str(&openfda["brand_name"]));
    record.set("generic_name", first_str(&openfda["generic_name"]));
    record.set("manufacturer", first_str(&openfda["manufacturer_name"]));
    record.set("substance_name", first_str(&openfda["substance_name"]));
    record.set("route", first_str(&openfda["route"]));
    record.set("effective_time", result["effective_time"].as_str().unwrap_or(""));
    Some(record)
}

/// openFDA wraps scalar label fields in single-element arrays.
fn first_str(value: &serde_json::Value) -> &str {
    value
        .as_array()
        .and_then(|items| items.first())
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_json() -> serde_json::Value {
        serde_json::json!({
            "id": "d1a3efc8-0b52-4a6e",
            "effective_time": "20250114",
            "openfda": {
                "brand_name": ["Ozempic"],
                "generic_name": ["semaglutide"],
                "manufacturer_name": ["Novo Nordisk"],
                "substance_name": ["SEMAGLUTIDE"],
                "route": ["SUBCUTANEOUS"]
            }
        })
    }

    #[test]
    fn label_maps_to_regulatory_record() {
        let record = label_to_record(&label_json()).unwrap();
        assert_eq!(record.source, SourceKind::Regulatory);
        assert_eq!(record.canonical_id, "d1a3efc8-0b52-4a6e");
        assert_eq!(record.field("brand_name"), Some("Ozempic"));
        assert_eq!(record.field("generic_name"), Some("semaglutide"));
        assert_eq!(record.field("manufacturer"), Some("Novo Nordisk"));
        assert_eq!(record.field("route"), Some("SUBCUTANEOUS"));
        assert_eq!(record.field("effective_time"), Some("20250114"));
    }

    #[test]
    fn label_without_id_is_skipped() {
        let label = serde_json::json!({ "openfda": { "brand_name": ["X"] } });
        assert!(label_to_record(&label).is_none());
    }

    #[test]
    fn missing_openfda_section_leaves_fields_absent() {
        let label = serde_json::json!({ "id": "abc", "effective_time": "20240101" });
        let record = label_to_record(&label).unwrap();
        assert_eq!(record.field("brand_name"), None);
        assert_eq!(record.field("effective_time"), Some("20240101"));
    }
}
