//! PubMed E-utilities client.
//!
//! Endpoints used:
//!   esearch: {base}/esearch.fcgi  (PMID discovery, retstart pagination)
//!   efetch:  {base}/efetch.fcgi   (abstract XML, batched by PMID list)
//!
//! Produces Publication records with fields:
//!   pmid, title, abstract, journal, authors, year

use async_trait::async_trait;
use pharmscope_common::outbound::OutboundClient;
use pharmscope_common::retry::{with_retry, RetryPolicy};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::SourceAdapter;
use crate::error::{body_snippet, SourceError};
use crate::models::{RawRecord, SourceKind};
use crate::query::SourceQuery;

const SOURCE_NAME: &str = "pubmed";
const DEFAULT_PAGE_SIZE: usize = 50;
// NCBI asks for at most 3 requests per second without an API key.
const DEFAULT_REQUEST_DELAY_MS: u64 = 350;

pub struct PubMedAdapter {
    client: OutboundClient,
    base_url: String,
    api_key: Option<String>,
    page_size: usize,
    request_delay: Duration,
    retry: RetryPolicy,
}

impl PubMedAdapter {
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

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("db", "pubmed".to_string())];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    async fn get_checked(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<reqwest::Response, SourceError> {
        let resp = self.client.get(url)?.query(params).send().await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            let message = body_snippet(&resp.text().await.unwrap_or_default());
            return Err(SourceError::Upstream {
                adapter: SOURCE_NAME,
                status,
                message,
            });
        }
        Ok(resp)
    }

    /// One esearch page of PMIDs.
    async fn esearch_page(
        &self,
        term: &str,
        retstart: usize,
        retmax: usize,
    ) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/esearch.fcgi", self.base_url.trim_end_matches('/'));
        let mut params = self.base_params();
        params.push(("retmode", "json".to_string()));
        params.push(("term", term.to_string()));
        params.push(("retstart", retstart.to_string()));
        params.push(("retmax", retmax.to_string()));
        params.push(("usehistory", "n".to_string()));

        let resp: serde_json::Value = self.get_checked(&url, &params).await?.json().await?;
        let ids = resp["esearchresult"]["idlist"]
            .as_array()
            .unwrap_or(&vec![])
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();
        Ok(ids)
    }

    /// Abstract XML for a batch of PMIDs, parsed into records.
    async fn efetch_records(&self, pmids: &[String]) -> Result<Vec<RawRecord>, SourceError> {
        if pmids.is_empty() {
            return Ok(vec![]);
        }
        let url = format!("{}/efetch.fcgi", self.base_url.trim_end_matches('/'));
        let mut params = self.base_params();
        params.push(("id", pmids.join(",")));
        params.push(("rettype", "abstract".to_string()));
        params.push(("retmode", "xml".to_string()));

        let xml = self.get_checked(&url, &params).await?.text().await?;
        parse_pubmed_xml(&xml)
    }
}

#[async_trait]
impl SourceAdapter for PubMedAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Publication
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
        let term = query.pubmed_term();

        // Phase 1: page through esearch until we have enough PMIDs.
        let mut pmids: Vec<String> = Vec::new();
        let mut page = 0usize;
        while pmids.len() < max_results {
            if page > 0 {
                tokio::time::sleep(self.request_delay).await;
            }
            page += 1;

            let retstart = pmids.len();
            let retmax = self.page_size.min(max_results - pmids.len());
            let ids =
                with_retry(&self.retry, || self.esearch_page(&term, retstart, retmax)).await?;
            let n = ids.len();
            pmids.extend(ids);
            if n < retmax {
                break;
            }
        }
        debug!(n = pmids.len(), "PubMed esearch complete");
        if pmids.is_empty() {
            return Ok(vec![]);
        }

        // Phase 2: one batched efetch for the collected PMIDs.
        tokio::time::sleep(self.request_delay).await;
        let mut records = with_retry(&self.retry, || self.efetch_records(&pmids)).await?;
        records.truncate(max_results);
        Ok(records)
    }
}

/// Parse PubMed XML (efetch abstract mode) into Publication records.
/// Handles the <PubmedArticleSet><PubmedArticle> structure.
fn parse_pubmed_xml(xml: &str) -> Result<Vec<RawRecord>, SourceError> {
    let mut records = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // State machine for XML parsing
    let mut pmid = String::new();
    let mut title = String::new();
    let mut abstract_text = String::new();
    let mut journal = String::new();
    let mut authors: Vec<String> = Vec::new();
    let mut year = String::new();
    let mut in_article = false;
    let mut in_pmid = false;
    let mut in_title = false;
    let mut in_abstract = false;
    let mut in_journal = false;
    let mut in_last_name = false;
    let mut in_fore_name = false;
    let mut in_pub_date = false;
    let mut in_year = false;
    let mut current_last = String::new();
    let mut current_fore = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"PubmedArticle" => {
                    in_article = true;
                    pmid.clear();
                    title.clear();
                    abstract_text.clear();
                    journal.clear();
                    authors.clear();
                    year.clear();
                }
                b"PMID" => in_pmid = true,
                b"ArticleTitle" => in_title = true,
                b"AbstractText" => in_abstract = true,
                b"Title" => in_journal = true,
                b"Author" => {
                    current_last.clear();
                    current_fore.clear();
                }
                b"LastName" => in_last_name = true,
                b"ForeName" => in_fore_name = true,
                b"PubDate" => in_pub_date = true,
                b"Year" => in_year = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if !in_article {
                    buf.clear();
                    continue;
                }
                let text = e.unescape().unwrap_or_default().to_string();
                // First PMID in the article is the article's own id;
                // later ones belong to references.
                if in_pmid && pmid.is_empty() {
                    pmid = text.clone();
                }
                if in_title {
                    title = text.clone();
                }
                if in_abstract {
                    if !abstract_text.is_empty() {
                        abstract_text.push(' ');
                    }
                    abstract_text.push_str(&text);
                }
                if in_journal && journal.is_empty() {
                    journal = text.clone();
                }
                if in_last_name {
                    current_last = text.clone();
                }
                if in_fore_name {
                    current_fore = text.clone();
                }
                if in_pub_date && in_year && year.is_empty() {
                    year = text.clone();
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"PMID" => in_pmid = false,
                b"ArticleTitle" => in_title = false,
                b"AbstractText" => in_abstract = false,
                b"Title" => in_journal = false,
                b"LastName" => in_last_name = false,
                b"ForeName" => in_fore_name = false,
                b"PubDate" => in_pub_date = false,
                b"Year" => in_year = false,
                b"Author" => {
                    let name = if current_fore.is_empty() {
                        current_last.clone()
                    } else {
                        format!("{} {}", current_fore, current_last)
                    };
                    if !name.is_empty() {
                        authors.push(name);
                    }
                }
                b"PubmedArticle" => {
                    in_article = false;
                    if pmid.is_empty() {
                        warn!("Skipping PubMed article with no PMID");
                    } else {
                        let mut record = RawRecord::new(SourceKind::Publication, pmid.clone());
                        record.set("pmid", pmid.clone());
                        record.set("title", title.clone());
                        record.set("abstract", abstract_text.clone());
                        record.set("journal", journal.clone());
                        record.set("authors", authors.join("; "));
                        record.set("year", year.clone());
                        records.push(record);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SourceError::Decode {
                    adapter: SOURCE_NAME,
                    message: e.to_string(),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}
