//! Outbound HTTP policy.
//!
//! All upstream traffic from the source adapters goes through
//! `OutboundClient`, which refuses requests to hosts outside the allowlist
//! built from the configured base URLs. Network capability is capped to
//! what the run was configured to talk to.

use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("host not in outbound allowlist for URL {0}")]
    HostNotAllowed(String),
    #[error("unparseable base URL in configuration: {0}")]
    InvalidBaseUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// An HTTP client that only talks to approved hosts.
#[derive(Debug, Clone)]
pub struct OutboundClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl OutboundClient {
    /// Builds a client whose allowlist is the host of every given base URL.
    pub fn from_base_urls<I, S>(base_urls: I) -> Result<Self, OutboundError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowlist = HashSet::new();
        for raw in base_urls {
            let raw = raw.as_ref();
            let url =
                Url::parse(raw).map_err(|_| OutboundError::InvalidBaseUrl(raw.to_string()))?;
            match url.host_str() {
                Some(host) => {
                    allowlist.insert(host.to_string());
                }
                None => return Err(OutboundError::InvalidBaseUrl(raw.to_string())),
            }
        }

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_host(&mut self, host: &str) {
        self.allowlist.insert(host.to_string());
    }

    /// Exact host match, or subdomain of an allowed host.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }

    /// GET request builder, policy-checked.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, OutboundError> {
        if !self.is_allowed(url) {
            return Err(OutboundError::HostNotAllowed(url.to_string()));
        }
        Ok(self.client.get(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OutboundClient {
        OutboundClient::from_base_urls([
            "https://clinicaltrials.gov/api/v2",
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils",
        ])
        .unwrap()
    }

    #[test]
    fn allows_configured_hosts_and_subdomains() {
        let c = client();
        assert!(c.is_allowed("https://clinicaltrials.gov/api/v2/studies?query.term=x"));
        assert!(c.is_allowed("https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi"));
        assert!(c.is_allowed("https://beta.clinicaltrials.gov/api/v2/studies"));
    }

    #[test]
    fn rejects_unlisted_hosts() {
        let c = client();
        assert!(!c.is_allowed("https://example.com/anything"));
        assert!(!c.is_allowed("not a url"));
        assert!(c.get("https://example.com/x").is_err());
    }

    #[test]
    fn rejects_lookalike_suffix_hosts() {
        let c = client();
        assert!(!c.is_allowed("https://evilclinicaltrials.gov.example.com/"));
        assert!(!c.is_allowed("https://notclinicaltrials.gov/"));
    }

    #[test]
    fn invalid_base_url_is_an_error() {
        assert!(OutboundClient::from_base_urls(["not a url"]).is_err());
    }
}
