//! Source adapter error taxonomy.

use pharmscope_common::outbound::OutboundError;
use pharmscope_common::retry::Transient;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("upstream {adapter} returned {status}: {message}")]
    Upstream {
        adapter: &'static str,
        status: u16,
        message: String,
    },
    #[error("unreadable payload from {adapter}: {message}")]
    Decode {
        adapter: &'static str,
        message: String,
    },
    #[error("outbound policy: {0}")]
    Policy(#[from] OutboundError),
}

impl Transient for SourceError {
    /// Network failures and server-side trouble are retried inside the
    /// adapter pagination loop; decode and policy errors fail the fetch.
    fn is_transient(&self) -> bool {
        match self {
            SourceError::Network(_) => true,
            SourceError::Upstream { status, .. } => *status >= 500 || *status == 429,
            SourceError::Decode { .. } | SourceError::Policy(_) => false,
        }
    }
}

/// Trims an upstream error body down to something loggable.
pub(crate) fn body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= 200 {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(200).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let e = SourceError::Upstream {
            adapter: "clinicaltrials",
            status: 503,
            message: "unavailable".into(),
        };
        assert!(e.is_transient());

        let e = SourceError::Upstream {
            adapter: "openfda",
            status: 429,
            message: "slow down".into(),
        };
        assert!(e.is_transient());
    }

    #[test]
    fn client_and_decode_errors_are_permanent() {
        let e = SourceError::Upstream {
            adapter: "pubmed",
            status: 400,
            message: "bad term".into(),
        };
        assert!(!e.is_transient());

        let e = SourceError::Decode {
            adapter: "pubmed",
            message: "truncated XML".into(),
        };
        assert!(!e.is_transient());
    }

    #[test]
    fn adapter_name_is_display_only() {
        // The adapter tag feeds the message; the error chain stays empty.
        let e = SourceError::Upstream {
            adapter: "clinicaltrials",
            status: 503,
            message: "unavailable".into(),
        };
        assert!(std::error::Error::source(&e).is_none());
        assert_eq!(e.to_string(), "upstream clinicaltrials returned 503: unavailable");

        let e = SourceError::Decode {
            adapter: "pubmed",
            message: "truncated XML".into(),
        };
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn long_bodies_are_snipped() {
        let long = "x".repeat(500);
        let snip = body_snippet(&long);
        assert!(snip.chars().count() <= 201);
        assert!(snip.ends_with('…'));
        assert_eq!(body_snippet("  short  "), "short");
    }
}
