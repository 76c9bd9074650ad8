//! Audit entries for AI backend calls.
//!
//! Every completed generation is summarized into a `CallAudit` and logged
//! at debug level. Only the output hash is recorded, never the text, so
//! logs stay free of model output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CallAudit {
    pub id: Uuid,
    pub backend: String,
    pub model: String,
    pub prompt_chars: usize,
    pub output_chars: usize,
    pub output_sha256: String,
    pub latency_ms: u64,
    pub called_at: DateTime<Utc>,
}

impl CallAudit {
    pub fn new(backend: &str, model: &str, prompt: &str, output: &str, latency: Duration) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(output.as_bytes());
        let output_sha256 = format!("{:x}", hasher.finalize());

        Self {
            id: Uuid::new_v4(),
            backend: backend.to_string(),
            model: model.to_string(),
            prompt_chars: prompt.chars().count(),
            output_chars: output.chars().count(),
            output_sha256,
            latency_ms: latency.as_millis() as u64,
            called_at: Utc::now(),
        }
    }
}

/// Builds and logs the audit entry for one completed call.
pub(crate) fn record(backend: &str, model: &str, prompt: &str, output: &str, latency: Duration) {
    let entry = CallAudit::new(backend, model, prompt, output, latency);
    tracing::debug!(
        audit_id = %entry.id,
        backend = %entry.backend,
        model = %entry.model,
        prompt_chars = entry.prompt_chars,
        output_chars = entry.output_chars,
        output_sha256 = %entry.output_sha256,
        latency_ms = entry.latency_ms,
        "AI call completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_hash_is_deterministic() {
        let a = CallAudit::new("gemini", "m", "prompt", "same output", Duration::from_millis(5));
        let b = CallAudit::new("gemini", "m", "prompt", "same output", Duration::from_millis(9));
        assert_eq!(a.output_sha256, b.output_sha256);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn different_output_different_hash() {
        let a = CallAudit::new("gemini", "m", "p", "one", Duration::ZERO);
        let b = CallAudit::new("gemini", "m", "p", "two", Duration::ZERO);
        assert_ne!(a.output_sha256, b.output_sha256);
        assert_eq!(a.output_chars, 3);
    }
}
