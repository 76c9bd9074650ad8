//! pharmscope-common — Shared types and helpers used across all Pharmscope crates.

pub mod keywords;
pub mod outbound;
pub mod request;
pub mod retry;

// Re-export commonly used types
pub use keywords::KeywordSet;
pub use request::{ResearchKind, ResearchRequest};
pub use retry::{with_retry, RetryPolicy, Transient};
