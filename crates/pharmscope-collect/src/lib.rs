//! pharmscope-collect — Multi-source competitive-intelligence collection.
//! - Source adapters (ClinicalTrials.gov, PubMed, openFDA)
//! - Per-source query construction
//! - Pagination with per-source rate limiting
//! - Merged dataset with first-seen deduplication

pub mod collector;
pub mod error;
pub mod models;
pub mod query;
pub mod sources;

pub use collector::{Collection, Collector, SourceFailure};
pub use error::SourceError;
pub use models::{MergedDataset, RawRecord, RecordKey, SourceKind};
pub use query::SourceQuery;
pub use sources::SourceAdapter;
