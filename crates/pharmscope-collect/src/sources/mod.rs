//! Source adapter clients.

pub mod clinicaltrials;
pub mod openfda;
pub mod pubmed;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::models::{RawRecord, SourceKind};
use crate::query::SourceQuery;

/// Common interface for all upstream data sources.
///
/// Implementations paginate internally, sleep a configured delay between
/// page requests, retry transient page failures, and truncate at
/// `max_results`. A fetch either yields records or one terminal error;
/// the collector decides what a failure means for the run.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which record family this adapter produces.
    fn kind(&self) -> SourceKind;

    /// Short source name for logs and failure reports.
    fn name(&self) -> &'static str;

    /// Fetch up to `max_results` records matching the query.
    async fn fetch(
        &self,
        query: &SourceQuery,
        max_results: usize,
    ) -> Result<Vec<RawRecord>, SourceError>;
}
