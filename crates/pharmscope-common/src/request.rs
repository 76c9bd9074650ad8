//! Research request types.
//!
//! A `ResearchRequest` is constructed once per run and threaded through
//! every stage unchanged. The run itself is identified by a `Uuid` minted
//! by the pipeline, never by ambient state.

use serde::{Deserialize, Serialize};

/// Which competitive landscape a run is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchKind {
    /// Survey a whole therapeutic area (e.g. "GLP-1 agonists in obesity").
    TherapeuticArea,
    /// Track the development pipeline of a single named drug.
    DrugPipeline,
}

impl ResearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchKind::TherapeuticArea => "therapeutic_area",
            ResearchKind::DrugPipeline    => "drug_pipeline",
        }
    }
}

/// Parameters for a single research run. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    pub kind: ResearchKind,
    /// Set for `DrugPipeline` runs; sharpens regulatory queries.
    pub drug_name: Option<String>,
    /// Disease context, when the user supplied one.
    pub indication: Option<String>,
}

impl ResearchRequest {
    pub fn therapeutic_area(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into().trim().to_string(),
            kind: ResearchKind::TherapeuticArea,
            drug_name: None,
            indication: None,
        }
    }

    pub fn drug_pipeline(drug_name: impl Into<String>, indication: Option<String>) -> Self {
        let drug = drug_name.into().trim().to_string();
        Self {
            topic: drug.clone(),
            kind: ResearchKind::DrugPipeline,
            drug_name: Some(drug),
            indication: indication.map(|i| i.trim().to_string()).filter(|i| !i.is_empty()),
        }
    }

    /// One-line human description, used in log lines and report headers.
    pub fn summary(&self) -> String {
        match (&self.kind, &self.indication) {
            (ResearchKind::DrugPipeline, Some(ind)) => {
                format!("drug pipeline: {} ({})", self.topic, ind)
            }
            (ResearchKind::DrugPipeline, None) => format!("drug pipeline: {}", self.topic),
            (ResearchKind::TherapeuticArea, _) => format!("therapeutic area: {}", self.topic),
        }
    }
}
