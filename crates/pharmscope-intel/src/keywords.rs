//! Search keyword generation.
//!
//! The AI path asks the model for a flat keyword list and parses it; any
//! failure along the way drops into a curated static fallback, so
//! `generate` never fails and never produces an empty set. Results are
//! cached per request in a small LRU — the only state kept across runs.

use lru::LruCache;
use pharmscope_common::retry::{with_retry, RetryPolicy};
use pharmscope_common::{KeywordSet, ResearchKind, ResearchRequest};
use pharmscope_llm::{AiError, GenerateOptions, Pacer, TextModel};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const CACHE_CAPACITY: usize = 64;

/// Terms too generic to be useful as search keywords, stripped from AI
/// output before the non-empty check.
const GENERIC_TERMS: &[&str] = &[
    "cancer",
    "tumor",
    "disease",
    "trial",
    "therapy",
    "treatment",
    "drug",
    "medication",
    "clinical",
    "study",
    "research",
    "patient",
    "medical",
    "health",
    "care",
    "medicine",
    "pharmaceutical",
];

/// Curated keyword expansions for common therapeutic areas.
///
/// An entry matches when every trigger token appears in the lowercased
/// request text; the first matching entry in table order wins, so subtype
/// entries are listed before their umbrella entry.
const EXPANSIONS: &[(&[&str], &[&str])] = &[
    (
        &["cancer", "lung"],
        &[
            "nsclc",
            "non-small cell lung cancer",
            "sclc",
            "pembrolizumab",
            "nivolumab",
            "atezolizumab",
            "checkpoint inhibitor",
            "pd-1",
            "pd-l1",
            "immunotherapy",
        ],
    ),
    (
        &["cancer", "breast"],
        &[
            "her2-positive",
            "her2-negative",
            "triple-negative",
            "trastuzumab",
            "pertuzumab",
            "antibody-drug conjugate",
            "endocrine therapy",
            "aromatase inhibitor",
        ],
    ),
    (
        &["cancer", "colorectal"],
        &[
            "crc",
            "colorectal cancer",
            "kras",
            "braf",
            "msi-high",
            "cetuximab",
            "bevacizumab",
            "regorafenib",
        ],
    ),
    (
        &["leukemia"],
        &[
            "aml",
            "cll",
            "cml",
            "acute myeloid leukemia",
            "chronic lymphocytic leukemia",
            "tyrosine kinase inhibitor",
            "imatinib",
            "dasatinib",
        ],
    ),
    (
        &["lymphoma"],
        &[
            "dlbcl",
            "diffuse large b-cell lymphoma",
            "hodgkin",
            "car-t",
            "chimeric antigen receptor",
            "cd19",
            "rituximab",
        ],
    ),
    (
        &["cancer"],
        &[
            "oncology",
            "checkpoint inhibitor",
            "immunotherapy",
            "targeted therapy",
            "antibody-drug conjugate",
            "biomarker",
            "overall survival",
            "progression-free survival",
        ],
    ),
    (
        &["alzheimer"],
        &[
            "amyloid beta",
            "tau protein",
            "cognitive decline",
            "lecanemab",
            "donanemab",
            "neurodegeneration",
            "cerebrospinal fluid",
        ],
    ),
    (
        &["parkinson"],
        &[
            "dopamine",
            "levodopa",
            "deep brain stimulation",
            "alpha-synuclein",
            "motor symptoms",
            "bradykinesia",
        ],
    ),
    (
        &["multiple sclerosis"],
        &[
            "relapsing-remitting",
            "rrms",
            "interferon beta",
            "glatiramer acetate",
            "natalizumab",
            "fingolimod",
        ],
    ),
    (
        &["diabetes"],
        &[
            "type 2 diabetes",
            "glp-1",
            "glucagon-like peptide",
            "sglt2",
            "dpp-4",
            "metformin",
            "insulin",
            "hba1c",
            "glycemic control",
        ],
    ),
    (
        &["obesity"],
        &[
            "glp-1",
            "semaglutide",
            "tirzepatide",
            "weight loss",
            "incretin",
            "bariatric",
        ],
    ),
    (
        &["heart failure"],
        &[
            "hfref",
            "hfpef",
            "reduced ejection fraction",
            "ace inhibitor",
            "angiotensin receptor blocker",
            "beta blocker",
        ],
    ),
    (
        &["hypertension"],
        &[
            "blood pressure",
            "systolic",
            "ace inhibitor",
            "calcium channel blocker",
            "diuretic",
            "amlodipine",
        ],
    ),
    (
        &["rheumatoid arthritis"],
        &[
            "dmard",
            "methotrexate",
            "adalimumab",
            "etanercept",
            "infliximab",
            "tumor necrosis factor",
            "tnf",
        ],
    ),
    (
        &["psoriasis"],
        &[
            "psoriatic arthritis",
            "biologic",
            "ustekinumab",
            "secukinumab",
            "ixekizumab",
            "il-17",
        ],
    ),
    (
        &["asthma"],
        &[
            "bronchodilator",
            "inhaled corticosteroid",
            "long-acting beta agonist",
            "eosinophilic",
            "feno",
        ],
    ),
    (
        &["copd"],
        &[
            "chronic obstructive pulmonary disease",
            "bronchodilator",
            "long-acting muscarinic antagonist",
            "triple therapy",
            "fev1",
        ],
    ),
    (
        &["cystic fibrosis"],
        &[
            "cftr",
            "ivacaftor",
            "lumacaftor",
            "elexacaftor",
            "sweat chloride",
        ],
    ),
    (
        &["sickle cell"],
        &[
            "sickle cell disease",
            "hemoglobin",
            "hydroxyurea",
            "gene therapy",
            "crispr",
        ],
    ),
];

/// Baseline terms always added on drug-pipeline runs.
const PIPELINE_TERMS: &[&str] = &[
    "clinical trial",
    "phase",
    "safety",
    "efficacy",
    "pharmacokinetics",
    "mechanism of action",
    "biomarker",
    "adverse event",
    "tolerability",
];

/// Last-resort terms when a request tokenizes to nothing at all.
const DEFAULT_AREA_TERMS: &[&str] = &["clinical trial", "phase", "efficacy", "safety"];

pub struct KeywordGenerator {
    model: Arc<dyn TextModel>,
    pacer: Arc<Pacer>,
    options: GenerateOptions,
    retry: RetryPolicy,
    cache: Mutex<LruCache<String, KeywordSet>>,
}

impl KeywordGenerator {
    pub fn new(
        model: Arc<dyn TextModel>,
        pacer: Arc<Pacer>,
        options: GenerateOptions,
        retry: RetryPolicy,
    ) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            model,
            pacer,
            options,
            retry,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Produces the keyword set for a request. Never fails: any AI-path
    /// problem falls back to the curated tables, and the tables bottom
    /// out at the tokenized topic.
    #[instrument(skip(self, request), fields(topic = %request.topic))]
    pub async fn generate(&self, request: &ResearchRequest) -> KeywordSet {
        let cache_key = cache_key(request);
        if let Some(cached) = self.cache.lock().await.get(&cache_key) {
            debug!("Keyword cache hit");
            return cached.clone();
        }

        let keywords = match self.generate_ai(request).await {
            Ok(set) => {
                info!(n = set.len(), "Keywords generated by AI");
                set
            }
            Err(e) => {
                warn!(error = %e, "AI keyword generation unavailable, using static fallback");
                self.fallback(request)
            }
        };

        self.cache.lock().await.put(cache_key, keywords.clone());
        keywords
    }

    async fn generate_ai(&self, request: &ResearchRequest) -> Result<KeywordSet, AiError> {
        let prompt = build_prompt(request);
        let output = with_retry(&self.retry, || async {
            self.pacer.pause().await;
            self.model.generate(&prompt, &self.options).await
        })
        .await?;

        parse_keyword_list(&output)
            .ok_or_else(|| AiError::Malformed("no usable keywords in response".to_string()))
    }

    /// Static keyword derivation, in priority order: curated expansion
    /// table, then the tokenized request, then fixed default terms. The
    /// last step makes the non-empty postcondition unconditional.
    fn fallback(&self, request: &ResearchRequest) -> KeywordSet {
        let haystack = request_text(request);

        let mut candidates: Vec<String> = Vec::new();
        if let Some(expansion) = lookup_expansion(&haystack) {
            candidates.extend(expansion.iter().map(|s| s.to_string()));
        }

        if request.kind == ResearchKind::DrugPipeline {
            if let Some(ref drug) = request.drug_name {
                candidates.push(drug.clone());
            }
            if let Some(ref indication) = request.indication {
                candidates.push(indication.clone());
            }
            candidates.extend(PIPELINE_TERMS.iter().map(|s| s.to_string()));
        }

        if candidates.is_empty() {
            candidates.extend(tokenize(&request.topic));
        }

        KeywordSet::build(candidates).unwrap_or_else(|| {
            // Pathological blank request; fixed terms keep the invariant.
            KeywordSet::build(DEFAULT_AREA_TERMS)
                .unwrap_or_else(|| unreachable!("default term table is non-empty"))
        })
    }
}

fn cache_key(request: &ResearchRequest) -> String {
    format!(
        "{}|{}|{}|{}",
        request.topic.to_lowercase(),
        request.kind.as_str(),
        request.drug_name.as_deref().unwrap_or("").to_lowercase(),
        request.indication.as_deref().unwrap_or("").to_lowercase(),
    )
}

fn request_text(request: &ResearchRequest) -> String {
    let mut text = request.topic.to_lowercase();
    if let Some(ref drug) = request.drug_name {
        text.push(' ');
        text.push_str(&drug.to_lowercase());
    }
    if let Some(ref indication) = request.indication {
        text.push(' ');
        text.push_str(&indication.to_lowercase());
    }
    text
}

/// First expansion entry whose trigger tokens all appear in the request.
fn lookup_expansion(haystack: &str) -> Option<&'static [&'static str]> {
    EXPANSIONS
        .iter()
        .find(|(triggers, _)| triggers.iter().all(|t| haystack.contains(t)))
        .map(|(_, keywords)| *keywords)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(|token| token.trim().to_lowercase())
        .filter(|token| token.len() > 2)
        .collect()
}

fn build_prompt(request: &ResearchRequest) -> String {
    match request.kind {
        ResearchKind::TherapeuticArea => format!(
            "Generate 10-15 highly specific keywords for searching clinical trials, \
             publications and drug labels about: \"{}\"\n\n\
             Focus on:\n\
             - Drug names and synonyms\n\
             - Disease subtypes and specific conditions\n\
             - Mechanisms of action and molecular targets\n\
             - Biomarkers and clinical endpoints\n\
             - Treatment approaches\n\n\
             Exclude generic terms like \"cancer\", \"trial\", \"treatment\", \"therapy\" \
             unless they are part of a specific term.\n\n\
             Return only the keywords as a comma-separated list, no explanations.",
            request.topic
        ),
        ResearchKind::DrugPipeline => {
            let indication = request
                .indication
                .as_deref()
                .map(|i| format!(" in {i}"))
                .unwrap_or_default();
            format!(
                "Generate 10-15 highly specific keywords for tracking the development \
                 pipeline of the drug \"{}\"{}.\n\n\
                 Focus on:\n\
                 - The drug name, synonyms and drug class\n\
                 - Mechanism of action, target and pathway\n\
                 - Development stages and trial phases\n\
                 - Clinical endpoints, safety and tolerability vocabulary\n\
                 - Competing drugs with the same target\n\n\
                 Return only the keywords as a comma-separated list, no explanations.",
                request.topic, indication
            )
        }
    }
}

/// Splits a model response on newlines and commas into a keyword set,
/// dropping generic filler terms. `None` when nothing usable remains.
fn parse_keyword_list(output: &str) -> Option<KeywordSet> {
    let candidates = output
        .lines()
        .flat_map(|line| line.split(','))
        .map(|term| term.trim_matches(|c: char| c.is_whitespace() || "-*•\"'`".contains(c)))
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
        .filter(|term| !GENERIC_TERMS.contains(&term.as_str()));
    KeywordSet::build(candidates)
}
