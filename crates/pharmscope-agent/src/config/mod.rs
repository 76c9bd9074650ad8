//! Configuration loading for Pharmscope.
//! Reads pharmscope.toml from the current directory or path in PHARMSCOPE_CONFIG env var.

use pharmscope_common::retry::RetryPolicy;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub ai: AiConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub research: Option<ResearchDefaults>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiProvider {
    Gemini,
    OpenaiCompatible,
}

#[derive(Debug, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_provider")]
    pub provider: AiProvider,
    #[serde(default = "default_model")]
    pub model: String,
    /// Required for `openai_compatible`; overrides the Gemini default.
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    pub api_key: Option<SecretString>,
    #[serde(default = "default_min_call_spacing_ms")]
    pub min_call_spacing_ms: u64,
}

fn default_provider()          -> AiProvider { AiProvider::Gemini }
fn default_model()             -> String { "gemini-2.0-flash".to_string() }
fn default_temperature()       -> f32 { 0.3 }
fn default_max_output_tokens() -> u32 { 1024 }
fn default_min_call_spacing_ms() -> u64 { 1_000 }

impl AiConfig {
    /// Config key, then PHARMSCOPE_AI_API_KEY; Gemini also honors
    /// GOOGLE_API_KEY.
    pub fn resolved_api_key(&self) -> Option<SecretString> {
        if let Some(ref key) = self.api_key {
            return Some(key.expose_secret().to_string().into());
        }
        if let Ok(key) = std::env::var("PHARMSCOPE_AI_API_KEY") {
            if !key.is_empty() {
                return Some(key.into());
            }
        }
        if self.provider == AiProvider::Gemini {
            if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
                if !key.is_empty() {
                    return Some(key.into());
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Soft deadline for the whole analysis stage; records past it use
    /// the heuristic fallback.
    pub deadline_secs: Option<u64>,
}

fn default_concurrency() -> usize { 4 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            deadline_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "bool_true")]
    pub active_trial_focus: bool,
}

fn bool_true() -> bool { true }

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            active_trial_focus: bool_true(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub trials: TrialsConfig,
    #[serde(default)]
    pub publications: PublicationsConfig,
    #[serde(default)]
    pub regulatory: RegulatoryConfig,
}

impl SourcesConfig {
    pub fn any_enabled(&self) -> bool {
        self.trials.enabled || self.publications.enabled || self.regulatory.enabled
    }

    pub fn enabled_base_urls(&self) -> Vec<&str> {
        let mut urls = Vec::new();
        if self.trials.enabled {
            urls.push(self.trials.base_url.as_str());
        }
        if self.publications.enabled {
            urls.push(self.publications.base_url.as_str());
        }
        if self.regulatory.enabled {
            urls.push(self.regulatory.base_url.as_str());
        }
        urls
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrialsConfig {
    #[serde(default = "default_trials_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_trials_delay_ms")]
    pub request_delay_ms: u64,
    /// Registry fields to request; empty keeps the adapter default set.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

fn default_trials_base_url() -> String { "https://clinicaltrials.gov/api/v2".to_string() }
fn default_max_results()     -> usize  { 50 }
fn default_page_size()       -> usize  { 50 }
fn default_trials_delay_ms() -> u64    { 500 }

impl Default for TrialsConfig {
    fn default() -> Self {
        Self {
            base_url: default_trials_base_url(),
            max_results: default_max_results(),
            page_size: default_page_size(),
            request_delay_ms: default_trials_delay_ms(),
            fields: Vec::new(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicationsConfig {
    #[serde(default = "default_publications_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_publications_delay_ms")]
    pub request_delay_ms: u64,
    /// NCBI API key; raises the request-rate allowance.
    pub api_key: Option<String>,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

fn default_publications_base_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}
fn default_publications_delay_ms() -> u64 { 350 }

impl Default for PublicationsConfig {
    fn default() -> Self {
        Self {
            base_url: default_publications_base_url(),
            max_results: default_max_results(),
            page_size: default_page_size(),
            request_delay_ms: default_publications_delay_ms(),
            api_key: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegulatoryConfig {
    #[serde(default = "default_regulatory_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_regulatory_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

fn default_regulatory_base_url() -> String { "https://api.fda.gov".to_string() }
fn default_regulatory_delay_ms() -> u64 { 300 }

impl Default for RegulatoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_regulatory_base_url(),
            max_results: default_max_results(),
            page_size: default_page_size(),
            request_delay_ms: default_regulatory_delay_ms(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

fn default_output_dir() -> String { "reports".to_string() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

/// Default request for non-interactive runs without an argv topic.
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchDefaults {
    pub topic: String,
    #[serde(default = "default_research_kind")]
    pub kind: String,
    pub indication: Option<String>,
}

fn default_research_kind() -> String { "therapeutic_area".to_string() }


impl Config {
    /// Load configuration from pharmscope.toml.
    /// Checks PHARMSCOPE_CONFIG env var first, then current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("PHARMSCOPE_CONFIG")
            .unwrap_or_else(|_| "pharmscope.toml".to_string());

        if !Path::new(&path).exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy pharmscope.example.toml to pharmscope.toml and edit it.",
                path
            );
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Startup validation; any failure here aborts before the pipeline
    /// is constructed.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.ai.provider {
            AiProvider::Gemini => {
                if self.ai.resolved_api_key().is_none() {
                    anyhow::bail!(
                        "Gemini provider needs an API key: set ai.api_key, \
                         PHARMSCOPE_AI_API_KEY or GOOGLE_API_KEY"
                    );
                }
            }
            AiProvider::OpenaiCompatible => {
                if self.ai.base_url.is_none() {
                    anyhow::bail!("openai_compatible provider needs ai.base_url");
                }
            }
        }
        if !self.sources.any_enabled() {
            anyhow::bail!("all sources are disabled; enable at least one [sources.*] section");
        }
        if self.analysis.concurrency == 0 {
            anyhow::bail!("analysis.concurrency must be at least 1");
        }
        if self.output.dir.trim().is_empty() {
            anyhow::bail!("output.dir must not be empty");
        }
        if let Some(ref research) = self.research {
            match research.kind.as_str() {
                "therapeutic_area" | "drug_pipeline" => {}
                other => anyhow::bail!(
                    "research.kind must be therapeutic_area or drug_pipeline, got {other:?}"
                ),
            }
        }
        Ok(())
    }
}
