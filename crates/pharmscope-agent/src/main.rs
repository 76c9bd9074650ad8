//! Pharmscope — Pharmaceutical competitive-intelligence pipeline.
//! Entry point for the agent binary.

mod config;
mod interactive;

use anyhow::Context;
use pharmscope_collect::sources::clinicaltrials::ClinicalTrialsAdapter;
use pharmscope_collect::sources::openfda::OpenFdaAdapter;
use pharmscope_collect::sources::pubmed::PubMedAdapter;
use pharmscope_collect::{Collector, SourceAdapter};
use pharmscope_common::outbound::OutboundClient;
use pharmscope_common::ResearchRequest;
use pharmscope_intel::pipeline::RunOutcome;
use pharmscope_intel::{render_markdown, render_yaml, Analyzer, KeywordGenerator, Pipeline};
use pharmscope_llm::{GeminiModel, GenerateOptions, OpenAiCompatModel, Pacer, TextModel};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn build_model(config: &config::Config) -> anyhow::Result<Arc<dyn TextModel>> {
    let ai = &config.ai;
    match ai.provider {
        config::AiProvider::Gemini => {
            let key = ai
                .resolved_api_key()
                .context("Gemini API key missing despite config validation")?;
            let mut model = GeminiModel::new(key.expose_secret(), ai.model.clone());
            if let Some(ref base_url) = ai.base_url {
                model = model.with_base_url(base_url.clone());
            }
            Ok(Arc::new(model))
        }
        config::AiProvider::OpenaiCompatible => {
            let base_url = ai
                .base_url
                .clone()
                .context("ai.base_url missing despite config validation")?;
            let key = ai
                .resolved_api_key()
                .map(|k| k.expose_secret().to_string());
            Ok(Arc::new(OpenAiCompatModel::new(base_url, ai.model.clone(), key)))
        }
    }
}

/// Enabled source adapters plus their per-source result caps.
fn build_adapters(
    config: &config::Config,
    client: &OutboundClient,
) -> (Vec<Arc<dyn SourceAdapter>>, HashMap<String, usize>) {
    let sources = &config.sources;
    let retry = config.retry.clone();
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    let mut caps = HashMap::new();

    if sources.trials.enabled {
        let s = &sources.trials;
        let adapter = ClinicalTrialsAdapter::new(client.clone(), s.base_url.clone())
            .with_fields(s.fields.clone())
            .with_page_size(s.page_size)
            .with_request_delay(Duration::from_millis(s.request_delay_ms))
            .with_retry(retry.clone());
        caps.insert(adapter.name().to_string(), s.max_results);
        adapters.push(Arc::new(adapter));
    }
    if sources.publications.enabled {
        let s = &sources.publications;
        let adapter = PubMedAdapter::new(client.clone(), s.base_url.clone(), s.api_key.clone())
            .with_page_size(s.page_size)
            .with_request_delay(Duration::from_millis(s.request_delay_ms))
            .with_retry(retry.clone());
        caps.insert(adapter.name().to_string(), s.max_results);
        adapters.push(Arc::new(adapter));
    }
    if sources.regulatory.enabled {
        let s = &sources.regulatory;
        let adapter = OpenFdaAdapter::new(client.clone(), s.base_url.clone(), None)
            .with_page_size(s.page_size)
            .with_request_delay(Duration::from_millis(s.request_delay_ms))
            .with_retry(retry);
        caps.insert(adapter.name().to_string(), s.max_results);
        adapters.push(Arc::new(adapter));
    }

    (adapters, caps)
}

/// Topic from argv, then [research] defaults, then the interactive prompt.
fn resolve_request(config: &config::Config) -> anyhow::Result<ResearchRequest> {
    if let Some(topic) = std::env::args().nth(1) {
        let topic = topic.trim().to_string();
        anyhow::ensure!(!topic.is_empty(), "topic argument must not be empty");
        if interactive::looks_like_drug_name(&topic) {
            info!(topic, "Topic looks like a drug name, tracking its pipeline");
            return Ok(ResearchRequest::drug_pipeline(topic, None));
        }
        return Ok(ResearchRequest::therapeutic_area(topic));
    }

    if let Some(ref research) = config.research {
        let request = match research.kind.as_str() {
            "drug_pipeline" => {
                ResearchRequest::drug_pipeline(research.topic.clone(), research.indication.clone())
            }
            _ => ResearchRequest::therapeutic_area(research.topic.clone()),
        };
        info!(request = %request.summary(), "Using configured default research request");
        return Ok(request);
    }

    interactive::prompt_request()
}

/// Lowercased alphanumeric topic for file names.
fn slug(topic: &str) -> String {
    let mut out = String::new();
    for c in topic.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

fn write_outputs(dir: &str, outcome: &RunOutcome) -> anyhow::Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {dir}"))?;
    let stem = format!(
        "landscape_{}_{}",
        slug(&outcome.report.request.topic),
        outcome.report.generated_at.format("%Y%m%d_%H%M%S")
    );

    let md_path = PathBuf::from(dir).join(format!("{stem}.md"));
    std::fs::write(&md_path, render_markdown(outcome))
        .with_context(|| format!("failed to write {}", md_path.display()))?;

    let yaml_path = PathBuf::from(dir).join(format!("{stem}.yaml"));
    let yaml = render_yaml(outcome).context("failed to serialize run archive")?;
    std::fs::write(&yaml_path, yaml)
        .with_context(|| format!("failed to write {}", yaml_path.display()))?;

    Ok((md_path, yaml_path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pharmscope=debug,info")),
        )
        .init();

    info!("🔬 Pharmscope starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration; any config problem is fatal before the run starts.
    let config = config::Config::load().context("configuration error")?;
    info!(
        "Configuration loaded. AI model: {}, sources enabled: {}",
        config.ai.model,
        config.sources.enabled_base_urls().len()
    );

    let client = OutboundClient::from_base_urls(config.sources.enabled_base_urls())
        .context("invalid source base URL in configuration")?;
    let model = build_model(&config)?;
    info!("✅ AI backend ready: {}", model.model_id());

    let options = GenerateOptions {
        temperature: config.ai.temperature,
        max_output_tokens: config.ai.max_output_tokens,
    };
    let pacer = Arc::new(Pacer::new(Duration::from_millis(config.ai.min_call_spacing_ms)));

    let (adapters, caps) = build_adapters(&config, &client);
    info!("✅ {} source adapters configured", adapters.len());

    let keyword_generator = KeywordGenerator::new(
        model.clone(),
        pacer.clone(),
        options.clone(),
        config.retry.clone(),
    );
    let collector = Collector::new(adapters, 50)
        .with_source_caps(caps)
        .with_active_trial_focus(config.collection.active_trial_focus);
    let analyzer = Analyzer::new(model, pacer, options, config.retry.clone())
        .with_concurrency(config.analysis.concurrency)
        .with_deadline(config.analysis.deadline_secs.map(Duration::from_secs));
    let pipeline = Pipeline::new(keyword_generator, collector, analyzer);

    let request = resolve_request(&config)?;
    info!("🔎 Research request: {}", request.summary());

    let (progress_tx, mut progress_rx) =
        tokio::sync::broadcast::channel::<pharmscope_intel::RunProgress>(32);
    let subscriber = tokio::spawn(async move {
        while let Ok(event) = progress_rx.recv().await {
            println!("[{}] {}", event.stage, event.message);
        }
    });

    let outcome = pipeline
        .run_research(request, Some(progress_tx))
        .await
        .context("research run failed")?;
    subscriber.await.ok();

    let (md_path, yaml_path) = write_outputs(&config.output.dir, &outcome)?;

    info!(
        "✅ Run {} complete in {} ms: {} records, {} AI analyses, {} fallback, degraded: {}",
        outcome.run_id,
        outcome.duration_ms,
        outcome.dataset.len(),
        outcome.ai_count(),
        outcome.fallback_count(),
        outcome.report.degraded
    );
    info!("📄 Report:  {}", md_path.display());
    info!("🗄  Archive: {}", yaml_path.display());

    Ok(())
}
