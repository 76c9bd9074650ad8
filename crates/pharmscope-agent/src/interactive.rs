//! Interactive research prompt.
//!
//! Asks for a topic, guesses whether it names a single drug from common
//! nonproprietary-name suffixes, confirms the guess, and optionally takes
//! a disease indication for drug-pipeline runs.

use anyhow::Context;
use pharmscope_common::ResearchRequest;
use std::io::{self, Write};

/// INN suffixes that mark a single token as a likely drug name
/// (monoclonal antibodies, kinase inhibitors, fusion proteins, peptides).
const DRUG_SUFFIXES: &[&str] = &["mab", "nib", "cept", "tide"];

pub fn prompt_request() -> anyhow::Result<ResearchRequest> {
    println!("Pharmscope competitive-intelligence research");
    println!();

    let topic = loop {
        let topic = read_line("Research topic (therapeutic area or drug name): ")?;
        if !topic.is_empty() {
            break topic;
        }
        println!("Topic must not be empty.");
    };

    if looks_like_drug_name(&topic) {
        let answer = read_line(&format!(
            "\"{topic}\" looks like a drug name. Track its development pipeline? [Y/n]: "
        ))?;
        if is_yes(&answer) {
            let indication = read_line("Disease indication (optional, Enter to skip): ")?;
            let indication = (!indication.is_empty()).then_some(indication);
            return Ok(ResearchRequest::drug_pipeline(topic, indication));
        }
    }

    Ok(ResearchRequest::therapeutic_area(topic))
}

/// A single token ending in a known INN suffix is treated as a drug name.
pub fn looks_like_drug_name(topic: &str) -> bool {
    let topic = topic.trim();
    if topic.is_empty() || topic.contains(char::is_whitespace) {
        return false;
    }
    let lowered = topic.to_lowercase();
    DRUG_SUFFIXES
        .iter()
        .any(|suffix| lowered.ends_with(suffix) && lowered.len() > suffix.len())
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes")
}

fn read_line(prompt: &str) -> anyhow::Result<String> {
    print!("{prompt}");
    io::stdout().flush().context("failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim().to_string())
}
