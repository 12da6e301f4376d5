//! veracity: verify factual claims against web evidence.
//!
//! Usage:
//!   veracity verify --config veracity.yaml --claims claims.json
//!   veracity verify --claims - --samples 5 --deadline 2m < claims.txt
//!   veracity providers
//!   veracity check-config --config veracity.yaml

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use veracity_core::{Claim, Verdict};
use veracity_runtime::{ClaimVerifier, ProviderRegistry, RuntimeConfig, SearchRegistry};

#[derive(Parser, Debug)]
#[command(name = "veracity", version, about = "Verify factual claims against web evidence")]
struct Cli {
    /// Log filter when RUST_LOG is not set (e.g. "debug", "veracity_runtime=trace")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify claims and print one JSON result per claim.
    Verify {
        /// Configuration file (YAML, or JSON by extension); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Claims: a JSON array or one claim per line; "-" reads stdin
        #[arg(long)]
        claims: PathBuf,

        /// Claims verified at the same time
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Consensus samples per evaluation (overrides the config)
        #[arg(long)]
        samples: Option<usize>,

        /// Search provider (overrides the config)
        #[arg(long)]
        provider: Option<String>,

        /// Per-claim deadline, e.g. "90s" or "2m"
        #[arg(long, value_parser = humantime::parse_duration)]
        deadline: Option<Duration>,
    },

    /// List registered search and model providers.
    Providers,

    /// Validate a configuration file and the providers it names.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

/// A claim as read from a JSON claims file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClaimInput {
    Text(String),
    Full(Claim),
}

/// One line of `verify` output.
#[derive(Debug, Serialize)]
struct ClaimReport {
    claim_index: usize,
    verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn standalone(text: &str, index: usize) -> Claim {
    Claim::new(text).with_source(text, text, index)
}

/// Parse claims from a JSON array or from plain lines.
fn parse_claims(input: &str) -> Result<Vec<Claim>> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('[') {
        let items: Vec<ClaimInput> = serde_json::from_str(trimmed)
            .context("Claims file looks like JSON but does not parse")?;
        return Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                ClaimInput::Text(text) => standalone(&text, i),
                ClaimInput::Full(claim) => claim,
            })
            .collect());
    }

    Ok(input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| standalone(line, i))
        .collect())
}

fn read_claims(path: &Path) -> Result<Vec<Claim>> {
    let input = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read claims from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    };
    parse_claims(&input)
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Invalid config {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

async fn verify(
    config: Option<PathBuf>,
    claims: PathBuf,
    concurrency: usize,
    samples: Option<usize>,
    provider: Option<String>,
    deadline: Option<Duration>,
) -> Result<()> {
    let mut config = load_config(config.as_deref())?;
    if let Some(samples) = samples {
        config.invoker.consensus_samples = samples;
    }
    if let Some(provider) = provider {
        config.search.search_provider = provider;
    }

    let claims = read_claims(&claims)?;
    if claims.is_empty() {
        bail!("No claims to verify");
    }

    let verifier = ClaimVerifier::from_config(
        &config,
        &ProviderRegistry::with_defaults(),
        &SearchRegistry::with_defaults(),
    )
    .context("Failed to set up verifier")?;

    let total = claims.len();
    let mut outcome = verifier.verify_all(claims, concurrency, deadline).await;
    let verdicts = outcome.verdicts.snapshot();

    let reports: Vec<ClaimReport> = (0..total)
        .map(|index| ClaimReport {
            claim_index: index,
            verdict: verdicts.get(&index).cloned(),
            error: outcome.errors.remove(&index).map(|e| e.to_string()),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&reports)?);

    let usage = verifier.usage().total();
    tracing::info!(
        llm_calls = usage.llm_calls,
        failed_calls = usage.failed_calls,
        invalid_outputs = usage.invalid_outputs,
        total_tokens = usage.total_tokens,
        estimated_cost = usage.estimated_cost,
        "Model usage"
    );
    Ok(())
}

fn providers() {
    let search = SearchRegistry::with_defaults();
    let models = ProviderRegistry::with_defaults();

    println!("Search providers:");
    for (name, description) in search.describe() {
        println!("  {:<10} {}", name, description);
    }
    println!();
    println!("Model providers:");
    for (name, description) in models.describe() {
        println!("  {:<10} {}", name, description);
    }
}

fn check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;

    SearchRegistry::with_defaults()
        .validate(&config.search.search_provider, &config.search.options)
        .context("Search provider")?;
    ProviderRegistry::with_defaults()
        .validate(&config.model.llm_provider, &config.model.options)
        .context("Model provider")?;

    println!(
        "{} is valid (search: {}, model: {} {})",
        path.display(),
        config.search.search_provider,
        config.model.llm_provider,
        config.model.model
    );
    for warning in config.warnings() {
        println!("warning: {}", warning);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Command::Verify {
            config,
            claims,
            concurrency,
            samples,
            provider,
            deadline,
        } => verify(config, claims, concurrency, samples, provider, deadline).await,
        Command::Providers => {
            providers();
            Ok(())
        }
        Command::CheckConfig { config } => check_config(&config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines() {
        let claims = parse_claims("The sky is blue.\n\n  Water boils at 100 C.  \n").unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[1].claim_text, "Water boils at 100 C.");
        assert_eq!(claims[1].original_index, 1);
    }

    #[test]
    fn test_json_strings_and_objects() {
        let input = r#"[
            "The sky is blue.",
            {"claim_text": "It is 330 m tall.",
             "disambiguated_sentence": "The Eiffel Tower is 330 m tall.",
             "original_sentence": "It is 330 m tall.",
             "original_index": 4}
        ]"#;
        let claims = parse_claims(input).unwrap();

        assert_eq!(claims[0].claim_text, "The sky is blue.");
        assert_eq!(claims[1].disambiguated_sentence, "The Eiffel Tower is 330 m tall.");
        assert_eq!(claims[1].original_index, 4);
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(parse_claims("[1, 2").is_err());
    }

    #[test]
    fn test_cli_parses_verify() {
        let cli = Cli::try_parse_from([
            "veracity", "verify", "--claims", "-", "--samples", "5", "--deadline", "2m",
        ])
        .unwrap();
        match cli.command {
            Command::Verify { samples, deadline, .. } => {
                assert_eq!(samples, Some(5));
                assert_eq!(deadline, Some(Duration::from_secs(120)));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
