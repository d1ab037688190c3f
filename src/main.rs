//! modelgate - resilient AI text-generation gateway
//!
//! One-shot CLI: load a config, route a prompt through the gateway, print
//! the response. `--status` prints the routing and analytics state after the
//! request instead of exiting silently.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use modelgate::{Gateway, GatewayConfig, GenerateOptions, SamplingParams};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modelgate", version, about = "Resilient AI text-generation gateway")]
struct Cli {
    /// Path to the gateway configuration (YAML or JSON)
    #[arg(short, long, env = "MODELGATE_CONFIG", default_value = "modelgate.yaml")]
    config: PathBuf,

    /// Prompt to route through the gateway
    prompt: String,

    /// Preferred model; falls back through the configured failover order
    #[arg(short, long)]
    model: Option<String>,

    /// Topic used by the deterministic local fallback
    #[arg(long)]
    topic: Option<String>,

    /// Strategy label echoed by the local fallback
    #[arg(long)]
    strategy: Option<String>,

    /// Iteration counter echoed by the local fallback
    #[arg(long, default_value_t = 0)]
    iteration: u32,

    /// Sampling temperature
    #[arg(short, long)]
    temperature: Option<f64>,

    /// Completion token budget
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Bypass the response cache for this call
    #[arg(long)]
    no_cache: bool,

    /// Print gateway status as JSON after the request
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = GatewayConfig::from_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let gateway = Gateway::new(config)?;
    gateway.start_background_tasks();

    let options = GenerateOptions {
        model: cli.model,
        params: SamplingParams {
            temperature: cli.temperature,
            top_p: None,
            max_tokens: cli.max_tokens,
        },
        topic: cli.topic,
        strategy: cli.strategy,
        iteration: cli.iteration,
        skip_cache: cli.no_cache,
        ttl_override_ms: None,
    };

    let response = gateway.generate(&cli.prompt, &options).await;
    println!("{}", response.content);
    eprintln!(
        "[{}/{}{}] {} tokens",
        response.provider,
        response.model,
        if response.cached { ", cached" } else { "" },
        response.usage.total_tokens
    );

    if cli.status {
        println!("{}", serde_json::to_string_pretty(&gateway.get_status())?);
    }

    gateway.shutdown()?;
    Ok(())
}
