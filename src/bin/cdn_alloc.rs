//! cdn-alloc CLI
//!
//! Boots a registry from a network state document and prints the
//! allocation a server at one location would receive, one JSON line per
//! round.

use anyhow::{bail, Context};
use cdn_alloc::{
    load_network_state, AllocatorConfig, JsonFileRankingSource, JsonNetworkState,
    RegistryBuilder, Strategy,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cdn-alloc")]
#[command(about = "Space-aware content allocation for CDN edge servers")]
struct Args {
    /// Allocator configuration (TOML); defaults are used if omitted
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Network state document (JSON)
    #[arg(short = 's', long)]
    state: PathBuf,

    /// Priority rankings (JSON), required by the precomputed strategy
    #[arg(short = 'r', long)]
    ranking: Option<PathBuf>,

    /// Location of the requesting server
    #[arg(short = 'l', long)]
    location: String,

    /// Free bytes on the requesting server
    #[arg(short = 'b', long)]
    space: u64,

    /// Number of consecutive requests to simulate
    #[arg(short = 'n', long, default_value = "1")]
    rounds: usize,
}

/// Log filter from `RUST_LOG` directives, INFO when unset or unparsable
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AllocatorConfig::load(path)
            .with_context(|| format!("loading config {:?}", path))?,
        None => AllocatorConfig::default(),
    };
    info!("Strategy: {:?}", config.strategy);

    let mut builder = RegistryBuilder::new()
        .config(config.clone())
        .without_background_refresh();
    if config.strategy == Strategy::Precomputed {
        let Some(ranking) = &args.ranking else {
            bail!("--ranking is required for the precomputed strategy");
        };
        builder = builder.ranking_source(Arc::new(JsonFileRankingSource::new(ranking)));
    }
    let registry = builder.build()?;

    let state = JsonNetworkState::load(&args.state)
        .with_context(|| format!("loading network state {:?}", args.state))?;
    let report = load_network_state(&state, &registry)?;
    info!(
        "Loaded {} entries at {} locations",
        report.entries, report.locations
    );

    let published = registry.recompute_all()?;
    if published > 0 {
        info!("Precomputed {} locations", published);
    }

    for round in 0..args.rounds {
        let ids = registry.allocate_space(&args.location, args.space)?;
        let line = serde_json::json!({
            "round": round,
            "location": args.location,
            "space": args.space,
            "content": ids,
        });
        println!("{}", line);
    }

    Ok(())
}
