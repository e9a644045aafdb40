//! Partner Recovery Drill
//!
//! This binary runs a ring of in-process ranks through a few checkpoint
//! rounds, discards one rank's records and rebuilds them from its partner.
//!
//! # Usage
//!
//! ```bash
//! # Four ranks, rank 1 fails
//! recovery-drill
//!
//! # Larger ring with a configuration file
//! recovery-drill --ranks 8 --victim 5 --config resilience.toml
//! ```

mod drill;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drill::DrillPlan;
use resilience_core::ResilienceConfig;

/// Partner Recovery Drill
#[derive(Parser, Debug)]
#[command(name = "recovery-drill")]
#[command(about = "Checkpoint on a rank ring, lose one rank and recover it from its partner")]
struct Args {
    /// Number of in-process ranks
    #[arg(short, long, default_value = "4")]
    ranks: usize,

    /// Members registered per rank
    #[arg(short, long, default_value = "3")]
    members: usize,

    /// Elements (8-byte doubles) per member
    #[arg(short, long, default_value = "1024")]
    elements: usize,

    /// Checkpoint rounds before the failure
    #[arg(long, default_value = "3")]
    rounds: usize,

    /// Rank whose state is discarded
    #[arg(long, default_value = "1")]
    victim: usize,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the config
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ResilienceConfig::from_file(path)?,
        None => ResilienceConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;

    // Initialize logging
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let plan = DrillPlan {
        ranks: args.ranks,
        members: args.members,
        elements: args.elements,
        rounds: args.rounds,
        victim: args.victim,
    };

    tracing::info!("Starting recovery drill");
    tracing::info!("  Ranks: {}", plan.ranks);
    tracing::info!("  Members per rank: {}", plan.members);
    tracing::info!("  Checkpoint rounds: {}", plan.rounds);
    tracing::info!("  History depth: {}", config.topology.depth);
    tracing::info!("  Rank separation: {}", config.topology.rank_separation);

    let report = drill::run(&plan, &config)?;

    tracing::info!(
        "Rank {} recovered from rank {}: {} members, {} versions, {} bytes verified",
        plan.victim,
        report.survivor,
        report.members_verified,
        report.versions_restored,
        report.bytes_restored
    );

    Ok(())
}
