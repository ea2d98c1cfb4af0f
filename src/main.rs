use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

mod config;
mod error;
mod health;
mod jobs;
mod matching;
mod orchestrator;
mod proxy;
mod queue;
mod ratelimit;
mod run_tracker;
mod scrapers;
mod store;

use config::Config;
use queue::{HttpSettlementQueue, NoopSettlementQueue, SettlementQueue};
use scrapers::page::PageFactory;
use store::Database;

/// Multi-source sports data aggregation pipeline
#[derive(Parser, Debug)]
#[command(name = "matchfeed", version, about)]
struct Cli {
    #[command(subcommand)]
    job: Job,

    #[command(flatten)]
    config: Config,
}

/// One scheduled invocation per subcommand; each loads state from the
/// store, performs its network work, writes results and exits.
#[derive(Subcommand, Debug)]
enum Job {
    /// Harvest upcoming fixtures (runs every ~2h)
    SyncFixtures,
    /// Refresh betting odds on upcoming events (every ~5m)
    SyncOdds,
    /// Pull live scores and settle finished matches (every ~1m)
    SyncLiveScores,
    /// Flip scheduled events whose start time has passed to live (every ~1m)
    TransitionEvents,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialise tracing / logging: RUST_LOG wins, then LOG_LEVEL, then info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = cli.config.log_level.as_deref().unwrap_or("info");
        tracing_subscriber::EnvFilter::new(level.to_lowercase())
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    cli.config.validate()?;

    let db = Database::open(&cli.config.database_path)?;
    info!("Database opened: {}", cli.config.database_path);
    seed_sports(&db)?;

    let queue: Box<dyn SettlementQueue> = match &cli.config.settlement_queue_url {
        Some(url) => Box::new(HttpSettlementQueue::new(url)?),
        None => Box::new(NoopSettlementQueue),
    };

    // The headless browser driver is deployment wiring; without one the
    // orchestrators skip the DOM sources and run on the JSON APIs.
    let page_factory: Option<&dyn PageFactory> = None;

    match cli.job {
        Job::SyncFixtures => jobs::sync_fixtures::run(&cli.config, &db, page_factory).await,
        Job::SyncOdds => jobs::sync_odds::run(&cli.config, &db, page_factory).await,
        Job::SyncLiveScores => {
            jobs::sync_live_scores::run(&cli.config, &db, queue.as_ref(), page_factory).await
        }
        Job::TransitionEvents => jobs::transition_events::run(&cli.config, &db).await,
    }
}

/// Sports are immutable reference data; make sure the closed set exists.
fn seed_sports(db: &Database) -> Result<()> {
    for (slug, name) in [
        ("football", "Football"),
        ("basketball", "Basketball"),
        ("tennis", "Tennis"),
    ] {
        db.upsert_sport(slug, name)?;
    }
    Ok(())
}
