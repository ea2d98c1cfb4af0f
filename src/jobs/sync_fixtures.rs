//! Fixtures job: harvest upcoming matches per sport, deduplicate across
//! sources into canonical events, alert on thin harvests.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use super::fixture_sources;
use crate::config::Config;
use crate::health::SourceHealthTracker;
use crate::matching::dedup::find_or_create_event;
use crate::matching::{ScrapedFixture, TeamResolver};
use crate::orchestrator::FixturesOrchestrator;
use crate::proxy::ProxyManager;
use crate::ratelimit::{RateLimiter, DEFAULT_MAX_PER_MINUTE};
use crate::run_tracker::{ItemOutcome, RunTracker};
use crate::scrapers::page::PageFactory;
use crate::store::models::{JobType, Sport};
use crate::store::Database;

/// Expected per-sport fixture floor over the harvest window; harvests
/// below it raise the low-count alert.
pub(crate) fn fixture_floor(sport_slug: &str) -> usize {
    match sport_slug {
        "football" => 20,
        "basketball" => 10,
        "tennis" => 3,
        _ => 5,
    }
}

pub async fn run(
    config: &Config,
    db: &Database,
    page_factory: Option<&dyn PageFactory>,
) -> Result<()> {
    let mut tracker = RunTracker::start(
        db.clone(),
        JobType::SyncFixtures,
        None,
        config.request_id.as_deref(),
    )?;
    match execute(config, db, page_factory, &mut tracker).await {
        Ok(()) => {
            tracker.complete()?;
            Ok(())
        }
        Err(err) => {
            tracker.fail(&err)?;
            Err(err)
        }
    }
}

async fn execute(
    config: &Config,
    db: &Database,
    page_factory: Option<&dyn PageFactory>,
    tracker: &mut RunTracker,
) -> Result<()> {
    let mut health = SourceHealthTracker::new();
    let mut proxies = ProxyManager::from_config(config);
    let limiter = Arc::new(RateLimiter::per_minute(DEFAULT_MAX_PER_MINUTE));

    for sport in db.list_active_sports()? {
        let minimum = fixture_floor(&sport.slug);
        let mut orchestrator = FixturesOrchestrator::new(fixture_sources(&limiter, &sport.slug));
        let outcome = orchestrator
            .run(
                &sport.slug,
                config.fixture_days,
                minimum,
                &mut health,
                &mut proxies,
                page_factory,
            )
            .await;
        tracker.record_health_alerts(&outcome.alerts)?;

        let ingested = ingest_fixtures(db, tracker, &sport, &outcome.fixtures)?;
        info!(
            "{}: {} fixture(s) harvested, {} ingested",
            sport.slug,
            outcome.fixtures.len(),
            ingested
        );
        tracker.check_fixture_floor(&sport.slug, ingested, minimum)?;
    }
    Ok(())
}

/// Run every scraped fixture through the deduplicator. Returns how many
/// rows resolved to an event (new or existing).
pub(crate) fn ingest_fixtures(
    db: &Database,
    tracker: &mut RunTracker,
    sport: &Sport,
    fixtures: &[ScrapedFixture],
) -> Result<usize> {
    let mut resolver = TeamResolver::new(db.clone());
    let mut ingested = 0usize;

    for fixture in fixtures {
        match find_or_create_event(db, &mut resolver, fixture, sport) {
            Ok(outcome) => {
                ingested += 1;
                let item = if outcome.is_new {
                    ItemOutcome::Created
                } else {
                    ItemOutcome::Updated
                };
                tracker.record(&sport.slug, item);
            }
            Err(e) => {
                warn!(
                    "Fixture '{} vs {}' ({}) failed: {:#}",
                    fixture.home_team, fixture.away_team, fixture.source, e
                );
                tracker.record(&sport.slug, ItemOutcome::Failed);
            }
        }
    }
    Ok(ingested)
}
