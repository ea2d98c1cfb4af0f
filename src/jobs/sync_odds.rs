//! Odds job: rotate odds sources, match rows to upcoming events at the
//! strict threshold, upsert 1X2 outcomes with movement tracking.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::odds_sources;
use crate::config::Config;
use crate::health::SourceHealthTracker;
use crate::matching::{match_events, EventToMatch, MatchOptions};
use crate::orchestrator::OddsOrchestrator;
use crate::proxy::ProxyManager;
use crate::run_tracker::{ItemOutcome, RunTracker};
use crate::scrapers::page::PageFactory;
use crate::scrapers::{NormalizedOdds, ScrapedEvent};
use crate::store::models::JobType;
use crate::store::Database;

pub async fn run(
    config: &Config,
    db: &Database,
    page_factory: Option<&dyn PageFactory>,
) -> Result<()> {
    let mut tracker = RunTracker::start(
        db.clone(),
        JobType::SyncOdds,
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

    let upcoming = db.list_upcoming_events(config.odds_window_hours)?;
    if upcoming.is_empty() {
        info!("No upcoming events within {}h", config.odds_window_hours);
        return Ok(());
    }

    for sport in db.list_active_sports()? {
        let events: Vec<EventToMatch> = upcoming
            .iter()
            .filter(|ev| ev.sport_id == sport.id)
            .map(|ev| EventToMatch {
                event_id: ev.id,
                home_team: ev.home_team_name.clone(),
                away_team: ev.away_team_name.clone(),
                start_time: ev.start_time,
            })
            .collect();
        if events.is_empty() {
            continue;
        }

        let mut orchestrator = OddsOrchestrator::new(odds_sources());
        let outcome = orchestrator
            .run(&sport.slug, &mut health, &mut proxies, page_factory)
            .await;
        tracker.record_health_alerts(&outcome.alerts)?;
        info!(
            "{}: {} odds row(s) from {} attempt(s)",
            sport.slug,
            outcome.odds.len(),
            outcome.attempts.len()
        );

        apply_odds(db, tracker, &sport.slug, &outcome.odds, &events)?;
    }
    Ok(())
}

/// Match odds rows to events and write outcomes. Rows run through the
/// shared matcher at [`MatchOptions::odds`] in source-visit order; each
/// db event is claimed at most once per tick, so the first source to
/// reach an event wins.
pub(crate) fn apply_odds(
    db: &Database,
    tracker: &mut RunTracker,
    sport_slug: &str,
    odds_rows: &[NormalizedOdds],
    events: &[EventToMatch],
) -> Result<()> {
    let scraped: Vec<ScrapedEvent> = odds_rows.iter().map(as_scraped).collect();
    let results = match_events(&scraped, events, &MatchOptions::odds());

    let mut matched = vec![false; odds_rows.len()];
    for result in &results {
        matched[result.scraped_index] = true;
        let row = &odds_rows[result.scraped_index];
        debug!(
            "Odds '{} vs {}' -> event {} (confidence {:.2}, {})",
            row.home_team,
            row.away_team,
            result.event_id,
            result.overall_confidence,
            row.source
        );
        match write_odds(db, result.event_id, row) {
            Ok(()) => tracker.record(sport_slug, ItemOutcome::Updated),
            Err(e) => {
                warn!("Odds write failed for event {}: {:#}", result.event_id, e);
                tracker.record(sport_slug, ItemOutcome::Failed);
            }
        }
    }

    for (row, row_matched) in odds_rows.iter().zip(&matched) {
        if !row_matched {
            debug!(
                "No event matched odds row '{} vs {}' ({})",
                row.home_team, row.away_team, row.source
            );
            tracker.record(sport_slug, ItemOutcome::Skipped);
        }
    }
    Ok(())
}

/// Odds rows carry no scores or kick-off time; only the team names
/// matter for pairing.
fn as_scraped(row: &NormalizedOdds) -> ScrapedEvent {
    ScrapedEvent {
        home_team: row.home_team.clone(),
        away_team: row.away_team.clone(),
        home_score: None,
        away_score: None,
        period: None,
        minute: None,
        is_finished: false,
        start_time: None,
        competition_name: row.competition.clone(),
        source_id: None,
        source_name: row.source.clone(),
    }
}

fn write_odds(db: &Database, event_id: i64, row: &NormalizedOdds) -> Result<()> {
    let market_id = db
        .main_market_id(event_id)?
        .with_context(|| format!("event {} has no main market", event_id))?;
    if let Some(odds) = row.home_win {
        db.update_outcome_odds(market_id, "1", odds)?;
    }
    if let Some(odds) = row.draw {
        db.update_outcome_odds(market_id, "X", odds)?;
    }
    if let Some(odds) = row.away_win {
        db.update_outcome_odds(market_id, "2", odds)?;
    }
    Ok(())
}
