//! Live-scores job: load live events, rotate sources, write merged
//! scores, enqueue settlement for finished matches.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::live_sources;
use crate::config::Config;
use crate::health::SourceHealthTracker;
use crate::matching::EventToMatch;
use crate::orchestrator::LiveScoresOrchestrator;
use crate::proxy::ProxyManager;
use crate::queue::{FinalResult, SettlementQueue};
use crate::ratelimit::{RateLimiter, DEFAULT_MAX_PER_MINUTE};
use crate::run_tracker::{ItemOutcome, RunTracker};
use crate::scrapers::page::PageFactory;
use crate::scrapers::LiveScore;
use crate::store::models::{EventStatus, JobType};
use crate::store::Database;

pub async fn run(
    config: &Config,
    db: &Database,
    queue: &dyn SettlementQueue,
    page_factory: Option<&dyn PageFactory>,
) -> Result<()> {
    let mut tracker = RunTracker::start(
        db.clone(),
        JobType::SyncLiveScores,
        None,
        config.request_id.as_deref(),
    )?;
    match execute(config, db, queue, page_factory, &mut tracker).await {
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
    queue: &dyn SettlementQueue,
    page_factory: Option<&dyn PageFactory>,
    tracker: &mut RunTracker,
) -> Result<()> {
    let mut health = SourceHealthTracker::new();
    let mut proxies = ProxyManager::from_config(config);
    let limiter = Arc::new(RateLimiter::per_minute(DEFAULT_MAX_PER_MINUTE));

    let live_events = db.list_live_events()?;
    if live_events.is_empty() {
        info!("No live events to refresh");
        return Ok(());
    }
    info!("Refreshing scores for {} live event(s)", live_events.len());

    for sport in db.list_active_sports()? {
        let events: Vec<EventToMatch> = live_events
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

        let mut orchestrator = LiveScoresOrchestrator::new(live_sources(&limiter, &sport.slug));
        let outcome = orchestrator
            .run(&events, &mut health, &mut proxies, page_factory)
            .await;
        tracker.record_health_alerts(&outcome.alerts)?;
        info!(
            "{}: {:.0}% coverage from {} attempt(s)",
            sport.slug,
            outcome.coverage * 100.0,
            outcome.attempts.len()
        );

        apply_scores(db, queue, tracker, &sport.slug, &outcome.scores).await?;
    }
    Ok(())
}

/// Write merged scores and drive the finished transition. Exactly one
/// settlement message per event: only the tick that performs the
/// live -> finished edge enqueues.
pub(crate) async fn apply_scores(
    db: &Database,
    queue: &dyn SettlementQueue,
    tracker: &mut RunTracker,
    sport_slug: &str,
    scores: &HashMap<i64, LiveScore>,
) -> Result<()> {
    for (&event_id, score) in scores {
        let written = match db.update_live_score(
            event_id,
            score.home_score,
            score.away_score,
            score.period.as_deref(),
            score.minute,
        ) {
            Ok(w) => w,
            Err(e) => {
                warn!("Score write failed for event {}: {:#}", event_id, e);
                tracker.record(sport_slug, ItemOutcome::Failed);
                continue;
            }
        };
        if !written {
            tracker.record(sport_slug, ItemOutcome::Skipped);
            continue;
        }
        tracker.record(sport_slug, ItemOutcome::Updated);

        if score.is_finished {
            let transitioned = db.update_event_status(event_id, EventStatus::Finished)?;
            if transitioned {
                info!(
                    "Event {} finished {}-{}",
                    event_id, score.home_score, score.away_score
                );
                if let Err(e) = queue
                    .send_event_finished(
                        event_id,
                        &FinalResult {
                            home_score: score.home_score,
                            away_score: score.away_score,
                        },
                    )
                    .await
                {
                    // The transition already happened; settlement delivery
                    // failures surface as alerts, not re-sends.
                    warn!("Settlement enqueue failed for event {}: {:#}", event_id, e);
                    tracker.record(sport_slug, ItemOutcome::Failed);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::RecordingSettlementQueue;
    use crate::store::models::Source;
    use crate::store::NewEvent;
    use chrono::Utc;

    fn seed_live_event(db: &Database, home: &str, away: &str) -> i64 {
        let sport_id = db.upsert_sport("football", "Football").unwrap();
        let comp_id = db.find_or_create_competition(sport_id, "Premier League").unwrap();
        let home_id = db.insert_team(home).unwrap();
        let away_id = db.insert_team(away).unwrap();
        let event_id = db
            .insert_event(&NewEvent {
                sport_id,
                competition_id: comp_id,
                competition_name: "Premier League".into(),
                home_team_id: home_id,
                away_team_id: away_id,
                home_team_name: home.into(),
                away_team_name: away.into(),
                start_time: Utc::now(),
                source: Source::Flashscore,
                external_id: format!("{home}-{away}"),
            })
            .unwrap();
        db.update_event_status(event_id, EventStatus::Live).unwrap();
        event_id
    }

    fn score(h: i32, a: i32, finished: bool) -> LiveScore {
        LiveScore {
            home_score: h,
            away_score: a,
            period: None,
            minute: Some(90),
            is_finished: finished,
        }
    }

    #[tokio::test]
    async fn test_live_score_update_writes_scores() {
        let db = Database::open_in_memory().unwrap();
        let event_id = seed_live_event(&db, "Arsenal", "Chelsea");
        let queue = RecordingSettlementQueue::new();
        let mut tracker =
            RunTracker::start(db.clone(), JobType::SyncLiveScores, None, None).unwrap();

        let scores = HashMap::from([(event_id, score(1, 0, false))]);
        apply_scores(&db, &queue, &mut tracker, "football", &scores)
            .await
            .unwrap();

        let ev = db.get_event(event_id).unwrap().unwrap();
        assert_eq!(ev.home_score, Some(1));
        assert_eq!(ev.status, EventStatus::Live);
        assert!(queue.messages().is_empty());
    }

    #[tokio::test]
    async fn test_finished_match_enqueues_settlement_exactly_once() {
        let db = Database::open_in_memory().unwrap();
        let event_id = seed_live_event(&db, "Arsenal", "Chelsea");
        let queue = RecordingSettlementQueue::new();
        let mut tracker =
            RunTracker::start(db.clone(), JobType::SyncLiveScores, None, None).unwrap();

        let scores = HashMap::from([(event_id, score(2, 1, true))]);
        apply_scores(&db, &queue, &mut tracker, "football", &scores)
            .await
            .unwrap();

        assert_eq!(
            db.get_event(event_id).unwrap().unwrap().status,
            EventStatus::Finished
        );
        assert_eq!(
            queue.messages(),
            vec![(
                event_id,
                FinalResult {
                    home_score: 2,
                    away_score: 1
                }
            )]
        );

        // A second tick with the same data must not enqueue again: the
        // live -> finished edge has already been consumed.
        apply_scores(&db, &queue, &mut tracker, "football", &scores)
            .await
            .unwrap();
        assert_eq!(queue.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_scheduled_event_is_not_scored() {
        let db = Database::open_in_memory().unwrap();
        let sport_id = db.upsert_sport("football", "Football").unwrap();
        let comp_id = db.find_or_create_competition(sport_id, "PL").unwrap();
        let home_id = db.insert_team("Lyon").unwrap();
        let away_id = db.insert_team("Nice").unwrap();
        let event_id = db
            .insert_event(&NewEvent {
                sport_id,
                competition_id: comp_id,
                competition_name: "PL".into(),
                home_team_id: home_id,
                away_team_id: away_id,
                home_team_name: "Lyon".into(),
                away_team_name: "Nice".into(),
                start_time: Utc::now(),
                source: Source::Sofascore,
                external_id: "ln-1".into(),
            })
            .unwrap();

        let queue = RecordingSettlementQueue::new();
        let mut tracker =
            RunTracker::start(db.clone(), JobType::SyncLiveScores, None, None).unwrap();
        let scores = HashMap::from([(event_id, score(1, 0, false))]);
        apply_scores(&db, &queue, &mut tracker, "football", &scores)
            .await
            .unwrap();

        let ev = db.get_event(event_id).unwrap().unwrap();
        assert_eq!(ev.home_score, None, "scheduled events must not take scores");
    }
}
