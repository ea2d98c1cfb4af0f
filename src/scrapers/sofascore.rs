//! SofaScore JSON API adapter (live scores + scheduled fixtures).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::{
    jitter_delay, match_batch, with_backoff, FixturesScraper, HttpFetcher, LiveScoresScraper,
    ScrapeBatch, ScrapedEvent,
};
use crate::error::ScrapeError;
use crate::matching::{EventToMatch, MatchOptions, ScrapedFixture};
use crate::store::models::Source;

const DEFAULT_BASE_URL: &str = "https://api.sofascore.com/api/v1";

pub struct SofascoreScraper {
    fetcher: HttpFetcher,
    sport: String,
    base_url: String,
}

impl SofascoreScraper {
    pub fn new(fetcher: HttpFetcher, sport: &str, base_url: Option<&str>) -> Self {
        SofascoreScraper {
            fetcher,
            sport: sport.to_string(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
        }
    }
}

// ── Response shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EventsResponse {
    events: Option<Vec<SofaEvent>>,
}

#[derive(Debug, Deserialize)]
struct SofaEvent {
    id: Option<i64>,
    tournament: Option<SofaTournament>,
    status: Option<SofaStatus>,
    #[serde(rename = "homeTeam")]
    home_team: Option<SofaTeam>,
    #[serde(rename = "awayTeam")]
    away_team: Option<SofaTeam>,
    #[serde(rename = "homeScore")]
    home_score: Option<SofaScore>,
    #[serde(rename = "awayScore")]
    away_score: Option<SofaScore>,
    #[serde(rename = "startTimestamp")]
    start_timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SofaTournament {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SofaStatus {
    #[serde(rename = "type")]
    kind: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SofaTeam {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SofaScore {
    current: Option<i32>,
}

/// Map one SofaScore event into the common shape; rows missing a team
/// name are skipped.
fn map_event(ev: &SofaEvent) -> Option<ScrapedEvent> {
    let home_team = ev.home_team.as_ref()?.name.clone()?;
    let away_team = ev.away_team.as_ref()?.name.clone()?;
    let kind = ev
        .status
        .as_ref()
        .and_then(|s| s.kind.as_deref())
        .unwrap_or("notstarted");

    Some(ScrapedEvent {
        home_team,
        away_team,
        home_score: ev.home_score.as_ref().and_then(|s| s.current),
        away_score: ev.away_score.as_ref().and_then(|s| s.current),
        period: ev
            .status
            .as_ref()
            .and_then(|s| s.description.clone()),
        minute: None,
        is_finished: kind == "finished",
        start_time: ev
            .start_timestamp
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        competition_name: ev.tournament.as_ref().and_then(|t| t.name.clone()),
        source_id: ev.id.map(|id| id.to_string()),
        source_name: Source::Sofascore.as_str().to_string(),
    })
}

#[async_trait]
impl LiveScoresScraper for SofascoreScraper {
    fn name(&self) -> &'static str {
        Source::Sofascore.as_str()
    }

    async fn fetch_live_scores(
        &self,
        events: &[EventToMatch],
    ) -> Result<ScrapeBatch, ScrapeError> {
        let url = format!("{}/sport/{}/events/live", self.base_url, self.sport);
        jitter_delay(50, 400).await;
        let resp: EventsResponse = with_backoff(|| self.fetcher.get_json(&url)).await?;

        let scraped: Vec<ScrapedEvent> = resp
            .events
            .unwrap_or_default()
            .iter()
            .filter_map(map_event)
            .collect();
        Ok(match_batch(scraped, events, &MatchOptions::live()))
    }
}

#[async_trait]
impl FixturesScraper for SofascoreScraper {
    fn name(&self) -> &'static str {
        Source::Sofascore.as_str()
    }

    async fn fetch_fixtures(
        &self,
        sport: &str,
        days: u32,
    ) -> Result<Vec<ScrapedFixture>, ScrapeError> {
        let mut fixtures = Vec::new();
        for day in 0..days {
            let date = (Utc::now() + Duration::days(day as i64)).format("%Y-%m-%d");
            let url = format!("{}/sport/{}/scheduled-events/{}", self.base_url, sport, date);
            jitter_delay(200, 900).await;
            let resp: EventsResponse = with_backoff(|| self.fetcher.get_json(&url)).await?;

            for ev in resp.events.unwrap_or_default() {
                let Some(mapped) = map_event(&ev) else { continue };
                let (Some(external_id), Some(start_time)) = (mapped.source_id, mapped.start_time)
                else {
                    continue;
                };
                fixtures.push(ScrapedFixture {
                    source: Source::Sofascore,
                    external_id,
                    home_team: mapped.home_team,
                    away_team: mapped.away_team,
                    start_time,
                    competition_name: mapped.competition_name,
                });
            }
        }
        Ok(fixtures)
    }
}
