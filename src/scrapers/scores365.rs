//! 365Scores JSON API adapter (live scores).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{
    jitter_delay, match_batch, with_backoff, HttpFetcher, LiveScoresScraper, ScrapeBatch,
    ScrapedEvent,
};
use crate::error::ScrapeError;
use crate::matching::{EventToMatch, MatchOptions};
use crate::store::models::Source;

const DEFAULT_BASE_URL: &str = "https://webws.365scores.com/web/games/current";

/// 365Scores keys sports numerically.
fn sport_type_id(sport: &str) -> u32 {
    match sport {
        "basketball" => 2,
        "tennis" => 3,
        _ => 1,
    }
}

pub struct Scores365Scraper {
    fetcher: HttpFetcher,
    sport: String,
    base_url: String,
}

impl Scores365Scraper {
    pub fn new(fetcher: HttpFetcher, sport: &str, base_url: Option<&str>) -> Self {
        Scores365Scraper {
            fetcher,
            sport: sport.to_string(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
        }
    }
}

// ── Response shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GamesResponse {
    games: Option<Vec<Game>>,
}

#[derive(Debug, Deserialize)]
struct Game {
    id: Option<i64>,
    #[serde(rename = "homeCompetitor")]
    home_competitor: Option<Competitor>,
    #[serde(rename = "awayCompetitor")]
    away_competitor: Option<Competitor>,
    #[serde(rename = "statusText")]
    status_text: Option<String>,
    #[serde(rename = "gameTime")]
    game_time: Option<f64>,
    #[serde(rename = "competitionDisplayName")]
    competition: Option<String>,
    #[serde(rename = "startTime")]
    start_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Competitor {
    name: Option<String>,
    /// -1 while the match has not started.
    score: Option<f64>,
}

fn map_game(game: &Game) -> Option<ScrapedEvent> {
    let home = game.home_competitor.as_ref()?;
    let away = game.away_competitor.as_ref()?;
    let home_team = home.name.clone()?;
    let away_team = away.name.clone()?;

    let status = game.status_text.clone().unwrap_or_default();
    let is_finished = matches!(status.as_str(), "Ended" | "Final" | "FT" | "After Penalties");

    Some(ScrapedEvent {
        home_team,
        away_team,
        home_score: score_of(home),
        away_score: score_of(away),
        period: if status.is_empty() { None } else { Some(status) },
        minute: game.game_time.filter(|m| *m >= 0.0).map(|m| m as i32),
        is_finished,
        start_time: game
            .start_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc)),
        competition_name: game.competition.clone(),
        source_id: game.id.map(|id| id.to_string()),
        source_name: Source::Scores365.as_str().to_string(),
    })
}

fn score_of(c: &Competitor) -> Option<i32> {
    c.score.filter(|s| *s >= 0.0).map(|s| s as i32)
}

#[async_trait]
impl LiveScoresScraper for Scores365Scraper {
    fn name(&self) -> &'static str {
        Source::Scores365.as_str()
    }

    async fn fetch_live_scores(
        &self,
        events: &[EventToMatch],
    ) -> Result<ScrapeBatch, ScrapeError> {
        let url = format!(
            "{}/?sports={}&onlyLiveGames=true",
            self.base_url,
            sport_type_id(&self.sport)
        );
        jitter_delay(50, 400).await;
        let resp: GamesResponse = with_backoff(|| self.fetcher.get_json(&url)).await?;

        let scraped: Vec<ScrapedEvent> = resp
            .games
            .unwrap_or_default()
            .iter()
            .filter_map(map_game)
            .collect();
        Ok(match_batch(scraped, events, &MatchOptions::live()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAMES_SAMPLE: &str = r#"{
        "games": [
            {
                "id": 4139206,
                "homeCompetitor": {"name": "Arsenal", "score": 2},
                "awayCompetitor": {"name": "Chelsea", "score": 1},
                "statusText": "78",
                "gameTime": 78.0,
                "competitionDisplayName": "Premier League",
                "startTime": "2024-11-30T15:00:00Z"
            },
            {
                "id": 4139207,
                "homeCompetitor": {"name": "Lyon", "score": -1},
                "awayCompetitor": {"name": "Nice", "score": -1},
                "statusText": "",
                "gameTime": -1.0
            },
            {
                "id": 4139208,
                "homeCompetitor": {"name": "Real Madrid", "score": 3},
                "awayCompetitor": {"name": "Sevilla", "score": 0},
                "statusText": "Ended"
            }
        ]
    }"#;

    #[test]
    fn test_map_games_handles_sentinel_scores() {
        let resp: GamesResponse = serde_json::from_str(GAMES_SAMPLE).unwrap();
        let scraped: Vec<ScrapedEvent> = resp
            .games
            .unwrap()
            .iter()
            .filter_map(map_game)
            .collect();

        assert_eq!(scraped.len(), 3);
        assert_eq!(scraped[0].home_score, Some(2));
        assert_eq!(scraped[0].minute, Some(78));
        assert!(!scraped[0].is_finished);

        // -1 means "no score yet", not zero
        assert_eq!(scraped[1].home_score, None);
        assert_eq!(scraped[1].minute, None);

        assert!(scraped[2].is_finished);
    }

    #[test]
    fn test_sport_type_ids() {
        assert_eq!(sport_type_id("football"), 1);
        assert_eq!(sport_type_id("basketball"), 2);
        assert_eq!(sport_type_id("tennis"), 3);
    }
}
