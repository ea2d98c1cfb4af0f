//! FotMob JSON API adapter (live scores, football only).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{
    extract_scoreline, jitter_delay, match_batch, with_backoff, HttpFetcher, LiveScoresScraper,
    ScrapeBatch, ScrapedEvent,
};
use crate::error::ScrapeError;
use crate::matching::{EventToMatch, MatchOptions};
use crate::store::models::Source;

const DEFAULT_BASE_URL: &str = "https://www.fotmob.com/api";

pub struct FotmobScraper {
    fetcher: HttpFetcher,
    base_url: String,
}

impl FotmobScraper {
    pub fn new(fetcher: HttpFetcher, base_url: Option<&str>) -> Self {
        FotmobScraper {
            fetcher,
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
        }
    }
}

// ── Response shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MatchesResponse {
    leagues: Option<Vec<League>>,
}

#[derive(Debug, Deserialize)]
struct League {
    name: Option<String>,
    matches: Option<Vec<Match>>,
}

#[derive(Debug, Deserialize)]
struct Match {
    id: Option<i64>,
    home: Option<Side>,
    away: Option<Side>,
    status: Option<MatchStatus>,
}

#[derive(Debug, Deserialize)]
struct Side {
    name: Option<String>,
    score: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct MatchStatus {
    started: Option<bool>,
    finished: Option<bool>,
    #[serde(rename = "scoreStr")]
    score_str: Option<String>,
    #[serde(rename = "utcTime")]
    utc_time: Option<String>,
    #[serde(rename = "liveTime")]
    live_time: Option<LiveTime>,
}

#[derive(Debug, Deserialize)]
struct LiveTime {
    short: Option<String>,
}

fn map_match(league: Option<&str>, m: &Match) -> Option<ScrapedEvent> {
    let home = m.home.as_ref()?;
    let away = m.away.as_ref()?;
    let home_team = home.name.clone()?;
    let away_team = away.name.clone()?;
    let status = m.status.as_ref();

    // Scores live on the sides; the "2 - 1" scoreStr is the fallback when
    // they are absent.
    let (mut home_score, mut away_score) = (home.score, away.score);
    if home_score.is_none() || away_score.is_none() {
        if let Some((h, a)) = status
            .and_then(|s| s.score_str.as_deref())
            .and_then(extract_scoreline)
        {
            home_score = Some(h);
            away_score = Some(a);
        }
    }

    let live_short = status
        .and_then(|s| s.live_time.as_ref())
        .and_then(|t| t.short.clone());
    let minute = live_short
        .as_deref()
        .map(|s| s.trim_end_matches(['\u{2019}', '\'']))
        .and_then(|s| s.parse().ok());

    Some(ScrapedEvent {
        home_team,
        away_team,
        home_score,
        away_score,
        period: live_short,
        minute,
        is_finished: status.and_then(|s| s.finished).unwrap_or(false),
        start_time: status
            .and_then(|s| s.utc_time.as_deref())
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|d| d.with_timezone(&Utc)),
        competition_name: league.map(|s| s.to_string()),
        source_id: m.id.map(|id| id.to_string()),
        source_name: Source::Fotmob.as_str().to_string(),
    })
}

fn started(m: &Match) -> bool {
    m.status
        .as_ref()
        .and_then(|s| s.started)
        .unwrap_or(false)
}

#[async_trait]
impl LiveScoresScraper for FotmobScraper {
    fn name(&self) -> &'static str {
        Source::Fotmob.as_str()
    }

    async fn fetch_live_scores(
        &self,
        events: &[EventToMatch],
    ) -> Result<ScrapeBatch, ScrapeError> {
        let date = Utc::now().format("%Y%m%d");
        let url = format!("{}/matches?date={}", self.base_url, date);
        jitter_delay(50, 400).await;
        let resp: MatchesResponse = with_backoff(|| self.fetcher.get_json(&url)).await?;

        let mut scraped = Vec::new();
        for league in resp.leagues.unwrap_or_default() {
            let league_name = league.name.clone();
            for m in league.matches.unwrap_or_default() {
                if !started(&m) {
                    continue;
                }
                if let Some(ev) = map_match(league_name.as_deref(), &m) {
                    scraped.push(ev);
                }
            }
        }
        Ok(match_batch(scraped, events, &MatchOptions::live()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATCHES_SAMPLE: &str = r#"{
        "leagues": [
            {
                "name": "Premier League",
                "matches": [
                    {
                        "id": 4621234,
                        "home": {"name": "Arsenal", "score": 2},
                        "away": {"name": "Chelsea", "score": 1},
                        "status": {
                            "started": true,
                            "finished": false,
                            "scoreStr": "2 - 1",
                            "utcTime": "2024-11-30T15:00:00Z",
                            "liveTime": {"short": "78'"}
                        }
                    },
                    {
                        "id": 4621235,
                        "home": {"name": "Lyon"},
                        "away": {"name": "Nice"},
                        "status": {"started": true, "finished": true, "scoreStr": "0 - 3"}
                    },
                    {
                        "id": 4621236,
                        "home": {"name": "Real Madrid"},
                        "away": {"name": "Sevilla"},
                        "status": {"started": false}
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_map_match_with_side_scores() {
        let resp: MatchesResponse = serde_json::from_str(MATCHES_SAMPLE).unwrap();
        let league = &resp.leagues.unwrap()[0];
        let ev = map_match(league.name.as_deref(), &league.matches.as_ref().unwrap()[0]).unwrap();
        assert_eq!(ev.home_team, "Arsenal");
        assert_eq!(ev.home_score, Some(2));
        assert_eq!(ev.minute, Some(78));
        assert_eq!(ev.competition_name.as_deref(), Some("Premier League"));
        assert!(!ev.is_finished);
    }

    #[test]
    fn test_map_match_falls_back_to_score_str() {
        let resp: MatchesResponse = serde_json::from_str(MATCHES_SAMPLE).unwrap();
        let league = &resp.leagues.unwrap()[0];
        let ev = map_match(None, &league.matches.as_ref().unwrap()[1]).unwrap();
        assert_eq!(ev.home_score, Some(0));
        assert_eq!(ev.away_score, Some(3));
        assert!(ev.is_finished);
    }

    #[test]
    fn test_not_started_matches_are_filtered() {
        let resp: MatchesResponse = serde_json::from_str(MATCHES_SAMPLE).unwrap();
        let league = &resp.leagues.unwrap()[0];
        let matches = league.matches.as_ref().unwrap();
        assert!(started(&matches[0]));
        assert!(!started(&matches[2]));
    }
}
