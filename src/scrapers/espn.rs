//! ESPN site API adapter (live scores).

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

const DEFAULT_BASE_URL: &str = "https://site.api.espn.com/apis/site/v2/sports";

/// ESPN paths are (sport, league); one adapter instance covers one league.
fn league_path(sport: &str) -> (&'static str, &'static str) {
    match sport {
        "basketball" => ("basketball", "nba"),
        "tennis" => ("tennis", "atp"),
        // Premier League is the default soccer board
        _ => ("soccer", "eng.1"),
    }
}

pub struct EspnScraper {
    fetcher: HttpFetcher,
    sport: String,
    base_url: String,
}

impl EspnScraper {
    pub fn new(fetcher: HttpFetcher, sport: &str, base_url: Option<&str>) -> Self {
        EspnScraper {
            fetcher,
            sport: sport.to_string(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
        }
    }
}

// ── Response shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Scoreboard {
    events: Option<Vec<EspnEvent>>,
}

#[derive(Debug, Deserialize)]
struct EspnEvent {
    id: Option<String>,
    date: Option<String>,
    competitions: Option<Vec<Competition>>,
}

#[derive(Debug, Deserialize)]
struct Competition {
    competitors: Option<Vec<Competitor>>,
    status: Option<EspnStatus>,
}

#[derive(Debug, Deserialize)]
struct Competitor {
    #[serde(rename = "homeAway")]
    home_away: Option<String>,
    score: Option<String>,
    team: Option<EspnTeam>,
}

#[derive(Debug, Deserialize)]
struct EspnTeam {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EspnStatus {
    period: Option<i32>,
    #[serde(rename = "displayClock")]
    display_clock: Option<String>,
    #[serde(rename = "type")]
    kind: Option<EspnStatusType>,
}

#[derive(Debug, Deserialize)]
struct EspnStatusType {
    /// "pre" | "in" | "post"
    state: Option<String>,
}

fn map_event(ev: &EspnEvent) -> Option<ScrapedEvent> {
    let competition = ev.competitions.as_ref()?.first()?;
    let competitors = competition.competitors.as_ref()?;

    let mut home: Option<&Competitor> = None;
    let mut away: Option<&Competitor> = None;
    for c in competitors {
        match c.home_away.as_deref() {
            Some("home") => home = Some(c),
            Some("away") => away = Some(c),
            _ => {}
        }
    }
    let home = home?;
    let away = away?;
    let home_team = home.team.as_ref()?.display_name.clone()?;
    let away_team = away.team.as_ref()?.display_name.clone()?;

    let state = competition
        .status
        .as_ref()
        .and_then(|s| s.kind.as_ref())
        .and_then(|k| k.state.as_deref())
        .unwrap_or("pre");

    let minute = competition
        .status
        .as_ref()
        .and_then(|s| s.display_clock.as_deref())
        .and_then(parse_clock_minute);

    Some(ScrapedEvent {
        home_team,
        away_team,
        home_score: home.score.as_deref().and_then(|s| s.parse().ok()),
        away_score: away.score.as_deref().and_then(|s| s.parse().ok()),
        period: competition
            .status
            .as_ref()
            .and_then(|s| s.period)
            .map(|p| p.to_string()),
        minute,
        is_finished: state == "post",
        start_time: ev
            .date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc)),
        competition_name: None,
        source_id: ev.id.clone(),
        source_name: Source::Espn.as_str().to_string(),
    })
}

/// "63'" or "63:12" -> 63
fn parse_clock_minute(clock: &str) -> Option<i32> {
    let digits: String = clock.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[async_trait]
impl LiveScoresScraper for EspnScraper {
    fn name(&self) -> &'static str {
        Source::Espn.as_str()
    }

    async fn fetch_live_scores(
        &self,
        events: &[EventToMatch],
    ) -> Result<ScrapeBatch, ScrapeError> {
        let (sport, league) = league_path(&self.sport);
        let url = format!("{}/{}/{}/scoreboard", self.base_url, sport, league);
        jitter_delay(50, 400).await;
        let resp: Scoreboard = with_backoff(|| self.fetcher.get_json(&url)).await?;

        let scraped: Vec<ScrapedEvent> = resp
            .events
            .unwrap_or_default()
            .iter()
            .filter_map(map_event)
            // Scoreboards list the whole day; only in-play and just-finished
            // rows carry usable scores.
            .filter(|ev| ev.home_score.is_some() && ev.away_score.is_some())
            .collect();
        Ok(match_batch(scraped, events, &MatchOptions::live()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCOREBOARD_SAMPLE: &str = r#"{
        "events": [
            {
                "id": "401547440",
                "date": "2024-11-30T15:00:00Z",
                "competitions": [
                    {
                        "competitors": [
                            {"homeAway": "home", "score": "2", "team": {"displayName": "Arsenal"}},
                            {"homeAway": "away", "score": "1", "team": {"displayName": "Chelsea"}}
                        ],
                        "status": {
                            "period": 2,
                            "displayClock": "63'",
                            "type": {"state": "in"}
                        }
                    }
                ]
            },
            {
                "id": "401547441",
                "competitions": [{"competitors": []}]
            }
        ]
    }"#;

    #[test]
    fn test_map_scoreboard_event() {
        let resp: Scoreboard = serde_json::from_str(SCOREBOARD_SAMPLE).unwrap();
        let scraped: Vec<ScrapedEvent> = resp
            .events
            .unwrap()
            .iter()
            .filter_map(map_event)
            .collect();

        assert_eq!(scraped.len(), 1);
        let ev = &scraped[0];
        assert_eq!(ev.home_team, "Arsenal");
        assert_eq!(ev.away_team, "Chelsea");
        assert_eq!(ev.home_score, Some(2));
        assert_eq!(ev.away_score, Some(1));
        assert_eq!(ev.minute, Some(63));
        assert_eq!(ev.period.as_deref(), Some("2"));
        assert!(!ev.is_finished);
        assert_eq!(ev.source_id.as_deref(), Some("401547440"));
    }

    #[test]
    fn test_post_state_marks_finished() {
        let raw = r#"{
            "id": "1",
            "competitions": [{
                "competitors": [
                    {"homeAway": "home", "score": "3", "team": {"displayName": "Lyon"}},
                    {"homeAway": "away", "score": "0", "team": {"displayName": "Nice"}}
                ],
                "status": {"type": {"state": "post"}}
            }]
        }"#;
        let ev: EspnEvent = serde_json::from_str(raw).unwrap();
        assert!(map_event(&ev).unwrap().is_finished);
    }

    #[test]
    fn test_parse_clock_minute() {
        assert_eq!(parse_clock_minute("63'"), Some(63));
        assert_eq!(parse_clock_minute("12:45"), Some(12));
        assert_eq!(parse_clock_minute("HT"), None);
    }

    #[test]
    fn test_league_paths() {
        assert_eq!(league_path("football"), ("soccer", "eng.1"));
        assert_eq!(league_path("basketball"), ("basketball", "nba"));
        assert_eq!(league_path("tennis"), ("tennis", "atp"));
    }
}
