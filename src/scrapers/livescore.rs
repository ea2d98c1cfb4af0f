//! LiveScore JSON API adapter (live scores).
//!
//! The feed nests events under stages and encodes most fields as strings,
//! including scores ("Tr1": "2") and start times as numeric
//! yyyyMMddHHmmss stamps in CET display time.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;

use super::{
    cet_to_utc, jitter_delay, match_batch, with_backoff, HttpFetcher, LiveScoresScraper,
    ScrapeBatch, ScrapedEvent,
};
use crate::error::ScrapeError;
use crate::matching::{EventToMatch, MatchOptions};
use crate::store::models::Source;

const DEFAULT_BASE_URL: &str = "https://prod-public-api.livescore.com/v1/api/app";

fn sport_path(sport: &str) -> &'static str {
    match sport {
        "basketball" => "basketball",
        "tennis" => "tennis",
        _ => "soccer",
    }
}

pub struct LiveScoreScraper {
    fetcher: HttpFetcher,
    sport: String,
    base_url: String,
}

impl LiveScoreScraper {
    pub fn new(fetcher: HttpFetcher, sport: &str, base_url: Option<&str>) -> Self {
        LiveScoreScraper {
            fetcher,
            sport: sport.to_string(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
        }
    }
}

// ── Response shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LiveResponse {
    #[serde(rename = "Stages")]
    stages: Option<Vec<Stage>>,
}

#[derive(Debug, Deserialize)]
struct Stage {
    /// Stage (competition) name.
    #[serde(rename = "Snm")]
    stage_name: Option<String>,
    #[serde(rename = "Events")]
    events: Option<Vec<LsEvent>>,
}

#[derive(Debug, Deserialize)]
struct LsEvent {
    #[serde(rename = "Eid")]
    event_id: Option<String>,
    #[serde(rename = "T1")]
    team1: Option<Vec<LsTeam>>,
    #[serde(rename = "T2")]
    team2: Option<Vec<LsTeam>>,
    /// Scores arrive as strings.
    #[serde(rename = "Tr1")]
    score1: Option<String>,
    #[serde(rename = "Tr2")]
    score2: Option<String>,
    /// Status text: "FT", "HT", "45'" or similar.
    #[serde(rename = "Eps")]
    status: Option<String>,
    /// Start as yyyyMMddHHmmss in display (CET) time.
    #[serde(rename = "Esd")]
    start: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LsTeam {
    #[serde(rename = "Nm")]
    name: Option<String>,
}

fn map_event(stage_name: Option<&str>, ev: &LsEvent) -> Option<ScrapedEvent> {
    let home_team = ev.team1.as_ref()?.first()?.name.clone()?;
    let away_team = ev.team2.as_ref()?.first()?.name.clone()?;

    let status = ev.status.clone().unwrap_or_default();
    let is_finished = matches!(status.as_str(), "FT" | "AET" | "AP");
    let minute = status
        .trim_end_matches(['\'', '+'])
        .parse::<i32>()
        .ok();

    Some(ScrapedEvent {
        home_team,
        away_team,
        home_score: ev.score1.as_deref().and_then(|s| s.parse().ok()),
        away_score: ev.score2.as_deref().and_then(|s| s.parse().ok()),
        period: if status.is_empty() { None } else { Some(status.clone()) },
        minute,
        is_finished,
        start_time: ev.start.and_then(parse_compact_stamp),
        competition_name: stage_name.map(|s| s.to_string()),
        source_id: ev.event_id.clone(),
        source_name: Source::LiveScore.as_str().to_string(),
    })
}

/// 20241130150000 -> 2024-11-30 15:00:00 CET -> UTC
fn parse_compact_stamp(stamp: i64) -> Option<chrono::DateTime<chrono::Utc>> {
    let s = stamp.to_string();
    if s.len() != 14 {
        return None;
    }
    NaiveDateTime::parse_from_str(&s, "%Y%m%d%H%M%S")
        .ok()
        .map(cet_to_utc)
}

#[async_trait]
impl LiveScoresScraper for LiveScoreScraper {
    fn name(&self) -> &'static str {
        Source::LiveScore.as_str()
    }

    async fn fetch_live_scores(
        &self,
        events: &[EventToMatch],
    ) -> Result<ScrapeBatch, ScrapeError> {
        let url = format!("{}/live/{}/0", self.base_url, sport_path(&self.sport));
        jitter_delay(50, 400).await;
        let resp: LiveResponse = with_backoff(|| self.fetcher.get_json(&url)).await?;

        let mut scraped = Vec::new();
        for stage in resp.stages.unwrap_or_default() {
            let stage_name = stage.stage_name.clone();
            for ev in stage.events.unwrap_or_default() {
                if let Some(mapped) = map_event(stage_name.as_deref(), &ev) {
                    scraped.push(mapped);
                }
            }
        }
        Ok(match_batch(scraped, events, &MatchOptions::live()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE_SAMPLE: &str = r#"{
        "Stages": [
            {
                "Snm": "Premier League",
                "Events": [
                    {
                        "Eid": "912345",
                        "T1": [{"Nm": "Arsenal"}],
                        "T2": [{"Nm": "Chelsea"}],
                        "Tr1": "2",
                        "Tr2": "1",
                        "Eps": "78'",
                        "Esd": 20241130150000
                    },
                    {
                        "Eid": "912346",
                        "T1": [{"Nm": "Lyon"}],
                        "T2": [{"Nm": "Nice"}],
                        "Tr1": "0",
                        "Tr2": "3",
                        "Eps": "FT"
                    },
                    {
                        "Eid": "912347",
                        "T1": [],
                        "T2": [{"Nm": "Orphan"}]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_map_stringly_typed_event() {
        let resp: LiveResponse = serde_json::from_str(LIVE_SAMPLE).unwrap();
        let stage = &resp.stages.unwrap()[0];
        let events = stage.events.as_ref().unwrap();

        let ev = map_event(stage.stage_name.as_deref(), &events[0]).unwrap();
        assert_eq!(ev.home_team, "Arsenal");
        assert_eq!(ev.home_score, Some(2));
        assert_eq!(ev.away_score, Some(1));
        assert_eq!(ev.minute, Some(78));
        assert!(!ev.is_finished);
        assert_eq!(ev.competition_name.as_deref(), Some("Premier League"));
        // 15:00 CET in November is 14:00 UTC
        assert_eq!(
            ev.start_time.unwrap().to_rfc3339(),
            "2024-11-30T14:00:00+00:00"
        );
    }

    #[test]
    fn test_full_time_is_finished() {
        let resp: LiveResponse = serde_json::from_str(LIVE_SAMPLE).unwrap();
        let stage = &resp.stages.unwrap()[0];
        let ev = map_event(None, &stage.events.as_ref().unwrap()[1]).unwrap();
        assert!(ev.is_finished);
        assert_eq!(ev.minute, None);
    }

    #[test]
    fn test_event_without_teams_is_skipped() {
        let resp: LiveResponse = serde_json::from_str(LIVE_SAMPLE).unwrap();
        let stage = &resp.stages.unwrap()[0];
        assert!(map_event(None, &stage.events.as_ref().unwrap()[2]).is_none());
    }

    #[test]
    fn test_compact_stamp_rejects_short_values() {
        assert!(parse_compact_stamp(2024113015).is_none());
    }
}
