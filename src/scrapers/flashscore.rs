//! Flashscore DOM adapter (live scores + fixtures).
//!
//! Flashscore renders everything client-side and renames CSS classes
//! regularly, so extraction runs through a fallback chain: JSON-LD
//! `SportsEvent` blocks when present, then the known row selectors in
//! priority order, then a plain-text scoreline heuristic over the
//! rendered page.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};

use super::page::Page;
use super::{cet_to_utc, extract_scoreline, match_batch, ScrapeBatch, ScrapedEvent};
use crate::error::ScrapeError;
use crate::matching::{normalize_team_name, EventToMatch, MatchOptions, ScrapedFixture};
use crate::scrapers::FixturesScraper;
use crate::scrapers::LiveScoresScraper;
use crate::store::models::Source;

const BASE_URL: &str = "https://www.flashscore.com";

/// Row selectors, most specific first; the site renames classes.
const LIVE_SELECTORS: &[&str] = &[
    "div.event__match--live",
    "div.event__match",
    "[id^='g_1_']",
];
const FIXTURE_SELECTORS: &[&str] = &[
    "div.event__match--scheduled",
    "div.event__match",
];
const JSON_LD_SELECTOR: &str = "script[type='application/ld+json']";

/// Status tokens Flashscore shows in place of a minute.
const FINISHED_TOKENS: &[&str] = &["FT", "Finished", "AET", "After Pen.", "Pen."];
const BREAK_TOKENS: &[&str] = &["HT", "Half Time", "Break"];

pub struct FlashscoreScraper {
    page: Box<dyn Page>,
    sport: String,
}

impl FlashscoreScraper {
    pub fn new(page: Box<dyn Page>, sport: &str) -> Self {
        FlashscoreScraper {
            page,
            sport: sport.to_string(),
        }
    }

    async fn live_rows(&self) -> Result<Vec<String>, ScrapeError> {
        for selector in LIVE_SELECTORS {
            let rows = self.page.query_selector_all(selector).await?;
            if !rows.is_empty() {
                return Ok(rows);
            }
        }
        Ok(Vec::new())
    }
}

/// Parse one live match row. Expected line layout (team names, minute and
/// scores in some order):
///
/// ```text
/// 45'
/// Arsenal
/// Chelsea
/// 2
/// 1
/// ```
fn parse_live_row(text: &str) -> Option<ScrapedEvent> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < 2 {
        return None;
    }

    let mut teams: Vec<&str> = Vec::new();
    let mut numbers: Vec<i32> = Vec::new();
    let mut minute: Option<i32> = None;
    let mut period: Option<String> = None;
    let mut is_finished = false;

    for line in &lines {
        if FINISHED_TOKENS.contains(line) {
            is_finished = true;
            period = Some((*line).to_string());
            continue;
        }
        if BREAK_TOKENS.contains(line) {
            period = Some((*line).to_string());
            continue;
        }
        if let Some(min) = parse_minute(line) {
            minute = Some(min);
            continue;
        }
        if let Ok(n) = line.parse::<i32>() {
            if (0..200).contains(&n) {
                numbers.push(n);
                continue;
            }
        }
        if teams.len() < 2 {
            teams.push(line);
        }
    }

    if teams.len() != 2 {
        return None;
    }
    let (home_score, away_score) = match numbers.as_slice() {
        [h, a, ..] => (Some(*h), Some(*a)),
        _ => extract_scoreline(text).map(|(h, a)| (Some(h), Some(a)))?,
    };

    Some(ScrapedEvent {
        home_team: teams[0].to_string(),
        away_team: teams[1].to_string(),
        home_score,
        away_score,
        period,
        minute,
        is_finished,
        start_time: None,
        competition_name: None,
        source_id: None,
        source_name: Source::Flashscore.as_str().to_string(),
    })
}

/// "45'" / "90+3'" -> minute
fn parse_minute(line: &str) -> Option<i32> {
    let stripped = line.trim_end_matches('\'');
    if stripped == line {
        return None;
    }
    let head: String = stripped
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    head.parse().ok()
}

/// Fixture rows carry a kick-off time instead of scores:
///
/// ```text
/// 15:00
/// Arsenal
/// Chelsea
/// ```
fn parse_fixture_row(text: &str, date: NaiveDate) -> Option<(String, String, chrono::DateTime<Utc>)> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut kick_off: Option<NaiveTime> = None;
    let mut teams: Vec<&str> = Vec::new();
    for line in &lines {
        if kick_off.is_none() {
            if let Ok(t) = NaiveTime::parse_from_str(line, "%H:%M") {
                kick_off = Some(t);
                continue;
            }
        }
        if teams.len() < 2 && line.parse::<i32>().is_err() {
            teams.push(line);
        }
    }

    if teams.len() != 2 {
        return None;
    }
    // Displayed kick-off times are CET/CEST.
    let start = cet_to_utc(date.and_time(kick_off?));
    Some((teams[0].to_string(), teams[1].to_string(), start))
}

/// Deterministic external id for DOM-scraped fixtures, stable across runs:
/// the page itself exposes no usable identifier.
fn synthetic_fixture_id(home: &str, away: &str, start: chrono::DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        slug(&normalize_team_name(home)),
        slug(&normalize_team_name(away)),
        start.format("%Y%m%d%H")
    )
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

/// Pull `SportsEvent` entries out of JSON-LD blocks.
fn parse_json_ld_fixtures(blocks: &[String]) -> Vec<(String, String, chrono::DateTime<Utc>)> {
    let mut fixtures = Vec::new();
    for block in blocks {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(block) else {
            continue;
        };
        let items: Vec<&serde_json::Value> = match value.as_array() {
            Some(arr) => arr.iter().collect(),
            None => vec![&value],
        };
        for item in items {
            if item["@type"].as_str() != Some("SportsEvent") {
                continue;
            }
            let start = item["startDate"]
                .as_str()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc));
            let (home, away) = match (
                item["homeTeam"]["name"].as_str(),
                item["awayTeam"]["name"].as_str(),
            ) {
                (Some(h), Some(a)) => (h.to_string(), a.to_string()),
                _ => {
                    // "Arsenal - Chelsea" in the name field
                    let Some(name) = item["name"].as_str() else { continue };
                    let Some((h, a)) = name.split_once(" - ") else { continue };
                    (h.trim().to_string(), a.trim().to_string())
                }
            };
            if let Some(start) = start {
                fixtures.push((home, away, start));
            }
        }
    }
    fixtures
}

#[async_trait]
impl LiveScoresScraper for FlashscoreScraper {
    fn name(&self) -> &'static str {
        Source::Flashscore.as_str()
    }

    async fn fetch_live_scores(
        &self,
        events: &[EventToMatch],
    ) -> Result<ScrapeBatch, ScrapeError> {
        let url = format!("{}/{}/", BASE_URL, self.sport);
        self.page.goto(&url).await?;

        let mut scraped: Vec<ScrapedEvent> = self
            .live_rows()
            .await?
            .iter()
            .filter_map(|row| parse_live_row(row))
            .collect();

        if scraped.is_empty() {
            // Heuristic last resort: one "A 2 - 1 B" scoreline per text line.
            let text = self.page.evaluate_text().await?;
            for line in text.lines() {
                if let Some(ev) = parse_text_scoreline(line) {
                    scraped.push(ev);
                }
            }
        }

        Ok(match_batch(scraped, events, &MatchOptions::live()))
    }
}

/// "Arsenal 2 - 1 Chelsea" -> event
fn parse_text_scoreline(line: &str) -> Option<ScrapedEvent> {
    let (h, a) = extract_scoreline(line)?;
    let score_pos = line.find(&format!("{} - {}", h, a))?;
    let home = line[..score_pos].trim();
    let away = line[score_pos..]
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '-' || c.is_whitespace())
        .trim();
    if home.is_empty() || away.is_empty() {
        return None;
    }
    Some(ScrapedEvent {
        home_team: home.to_string(),
        away_team: away.to_string(),
        home_score: Some(h),
        away_score: Some(a),
        period: None,
        minute: None,
        is_finished: false,
        start_time: None,
        competition_name: None,
        source_id: None,
        source_name: Source::Flashscore.as_str().to_string(),
    })
}

#[async_trait]
impl FixturesScraper for FlashscoreScraper {
    fn name(&self) -> &'static str {
        Source::Flashscore.as_str()
    }

    async fn fetch_fixtures(
        &self,
        sport: &str,
        days: u32,
    ) -> Result<Vec<ScrapedFixture>, ScrapeError> {
        let mut fixtures = Vec::new();
        // Flashscore exposes one page per day offset.
        for day in 0..days.min(7) {
            let url = format!("{}/{}/fixtures/?d={}", BASE_URL, sport, day);
            self.page.goto(&url).await?;

            let date = (Utc::now() + Duration::days(day as i64)).date_naive();
            let mut day_rows: Vec<(String, String, chrono::DateTime<Utc>)> = Vec::new();

            // JSON-LD first: structured and stable when present.
            let blocks = self.page.query_selector_all(JSON_LD_SELECTOR).await?;
            day_rows.extend(parse_json_ld_fixtures(&blocks));

            if day_rows.is_empty() {
                for selector in FIXTURE_SELECTORS {
                    let rows = self.page.query_selector_all(selector).await?;
                    if rows.is_empty() {
                        continue;
                    }
                    day_rows.extend(rows.iter().filter_map(|r| parse_fixture_row(r, date)));
                    if !day_rows.is_empty() {
                        break;
                    }
                }
            }

            for (home, away, start) in day_rows {
                let external_id = synthetic_fixture_id(&home, &away, start);
                fixtures.push(ScrapedFixture {
                    source: Source::Flashscore,
                    external_id,
                    home_team: home,
                    away_team: away,
                    start_time: start,
                    competition_name: None,
                });
            }
        }
        Ok(fixtures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::page::FakePage;

    #[test]
    fn test_parse_live_row_full_layout() {
        let ev = parse_live_row("45'\nArsenal\nChelsea\n2\n1").unwrap();
        assert_eq!(ev.home_team, "Arsenal");
        assert_eq!(ev.away_team, "Chelsea");
        assert_eq!(ev.home_score, Some(2));
        assert_eq!(ev.away_score, Some(1));
        assert_eq!(ev.minute, Some(45));
        assert!(!ev.is_finished);
    }

    #[test]
    fn test_parse_live_row_finished() {
        let ev = parse_live_row("FT\nLyon\nNice\n0\n3").unwrap();
        assert!(ev.is_finished);
        assert_eq!(ev.period.as_deref(), Some("FT"));
    }

    #[test]
    fn test_parse_live_row_rejects_garbage() {
        assert!(parse_live_row("advertisement").is_none());
        assert!(parse_live_row("Arsenal\nodds boost!").is_none());
    }

    #[test]
    fn test_parse_fixture_row_converts_cet() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 30).unwrap();
        let (home, away, start) = parse_fixture_row("15:00\nArsenal\nChelsea", date).unwrap();
        assert_eq!(home, "Arsenal");
        assert_eq!(away, "Chelsea");
        assert_eq!(start.to_rfc3339(), "2024-11-30T14:00:00+00:00");
    }

    #[test]
    fn test_synthetic_fixture_id_is_stable() {
        let start = Utc::now();
        let a = synthetic_fixture_id("Arsenal FC", "Chelsea", start);
        let b = synthetic_fixture_id("Arsenal", "Chelsea FC", start);
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_json_ld_sports_events() {
        let block = r#"[
            {
                "@type": "SportsEvent",
                "name": "Arsenal - Chelsea",
                "startDate": "2024-11-30T15:00:00+01:00"
            },
            {"@type": "BreadcrumbList"}
        ]"#;
        let fixtures = parse_json_ld_fixtures(&[block.to_string()]);
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].0, "Arsenal");
        assert_eq!(fixtures[0].2.to_rfc3339(), "2024-11-30T14:00:00+00:00");
    }

    #[tokio::test]
    async fn test_live_scores_via_selector_chain() {
        let page = FakePage::new().with_selector(
            "div.event__match--live",
            vec!["67'\nArsenal\nChelsea\n2\n1"],
        );
        let scraper = FlashscoreScraper::new(Box::new(page), "football");

        let events = vec![EventToMatch {
            event_id: 10,
            home_team: "Arsenal".into(),
            away_team: "Chelsea".into(),
            start_time: Utc::now(),
        }];
        let batch = scraper.fetch_live_scores(&events).await.unwrap();
        assert_eq!(batch.matched, 1);
        assert_eq!(batch.scores.get(&10).unwrap().home_score, 2);
    }

    #[tokio::test]
    async fn test_live_scores_fall_back_to_secondary_selector() {
        let page = FakePage::new().with_selector(
            "div.event__match",
            vec!["HT\nLyon\nNice\n1\n1"],
        );
        let scraper = FlashscoreScraper::new(Box::new(page), "football");

        let events = vec![EventToMatch {
            event_id: 4,
            home_team: "Lyon".into(),
            away_team: "Nice".into(),
            start_time: Utc::now(),
        }];
        let batch = scraper.fetch_live_scores(&events).await.unwrap();
        assert_eq!(batch.matched, 1);
        assert_eq!(batch.scores.get(&4).unwrap().period.as_deref(), Some("HT"));
    }

    #[tokio::test]
    async fn test_live_scores_text_heuristic_fallback() {
        let page = FakePage::new().with_text("Premier League\nArsenal 2 - 1 Chelsea\nfooter");
        let scraper = FlashscoreScraper::new(Box::new(page), "football");

        let events = vec![EventToMatch {
            event_id: 9,
            home_team: "Arsenal".into(),
            away_team: "Chelsea".into(),
            start_time: Utc::now(),
        }];
        let batch = scraper.fetch_live_scores(&events).await.unwrap();
        assert_eq!(batch.matched, 1);
    }

    #[tokio::test]
    async fn test_fixtures_prefer_json_ld() {
        let page = FakePage::new()
            .with_selector(
                "script[type='application/ld+json']",
                vec![r#"{"@type": "SportsEvent", "name": "Arsenal - Chelsea", "startDate": "2025-08-02T16:00:00+02:00"}"#],
            )
            .with_selector("div.event__match--scheduled", vec!["15:00\nWrong\nRows"]);
        let scraper = FlashscoreScraper::new(Box::new(page), "football");

        let fixtures = scraper.fetch_fixtures("football", 1).await.unwrap();
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].home_team, "Arsenal");
        assert_eq!(fixtures[0].source, Source::Flashscore);
    }

    #[tokio::test]
    async fn test_navigation_failure_surfaces_as_error() {
        let page = FakePage::new().failing_navigation();
        let scraper = FlashscoreScraper::new(Box::new(page), "football");
        let result = scraper.fetch_live_scores(&[]).await;
        assert!(result.is_err());
    }
}
