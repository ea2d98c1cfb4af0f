//! Oddschecker DOM adapter (best 1X2 price across bookmakers).

use async_trait::async_trait;

use super::page::Page;
use super::{extract_decimal_odds, NormalizedOdds, OddsScraper};
use crate::error::ScrapeError;
use crate::store::models::Source;

const BASE_URL: &str = "https://www.oddschecker.com";

const ROW_SELECTORS: &[&str] = &[
    "tr.match-on",
    "div[data-testid='match-row']",
    "div.match-row",
];

fn sport_path(sport: &str) -> &'static str {
    match sport {
        "basketball" => "basketball",
        "tennis" => "tennis",
        _ => "football",
    }
}

pub struct OddscheckerScraper {
    page: Box<dyn Page>,
}

impl OddscheckerScraper {
    pub fn new(page: Box<dyn Page>) -> Self {
        OddscheckerScraper { page }
    }
}

/// Oddschecker separates teams with " v " and appends the bookmaker count:
///
/// ```text
/// Arsenal v Chelsea
/// 2.05 3.50 3.30
/// 14 bookies
/// ```
fn parse_row(text: &str, sport: &str) -> Option<NormalizedOdds> {
    let (home, away) = find_pairing(text)?;
    let odds = extract_decimal_odds(text);

    let three_way = sport_path(sport) == "football";
    let needed = if three_way { 3 } else { 2 };
    if odds.len() < needed {
        return None;
    }
    let (home_win, draw, away_win) = if three_way {
        (Some(odds[0]), Some(odds[1]), Some(odds[2]))
    } else {
        (Some(odds[0]), None, Some(odds[1]))
    };

    Some(NormalizedOdds {
        home_team: home,
        away_team: away,
        competition: None,
        home_win,
        draw,
        away_win,
        source: Source::Oddschecker.as_str().to_string(),
        bookmaker_count: parse_bookmaker_count(text),
    })
}

fn find_pairing(text: &str) -> Option<(String, String)> {
    for line in text.lines().map(str::trim) {
        if let Some((h, a)) = line.split_once(" v ") {
            let h = h.trim();
            let a = a.trim();
            if !h.is_empty() && !a.is_empty() {
                return Some((h.to_string(), a.to_string()));
            }
        }
    }
    None
}

/// "14 bookies" / "14 bookmakers" -> 14
fn parse_bookmaker_count(text: &str) -> Option<u32> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for window in tokens.windows(2) {
        if matches!(window[1].to_lowercase().as_str(), "bookies" | "bookmakers") {
            if let Ok(n) = window[0].parse() {
                return Some(n);
            }
        }
    }
    None
}

#[async_trait]
impl OddsScraper for OddscheckerScraper {
    fn name(&self) -> &'static str {
        Source::Oddschecker.as_str()
    }

    async fn fetch_odds(&self, sport: &str) -> Result<Vec<NormalizedOdds>, ScrapeError> {
        let url = format!("{}/{}", BASE_URL, sport_path(sport));
        self.page.goto(&url).await?;

        for selector in ROW_SELECTORS {
            let rows = self.page.query_selector_all(selector).await?;
            if rows.is_empty() {
                continue;
            }
            let odds: Vec<NormalizedOdds> =
                rows.iter().filter_map(|r| parse_row(r, sport)).collect();
            if !odds.is_empty() {
                return Ok(odds);
            }
        }

        let text = self.page.evaluate_text().await?;
        let lines: Vec<&str> = text.lines().collect();
        let mut odds = Vec::new();
        for window in lines.windows(2) {
            let merged = format!("{}\n{}", window[0], window[1]);
            if let Some(row) = parse_row(&merged, sport) {
                odds.push(row);
            }
        }
        Ok(odds)
    }
}
