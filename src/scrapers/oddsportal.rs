//! OddsPortal DOM adapter (1X2 odds).

use async_trait::async_trait;

use super::page::Page;
use super::{extract_decimal_odds, NormalizedOdds, OddsScraper};
use crate::error::ScrapeError;
use crate::store::models::Source;

const BASE_URL: &str = "https://www.oddsportal.com";

const ROW_SELECTORS: &[&str] = &[
    "div[data-testid='game-row']",
    "div.eventRow",
    "tr.deactivate",
];

/// Two-way sports carry no draw price.
fn outcome_count(sport: &str) -> usize {
    match sport {
        "tennis" | "basketball" => 2,
        _ => 3,
    }
}

pub struct OddsPortalScraper {
    page: Box<dyn Page>,
}

impl OddsPortalScraper {
    pub fn new(page: Box<dyn Page>) -> Self {
        OddsPortalScraper { page }
    }
}

/// Row text carries the pairing and the average 1X2 prices:
///
/// ```text
/// 19:00
/// Arsenal – Chelsea
/// 2.10 3.40 3.25
/// ```
fn parse_row(text: &str, sport: &str) -> Option<NormalizedOdds> {
    let (home, away) = find_pairing(text)?;

    let odds = extract_decimal_odds(text);
    let n = outcome_count(sport);
    if odds.len() < n {
        return None;
    }
    let (home_win, draw, away_win) = if n == 3 {
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
        source: Source::OddsPortal.as_str().to_string(),
        bookmaker_count: None,
    })
}

/// Find the "Home – Away" line; OddsPortal uses an en dash, older markup a
/// plain hyphen.
fn find_pairing(text: &str) -> Option<(String, String)> {
    for line in text.lines().map(str::trim) {
        for sep in [" – ", " - "] {
            if let Some((h, a)) = line.split_once(sep) {
                let h = h.trim();
                let a = a.trim();
                // Skip scorelines ("2 - 1") and time ranges
                if h.is_empty() || a.is_empty() {
                    continue;
                }
                if h.chars().all(|c| c.is_ascii_digit() || c == ':')
                    || a.chars().all(|c| c.is_ascii_digit() || c == ':')
                {
                    continue;
                }
                return Some((h.to_string(), a.to_string()));
            }
        }
    }
    None
}

#[async_trait]
impl OddsScraper for OddsPortalScraper {
    fn name(&self) -> &'static str {
        Source::OddsPortal.as_str()
    }

    async fn fetch_odds(&self, sport: &str) -> Result<Vec<NormalizedOdds>, ScrapeError> {
        let url = format!("{}/matches/{}/", BASE_URL, sport);
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

        // Markup shifted entirely: scan the rendered text line-pairs.
        let text = self.page.evaluate_text().await?;
        let mut odds = Vec::new();
        let lines: Vec<&str> = text.lines().collect();
        for window in lines.windows(2) {
            let merged = format!("{}\n{}", window[0], window[1]);
            if let Some(row) = parse_row(&merged, sport) {
                odds.push(row);
            }
        }
        Ok(odds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::page::FakePage;

    #[test]
    fn test_parse_three_way_row() {
        let row = parse_row("19:00\nArsenal – Chelsea\n2.10 3.40 3.25", "football").unwrap();
        assert_eq!(row.home_team, "Arsenal");
        assert_eq!(row.away_team, "Chelsea");
        assert_eq!(row.home_win, Some(2.10));
        assert_eq!(row.draw, Some(3.40));
        assert_eq!(row.away_win, Some(3.25));
    }

    #[test]
    fn test_parse_two_way_row_for_tennis() {
        let row = parse_row("Alcaraz - Sinner\n1.65 2.20", "tennis").unwrap();
        assert_eq!(row.draw, None);
        assert_eq!(row.away_win, Some(2.20));
    }

    #[test]
    fn test_row_without_enough_prices_is_skipped() {
        assert!(parse_row("Arsenal – Chelsea\n2.10", "football").is_none());
    }

    #[test]
    fn test_scoreline_is_not_a_pairing() {
        assert!(find_pairing("2 - 1").is_none());
        assert_eq!(
            find_pairing("Lyon - Nice"),
            Some(("Lyon".to_string(), "Nice".to_string()))
        );
    }

    #[tokio::test]
    async fn test_fetch_odds_walks_selector_chain() {
        let page = FakePage::new().with_selector(
            "div.eventRow",
            vec!["Arsenal – Chelsea\n2.10 3.40 3.25", "junk row"],
        );
        let scraper = OddsPortalScraper::new(Box::new(page));

        let odds = scraper.fetch_odds("football").await.unwrap();
        assert_eq!(odds.len(), 1);
        assert_eq!(odds[0].source, "oddsportal");
    }

    #[tokio::test]
    async fn test_fetch_odds_text_fallback() {
        let page = FakePage::new().with_text("Premier League\nArsenal – Chelsea\n2.10 3.40 3.25\n");
        let scraper = OddsPortalScraper::new(Box::new(page));

        let odds = scraper.fetch_odds("football").await.unwrap();
        assert_eq!(odds.len(), 1);
        assert_eq!(odds[0].home_win, Some(2.10));
    }
}
