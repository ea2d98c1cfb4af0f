//! Source adapters and the common scraped-event shape.
//!
//! Two adapter families share one contract: JSON-API sources (SofaScore,
//! ESPN, 365Scores, FotMob, LiveScore) fetch documented endpoints with a
//! bare HTTP client; DOM sources (Flashscore, OddsPortal, Oddschecker)
//! run against the minimal [`page::Page`] seam so the headless browser
//! stays outside the crate. Every adapter maps its source's shape into
//! [`ScrapedEvent`] / [`NormalizedOdds`] / [`ScrapedFixture`] and skips
//! malformed rows instead of failing the batch.

pub mod espn;
pub mod flashscore;
pub mod fotmob;
pub mod livescore;
pub mod oddschecker;
pub mod oddsportal;
pub mod page;
pub mod scores365;
pub mod sofascore;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use rand::Rng;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ScrapeError;
use crate::health::is_blocked_response;
use crate::matching::{match_events, EventToMatch, MatchOptions, ScrapedFixture};
use crate::proxy::ProxyConfig;
use crate::ratelimit::RateLimiter;

/// Timeout for JSON API endpoints.
pub const JSON_TIMEOUT_SECS: u64 = 15;
/// Timeout for JS-heavy pages.
pub const PAGE_TIMEOUT_SECS: u64 = 60;
/// Transient failures are retried up to this many attempts.
pub const MAX_ATTEMPTS: u32 = 3;

/// One event as seen by a single source; identical shape across adapters
/// so the matcher can treat all sources uniformly.
#[derive(Debug, Clone)]
pub struct ScrapedEvent {
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub period: Option<String>,
    pub minute: Option<i32>,
    pub is_finished: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub competition_name: Option<String>,
    pub source_id: Option<String>,
    pub source_name: String,
}

/// A score update for one matched database event.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveScore {
    pub home_score: i32,
    pub away_score: i32,
    pub period: Option<String>,
    pub minute: Option<i32>,
    pub is_finished: bool,
}

/// Result of one live-scores scrape: updates keyed by database event id.
#[derive(Debug, Clone, Default)]
pub struct ScrapeBatch {
    pub scores: HashMap<i64, LiveScore>,
    pub matched: usize,
    pub unmatched: usize,
}

/// Odds normalized to a 1X2 triple, regardless of how the source lays
/// markets out.
#[derive(Debug, Clone)]
pub struct NormalizedOdds {
    pub home_team: String,
    pub away_team: String,
    pub competition: Option<String>,
    pub home_win: Option<f64>,
    pub draw: Option<f64>,
    pub away_win: Option<f64>,
    pub source: String,
    pub bookmaker_count: Option<u32>,
}

#[async_trait]
pub trait LiveScoresScraper: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch current scores and match them to the given database events.
    async fn fetch_live_scores(
        &self,
        events: &[EventToMatch],
    ) -> Result<ScrapeBatch, ScrapeError>;
}

#[async_trait]
pub trait OddsScraper: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_odds(&self, sport: &str) -> Result<Vec<NormalizedOdds>, ScrapeError>;
}

#[async_trait]
pub trait FixturesScraper: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_fixtures(
        &self,
        sport: &str,
        days: u32,
    ) -> Result<Vec<ScrapedFixture>, ScrapeError>;
}

/// Match a source's scraped events against the database events and build
/// the per-event score map. Rows without both scores are dropped.
pub fn match_batch(
    scraped: Vec<ScrapedEvent>,
    events: &[EventToMatch],
    opts: &MatchOptions,
) -> ScrapeBatch {
    let usable: Vec<ScrapedEvent> = scraped
        .into_iter()
        .filter(|ev| ev.home_score.is_some() && ev.away_score.is_some())
        .collect();

    let results = match_events(&usable, events, opts);
    let mut scores = HashMap::new();
    for result in &results {
        let ev = &usable[result.scraped_index];
        scores.insert(
            result.event_id,
            LiveScore {
                home_score: ev.home_score.unwrap_or(0),
                away_score: ev.away_score.unwrap_or(0),
                period: ev.period.clone(),
                minute: ev.minute,
                is_finished: ev.is_finished,
            },
        );
    }
    let matched = results.len();
    ScrapeBatch {
        scores,
        matched,
        unmatched: usable.len().saturating_sub(matched),
    }
}

// ── HTTP plumbing ──────────────────────────────────────────────────────────────

/// Browser user agents rotated per client to vary the fingerprint.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())]
}

/// Shared HTTP fetch layer: rate limiting, blocking classification, and
/// JSON decoding with localized parse errors.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl HttpFetcher {
    pub fn new(limiter: Arc<RateLimiter>, proxy: Option<&ProxyConfig>) -> Result<Self, ScrapeError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(JSON_TIMEOUT_SECS))
            .user_agent(random_user_agent());
        if let Some(p) = proxy {
            let mut rp = reqwest::Proxy::all(&p.server)
                .map_err(|e| ScrapeError::Transient(format!("bad proxy url: {e}")))?;
            if let (Some(user), Some(pass)) = (&p.username, &p.password) {
                rp = rp.basic_auth(user, pass);
            }
            builder = builder.proxy(rp);
        }
        let client = builder
            .build()
            .map_err(|e| ScrapeError::Transient(format!("client build failed: {e}")))?;
        Ok(HttpFetcher { client, limiter })
    }

    /// GET a URL, enforcing the per-domain rate limit and classifying
    /// blocked responses.
    pub async fn get_text(&self, url: &str) -> Result<String, ScrapeError> {
        self.limiter.acquire(url).await;
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if is_blocked_response(Some(status), &body) {
            return Err(ScrapeError::Blocked {
                status: Some(status),
                snippet: body.chars().take(120).collect(),
            });
        }
        if !(200..300).contains(&status) {
            return Err(ScrapeError::Transient(format!("HTTP {status} from {url}")));
        }
        Ok(body)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ScrapeError> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body)
            .map_err(|e| ScrapeError::Parse(format!("{url}: {e}")))
    }
}

/// Retry transient failures with exponential backoff (1s base, doubling).
pub async fn with_backoff<T, F, Fut>(mut op: F) -> Result<T, ScrapeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                let backoff = Duration::from_secs(1 << (attempt - 1));
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Random inter-request delay, disguising the scrape cadence.
pub async fn jitter_delay(min_ms: u64, max_ms: u64) {
    let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ── Display-time conversion ────────────────────────────────────────────────────

/// Convert a CET/CEST wall-clock time (as displayed by European sites) to
/// UTC. DST runs from the last Sunday of March to the last Sunday of
/// October; inside it the offset is +2h, otherwise +1h.
pub fn cet_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    let year = local.year();
    let dst_start = last_sunday(year, 3).and_hms_opt(1, 0, 0).unwrap();
    let dst_end = last_sunday(year, 10).and_hms_opt(1, 0, 0).unwrap();

    // Provisional UTC assuming winter time, then re-check against the
    // DST window (boundaries are expressed in UTC).
    let provisional = local - ChronoDuration::hours(1);
    let offset = if provisional >= dst_start && provisional < dst_end {
        2
    } else {
        1
    };
    DateTime::from_naive_utc_and_offset(local - ChronoDuration::hours(offset), Utc)
}

fn last_sunday(year: i32, month: u32) -> NaiveDate {
    let last_day = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .unwrap()
    .pred_opt()
    .unwrap();
    last_day - ChronoDuration::days(last_day.weekday().num_days_from_sunday() as i64)
}

/// Scan free text for decimal odds (e.g. "2.35"), the fallback extraction
/// when a DOM source's markup has shifted.
pub fn extract_decimal_odds(text: &str) -> Vec<f64> {
    let mut odds = Vec::new();
    let mut chars = text.chars().peekable();
    let mut token = String::new();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || (c == '.' && !token.is_empty() && chars.peek().map(|n| n.is_ascii_digit()).unwrap_or(false)) {
            token.push(c);
        } else {
            push_if_odds(&mut odds, &token);
            token.clear();
        }
    }
    push_if_odds(&mut odds, &token);
    odds
}

fn push_if_odds(odds: &mut Vec<f64>, token: &str) {
    if !token.contains('.') {
        return;
    }
    if let Ok(value) = token.parse::<f64>() {
        // Plausible decimal-odds range; filters out scores and years.
        if (1.01..=100.0).contains(&value) {
            odds.push(value);
        }
    }
}

/// Parse an "X - Y" scoreline out of free text.
pub fn extract_scoreline(text: &str) -> Option<(i32, i32)> {
    for sep in ["-", ":", "–"] {
        for window in text.split_whitespace().collect::<Vec<_>>().windows(3) {
            if window[1] == sep {
                if let (Ok(h), Ok(a)) = (window[0].parse::<i32>(), window[2].parse::<i32>()) {
                    if (0..200).contains(&h) && (0..200).contains(&a) {
                        return Some((h, a));
                    }
                }
            }
        }
        // Also handle the compact "2-1" form
        for token in text.split_whitespace() {
            if let Some((h, a)) = token.split_once(sep) {
                if let (Ok(h), Ok(a)) = (h.parse::<i32>(), a.parse::<i32>()) {
                    if (0..200).contains(&h) && (0..200).contains(&a) {
                        return Some((h, a));
                    }
                }
            }
        }
    }
    None
}
