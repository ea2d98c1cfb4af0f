//! Pairs scraped events with database events via team names + time window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use super::normalizer::{normalize_team_name, similarity};
use crate::scrapers::ScrapedEvent;

/// A database event reduced to what matching needs.
#[derive(Debug, Clone)]
pub struct EventToMatch {
    pub event_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Minimum per-team (or average) confidence to accept a pairing.
    pub threshold: f64,
    /// When true, both teams must individually clear the threshold.
    pub require_both_teams: bool,
    /// Only db events within ±window of the scraped start time are candidates.
    pub time_window: Duration,
}

impl MatchOptions {
    /// Live-score matching: 12h window, 0.70 threshold.
    pub fn live() -> Self {
        MatchOptions {
            threshold: 0.70,
            require_both_teams: true,
            time_window: Duration::hours(12),
        }
    }

    /// Odds matching is stricter: a wrong pairing writes odds onto the
    /// wrong match.
    pub fn odds() -> Self {
        MatchOptions {
            threshold: 0.75,
            require_both_teams: true,
            time_window: Duration::hours(24),
        }
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions::live()
    }
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub event_id: i64,
    /// Index into the scraped slice this result came from.
    pub scraped_index: usize,
    pub home_confidence: f64,
    pub away_confidence: f64,
    pub overall_confidence: f64,
}

/// Confidence that two team names refer to the same team.
///
/// Returns 1.0 when the canonical forms coincide, otherwise the better of
/// raw-name and canonical-name similarity.
pub fn match_team_names(a: &str, b: &str) -> f64 {
    let norm_a = normalize_team_name(a);
    let norm_b = normalize_team_name(b);
    if norm_a.eq_ignore_ascii_case(&norm_b) {
        return 1.0;
    }
    similarity(a, b).max(similarity(&norm_a, &norm_b))
}

/// Match scraped events against database events.
///
/// Each db event is claimed by at most one scraped event; among surviving
/// candidates the highest overall confidence wins.
pub fn match_events(
    scraped: &[ScrapedEvent],
    db_events: &[EventToMatch],
    opts: &MatchOptions,
) -> Vec<MatchResult> {
    let mut claimed: HashSet<i64> = HashSet::new();
    let mut results = Vec::new();

    for (idx, ev) in scraped.iter().enumerate() {
        let mut best: Option<MatchResult> = None;

        for candidate in db_events {
            if claimed.contains(&candidate.event_id) {
                continue;
            }
            if let Some(start) = ev.start_time {
                let delta = (candidate.start_time - start).abs();
                if delta > opts.time_window {
                    continue;
                }
            }

            let home_conf = match_team_names(&ev.home_team, &candidate.home_team);
            let away_conf = match_team_names(&ev.away_team, &candidate.away_team);

            let passes = if opts.require_both_teams {
                home_conf >= opts.threshold && away_conf >= opts.threshold
            } else {
                (home_conf + away_conf) / 2.0 >= opts.threshold
            };
            if !passes {
                continue;
            }

            let overall = (home_conf + away_conf) / 2.0;
            if best
                .as_ref()
                .map(|b| overall > b.overall_confidence)
                .unwrap_or(true)
            {
                best = Some(MatchResult {
                    event_id: candidate.event_id,
                    scraped_index: idx,
                    home_confidence: home_conf,
                    away_confidence: away_conf,
                    overall_confidence: overall,
                });
            }
        }

        if let Some(result) = best {
            claimed.insert(result.event_id);
            results.push(result);
        }
    }

    results
}
