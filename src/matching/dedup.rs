//! Cross-source event deduplication: find or create the canonical event
//! for a scraped fixture, attaching per-source external IDs as sources
//! discover the same real-world match.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::matcher::match_team_names;
use super::normalizer::{normalize_team_name, TeamResolver};
use crate::store::models::{Source, Sport};
use crate::store::{Database, NewEvent};

/// Both teams must clear this bar before two sources' fixtures are merged.
/// Stricter than live matching: a wrong merge collapses two real matches.
pub const DEDUP_THRESHOLD: f64 = 0.80;

/// Start times within this bracket may refer to the same match.
pub const DEDUP_WINDOW_HOURS: i64 = 2;

/// A fixture row as scraped from one source.
#[derive(Debug, Clone)]
pub struct ScrapedFixture {
    pub source: Source,
    pub external_id: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
    pub competition_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub event_id: i64,
    pub is_new: bool,
    /// Which source's external ID pinned the existing event, when matched.
    pub matched_source: Option<String>,
    pub confidence: Option<f64>,
}

/// Find the canonical event for a scraped fixture, or create it.
///
/// Order: external-ID fast path, then fuzzy search over events in the same
/// sport within ±2h of the start time, then insert. After any successful
/// call at most one event row exists for the match, carrying the external
/// IDs of every source that has seen it.
pub fn find_or_create_event(
    db: &Database,
    resolver: &mut TeamResolver,
    fixture: &ScrapedFixture,
    sport: &Sport,
) -> Result<DedupOutcome> {
    // Fast path: this source already attached its ID.
    if let Some(event_id) = db.find_event_by_external_id(fixture.source, &fixture.external_id)? {
        debug!(
            "Fixture {}:{} already known as event {}",
            fixture.source, fixture.external_id, event_id
        );
        return Ok(DedupOutcome {
            event_id,
            is_new: false,
            matched_source: Some(fixture.source.as_str().to_string()),
            confidence: None,
        });
    }

    // Fuzzy path: another source may have created this event already.
    let candidates =
        db.list_events_near(sport.id, fixture.start_time, Duration::hours(DEDUP_WINDOW_HOURS))?;
    let mut best: Option<(i64, f64)> = None;
    for candidate in &candidates {
        let home_conf = match_team_names(&fixture.home_team, &candidate.home_team_name);
        let away_conf = match_team_names(&fixture.away_team, &candidate.away_team_name);
        if home_conf < DEDUP_THRESHOLD || away_conf < DEDUP_THRESHOLD {
            continue;
        }
        let overall = (home_conf + away_conf) / 2.0;
        if best.map(|(_, s)| overall > s).unwrap_or(true) {
            best = Some((candidate.id, overall));
        }
    }

    if let Some((event_id, confidence)) = best {
        db.set_external_id(event_id, fixture.source, &fixture.external_id)?;
        let matched_source = db
            .first_external_source(event_id)?
            .unwrap_or_else(|| fixture.source.as_str().to_string());
        info!(
            "Fixture '{} vs {}' from {} matched existing event {} (via {}, confidence {:.2})",
            fixture.home_team, fixture.away_team, fixture.source, event_id, matched_source, confidence
        );
        return Ok(DedupOutcome {
            event_id,
            is_new: false,
            matched_source: Some(matched_source),
            confidence: Some(confidence),
        });
    }

    // New match: resolve teams, create the event with its default market.
    let source_name = fixture.source.as_str();
    let home_team_id = resolver.find_or_create_team(&fixture.home_team, source_name)?;
    let away_team_id = resolver.find_or_create_team(&fixture.away_team, source_name)?;

    let competition_name = fixture
        .competition_name
        .clone()
        .unwrap_or_else(|| "Unknown".to_string());
    let competition_id = db.find_or_create_competition(sport.id, &competition_name)?;

    let event_id = db.insert_event(&NewEvent {
        sport_id: sport.id,
        competition_id,
        competition_name,
        home_team_id,
        away_team_id,
        home_team_name: normalize_team_name(&fixture.home_team),
        away_team_name: normalize_team_name(&fixture.away_team),
        start_time: fixture.start_time,
        source: fixture.source,
        external_id: fixture.external_id.clone(),
    })?;
    debug!(
        "Created event {} for '{} vs {}' ({})",
        event_id, fixture.home_team, fixture.away_team, source_name
    );
    Ok(DedupOutcome {
        event_id,
        is_new: true,
        matched_source: None,
        confidence: None,
    })
}

/// Key for merging fixture lists gathered from several sources in one tick:
/// same sport + normalized teams + start-hour bucket means same match.
pub fn fixture_merge_key(sport_slug: &str, fixture: &ScrapedFixture) -> String {
    format!(
        "{}|{}|{}|{}",
        sport_slug,
        normalize_team_name(&fixture.home_team).to_lowercase(),
        normalize_team_name(&fixture.away_team).to_lowercase(),
        fixture.start_time.format("%Y%m%d%H"),
    )
}
