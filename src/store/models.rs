use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the finite, known external websites we scrape.
///
/// Each source has a stable short name used for alias records, health
/// tracking, and the per-source external-ID column on events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Sofascore,
    Espn,
    Scores365,
    Fotmob,
    LiveScore,
    Flashscore,
    OddsPortal,
    Oddschecker,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Sofascore => "sofascore",
            Source::Espn => "espn",
            Source::Scores365 => "365scores",
            Source::Fotmob => "fotmob",
            Source::LiveScore => "livescore",
            Source::Flashscore => "flashscore",
            Source::OddsPortal => "oddsportal",
            Source::Oddschecker => "oddschecker",
        }
    }

    /// Column on the `events` table holding this source's external ID.
    /// Closed set; never interpolate user input into SQL.
    pub fn external_id_column(&self) -> &'static str {
        match self {
            Source::Sofascore => "external_sofascore_id",
            Source::Espn => "external_espn_id",
            Source::Scores365 => "external_365scores_id",
            Source::Fotmob => "external_fotmob_id",
            Source::LiveScore => "external_livescore_id",
            Source::Flashscore => "external_flashscore_id",
            Source::OddsPortal => "external_oddsportal_id",
            Source::Oddschecker => "external_oddschecker_id",
        }
    }

    pub fn all() -> &'static [Source] {
        &[
            Source::Sofascore,
            Source::Espn,
            Source::Scores365,
            Source::Fotmob,
            Source::LiveScore,
            Source::Flashscore,
            Source::OddsPortal,
            Source::Oddschecker,
        ]
    }

    pub fn from_str_opt(s: &str) -> Option<Source> {
        Source::all().iter().copied().find(|src| src.as_str() == s)
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sport {
    pub id: i64,
    /// Stable identifier, e.g. "football", "tennis"
    pub slug: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competition {
    pub id: i64,
    pub sport_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    /// Canonical name; immutable after creation.
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamAlias {
    pub id: i64,
    pub team_id: i64,
    pub alias: String,
    pub source: String,
}

/// Lifecycle of a real-world match.
///
/// Transitions form a DAG: `scheduled -> {live, cancelled, postponed}`,
/// `live -> finished`, `postponed -> scheduled`. No other edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Scheduled,
    Live,
    Finished,
    Cancelled,
    Postponed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Scheduled => "scheduled",
            EventStatus::Live => "live",
            EventStatus::Finished => "finished",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Postponed => "postponed",
        }
    }

    pub fn parse(s: &str) -> Option<EventStatus> {
        match s {
            "scheduled" => Some(EventStatus::Scheduled),
            "live" => Some(EventStatus::Live),
            "finished" => Some(EventStatus::Finished),
            "cancelled" => Some(EventStatus::Cancelled),
            "postponed" => Some(EventStatus::Postponed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, next),
            (Scheduled, Live)
                | (Scheduled, Cancelled)
                | (Scheduled, Postponed)
                | (Live, Finished)
                | (Postponed, Scheduled)
        )
    }

    /// Scores may only be written in these states.
    pub fn accepts_scores(&self) -> bool {
        matches!(self, EventStatus::Live | EventStatus::Finished)
    }
}

/// Canonical record of one real-world match, merged across sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub sport_id: i64,
    pub competition_id: i64,
    /// Denormalized names frozen at ingest; tolerant to later team renames.
    pub competition_name: String,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_team_name: String,
    pub away_team_name: String,
    pub start_time: DateTime<Utc>,
    pub status: EventStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub period: Option<String>,
    pub minute: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: i64,
    pub event_id: i64,
    /// e.g. "match_winner"
    pub kind: String,
    pub line: Option<f64>,
    pub is_suspended: bool,
    pub is_main_market: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub id: i64,
    pub market_id: i64,
    /// "1" | "X" | "2" for the match-winner market
    pub name: String,
    pub odds: Option<f64>,
    /// Prior odds value, kept for movement display.
    pub previous_odds: Option<f64>,
    pub is_winner: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    SyncFixtures,
    SyncOdds,
    SyncLiveScores,
    TransitionEvents,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::SyncFixtures => "sync-fixtures",
            JobType::SyncOdds => "sync-odds",
            JobType::SyncLiveScores => "sync-live-scores",
            JobType::TransitionEvents => "transition-events",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

/// One row per job invocation, written by the run tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperRun {
    pub id: i64,
    pub job_type: String,
    pub source: Option<String>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub items_processed: i64,
    pub items_created: i64,
    pub items_updated: i64,
    pub items_failed: i64,
    pub sport_stats: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperAlert {
    pub id: i64,
    pub run_id: Option<i64>,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_dag_allows_documented_edges() {
        use EventStatus::*;
        assert!(Scheduled.can_transition_to(Live));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(Scheduled.can_transition_to(Postponed));
        assert!(Live.can_transition_to(Finished));
        assert!(Postponed.can_transition_to(Scheduled));
    }

    #[test]
    fn test_status_dag_rejects_other_edges() {
        use EventStatus::*;
        assert!(!Finished.can_transition_to(Live));
        assert!(!Finished.can_transition_to(Scheduled));
        assert!(!Live.can_transition_to(Scheduled));
        assert!(!Cancelled.can_transition_to(Live));
        assert!(!Scheduled.can_transition_to(Finished));
        assert!(!Live.can_transition_to(Live));
    }

    #[test]
    fn test_scores_only_while_live_or_finished() {
        assert!(EventStatus::Live.accepts_scores());
        assert!(EventStatus::Finished.accepts_scores());
        assert!(!EventStatus::Scheduled.accepts_scores());
        assert!(!EventStatus::Postponed.accepts_scores());
    }

    #[test]
    fn test_source_round_trip() {
        for src in Source::all() {
            assert_eq!(Source::from_str_opt(src.as_str()), Some(*src));
        }
        assert_eq!(Source::from_str_opt("myspace"), None);
    }
}
