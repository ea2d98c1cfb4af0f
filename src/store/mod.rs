use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub mod models;
use models::*;

/// Thread-safe SQLite handle (single connection with mutex).
///
/// The store is the only durable shared resource; health and proxy state
/// live in memory for the lifetime of one invocation.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Everything needed to insert a new canonical event row.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub sport_id: i64,
    pub competition_id: i64,
    pub competition_name: String,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_team_name: String,
    pub away_team_name: String,
    pub start_time: DateTime<Utc>,
    pub source: Source,
    pub external_id: String,
}

impl Database {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent).
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Sports ───────────────────────────────────────────────────────────────

    pub fn upsert_sport(&self, slug: &str, name: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sports (slug, name, is_active) VALUES (?1, ?2, 1)
             ON CONFLICT(slug) DO UPDATE SET name=excluded.name",
            params![slug, name],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM sports WHERE slug = ?1",
            params![slug],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn get_sport_by_slug(&self, slug: &str) -> Result<Option<Sport>> {
        let conn = self.conn.lock().unwrap();
        let sport = conn
            .query_row(
                "SELECT id, slug, name, is_active FROM sports WHERE slug = ?1",
                params![slug],
                map_sport,
            )
            .optional()?;
        Ok(sport)
    }

    pub fn list_active_sports(&self) -> Result<Vec<Sport>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, slug, name, is_active FROM sports WHERE is_active = 1 ORDER BY id")?;
        let sports = stmt
            .query_map([], map_sport)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sports)
    }

    // ── Competitions ─────────────────────────────────────────────────────────

    /// Competitions are created on first sight, keyed on (sport, name).
    pub fn find_or_create_competition(&self, sport_id: i64, name: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM competitions WHERE sport_id = ?1 AND name = ?2",
                params![sport_id, name],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        conn.execute(
            "INSERT INTO competitions (sport_id, name) VALUES (?1, ?2)",
            params![sport_id, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ── Teams & aliases ──────────────────────────────────────────────────────

    pub fn insert_team(&self, name: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO teams (name, created_at) VALUES (?1, ?2)",
            params![name, Utc::now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_teams(&self) -> Result<Vec<Team>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM teams ORDER BY id")?;
        let teams = stmt
            .query_map([], map_team)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(teams)
    }

    pub fn find_team_by_alias(&self, alias: &str, source: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                "SELECT team_id FROM team_aliases WHERE alias = ?1 AND source = ?2",
                params![alias, source],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Case-insensitive exact match against the canonical team name.
    pub fn find_team_by_name_ci(&self, name: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                "SELECT id FROM teams WHERE name = ?1 COLLATE NOCASE",
                params![name],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Insert an alias; duplicate (alias, source) pairs are swallowed.
    pub fn insert_alias(&self, team_id: i64, alias: &str, source: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO team_aliases (team_id, alias, source) VALUES (?1, ?2, ?3)",
            params![team_id, alias, source],
        )?;
        Ok(())
    }

    pub fn list_aliases_for_team(&self, team_id: i64) -> Result<Vec<TeamAlias>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, team_id, alias, source FROM team_aliases WHERE team_id = ?1 ORDER BY id",
        )?;
        let aliases = stmt
            .query_map(params![team_id], |row| {
                Ok(TeamAlias {
                    id: row.get(0)?,
                    team_id: row.get(1)?,
                    alias: row.get(2)?,
                    source: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(aliases)
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Insert a new scheduled event with its default match-winner market.
    /// The external ID of the source that first saw the match is attached
    /// in the same transaction.
    pub fn insert_event(&self, ev: &NewEvent) -> Result<i64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();
        tx.execute(
            "INSERT INTO events (
                sport_id, competition_id, competition_name,
                home_team_id, away_team_id, home_team_name, away_team_name,
                start_time, status, created_at, updated_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,'scheduled',?9,?9)",
            params![
                ev.sport_id,
                ev.competition_id,
                ev.competition_name,
                ev.home_team_id,
                ev.away_team_id,
                ev.home_team_name,
                ev.away_team_name,
                ev.start_time,
                now,
            ],
        )?;
        let event_id = tx.last_insert_rowid();

        tx.execute(
            &format!(
                "UPDATE events SET {} = ?1 WHERE id = ?2",
                ev.source.external_id_column()
            ),
            params![ev.external_id, event_id],
        )?;

        tx.execute(
            "INSERT INTO markets (event_id, kind, is_suspended, is_main_market)
             VALUES (?1, 'match_winner', 0, 1)",
            params![event_id],
        )?;
        let market_id = tx.last_insert_rowid();
        for outcome in ["1", "X", "2"] {
            tx.execute(
                "INSERT INTO outcomes (market_id, name) VALUES (?1, ?2)",
                params![market_id, outcome],
            )?;
        }

        tx.commit()?;
        Ok(event_id)
    }

    pub fn get_event(&self, id: i64) -> Result<Option<Event>> {
        let conn = self.conn.lock().unwrap();
        let event = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_EVENT),
                params![id],
                map_event,
            )
            .optional()?;
        Ok(event)
    }

    pub fn find_event_by_external_id(&self, source: Source, external_id: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                &format!(
                    "SELECT id FROM events WHERE {} = ?1",
                    source.external_id_column()
                ),
                params![external_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Attach a source's external ID to an existing event.
    pub fn set_external_id(&self, event_id: i64, source: Source, external_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "UPDATE events SET {} = ?1, updated_at = ?2 WHERE id = ?3",
                source.external_id_column()
            ),
            params![external_id, Utc::now(), event_id],
        )?;
        Ok(())
    }

    pub fn get_external_id(&self, event_id: i64, source: Source) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                &format!(
                    "SELECT {} FROM events WHERE id = ?1",
                    source.external_id_column()
                ),
                params![event_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id.flatten())
    }

    /// First source (in integration order) that has an external ID on this
    /// event; tells a dedup caller which source originally pinned the match.
    pub fn first_external_source(&self, event_id: i64) -> Result<Option<String>> {
        for source in Source::all() {
            if self.get_external_id(event_id, *source)?.is_some() {
                return Ok(Some(source.as_str().to_string()));
            }
        }
        Ok(None)
    }

    /// Candidate events in a sport with start_time within ±window of `t`.
    pub fn list_events_near(
        &self,
        sport_id: i64,
        t: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE sport_id = ?1 AND start_time >= ?2 AND start_time <= ?3 ORDER BY start_time",
            SELECT_EVENT
        ))?;
        let events = stmt
            .query_map(params![sport_id, t - window, t + window], map_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    pub fn list_live_events(&self) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = 'live' ORDER BY start_time",
            SELECT_EVENT
        ))?;
        let events = stmt
            .query_map([], map_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// Scheduled events starting within the next `hours` hours.
    pub fn list_upcoming_events(&self, hours: i64) -> Result<Vec<Event>> {
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = 'scheduled' AND start_time >= ?1 AND start_time <= ?2 ORDER BY start_time",
            SELECT_EVENT
        ))?;
        let events = stmt
            .query_map(params![now, now + Duration::hours(hours)], map_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// Apply a status transition, enforcing the DAG. Returns true when the
    /// row was updated, false when the edge is not permitted or the event
    /// is already in the requested state.
    pub fn update_event_status(&self, event_id: i64, next: EventStatus) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM events WHERE id = ?1",
                params![event_id],
                |r| r.get(0),
            )
            .optional()?;
        let current = match current.as_deref().and_then(EventStatus::parse) {
            Some(s) => s,
            None => return Ok(false),
        };
        if !current.can_transition_to(next) {
            return Ok(false);
        }
        conn.execute(
            "UPDATE events SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![next.as_str(), Utc::now(), event_id],
        )?;
        Ok(true)
    }

    /// Write live score fields. Rejected unless the event is live or
    /// finished.
    pub fn update_live_score(
        &self,
        event_id: i64,
        home_score: i32,
        away_score: i32,
        period: Option<&str>,
        minute: Option<i32>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM events WHERE id = ?1",
                params![event_id],
                |r| r.get(0),
            )
            .optional()?;
        let status = match status.as_deref().and_then(EventStatus::parse) {
            Some(s) => s,
            None => return Ok(false),
        };
        if !status.accepts_scores() {
            return Ok(false);
        }
        conn.execute(
            "UPDATE events SET home_score=?1, away_score=?2, period=?3, minute=?4, updated_at=?5
             WHERE id = ?6",
            params![home_score, away_score, period, minute, Utc::now(), event_id],
        )?;
        Ok(true)
    }

    /// Flip scheduled events whose start time has passed to live.
    /// Single statement; used by the transition-events job.
    pub fn transition_due_events(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE events SET status='live', updated_at=?1
             WHERE status='scheduled' AND start_time <= ?1",
            params![now],
        )?;
        Ok(changed)
    }

    // ── Markets & outcomes ───────────────────────────────────────────────────

    pub fn main_market_id(&self, event_id: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                "SELECT id FROM markets WHERE event_id = ?1 AND is_main_market = 1",
                params![event_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Update an outcome's odds, preserving the prior value for movement.
    pub fn update_outcome_odds(&self, market_id: i64, name: &str, odds: f64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE outcomes SET previous_odds = odds, odds = ?1
             WHERE market_id = ?2 AND name = ?3",
            params![odds, market_id, name],
        )?;
        Ok(())
    }

    pub fn list_outcomes(&self, market_id: i64) -> Result<Vec<Outcome>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, market_id, name, odds, previous_odds, is_winner
             FROM outcomes WHERE market_id = ?1 ORDER BY id",
        )?;
        let outcomes = stmt
            .query_map(params![market_id], |row| {
                Ok(Outcome {
                    id: row.get(0)?,
                    market_id: row.get(1)?,
                    name: row.get(2)?,
                    odds: row.get(3)?,
                    previous_odds: row.get(4)?,
                    is_winner: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(outcomes)
    }

    // ── Scraper runs ─────────────────────────────────────────────────────────

    pub fn insert_run(
        &self,
        job_type: JobType,
        source: Option<&str>,
        request_id: Option<&str>,
        started_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO scraper_runs (job_type, source, status, started_at, request_id)
             VALUES (?1, ?2, 'running', ?3, ?4)",
            params![job_type.as_str(), source, started_at, request_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn complete_run(
        &self,
        run_id: i64,
        status: RunStatus,
        completed_at: DateTime<Utc>,
        duration_ms: i64,
        processed: i64,
        created: i64,
        updated: i64,
        failed: i64,
        sport_stats: Option<&serde_json::Value>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE scraper_runs SET
                status=?1, completed_at=?2, duration_ms=?3,
                items_processed=?4, items_created=?5, items_updated=?6, items_failed=?7,
                sport_stats=?8, error_message=?9
             WHERE id = ?10",
            params![
                status.as_str(),
                completed_at,
                duration_ms,
                processed,
                created,
                updated,
                failed,
                sport_stats.map(|v| v.to_string()),
                error_message,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: i64) -> Result<Option<ScraperRun>> {
        let conn = self.conn.lock().unwrap();
        let run = conn
            .query_row(
                "SELECT id, job_type, source, status, started_at, completed_at, duration_ms,
                        items_processed, items_created, items_updated, items_failed,
                        sport_stats, error_message, request_id
                 FROM scraper_runs WHERE id = ?1",
                params![run_id],
                map_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Number of most-recent runs of this job type that failed, counted
    /// from the newest backwards until a non-failed run.
    pub fn consecutive_failed_runs(&self, job_type: JobType) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT status FROM scraper_runs
             WHERE job_type = ?1 AND status != 'running'
             ORDER BY started_at DESC, id DESC LIMIT 10",
        )?;
        let statuses: Vec<String> = stmt
            .query_map(params![job_type.as_str()], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(statuses.iter().take_while(|s| s.as_str() == "failed").count())
    }

    // ── Scraper alerts ───────────────────────────────────────────────────────

    pub fn insert_alert(
        &self,
        run_id: Option<i64>,
        alert_type: &str,
        severity: AlertSeverity,
        message: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO scraper_alerts (run_id, alert_type, severity, message, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                alert_type,
                severity.as_str(),
                message,
                metadata.map(|v| v.to_string()),
                Utc::now(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_alerts(&self, limit: i64) -> Result<Vec<ScraperAlert>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, run_id, alert_type, severity, message, metadata, created_at, acknowledged_at
             FROM scraper_alerts ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let alerts = stmt
            .query_map(params![limit], map_alert)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(alerts)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const SELECT_EVENT: &str = "SELECT id, sport_id, competition_id, competition_name,
        home_team_id, away_team_id, home_team_name, away_team_name,
        start_time, status, home_score, away_score, period, minute,
        created_at, updated_at
 FROM events";

fn map_sport(row: &rusqlite::Row) -> rusqlite::Result<Sport> {
    Ok(Sport {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        is_active: row.get(3)?,
    })
}

fn map_team(row: &rusqlite::Row) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn map_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
    let status_str: String = row.get(9)?;
    Ok(Event {
        id: row.get(0)?,
        sport_id: row.get(1)?,
        competition_id: row.get(2)?,
        competition_name: row.get(3)?,
        home_team_id: row.get(4)?,
        away_team_id: row.get(5)?,
        home_team_name: row.get(6)?,
        away_team_name: row.get(7)?,
        start_time: row.get(8)?,
        status: EventStatus::parse(&status_str).unwrap_or(EventStatus::Scheduled),
        home_score: row.get(10)?,
        away_score: row.get(11)?,
        period: row.get(12)?,
        minute: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn map_run(row: &rusqlite::Row) -> rusqlite::Result<ScraperRun> {
    let status_str: String = row.get(3)?;
    let status = match status_str.as_str() {
        "running" => RunStatus::Running,
        "success" => RunStatus::Success,
        "partial" => RunStatus::Partial,
        _ => RunStatus::Failed,
    };
    let stats_str: Option<String> = row.get(11)?;
    Ok(ScraperRun {
        id: row.get(0)?,
        job_type: row.get(1)?,
        source: row.get(2)?,
        status,
        started_at: row.get(4)?,
        completed_at: row.get(5)?,
        duration_ms: row.get(6)?,
        items_processed: row.get(7)?,
        items_created: row.get(8)?,
        items_updated: row.get(9)?,
        items_failed: row.get(10)?,
        sport_stats: stats_str.and_then(|s| serde_json::from_str(&s).ok()),
        error_message: row.get(12)?,
        request_id: row.get(13)?,
    })
}

fn map_alert(row: &rusqlite::Row) -> rusqlite::Result<ScraperAlert> {
    let severity_str: String = row.get(3)?;
    let severity = match severity_str.as_str() {
        "critical" => AlertSeverity::Critical,
        "warning" => AlertSeverity::Warning,
        _ => AlertSeverity::Info,
    };
    let metadata_str: Option<String> = row.get(5)?;
    Ok(ScraperAlert {
        id: row.get(0)?,
        run_id: row.get(1)?,
        alert_type: row.get(2)?,
        severity,
        message: row.get(4)?,
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(6)?,
        acknowledged_at: row.get(7)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sports (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    slug      TEXT    NOT NULL UNIQUE,
    name      TEXT    NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS competitions (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    sport_id INTEGER NOT NULL,
    name     TEXT    NOT NULL,
    UNIQUE (sport_id, name),
    FOREIGN KEY (sport_id) REFERENCES sports(id)
);

CREATE TABLE IF NOT EXISTS teams (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT    NOT NULL,
    created_at TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS team_aliases (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    team_id INTEGER NOT NULL,
    alias   TEXT    NOT NULL,
    source  TEXT    NOT NULL,
    UNIQUE (alias, source),
    FOREIGN KEY (team_id) REFERENCES teams(id)
);

CREATE TABLE IF NOT EXISTS events (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    sport_id                INTEGER NOT NULL,
    competition_id          INTEGER NOT NULL,
    competition_name        TEXT    NOT NULL,
    home_team_id            INTEGER NOT NULL,
    away_team_id            INTEGER NOT NULL,
    home_team_name          TEXT    NOT NULL,
    away_team_name          TEXT    NOT NULL,
    start_time              TEXT    NOT NULL,
    status                  TEXT    NOT NULL DEFAULT 'scheduled',
    home_score              INTEGER,
    away_score              INTEGER,
    period                  TEXT,
    minute                  INTEGER,
    external_sofascore_id   TEXT UNIQUE,
    external_espn_id        TEXT UNIQUE,
    external_365scores_id   TEXT UNIQUE,
    external_fotmob_id      TEXT UNIQUE,
    external_livescore_id   TEXT UNIQUE,
    external_flashscore_id  TEXT UNIQUE,
    external_oddsportal_id  TEXT UNIQUE,
    external_oddschecker_id TEXT UNIQUE,
    created_at              TEXT    NOT NULL,
    updated_at              TEXT    NOT NULL,
    FOREIGN KEY (sport_id) REFERENCES sports(id),
    FOREIGN KEY (competition_id) REFERENCES competitions(id),
    FOREIGN KEY (home_team_id) REFERENCES teams(id),
    FOREIGN KEY (away_team_id) REFERENCES teams(id)
);

CREATE TABLE IF NOT EXISTS markets (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id       INTEGER NOT NULL,
    kind           TEXT    NOT NULL,
    line           REAL,
    is_suspended   INTEGER NOT NULL DEFAULT 0,
    is_main_market INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (event_id) REFERENCES events(id)
);

CREATE TABLE IF NOT EXISTS outcomes (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    market_id     INTEGER NOT NULL,
    name          TEXT    NOT NULL,
    odds          REAL,
    previous_odds REAL,
    is_winner     INTEGER,
    FOREIGN KEY (market_id) REFERENCES markets(id)
);

CREATE TABLE IF NOT EXISTS scraper_runs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    job_type        TEXT    NOT NULL,
    source          TEXT,
    status          TEXT    NOT NULL DEFAULT 'running',
    started_at      TEXT    NOT NULL,
    completed_at    TEXT,
    duration_ms     INTEGER,
    items_processed INTEGER NOT NULL DEFAULT 0,
    items_created   INTEGER NOT NULL DEFAULT 0,
    items_updated   INTEGER NOT NULL DEFAULT 0,
    items_failed    INTEGER NOT NULL DEFAULT 0,
    sport_stats     TEXT,
    error_message   TEXT,
    request_id      TEXT
);

CREATE TABLE IF NOT EXISTS scraper_alerts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id          INTEGER,
    alert_type      TEXT    NOT NULL,
    severity        TEXT    NOT NULL,
    message         TEXT    NOT NULL,
    metadata        TEXT,
    created_at      TEXT    NOT NULL,
    acknowledged_at TEXT,
    FOREIGN KEY (run_id) REFERENCES scraper_runs(id)
);

CREATE INDEX IF NOT EXISTS idx_events_status ON events(status);
CREATE INDEX IF NOT EXISTS idx_events_sport_start ON events(sport_id, start_time);
CREATE INDEX IF NOT EXISTS idx_aliases_team ON team_aliases(team_id);
CREATE INDEX IF NOT EXISTS idx_markets_event ON markets(event_id);
CREATE INDEX IF NOT EXISTS idx_outcomes_market ON outcomes(market_id);
CREATE INDEX IF NOT EXISTS idx_runs_job_type ON scraper_runs(job_type, started_at);
CREATE INDEX IF NOT EXISTS idx_alerts_created ON scraper_alerts(created_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_event(db: &Database, home: &str, away: &str, start: DateTime<Utc>) -> i64 {
        let sport_id = db.upsert_sport("football", "Football").unwrap();
        let comp_id = db.find_or_create_competition(sport_id, "Premier League").unwrap();
        let home_id = db.insert_team(home).unwrap();
        let away_id = db.insert_team(away).unwrap();
        db.insert_event(&NewEvent {
            sport_id,
            competition_id: comp_id,
            competition_name: "Premier League".into(),
            home_team_id: home_id,
            away_team_id: away_id,
            home_team_name: home.into(),
            away_team_name: away.into(),
            start_time: start,
            source: Source::Flashscore,
            external_id: format!("{}-{}", home, away),
        })
        .unwrap()
    }

    #[test]
    fn test_insert_event_creates_default_market() {
        let db = db();
        let event_id = seed_event(&db, "Arsenal", "Chelsea", Utc::now());
        let market_id = db.main_market_id(event_id).unwrap().unwrap();
        let outcomes = db.list_outcomes(market_id).unwrap();
        let names: Vec<&str> = outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["1", "X", "2"]);
        assert!(outcomes.iter().all(|o| o.odds.is_none()));
    }

    #[test]
    fn test_external_id_lookup_and_attach() {
        let db = db();
        let event_id = seed_event(&db, "Arsenal", "Chelsea", Utc::now());
        let found = db
            .find_event_by_external_id(Source::Flashscore, "Arsenal-Chelsea")
            .unwrap();
        assert_eq!(found, Some(event_id));

        db.set_external_id(event_id, Source::Oddschecker, "XYZ").unwrap();
        assert_eq!(
            db.find_event_by_external_id(Source::Oddschecker, "XYZ").unwrap(),
            Some(event_id)
        );
        assert_eq!(
            db.first_external_source(event_id).unwrap(),
            Some("flashscore".to_string())
        );
    }

    #[test]
    fn test_status_transition_enforces_dag() {
        let db = db();
        let event_id = seed_event(&db, "Arsenal", "Chelsea", Utc::now());

        // scheduled -> finished is not an edge
        assert!(!db.update_event_status(event_id, EventStatus::Finished).unwrap());
        assert!(db.update_event_status(event_id, EventStatus::Live).unwrap());
        assert!(db.update_event_status(event_id, EventStatus::Finished).unwrap());
        // finished is terminal
        assert!(!db.update_event_status(event_id, EventStatus::Live).unwrap());
    }

    #[test]
    fn test_scores_rejected_while_scheduled() {
        let db = db();
        let event_id = seed_event(&db, "Arsenal", "Chelsea", Utc::now());
        assert!(!db.update_live_score(event_id, 1, 0, Some("1H"), Some(12)).unwrap());

        db.update_event_status(event_id, EventStatus::Live).unwrap();
        assert!(db.update_live_score(event_id, 1, 0, Some("1H"), Some(12)).unwrap());

        let ev = db.get_event(event_id).unwrap().unwrap();
        assert_eq!(ev.home_score, Some(1));
        assert_eq!(ev.minute, Some(12));
    }

    #[test]
    fn test_transition_due_events_flips_only_past_start() {
        let db = db();
        let past = seed_event(&db, "Arsenal", "Chelsea", Utc::now() - Duration::minutes(5));
        let future = seed_event(&db, "Liverpool", "Everton", Utc::now() + Duration::hours(3));

        let changed = db.transition_due_events(Utc::now()).unwrap();
        assert_eq!(changed, 1);
        assert_eq!(db.get_event(past).unwrap().unwrap().status, EventStatus::Live);
        assert_eq!(
            db.get_event(future).unwrap().unwrap().status,
            EventStatus::Scheduled
        );
    }

    #[test]
    fn test_alias_duplicate_insert_is_swallowed() {
        let db = db();
        let team_id = db.insert_team("Arsenal").unwrap();
        db.insert_alias(team_id, "The Arsenal", "flashscore").unwrap();
        db.insert_alias(team_id, "The Arsenal", "flashscore").unwrap();
        assert_eq!(db.list_aliases_for_team(team_id).unwrap().len(), 1);
        assert_eq!(
            db.find_team_by_alias("The Arsenal", "flashscore").unwrap(),
            Some(team_id)
        );
    }

    #[test]
    fn test_outcome_odds_movement() {
        let db = db();
        let event_id = seed_event(&db, "Arsenal", "Chelsea", Utc::now());
        let market_id = db.main_market_id(event_id).unwrap().unwrap();

        db.update_outcome_odds(market_id, "1", 2.10).unwrap();
        db.update_outcome_odds(market_id, "1", 1.95).unwrap();

        let outcomes = db.list_outcomes(market_id).unwrap();
        let home = outcomes.iter().find(|o| o.name == "1").unwrap();
        assert_eq!(home.odds, Some(1.95));
        assert_eq!(home.previous_odds, Some(2.10));
    }

    #[test]
    fn test_consecutive_failed_runs_counts_leading_failures() {
        let db = db();
        let t0 = Utc::now() - Duration::minutes(30);
        for (i, status) in [RunStatus::Success, RunStatus::Failed, RunStatus::Failed]
            .iter()
            .enumerate()
        {
            let started = t0 + Duration::minutes(i as i64);
            let id = db
                .insert_run(JobType::SyncFixtures, None, None, started)
                .unwrap();
            db.complete_run(id, *status, started, 100, 0, 0, 0, 0, None, None)
                .unwrap();
        }
        assert_eq!(db.consecutive_failed_runs(JobType::SyncFixtures).unwrap(), 2);
        // A different job type is unaffected
        assert_eq!(db.consecutive_failed_runs(JobType::SyncOdds).unwrap(), 0);
    }
}
