//! Per-invocation run log and alert emission.
//!
//! Every job inserts a `running` row at start, accumulates per-sport
//! counters while it works, and finishes the row as success / partial /
//! failed. Threshold crossings (low fixture count, high error rate,
//! repeated failed runs) become rows in `scraper_alerts` for the
//! dashboards.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::health::HealthAlert;
use crate::store::models::{AlertSeverity, JobType, RunStatus};
use crate::store::Database;

/// Error-rate ceiling before a warning alert fires.
pub const ERROR_RATE_ALERT_THRESHOLD: f64 = 0.10;
/// Consecutive failed runs of one job type before a critical alert.
pub const CONSECUTIVE_FAILED_RUNS_ALERT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Created,
    Updated,
    Failed,
    /// Processed but nothing written (e.g. odds row with no matching event).
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SportStats {
    pub processed: i64,
    pub created: i64,
    pub updated: i64,
    pub failed: i64,
}

pub struct RunTracker {
    db: Database,
    run_id: i64,
    job_type: JobType,
    started_at: DateTime<Utc>,
    sport_stats: BTreeMap<String, SportStats>,
}

impl RunTracker {
    /// Insert the `running` row and return the tracker.
    pub fn start(
        db: Database,
        job_type: JobType,
        source: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<Self> {
        let started_at = Utc::now();
        let run_id = db.insert_run(job_type, source, request_id, started_at)?;
        info!("Run {} started ({})", run_id, job_type.as_str());
        Ok(RunTracker {
            db,
            run_id,
            job_type,
            started_at,
            sport_stats: BTreeMap::new(),
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn record(&mut self, sport: &str, outcome: ItemOutcome) {
        self.record_many(sport, outcome, 1);
    }

    pub fn record_many(&mut self, sport: &str, outcome: ItemOutcome, count: i64) {
        let stats = self.sport_stats.entry(sport.to_string()).or_default();
        stats.processed += count;
        match outcome {
            ItemOutcome::Created => stats.created += count,
            ItemOutcome::Updated => stats.updated += count,
            ItemOutcome::Failed => stats.failed += count,
            ItemOutcome::Skipped => {}
        }
    }

    fn totals(&self) -> SportStats {
        let mut total = SportStats::default();
        for stats in self.sport_stats.values() {
            total.processed += stats.processed;
            total.created += stats.created;
            total.updated += stats.updated;
            total.failed += stats.failed;
        }
        total
    }

    /// Persist alerts surfaced by the health tracker during this run.
    pub fn record_health_alerts(&self, alerts: &[HealthAlert]) -> Result<()> {
        for alert in alerts {
            let metadata = serde_json::json!({ "source": alert.source });
            self.db.insert_alert(
                Some(self.run_id),
                &alert.alert_type,
                alert.severity,
                &alert.message,
                Some(&metadata),
            )?;
        }
        Ok(())
    }

    /// Alert when a sport's fixture harvest lands below its expected floor.
    pub fn check_fixture_floor(&self, sport: &str, count: usize, floor: usize) -> Result<()> {
        if count >= floor {
            return Ok(());
        }
        warn!(
            "Low fixture count for {}: {} (expected at least {})",
            sport, count, floor
        );
        let metadata = serde_json::json!({ "sport": sport, "count": count, "floor": floor });
        self.db.insert_alert(
            Some(self.run_id),
            "low_fixture_count",
            AlertSeverity::Warning,
            &format!(
                "Only {} fixtures harvested for {} (expected at least {})",
                count, sport, floor
            ),
            Some(&metadata),
        )?;
        Ok(())
    }

    /// Close the run as success (no failures) or partial (some items
    /// failed), emitting the error-rate alert when warranted.
    pub fn complete(self) -> Result<RunStatus> {
        let totals = self.totals();
        let status = if totals.failed == 0 {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };
        let completed_at = Utc::now();
        let duration_ms = (completed_at - self.started_at).num_milliseconds();
        let stats_json = serde_json::to_value(&self.sport_stats)?;

        self.db.complete_run(
            self.run_id,
            status,
            completed_at,
            duration_ms,
            totals.processed,
            totals.created,
            totals.updated,
            totals.failed,
            Some(&stats_json),
            None,
        )?;
        info!(
            "Run {} finished {} ({} processed, {} created, {} updated, {} failed, {}ms)",
            self.run_id,
            status.as_str(),
            totals.processed,
            totals.created,
            totals.updated,
            totals.failed,
            duration_ms
        );

        if totals.processed > 0 {
            let error_rate = totals.failed as f64 / totals.processed as f64;
            if error_rate > ERROR_RATE_ALERT_THRESHOLD {
                let metadata = serde_json::json!({
                    "failed": totals.failed,
                    "processed": totals.processed,
                });
                self.db.insert_alert(
                    Some(self.run_id),
                    "high_error_rate",
                    AlertSeverity::Warning,
                    &format!(
                        "{} of {} items failed in {} run",
                        totals.failed,
                        totals.processed,
                        self.job_type.as_str()
                    ),
                    Some(&metadata),
                )?;
            }
        }
        Ok(status)
    }

    /// Close the run as failed; emits the consecutive-failures alert once
    /// the same job type has failed three times in a row.
    pub fn fail(self, err: &anyhow::Error) -> Result<()> {
        let totals = self.totals();
        let completed_at = Utc::now();
        let duration_ms = (completed_at - self.started_at).num_milliseconds();
        let stats_json = serde_json::to_value(&self.sport_stats)?;

        error!("Run {} failed: {:#}", self.run_id, err);
        self.db.complete_run(
            self.run_id,
            RunStatus::Failed,
            completed_at,
            duration_ms,
            totals.processed,
            totals.created,
            totals.updated,
            totals.failed,
            Some(&stats_json),
            Some(&format!("{:#}", err)),
        )?;

        let consecutive = self.db.consecutive_failed_runs(self.job_type)?;
        if consecutive >= CONSECUTIVE_FAILED_RUNS_ALERT {
            let metadata = serde_json::json!({
                "job_type": self.job_type.as_str(),
                "consecutive": consecutive,
            });
            self.db.insert_alert(
                Some(self.run_id),
                "consecutive_failed_runs",
                AlertSeverity::Critical,
                &format!(
                    "{} has failed {} times in a row",
                    self.job_type.as_str(),
                    consecutive
                ),
                Some(&metadata),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_clean_run_completes_as_success() {
        let db = db();
        let mut tracker =
            RunTracker::start(db.clone(), JobType::SyncLiveScores, None, Some("req-1")).unwrap();
        tracker.record("football", ItemOutcome::Updated);
        tracker.record("football", ItemOutcome::Updated);
        let run_id = tracker.run_id();

        assert_eq!(tracker.complete().unwrap(), RunStatus::Success);

        let run = db.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.items_processed, 2);
        assert_eq!(run.items_updated, 2);
        assert_eq!(run.request_id.as_deref(), Some("req-1"));
        assert!(run.sport_stats.is_some());
    }

    #[test]
    fn test_item_failures_make_run_partial_with_error_rate_alert() {
        let db = db();
        let mut tracker = RunTracker::start(db.clone(), JobType::SyncOdds, None, None).unwrap();
        for _ in 0..8 {
            tracker.record("football", ItemOutcome::Updated);
        }
        tracker.record("football", ItemOutcome::Failed);
        tracker.record("football", ItemOutcome::Failed);

        assert_eq!(tracker.complete().unwrap(), RunStatus::Partial);

        let alerts = db.list_alerts(10).unwrap();
        assert!(alerts.iter().any(|a| a.alert_type == "high_error_rate"));
    }

    #[test]
    fn test_low_error_rate_emits_no_alert() {
        let db = db();
        let mut tracker = RunTracker::start(db.clone(), JobType::SyncOdds, None, None).unwrap();
        for _ in 0..19 {
            tracker.record("football", ItemOutcome::Updated);
        }
        tracker.record("football", ItemOutcome::Failed);

        assert_eq!(tracker.complete().unwrap(), RunStatus::Partial);
        assert!(db.list_alerts(10).unwrap().is_empty());
    }

    #[test]
    fn test_third_consecutive_failure_alerts() {
        let db = db();
        let err = anyhow::anyhow!("store unreachable");
        for i in 0..3 {
            let tracker = RunTracker::start(db.clone(), JobType::SyncFixtures, None, None).unwrap();
            tracker.fail(&err).unwrap();
            let alerts = db.list_alerts(10).unwrap();
            let fired = alerts
                .iter()
                .any(|a| a.alert_type == "consecutive_failed_runs");
            assert_eq!(fired, i == 2, "alert should fire only on the third failure");
        }
    }

    #[test]
    fn test_fixture_floor_alert() {
        let db = db();
        let tracker = RunTracker::start(db.clone(), JobType::SyncFixtures, None, None).unwrap();
        tracker.check_fixture_floor("football", 4, 20).unwrap();
        tracker.check_fixture_floor("tennis", 5, 3).unwrap();

        let alerts = db.list_alerts(10).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "low_fixture_count");
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
    }

    #[test]
    fn test_health_alerts_are_persisted_with_run_id() {
        let db = db();
        let tracker = RunTracker::start(db.clone(), JobType::SyncLiveScores, None, None).unwrap();
        tracker
            .record_health_alerts(&[HealthAlert {
                alert_type: "source_down".into(),
                severity: AlertSeverity::Critical,
                source: "flashscore".into(),
                message: "down".into(),
            }])
            .unwrap();

        let alerts = db.list_alerts(10).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].run_id, Some(tracker.run_id()));
    }
}
