//! Transition job: flip scheduled events whose start time has passed to
//! live, in a single statement.

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::config::Config;
use crate::run_tracker::{ItemOutcome, RunTracker};
use crate::store::models::JobType;
use crate::store::Database;

pub async fn run(config: &Config, db: &Database) -> Result<()> {
    let mut tracker = RunTracker::start(
        db.clone(),
        JobType::TransitionEvents,
        None,
        config.request_id.as_deref(),
    )?;
    match db.transition_due_events(Utc::now()) {
        Ok(count) => {
            if count > 0 {
                info!("Transitioned {} event(s) to live", count);
            }
            tracker.record_many("all", ItemOutcome::Updated, count as i64);
            tracker.complete()?;
            Ok(())
        }
        Err(err) => {
            tracker.fail(&err)?;
            Err(err)
        }
    }
}
