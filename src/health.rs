//! Per-source health tracking and bot-detection classification.
//!
//! Sources fail in two distinct ways: transient errors and active blocking
//! (bot walls, rate limiting). The tracker keeps sliding failure counters
//! per source, assigns randomized cooldowns when a source goes down, and
//! emits deduplicated alerts at the state-machine crossings. All state is
//! in-memory and rebuilt on each invocation.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use tracing::{info, warn};

use crate::store::models::AlertSeverity;

/// Consecutive failures at which a source is degraded / down.
pub const DEGRADED_THRESHOLD: u32 = 2;
pub const DOWN_THRESHOLD: u32 = 5;

/// Cooldown assigned when a source goes down, uniform in this range.
pub const COOLDOWN_MIN_MINUTES: i64 = 8;
pub const COOLDOWN_MAX_MINUTES: i64 = 15;

/// The same (alert_type, source) pair is not re-emitted within this window.
pub const ALERT_DEDUP_MINUTES: i64 = 30;

const RECENT_REASONS_KEPT: usize = 10;

/// HTTP statuses treated as blocking regardless of body.
const BLOCKING_STATUSES: &[u16] = &[403, 429, 503];

/// Body fragments that mark a response as a bot wall (closed set,
/// case-insensitive).
const BLOCKING_PATTERNS: &[&str] = &[
    "access denied",
    "blocked",
    "captcha",
    "cloudflare",
    "please verify",
    "rate limit",
    "too many requests",
    "robot check",
    "unusual traffic",
    "automated access",
    "bot detection",
];

/// Classify a response as blocked vs. merely unsuccessful.
pub fn is_blocked_response(status: Option<u16>, body: &str) -> bool {
    if let Some(code) = status {
        if BLOCKING_STATUSES.contains(&code) {
            return true;
        }
    }
    let lower = body.to_lowercase();
    BLOCKING_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Healthy,
    Degraded,
    Down,
    Cooldown,
}

#[derive(Debug, Clone, Default)]
struct SourceHealth {
    consecutive_failures: u32,
    last_success_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    marked_down_at: Option<DateTime<Utc>>,
    cooldown: Option<Duration>,
    recent_reasons: VecDeque<String>,
}

/// An alert produced by a threshold crossing; the caller persists it.
#[derive(Debug, Clone)]
pub struct HealthAlert {
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub source: String,
    pub message: String,
}

pub struct SourceHealthTracker {
    sources: HashMap<String, SourceHealth>,
    /// (alert_type, source) -> last emission, for dedup.
    alert_emitted: HashMap<(String, String), DateTime<Utc>>,
}

impl SourceHealthTracker {
    pub fn new() -> Self {
        SourceHealthTracker {
            sources: HashMap::new(),
            alert_emitted: HashMap::new(),
        }
    }

    /// A successful scrape clears the counters and any cooldown.
    pub fn record_success(&mut self, source: &str) {
        self.record_success_at(source, Utc::now())
    }

    pub fn record_success_at(&mut self, source: &str, now: DateTime<Utc>) {
        let health = self.sources.entry(source.to_string()).or_default();
        health.consecutive_failures = 0;
        health.last_success_at = Some(now);
        health.marked_down_at = None;
        health.cooldown = None;
    }

    /// Record a failed attempt. Returns an alert when a threshold is
    /// crossed (and the dedup window allows emission).
    pub fn record_failure(&mut self, source: &str, reason: &str) -> Option<HealthAlert> {
        self.record_failure_at(source, reason, Utc::now())
    }

    pub fn record_failure_at(
        &mut self,
        source: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Option<HealthAlert> {
        let health = self.sources.entry(source.to_string()).or_default();
        health.consecutive_failures += 1;
        health.last_failure_at = Some(now);
        health.recent_reasons.push_back(reason.to_string());
        while health.recent_reasons.len() > RECENT_REASONS_KEPT {
            health.recent_reasons.pop_front();
        }

        let consecutive = health.consecutive_failures;

        if consecutive >= DOWN_THRESHOLD {
            let cooldown_expired = match (health.marked_down_at, health.cooldown) {
                (Some(at), Some(cd)) => now >= at + cd,
                _ => true,
            };
            if cooldown_expired {
                // First crossing, or the single post-cooldown retry failed:
                // (re)assign a fresh randomized cooldown.
                let minutes =
                    rand::thread_rng().gen_range(COOLDOWN_MIN_MINUTES..=COOLDOWN_MAX_MINUTES);
                health.marked_down_at = Some(now);
                health.cooldown = Some(Duration::minutes(minutes));
                warn!(
                    "Source '{}' down after {} consecutive failures, cooling for {}m: {}",
                    source, consecutive, minutes, reason
                );
            }
            if consecutive == DOWN_THRESHOLD {
                return self.emit(
                    "source_down",
                    AlertSeverity::Critical,
                    source,
                    &format!(
                        "Source '{}' is down after {} consecutive failures (last: {})",
                        source, consecutive, reason
                    ),
                    now,
                );
            }
            return None;
        }

        if consecutive == DEGRADED_THRESHOLD {
            info!(
                "Source '{}' degraded ({} consecutive failures): {}",
                source, consecutive, reason
            );
            return self.emit(
                "source_degraded",
                AlertSeverity::Warning,
                source,
                &format!(
                    "Source '{}' is degraded after {} consecutive failures (last: {})",
                    source, consecutive, reason
                ),
                now,
            );
        }

        None
    }

    /// True iff the source has crossed the down threshold AND is inside its
    /// cooldown window. Crossing the cooldown edge does not clear the down
    /// state; it allows exactly one retry.
    pub fn is_source_down(&self, source: &str) -> bool {
        self.is_source_down_at(source, Utc::now())
    }

    pub fn is_source_down_at(&self, source: &str, now: DateTime<Utc>) -> bool {
        let Some(health) = self.sources.get(source) else {
            return false;
        };
        if health.consecutive_failures < DOWN_THRESHOLD {
            return false;
        }
        match (health.marked_down_at, health.cooldown) {
            (Some(at), Some(cd)) => now < at + cd,
            _ => false,
        }
    }

    pub fn state(&self, source: &str) -> SourceState {
        self.state_at(source, Utc::now())
    }

    pub fn state_at(&self, source: &str, now: DateTime<Utc>) -> SourceState {
        let Some(health) = self.sources.get(source) else {
            return SourceState::Healthy;
        };
        match health.consecutive_failures {
            c if c >= DOWN_THRESHOLD => {
                if self.is_source_down_at(source, now) {
                    SourceState::Cooldown
                } else {
                    SourceState::Down
                }
            }
            c if c >= DEGRADED_THRESHOLD => SourceState::Degraded,
            _ => SourceState::Healthy,
        }
    }

    pub fn consecutive_failures(&self, source: &str) -> u32 {
        self.sources
            .get(source)
            .map(|h| h.consecutive_failures)
            .unwrap_or(0)
    }

    pub fn recent_reasons(&self, source: &str) -> Vec<String> {
        self.sources
            .get(source)
            .map(|h| h.recent_reasons.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn emit(
        &mut self,
        alert_type: &str,
        severity: AlertSeverity,
        source: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Option<HealthAlert> {
        let key = (alert_type.to_string(), source.to_string());
        if let Some(last) = self.alert_emitted.get(&key) {
            if now - *last < Duration::minutes(ALERT_DEDUP_MINUTES) {
                return None;
            }
        }
        self.alert_emitted.insert(key, now);
        Some(HealthAlert {
            alert_type: alert_type.to_string(),
            severity,
            source: source.to_string(),
            message: message.to_string(),
        })
    }
}

impl Default for SourceHealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_classifier_statuses() {
        assert!(is_blocked_response(Some(403), ""));
        assert!(is_blocked_response(Some(429), ""));
        assert!(is_blocked_response(Some(503), ""));
        assert!(!is_blocked_response(Some(500), ""));
        assert!(!is_blocked_response(Some(200), "all good"));
    }

    #[test]
    fn test_blocking_classifier_body_patterns() {
        assert!(is_blocked_response(Some(200), "Checking your browser... Cloudflare"));
        assert!(is_blocked_response(None, "Please complete the CAPTCHA to continue"));
        assert!(is_blocked_response(Some(200), "We detected UNUSUAL TRAFFIC from your network"));
        assert!(!is_blocked_response(Some(200), "<html>match report</html>"));
    }

    #[test]
    fn test_five_failures_mark_source_down_for_cooldown_window() {
        let mut tracker = SourceHealthTracker::new();
        let t0 = Utc::now();
        for i in 0..5 {
            tracker.record_failure_at("flashscore", "HTTP 503", t0 + Duration::seconds(i));
        }
        assert!(tracker.is_source_down_at("flashscore", t0 + Duration::seconds(5)));
        // Cooldown is at least 8 minutes
        assert!(tracker.is_source_down_at("flashscore", t0 + Duration::minutes(7)));
        // And at most 15
        assert!(!tracker.is_source_down_at("flashscore", t0 + Duration::minutes(16)));
    }

    #[test]
    fn test_single_success_returns_source_to_healthy() {
        let mut tracker = SourceHealthTracker::new();
        let t0 = Utc::now();
        for i in 0..6 {
            tracker.record_failure_at("espn", "timeout", t0 + Duration::seconds(i));
        }
        assert!(tracker.is_source_down_at("espn", t0 + Duration::minutes(1)));

        tracker.record_success_at("espn", t0 + Duration::minutes(1));
        assert!(!tracker.is_source_down_at("espn", t0 + Duration::minutes(1)));
        assert_eq!(tracker.consecutive_failures("espn"), 0);
        assert_eq!(tracker.state_at("espn", t0 + Duration::minutes(1)), SourceState::Healthy);
    }

    #[test]
    fn test_cooldown_expiry_allows_one_retry_then_reassigns() {
        let mut tracker = SourceHealthTracker::new();
        let t0 = Utc::now();
        for i in 0..5 {
            tracker.record_failure_at("sofascore", "blocked", t0 + Duration::seconds(i));
        }
        // Past the maximum cooldown the source is eligible for one retry
        let after = t0 + Duration::minutes(20);
        assert!(!tracker.is_source_down_at("sofascore", after));
        assert_eq!(tracker.state_at("sofascore", after), SourceState::Down);

        // The retry fails: a fresh cooldown window opens from that moment
        tracker.record_failure_at("sofascore", "blocked again", after);
        assert!(tracker.is_source_down_at("sofascore", after + Duration::minutes(1)));
    }

    #[test]
    fn test_degraded_warning_then_down_critical() {
        let mut tracker = SourceHealthTracker::new();
        let t0 = Utc::now();

        assert!(tracker.record_failure_at("fotmob", "e1", t0).is_none());
        let warn = tracker.record_failure_at("fotmob", "e2", t0 + Duration::seconds(1));
        assert_eq!(warn.as_ref().map(|a| a.severity), Some(AlertSeverity::Warning));
        assert_eq!(warn.unwrap().alert_type, "source_degraded");

        assert!(tracker.record_failure_at("fotmob", "e3", t0 + Duration::seconds(2)).is_none());
        assert!(tracker.record_failure_at("fotmob", "e4", t0 + Duration::seconds(3)).is_none());
        let crit = tracker.record_failure_at("fotmob", "e5", t0 + Duration::seconds(4));
        assert_eq!(crit.as_ref().map(|a| a.severity), Some(AlertSeverity::Critical));
        assert_eq!(crit.unwrap().alert_type, "source_down");
    }

    #[test]
    fn test_alert_dedup_within_window() {
        let mut tracker = SourceHealthTracker::new();
        let t0 = Utc::now();

        tracker.record_failure_at("espn", "e1", t0);
        let first = tracker.record_failure_at("espn", "e2", t0 + Duration::seconds(1));
        assert!(first.is_some());

        // Reset via success, then degrade again inside the 30m dedup window
        tracker.record_success_at("espn", t0 + Duration::minutes(5));
        tracker.record_failure_at("espn", "e3", t0 + Duration::minutes(6));
        let suppressed = tracker.record_failure_at("espn", "e4", t0 + Duration::minutes(7));
        assert!(suppressed.is_none());

        // Outside the window the alert fires again
        tracker.record_success_at("espn", t0 + Duration::minutes(40));
        tracker.record_failure_at("espn", "e5", t0 + Duration::minutes(41));
        let again = tracker.record_failure_at("espn", "e6", t0 + Duration::minutes(42));
        assert!(again.is_some());
    }

    #[test]
    fn test_recent_reasons_bounded_to_ten() {
        let mut tracker = SourceHealthTracker::new();
        let t0 = Utc::now();
        for i in 0..15 {
            tracker.record_failure_at("livescore", &format!("err {}", i), t0);
        }
        let reasons = tracker.recent_reasons("livescore");
        assert_eq!(reasons.len(), 10);
        assert_eq!(reasons[0], "err 5");
        assert_eq!(reasons[9], "err 14");
    }

    #[test]
    fn test_unknown_source_is_healthy() {
        let tracker = SourceHealthTracker::new();
        assert!(!tracker.is_source_down("nowhere"));
        assert_eq!(tracker.state("nowhere"), SourceState::Healthy);
    }
}
