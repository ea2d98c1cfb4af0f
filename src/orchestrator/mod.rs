//! Source orchestration: rotation, health-aware skipping, and early exit.
//!
//! All three orchestrators share the same shape: an ordered list of source
//! entries, traversed sequentially (parallel fan-out would waste the early
//! exit and multiply detection risk), with per-attempt success/failure fed
//! back into the health tracker and proxy manager.

pub mod fixtures;
pub mod live_scores;
pub mod odds;

pub use fixtures::{FixtureSource, FixturesOrchestrator, FixturesOutcome};
pub use live_scores::{LiveScoresOrchestrator, LiveScoresOutcome, LiveSource};
pub use odds::{OddsOrchestrator, OddsOutcome, OddsSource};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;

use crate::proxy::ProxyConfig;
use crate::scrapers::page::Page;

/// Static description of one source in a rotation.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub name: &'static str,
    /// Lower is tried earlier; ties broken least-recently-used.
    pub priority: u8,
    pub needs_proxy: bool,
    /// DOM sources need a page from the factory.
    pub needs_page: bool,
    /// Free sources are allowed to satisfy the early-exit rule.
    pub free: bool,
}

/// Per-attempt resources handed to a source builder.
pub struct SourceContext {
    pub proxy: Option<ProxyConfig>,
    pub page: Option<Box<dyn Page>>,
}

/// Outcome of one source attempt, for run stats.
#[derive(Debug, Clone)]
pub struct SourceAttempt {
    pub source: String,
    pub ok: bool,
    pub items: usize,
    pub error: Option<String>,
}

/// Least-recently-used ordering with jitter.
///
/// Sources at equal priority are ordered by last use, with ±30s of random
/// noise so the visit pattern does not repeat exactly each tick.
pub struct Rotation {
    last_used: HashMap<&'static str, DateTime<Utc>>,
}

impl Rotation {
    pub fn new() -> Self {
        Rotation {
            last_used: HashMap::new(),
        }
    }

    pub fn touch(&mut self, name: &'static str) {
        self.last_used.insert(name, Utc::now());
    }

    /// Indices of `entries` in visit order.
    pub fn order(&self, entries: &[SourceEntry]) -> Vec<usize> {
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let mut keyed: Vec<(u8, DateTime<Utc>, usize)> = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let used = *self.last_used.get(entry.name).unwrap_or(&epoch);
                let jitter = Duration::seconds(rand::thread_rng().gen_range(-30..=30));
                (entry.priority, used + jitter, i)
            })
            .collect();
        keyed.sort_by_key(|(priority, used, _)| (*priority, *used));
        keyed.into_iter().map(|(_, _, i)| i).collect()
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &'static str, priority: u8) -> SourceEntry {
        SourceEntry {
            name,
            priority,
            needs_proxy: false,
            needs_page: false,
            free: true,
        }
    }

    #[test]
    fn test_priority_dominates_order() {
        let rotation = Rotation::new();
        let entries = vec![entry("slow", 2), entry("fast", 1)];
        let order = rotation.order(&entries);
        assert_eq!(order[0], 1);
        assert_eq!(order[1], 0);
    }

    #[test]
    fn test_recently_used_source_rotates_to_back() {
        let mut rotation = Rotation::new();
        let entries = vec![entry("a", 1), entry("b", 1)];

        // "a" was just used; jitter (±30s) cannot outweigh the gap to the
        // never-used "b".
        rotation.last_used.insert("a", Utc::now());
        let order = rotation.order(&entries);
        assert_eq!(order[0], 1, "least-recently-used source should go first");
    }
}
