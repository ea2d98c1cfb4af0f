//! Fixtures rotation: primary source with fallback below a per-sport
//! minimum, optional multi-source merge, hard per-scraper timeout.

use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Rotation, SourceAttempt, SourceContext, SourceEntry};
use crate::error::ScrapeError;
use crate::health::{HealthAlert, SourceHealthTracker};
use crate::matching::dedup::fixture_merge_key;
use crate::matching::ScrapedFixture;
use crate::proxy::ProxyManager;
use crate::scrapers::page::PageFactory;
use crate::scrapers::{jitter_delay, FixturesScraper};

/// Each scraper call races this hard deadline.
pub const SCRAPER_TIMEOUT: Duration = Duration::from_secs(120);

type FixturesBuilder =
    Box<dyn Fn(SourceContext) -> Result<Box<dyn FixturesScraper>, ScrapeError> + Send + Sync>;

pub struct FixtureSource {
    pub entry: SourceEntry,
    pub build: FixturesBuilder,
}

#[derive(Debug, Default)]
pub struct FixturesOutcome {
    pub fixtures: Vec<ScrapedFixture>,
    pub alerts: Vec<HealthAlert>,
    pub attempts: Vec<SourceAttempt>,
}

pub struct FixturesOrchestrator {
    sources: Vec<FixtureSource>,
    rotation: Rotation,
    /// When set, keep visiting sources and merge their lists instead of
    /// stopping at the first sufficient one.
    merge_sources: bool,
}

impl FixturesOrchestrator {
    pub fn new(sources: Vec<FixtureSource>) -> Self {
        FixturesOrchestrator {
            sources,
            rotation: Rotation::new(),
            merge_sources: false,
        }
    }

    pub fn with_merge(mut self) -> Self {
        self.merge_sources = true;
        self
    }

    /// Fetch upcoming fixtures for one sport. The primary source is tried
    /// first; a fallback is consulted when it yields fewer than `minimum`
    /// rows. Merged lists are deduplicated on (sport, normalized teams,
    /// start-hour bucket), earlier sources winning.
    pub async fn run(
        &mut self,
        sport: &str,
        days: u32,
        minimum: usize,
        health: &mut SourceHealthTracker,
        proxies: &mut ProxyManager,
        page_factory: Option<&dyn PageFactory>,
    ) -> FixturesOutcome {
        let mut outcome = FixturesOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        let entries: Vec<SourceEntry> = self.sources.iter().map(|s| s.entry.clone()).collect();
        for idx in self.rotation.order(&entries) {
            if !self.merge_sources && outcome.fixtures.len() >= minimum {
                break;
            }
            let source = &self.sources[idx];
            let name = source.entry.name;

            if health.is_source_down(name) {
                debug!("Skipping '{}' (cooling down)", name);
                continue;
            }
            if source.entry.needs_proxy && !proxies.has_providers() {
                continue;
            }
            if source.entry.needs_page && page_factory.is_none() {
                continue;
            }

            let proxy = if source.entry.needs_proxy {
                match proxies.get_proxy() {
                    Some(p) => Some(p),
                    None => continue,
                }
            } else {
                None
            };
            let page = match (source.entry.needs_page, page_factory) {
                (true, Some(factory)) => match factory.open().await {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!("Page open failed for '{}': {}", name, e);
                        if let Some(alert) = health.record_failure(name, &e.to_string()) {
                            outcome.alerts.push(alert);
                        }
                        continue;
                    }
                },
                _ => None,
            };

            jitter_delay(200, 1500).await;
            self.rotation.touch(name);

            let attempt = async {
                let scraper = (source.build)(SourceContext {
                    proxy: proxy.clone(),
                    page,
                })?;
                // Race the scraper against the hard deadline; a hung page
                // must not stall the whole job.
                match tokio::time::timeout(SCRAPER_TIMEOUT, scraper.fetch_fixtures(sport, days))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ScrapeError::Timeout(SCRAPER_TIMEOUT)),
                }
            }
            .await;

            match attempt {
                Ok(rows) => {
                    let mut added = 0usize;
                    for fixture in rows {
                        let key = fixture_merge_key(sport, &fixture);
                        if seen.insert(key) {
                            outcome.fixtures.push(fixture);
                            added += 1;
                        }
                    }
                    info!("Source '{}' contributed {} fixture(s)", name, added);
                    health.record_success(name);
                    if let Some(p) = &proxy {
                        proxies.mark_success(p);
                    }
                    outcome.attempts.push(SourceAttempt {
                        source: name.to_string(),
                        ok: true,
                        items: added,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Source '{}' failed: {}", name, e);
                    if let Some(p) = &proxy {
                        proxies.mark_failed(p);
                    }
                    if let Some(alert) = health.record_failure(name, &e.to_string()) {
                        outcome.alerts.push(alert);
                    }
                    outcome.attempts.push(SourceAttempt {
                        source: name.to_string(),
                        ok: false,
                        items: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        outcome
    }
}
