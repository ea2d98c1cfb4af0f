//! Odds rotation: gather normalized 1X2 rows until enough coverage.

use tracing::{debug, info, warn};

use super::{Rotation, SourceAttempt, SourceContext, SourceEntry};
use crate::error::ScrapeError;
use crate::health::{HealthAlert, SourceHealthTracker};
use crate::proxy::ProxyManager;
use crate::scrapers::page::PageFactory;
use crate::scrapers::{jitter_delay, NormalizedOdds, OddsScraper};

/// Stop rotating once this many odds rows are gathered.
pub const ODDS_ROWS_TARGET: usize = 50;

type OddsBuilder =
    Box<dyn Fn(SourceContext) -> Result<Box<dyn OddsScraper>, ScrapeError> + Send + Sync>;

pub struct OddsSource {
    pub entry: SourceEntry,
    pub build: OddsBuilder,
}

#[derive(Debug, Default)]
pub struct OddsOutcome {
    /// In source-visit order; the driver applies first-source-wins per
    /// event within a tick.
    pub odds: Vec<NormalizedOdds>,
    pub alerts: Vec<HealthAlert>,
    pub attempts: Vec<SourceAttempt>,
}

pub struct OddsOrchestrator {
    sources: Vec<OddsSource>,
    rotation: Rotation,
}

impl OddsOrchestrator {
    pub fn new(sources: Vec<OddsSource>) -> Self {
        OddsOrchestrator {
            sources,
            rotation: Rotation::new(),
        }
    }

    pub async fn run(
        &mut self,
        sport: &str,
        health: &mut SourceHealthTracker,
        proxies: &mut ProxyManager,
        page_factory: Option<&dyn PageFactory>,
    ) -> OddsOutcome {
        let mut outcome = OddsOutcome::default();

        let entries: Vec<SourceEntry> = self.sources.iter().map(|s| s.entry.clone()).collect();
        for idx in self.rotation.order(&entries) {
            if outcome.odds.len() >= ODDS_ROWS_TARGET {
                info!("Odds target reached ({} rows); stopping rotation", outcome.odds.len());
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
                scraper.fetch_odds(sport).await
            }
            .await;

            match attempt {
                Ok(rows) => {
                    info!("Source '{}' returned {} odds row(s)", name, rows.len());
                    health.record_success(name);
                    if let Some(p) = &proxy {
                        proxies.mark_success(p);
                    }
                    outcome.attempts.push(SourceAttempt {
                        source: name.to_string(),
                        ok: true,
                        items: rows.len(),
                        error: None,
                    });
                    outcome.odds.extend(rows);
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
