//! Live-scores rotation: merge coverage across sources, stop early.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{Rotation, SourceAttempt, SourceContext, SourceEntry};
use crate::error::ScrapeError;
use crate::health::{HealthAlert, SourceHealthTracker};
use crate::matching::EventToMatch;
use crate::proxy::ProxyManager;
use crate::scrapers::page::PageFactory;
use crate::scrapers::{jitter_delay, LiveScore, LiveScoresScraper};

/// Stop rotating once this share of the input events is covered by free
/// sources.
pub const EARLY_EXIT_COVERAGE: f64 = 0.8;

type LiveBuilder =
    Box<dyn Fn(SourceContext) -> Result<Box<dyn LiveScoresScraper>, ScrapeError> + Send + Sync>;

pub struct LiveSource {
    pub entry: SourceEntry,
    pub build: LiveBuilder,
}

#[derive(Debug, Default)]
pub struct LiveScoresOutcome {
    pub scores: HashMap<i64, LiveScore>,
    /// Share of requested events for which a score was produced.
    pub coverage: f64,
    pub alerts: Vec<HealthAlert>,
    pub attempts: Vec<SourceAttempt>,
}

pub struct LiveScoresOrchestrator {
    sources: Vec<LiveSource>,
    rotation: Rotation,
}

impl LiveScoresOrchestrator {
    pub fn new(sources: Vec<LiveSource>) -> Self {
        LiveScoresOrchestrator {
            sources,
            rotation: Rotation::new(),
        }
    }

    /// Rotate over the sources until every event has a score or the
    /// early-exit coverage is reached from a free source. Later sources
    /// never overwrite scores matched earlier in the tick.
    pub async fn run(
        &mut self,
        events: &[EventToMatch],
        health: &mut SourceHealthTracker,
        proxies: &mut ProxyManager,
        page_factory: Option<&dyn PageFactory>,
    ) -> LiveScoresOutcome {
        let mut outcome = LiveScoresOutcome::default();
        if events.is_empty() {
            return outcome;
        }

        let total = events.len();
        let mut remaining: Vec<EventToMatch> = events.to_vec();

        let entries: Vec<SourceEntry> = self.sources.iter().map(|s| s.entry.clone()).collect();
        for idx in self.rotation.order(&entries) {
            if remaining.is_empty() {
                break;
            }
            let source = &self.sources[idx];
            let name = source.entry.name;

            if health.is_source_down(name) {
                debug!("Skipping '{}' (cooling down)", name);
                continue;
            }
            if source.entry.needs_proxy && !proxies.has_providers() {
                debug!("Skipping '{}' (requires proxy, none configured)", name);
                continue;
            }
            if source.entry.needs_page && page_factory.is_none() {
                debug!("Skipping '{}' (requires a browser page, none configured)", name);
                continue;
            }

            let proxy = if source.entry.needs_proxy {
                match proxies.get_proxy() {
                    Some(p) => Some(p),
                    None => {
                        debug!("Skipping '{}' (no proxy available)", name);
                        continue;
                    }
                }
            } else {
                None
            };

            // One fresh page (browser context) per attempt.
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

            jitter_delay(100, 1200).await;
            self.rotation.touch(name);

            let attempt_result = async {
                let scraper = (source.build)(SourceContext {
                    proxy: proxy.clone(),
                    page,
                })?;
                scraper.fetch_live_scores(&remaining).await
            }
            .await;

            match attempt_result {
                Ok(batch) => {
                    let matched = batch.scores.len();
                    remaining.retain(|ev| !batch.scores.contains_key(&ev.event_id));
                    for (event_id, score) in batch.scores {
                        outcome.scores.entry(event_id).or_insert(score);
                    }
                    health.record_success(name);
                    if let Some(p) = &proxy {
                        proxies.mark_success(p);
                    }
                    outcome.attempts.push(SourceAttempt {
                        source: name.to_string(),
                        ok: true,
                        items: matched,
                        error: None,
                    });

                    let coverage = outcome.scores.len() as f64 / total as f64;
                    info!(
                        "Source '{}' matched {} event(s); coverage {:.0}%",
                        name,
                        matched,
                        coverage * 100.0
                    );
                    if source.entry.free && coverage >= EARLY_EXIT_COVERAGE {
                        info!("Early exit: {:.0}% coverage from free sources", coverage * 100.0);
                        break;
                    }
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

        outcome.coverage = outcome.scores.len() as f64 / total as f64;
        outcome
    }
}
