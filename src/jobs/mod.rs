//! Job drivers: one straight-line entry point per scheduled invocation,
//! plus the wiring that assembles each orchestrator's source list.

pub mod sync_fixtures;
pub mod sync_live_scores;
pub mod sync_odds;
pub mod transition_events;

use std::sync::Arc;

use crate::error::ScrapeError;
use crate::orchestrator::{FixtureSource, LiveSource, OddsSource, SourceEntry};
use crate::ratelimit::RateLimiter;
use crate::scrapers::espn::EspnScraper;
use crate::scrapers::flashscore::FlashscoreScraper;
use crate::scrapers::fotmob::FotmobScraper;
use crate::scrapers::livescore::LiveScoreScraper;
use crate::scrapers::oddschecker::OddscheckerScraper;
use crate::scrapers::oddsportal::OddsPortalScraper;
use crate::scrapers::scores365::Scores365Scraper;
use crate::scrapers::sofascore::SofascoreScraper;
use crate::scrapers::HttpFetcher;

fn need_page(ctx_page: Option<Box<dyn crate::scrapers::page::Page>>) -> Result<Box<dyn crate::scrapers::page::Page>, ScrapeError> {
    ctx_page.ok_or_else(|| ScrapeError::Transient("no page provided for DOM source".into()))
}

/// Live-score sources for one sport, priority order.
pub(crate) fn live_sources(limiter: &Arc<RateLimiter>, sport: &str) -> Vec<LiveSource> {
    let mut sources = Vec::new();

    {
        let limiter = limiter.clone();
        let sport = sport.to_string();
        sources.push(LiveSource {
            entry: SourceEntry {
                name: "sofascore",
                priority: 1,
                needs_proxy: false,
                needs_page: false,
                free: true,
            },
            build: Box::new(move |ctx| {
                let fetcher = HttpFetcher::new(limiter.clone(), ctx.proxy.as_ref())?;
                Ok(Box::new(SofascoreScraper::new(fetcher, &sport, None)))
            }),
        });
    }
    {
        let limiter = limiter.clone();
        let sport = sport.to_string();
        sources.push(LiveSource {
            entry: SourceEntry {
                name: "espn",
                priority: 1,
                needs_proxy: false,
                needs_page: false,
                free: true,
            },
            build: Box::new(move |ctx| {
                let fetcher = HttpFetcher::new(limiter.clone(), ctx.proxy.as_ref())?;
                Ok(Box::new(EspnScraper::new(fetcher, &sport, None)))
            }),
        });
    }
    {
        let limiter = limiter.clone();
        let sport = sport.to_string();
        sources.push(LiveSource {
            entry: SourceEntry {
                name: "365scores",
                priority: 2,
                needs_proxy: false,
                needs_page: false,
                free: true,
            },
            build: Box::new(move |ctx| {
                let fetcher = HttpFetcher::new(limiter.clone(), ctx.proxy.as_ref())?;
                Ok(Box::new(Scores365Scraper::new(fetcher, &sport, None)))
            }),
        });
    }
    if sport == "football" {
        let limiter = limiter.clone();
        sources.push(LiveSource {
            entry: SourceEntry {
                name: "fotmob",
                priority: 2,
                needs_proxy: false,
                needs_page: false,
                free: true,
            },
            build: Box::new(move |ctx| {
                let fetcher = HttpFetcher::new(limiter.clone(), ctx.proxy.as_ref())?;
                Ok(Box::new(FotmobScraper::new(fetcher, None)))
            }),
        });
    }
    {
        // LiveScore is aggressive towards datacenter traffic; only worth
        // trying through a residential exit.
        let limiter = limiter.clone();
        let sport = sport.to_string();
        sources.push(LiveSource {
            entry: SourceEntry {
                name: "livescore",
                priority: 2,
                needs_proxy: true,
                needs_page: false,
                free: true,
            },
            build: Box::new(move |ctx| {
                let fetcher = HttpFetcher::new(limiter.clone(), ctx.proxy.as_ref())?;
                Ok(Box::new(LiveScoreScraper::new(fetcher, &sport, None)))
            }),
        });
    }
    {
        let sport = sport.to_string();
        sources.push(LiveSource {
            entry: SourceEntry {
                name: "flashscore",
                priority: 3,
                needs_proxy: false,
                needs_page: true,
                free: true,
            },
            build: Box::new(move |ctx| {
                let page = need_page(ctx.page)?;
                Ok(Box::new(FlashscoreScraper::new(page, &sport)))
            }),
        });
    }

    sources
}

/// Odds sources; both are DOM scrapers.
pub(crate) fn odds_sources() -> Vec<OddsSource> {
    vec![
        OddsSource {
            entry: SourceEntry {
                name: "oddsportal",
                priority: 1,
                needs_proxy: false,
                needs_page: true,
                free: true,
            },
            build: Box::new(|ctx| {
                let page = need_page(ctx.page)?;
                Ok(Box::new(OddsPortalScraper::new(page)))
            }),
        },
        OddsSource {
            entry: SourceEntry {
                name: "oddschecker",
                priority: 2,
                needs_proxy: false,
                needs_page: true,
                free: true,
            },
            build: Box::new(|ctx| {
                let page = need_page(ctx.page)?;
                Ok(Box::new(OddscheckerScraper::new(page)))
            }),
        },
    ]
}

/// Fixture sources: Flashscore primary, Sofascore fallback.
pub(crate) fn fixture_sources(limiter: &Arc<RateLimiter>, sport: &str) -> Vec<FixtureSource> {
    let mut sources = Vec::new();
    {
        let sport_owned = sport.to_string();
        sources.push(FixtureSource {
            entry: SourceEntry {
                name: "flashscore",
                priority: 1,
                needs_proxy: false,
                needs_page: true,
                free: true,
            },
            build: Box::new(move |ctx| {
                let page = need_page(ctx.page)?;
                Ok(Box::new(FlashscoreScraper::new(page, &sport_owned)))
            }),
        });
    }
    {
        let limiter = limiter.clone();
        let sport_owned = sport.to_string();
        sources.push(FixtureSource {
            entry: SourceEntry {
                name: "sofascore",
                priority: 2,
                needs_proxy: false,
                needs_page: false,
                free: true,
            },
            build: Box::new(move |ctx| {
                let fetcher = HttpFetcher::new(limiter.clone(), ctx.proxy.as_ref())?;
                Ok(Box::new(SofascoreScraper::new(fetcher, &sport_owned, None)))
            }),
        });
    }
    sources
}
