//! Per-domain sliding-window rate limiting.
//!
//! A safety net beneath the orchestrators' natural pacing: no domain is hit
//! more than 30 times per minute, regardless of how many adapters share it.
//! Excess callers wait until the window advances.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_MAX_PER_MINUTE: usize = 30;

pub struct RateLimiter {
    max_per_window: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        RateLimiter {
            max_per_window,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(max: usize) -> Self {
        RateLimiter::new(max, Duration::from_secs(60))
    }

    /// Wait until a request to `url`'s domain is allowed, then record it.
    pub async fn acquire(&self, url: &str) {
        let domain = domain_of(url);
        loop {
            let wait = {
                let mut hits = self.hits.lock().await;
                let queue = hits.entry(domain.clone()).or_default();
                let now = Instant::now();
                while let Some(front) = queue.front() {
                    if now.duration_since(*front) >= self.window {
                        queue.pop_front();
                    } else {
                        break;
                    }
                }
                if queue.len() < self.max_per_window {
                    queue.push_back(now);
                    None
                } else {
                    // Oldest hit leaving the window frees a slot.
                    queue
                        .front()
                        .map(|front| self.window.saturating_sub(now.duration_since(*front)))
                }
            };
            match wait {
                None => return,
                Some(delay) => {
                    debug!("Rate limit reached for {}, waiting {:?}", domain, delay);
                    tokio::time::sleep(delay.max(Duration::from_millis(10))).await;
                }
            }
        }
    }
}

fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_under_limit_does_not_block() {
        let limiter = RateLimiter::per_minute(5);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire("https://api.sofascore.com/events").await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_excess_caller_blocks_until_window_advances() {
        let limiter = RateLimiter::new(2, Duration::from_millis(200));
        limiter.acquire("https://www.flashscore.com/a").await;
        limiter.acquire("https://www.flashscore.com/b").await;

        let start = Instant::now();
        limiter.acquire("https://www.flashscore.com/c").await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_domains_are_limited_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();
        limiter.acquire("https://www.flashscore.com/").await;
        limiter.acquire("https://api.sofascore.com/").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_domain_extraction() {
        assert_eq!(domain_of("https://api.sofascore.com/api/v1/x"), "api.sofascore.com");
        assert_eq!(domain_of("not a url"), "not a url");
    }
}
