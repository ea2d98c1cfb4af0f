use std::time::Duration;
use thiserror::Error;

/// Classified failure of a single scrape attempt.
///
/// The classification drives recovery: transient errors and timeouts are
/// retried with backoff, blocked responses feed the source-health tracker,
/// parse errors skip the offending row and continue.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Network-level failure worth retrying (connection reset, DNS, 5xx).
    #[error("transient error: {0}")]
    Transient(String),

    /// The source refused us: blocking status code or a bot-wall body.
    #[error("blocked by source (status {status:?}): {snippet}")]
    Blocked {
        status: Option<u16>,
        snippet: String,
    },

    /// A response arrived but could not be mapped into the common shape.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ScrapeError {
    /// Whether a retry with backoff makes sense for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScrapeError::Transient(_) | ScrapeError::Timeout(_))
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, ScrapeError::Blocked { .. })
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::Timeout(Duration::from_secs(0))
        } else if err.is_decode() {
            ScrapeError::Parse(err.to_string())
        } else {
            ScrapeError::Transient(err.to_string())
        }
    }
}
