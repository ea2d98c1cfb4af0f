//! Settlement queue seam.
//!
//! When a match finishes, the live-scores driver enqueues exactly one
//! message per event so the downstream settlement worker can grade
//! predictions. The queue is FIFO with the event id as partition key.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FinalResult {
    #[serde(rename = "homeScore")]
    pub home_score: i32,
    #[serde(rename = "awayScore")]
    pub away_score: i32,
}

#[derive(Debug, Clone, Serialize)]
struct EventFinishedMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "eventId")]
    event_id: String,
    result: &'a FinalResult,
}

#[async_trait]
pub trait SettlementQueue: Send + Sync {
    /// Enqueue a finished-match message, partitioned on the event id.
    async fn send_event_finished(&self, event_id: i64, result: &FinalResult) -> Result<()>;
}

/// HTTP-backed queue endpoint. The partition and deduplication keys ride as
/// headers so the receiving FIFO delivers once per event.
pub struct HttpSettlementQueue {
    http: Client,
    url: String,
}

impl HttpSettlementQueue {
    pub fn new(url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpSettlementQueue {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl SettlementQueue for HttpSettlementQueue {
    async fn send_event_finished(&self, event_id: i64, result: &FinalResult) -> Result<()> {
        let message = EventFinishedMessage {
            kind: "event_finished",
            event_id: event_id.to_string(),
            result,
        };
        let resp = self
            .http
            .post(&self.url)
            .header("X-Message-Group-Id", event_id.to_string())
            .header("X-Message-Deduplication-Id", event_id.to_string())
            .json(&message)
            .send()
            .await
            .context("Settlement queue request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Settlement enqueue failed {}: {}", status, body);
        }
        info!(
            "Enqueued settlement for event {} ({}-{})",
            event_id, result.home_score, result.away_score
        );
        Ok(())
    }
}

/// No-op queue used when `SETTLEMENT_QUEUE_URL` is not configured.
pub struct NoopSettlementQueue;

#[async_trait]
impl SettlementQueue for NoopSettlementQueue {
    async fn send_event_finished(&self, event_id: i64, result: &FinalResult) -> Result<()> {
        info!(
            "Settlement queue not configured; dropping finish for event {} ({}-{})",
            event_id, result.home_score, result.away_score
        );
        Ok(())
    }
}

/// Records every message, for driver tests.
#[cfg(test)]
pub struct RecordingSettlementQueue {
    pub sent: std::sync::Mutex<Vec<(i64, FinalResult)>>,
}

#[cfg(test)]
impl RecordingSettlementQueue {
    pub fn new() -> Self {
        RecordingSettlementQueue {
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<(i64, FinalResult)> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl SettlementQueue for RecordingSettlementQueue {
    async fn send_event_finished(&self, event_id: i64, result: &FinalResult) -> Result<()> {
        self.sent.lock().unwrap().push((event_id, result.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_body_shape() {
        let result = FinalResult {
            home_score: 2,
            away_score: 1,
        };
        let message = EventFinishedMessage {
            kind: "event_finished",
            event_id: "42".to_string(),
            result: &result,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "event_finished",
                "eventId": "42",
                "result": {"homeScore": 2, "awayScore": 1}
            })
        );
    }
}
