//! # Push Notification Dispatch
//!
//! Client for an Expo-compatible push gateway. Messages are POSTed as a
//! JSON array of `{to, title, body, data, sound}` objects; the gateway
//! rejects batches over 100 recipients, so [`send_chunked`] splits the fan-out
//! at exactly that size.
//!
//! Push delivery is best-effort by design: a failed batch is logged and
//! counted, never surfaced to the user action that triggered it. A friend
//! request whose notification was dropped is still a friend request.
//!
//! The [`PushGateway`] trait seams the HTTP transport away from callers so
//! tests can swap in a recording mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use souk_ledger::config::PUSH_CHUNK_SIZE;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from push-gateway delivery.
#[derive(Debug, Error)]
pub enum PushError {
    /// The request never completed (DNS, connect, timeout).
    #[error("push gateway request failed: {0}")]
    Network(String),

    /// The gateway answered with a non-success status.
    #[error("push gateway returned status {0}")]
    Status(u16),
}

// ---------------------------------------------------------------------------
// PushMessage
// ---------------------------------------------------------------------------

/// One notification addressed to one device token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    /// The recipient's push token.
    pub to: String,
    /// Notification title.
    pub title: String,
    /// Notification body text.
    pub body: String,
    /// Opaque payload delivered to the app alongside the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Sound hint. The storefront always sends "default".
    pub sound: String,
}

impl PushMessage {
    /// Creates a message with the default sound and no data payload.
    pub fn new(to: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            title: title.into(),
            body: body.into(),
            data: None,
            sound: "default".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// PushGateway
// ---------------------------------------------------------------------------

/// Transport abstraction over the push gateway.
///
/// One call delivers one batch; callers are responsible for chunking
/// (see [`send_chunked`]).
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Delivers a single batch of at most [`PUSH_CHUNK_SIZE`] messages.
    async fn deliver(&self, batch: &[PushMessage]) -> Result<(), PushError>;
}

/// HTTP implementation backed by reqwest.
pub struct HttpPushGateway {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpPushGateway {
    /// Creates a gateway client for the given endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn deliver(&self, batch: &[PushMessage]) -> Result<(), PushError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(batch)
            .send()
            .await
            .map_err(|e| PushError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// No-op gateway for deployments with push disabled.
pub struct DisabledPushGateway;

#[async_trait]
impl PushGateway for DisabledPushGateway {
    async fn deliver(&self, _batch: &[PushMessage]) -> Result<(), PushError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chunked Dispatch
// ---------------------------------------------------------------------------

/// Outcome of a chunked fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    /// Messages in batches that were delivered successfully.
    pub delivered: usize,
    /// Batches issued in total.
    pub batches: usize,
    /// Batches the gateway refused or that failed in transit.
    pub failed_batches: usize,
}

/// Fans a message list out to the gateway in batches of [`PUSH_CHUNK_SIZE`].
///
/// Failed batches are logged and counted but do not stop the remaining
/// batches; partial delivery beats none.
pub async fn send_chunked(gateway: &dyn PushGateway, messages: &[PushMessage]) -> PushReport {
    let mut report = PushReport {
        delivered: 0,
        batches: 0,
        failed_batches: 0,
    };

    for batch in messages.chunks(PUSH_CHUNK_SIZE) {
        report.batches += 1;
        match gateway.deliver(batch).await {
            Ok(()) => report.delivered += batch.len(),
            Err(e) => {
                report.failed_batches += 1;
                tracing::warn!(batch_size = batch.len(), "push batch failed: {}", e);
            }
        }
    }

    report
}

// ---------------------------------------------------------------------------
// Test Support
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::testing::RecordingGateway;
    use super::*;

    fn messages(count: usize) -> Vec<PushMessage> {
        (0..count)
            .map(|i| PushMessage::new(format!("token-{i}"), "Title", "Body"))
            .collect()
    }

    #[tokio::test]
    async fn small_fanout_is_a_single_batch() {
        let gateway = RecordingGateway::new();
        let report = send_chunked(&gateway, &messages(3)).await;

        assert_eq!(report.batches, 1);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed_batches, 0);
        assert_eq!(gateway.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fanout_chunks_at_one_hundred() {
        let gateway = RecordingGateway::new();
        let report = send_chunked(&gateway, &messages(250)).await;

        assert_eq!(report.batches, 3);
        assert_eq!(report.delivered, 250);

        let batches = gateway.batches.lock().unwrap();
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn exact_multiple_has_no_trailing_batch() {
        let gateway = RecordingGateway::new();
        let report = send_chunked(&gateway, &messages(200)).await;
        assert_eq!(report.batches, 2);
        let batches = gateway.batches.lock().unwrap();
        assert!(batches.iter().all(|b| b.len() == 100));
    }

    #[tokio::test]
    async fn empty_fanout_issues_no_requests() {
        let gateway = RecordingGateway::new();
        let report = send_chunked(&gateway, &[]).await;
        assert_eq!(report.batches, 0);
        assert_eq!(report.delivered, 0);
        assert!(gateway.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_batch_does_not_stop_the_rest() {
        let gateway = RecordingGateway::failing_on(&[1]);
        let report = send_chunked(&gateway, &messages(250)).await;

        assert_eq!(report.batches, 3);
        assert_eq!(report.failed_batches, 1);
        // The 100 messages of the failed middle batch are not counted.
        assert_eq!(report.delivered, 150);
        // All three batches were attempted.
        assert_eq!(gateway.batches.lock().unwrap().len(), 3);
    }

    #[test]
    fn message_serialization_omits_empty_data() {
        let msg = PushMessage::new("token-1", "Hello", "World");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["to"], "token-1");
        assert_eq!(json["sound"], "default");
        assert!(json.get("data").is_none());

        let mut with_data = PushMessage::new("token-1", "Hello", "World");
        with_data.data = Some(serde_json::json!({ "kind": "friend_request" }));
        let json = serde_json::to_value(&with_data).unwrap();
        assert_eq!(json["data"]["kind"], "friend_request");
    }
}
