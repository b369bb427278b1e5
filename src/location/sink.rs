//! Telemetry delivery targets.
//!
//! | Sink | Live record | Checkpoint |
//! |------|-------------|------------|
//! | [`StreamSink`] | `location_from_partner` on the event stream | HTTP, if configured |
//! | [`HttpSink`] | `POST socket/partner/emit` | `POST location/saveCurrentLocation` |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::manager::{ConnectionManager, Delivery};
use crate::protocol::{CheckpointBody, LOCATION_FROM_PARTNER, TelemetryRecord};
use crate::transport::HttpTelemetryClient;

// ============================================================================
// TelemetrySink
// ============================================================================

/// Where accepted fixes go.
#[async_trait]
pub trait TelemetrySink: Send + Sync + 'static {
    /// Delivers one live record. Must not block; drops rather than queues.
    fn publish(&self, auth_token: &str, record: &TelemetryRecord) -> Delivery;

    /// Stores a significant-move checkpoint.
    async fn checkpoint(&self, auth_token: &str, body: CheckpointBody) -> Result<()>;
}

// ============================================================================
// StreamSink
// ============================================================================

/// Publishes over the managed event stream.
#[derive(Debug, Clone)]
pub struct StreamSink {
    manager: ConnectionManager,
    http: Option<HttpTelemetryClient>,
}

impl StreamSink {
    /// Stream-only sink; checkpoints are skipped.
    #[must_use]
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            http: None,
        }
    }

    /// Sends checkpoints through the given HTTP client.
    #[must_use]
    pub fn with_http(mut self, http: HttpTelemetryClient) -> Self {
        self.http = Some(http);
        self
    }
}

#[async_trait]
impl TelemetrySink for StreamSink {
    fn publish(&self, _auth_token: &str, record: &TelemetryRecord) -> Delivery {
        let payload = match serde_json::to_value(record.stream_payload()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Telemetry payload not serializable");
                return Delivery::Dropped;
            }
        };

        self.manager.emit(LOCATION_FROM_PARTNER, payload)
    }

    async fn checkpoint(&self, auth_token: &str, body: CheckpointBody) -> Result<()> {
        match &self.http {
            Some(http) => http.save_current_location(auth_token, &body).await,
            None => {
                debug!("No checkpoint endpoint configured");
                Ok(())
            }
        }
    }
}

// ============================================================================
// HttpSink
// ============================================================================

/// Publishes through the REST relay, for deployments without a live stream.
#[derive(Debug, Clone)]
pub struct HttpSink {
    http: HttpTelemetryClient,
}

impl HttpSink {
    #[must_use]
    pub fn new(http: HttpTelemetryClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    /// Hands the POST to a background task; must be called inside a runtime.
    fn publish(&self, auth_token: &str, record: &TelemetryRecord) -> Delivery {
        let http = self.http.clone();
        let token = auth_token.to_string();
        let body = record.partner_emit_body();

        tokio::spawn(async move {
            if let Err(e) = http.emit_partner_event(&token, &body).await {
                warn!(error = %e, "Telemetry relay failed");
            }
        });

        Delivery::Sent
    }

    async fn checkpoint(&self, auth_token: &str, body: CheckpointBody) -> Result<()> {
        self.http.save_current_location(auth_token, &body).await
    }
}

// ============================================================================
// RecordingSink
// ============================================================================

#[cfg(test)]
pub(crate) use recording::RecordingSink;


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::{OrderId, UserId};
    use crate::manager::{ConnectionParameters, SessionCallbacks};
    use crate::transport::TransportEvent;
    use crate::transport::mock::MockTransport;

    fn record() -> TelemetryRecord {
        TelemetryRecord {
            latitude: 31.95,
            longitude: 35.91,
            heading_degrees: 90.0,
            speed: Some(2.5),
            order_id: Some(OrderId::new(7)),
            partner_id: Some(UserId::new(42)),
        }
    }

    #[tokio::test]
    async fn test_stream_sink_drops_while_disconnected() {
        let transport = MockTransport::new();
        let sink = StreamSink::new(ConnectionManager::new(transport));
        assert_eq!(sink.publish("t", &record()), Delivery::Dropped);
    }

    #[tokio::test]
    async fn test_stream_sink_emits_location_event() {
        let transport = MockTransport::new();
        let manager = ConnectionManager::new(transport.clone());
        manager
            .start_with(
                ConnectionParameters::new("https://rt.example.com", "t"),
                SessionCallbacks::noop(),
            )
            .unwrap();
        transport.last().push(TransportEvent::Connected);
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        let sink = StreamSink::new(manager);
        assert_eq!(sink.publish("t", &record()), Delivery::Sent);

        let emitted = transport.last().emitted();
        assert_eq!(emitted.len(), 1);
        let (name, payload) = &emitted[0];
        assert_eq!(name, "location_from_partner");
        assert_eq!(payload["heading"], json!(90.0));
        assert_eq!(payload["speed"], json!(2500.0));
        assert_eq!(payload["orderId"], json!(7));
        assert_eq!(payload["partner_id"], json!(42));
        assert!(payload["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_stream_sink_without_http_skips_checkpoint() {
        let sink = StreamSink::new(ConnectionManager::new(MockTransport::new()));
        assert!(sink.checkpoint("t", record().checkpoint_body()).await.is_ok());
    }
}
