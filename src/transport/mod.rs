//! Event-stream transport layer.
//!
//! A [`Transport`] opens one physical bidirectional connection per call and
//! hands back a [`TransportHandle`] for outbound traffic plus a channel of
//! [`TransportEvent`]s for inbound traffic. The connection manager owns
//! retry timing, so transports never reconnect on their own.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                        ┌──────────────────┐
//! │  ConnectionManager   │   Box<TransportHandle> │  Socket.IO       │
//! │                      │───────── emit ────────►│  server          │
//! │  dispatcher (gen N)  │◄── TransportEvents ────│                  │
//! └──────────────────────┘                        └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Transport::connect` - Spawn the I/O task, return immediately
//! 2. `TransportEvent::Connected` or `TransportEvent::ConnectError`
//! 3. `TransportHandle::emit` / `TransportEvent::Event` while connected
//! 4. `TransportEvent::Disconnected` or `TransportHandle::close`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socketio` | Socket.IO client over tokio-tungstenite |
//! | `http` | HTTP telemetry side-channel |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// HTTP telemetry client.
pub mod http;

/// Socket.IO websocket client.
pub mod socketio;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use http::HttpTelemetryClient;
pub use socketio::{SocketIoConnection, SocketIoTransport};

// ============================================================================
// Types
// ============================================================================

/// Receiving side of a transport's inbound event stream.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Inbound notification from a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake completed.
    Connected,
    /// Handshake failed or timed out.
    ConnectError(String),
    /// An established connection went away.
    Disconnected(String),
    /// Named event pushed by the server.
    Event {
        /// Event name.
        name: String,
        /// Event data.
        payload: Value,
    },
}

impl TransportEvent {
    /// Returns `true` if no further events will follow.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConnectError(_) | Self::Disconnected(_))
    }
}

// ============================================================================
// ConnectRequest
// ============================================================================

/// Everything a transport needs to open one connection.
#[derive(Clone)]
pub struct ConnectRequest {
    /// Endpoint as supplied by the caller.
    pub url: Url,
    /// Handshake headers, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Upper bound on the handshake.
    pub handshake_timeout: Duration,
}

impl ConnectRequest {
    /// Returns the value of a header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("ConnectRequest")
            .field("url", &self.url.as_str())
            .field("headers", &names)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Outbound side of one open connection.
pub trait TransportHandle: Send + Sync {
    /// Queues a named event for sending.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ConnectionClosed`] once the connection is gone.
    fn emit(&self, event: &str, payload: Value) -> Result<()>;

    /// Requests the connection to close. Idempotent.
    fn close(&self);
}

/// Factory for event-stream connections.
pub trait Transport: Send + Sync + 'static {
    /// Opens a connection without waiting for the handshake.
    ///
    /// Must return promptly; the handshake outcome is reported on the
    /// returned event channel.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidParameters`] if the request cannot be turned
    /// into a connection attempt at all.
    fn connect(&self, request: ConnectRequest)
    -> Result<(Box<dyn TransportHandle>, TransportEvents)>;
}

// ============================================================================
// Tests
// ============================================================================
