//! Error types for the telemetry pipeline.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use partner_telemetry::{ConnectionParameters, Result};
//!
//! fn example(pipeline: &Pipeline, params: SessionParams) -> Result<()> {
//!     pipeline.start_session(params)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidParameters`] |
//! | Transport | [`Error::Transport`], [`Error::HandshakeTimeout`], [`Error::ConnectionClosed`], [`Error::Protocol`] |
//! | Positioning | [`Error::PositioningUnavailable`] |
//! | Delivery | [`Error::DeliveryDropped`], [`Error::Http`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`], [`Error::Request`] |
//!
//! Only configuration errors and [`Error::PositioningUnavailable`] ever reach
//! callers synchronously. Transport failures are absorbed by the
//! reconnection state machine and show up only in logs and in
//! `is_connected()` returning `false`.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid connection or session parameters.
    ///
    /// Returned synchronously by `start` when the endpoint or token is empty
    /// or malformed.
    #[error("Invalid parameters: {message}")]
    InvalidParameters {
        /// Description of what is wrong.
        message: String,
    },

    /// Configuration error.
    ///
    /// Returned when options or the pipeline builder are incomplete.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connect, handshake or runtime socket failure.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// Handshake did not complete in time.
    #[error("Handshake timeout after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    /// The transport handle is closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Malformed frame from the remote end.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Positioning Errors
    // ========================================================================
    /// Location permission missing or provider disabled.
    ///
    /// Surfaced once by `start_tracking`; tracking does not begin.
    #[error("Positioning unavailable: {reason}")]
    PositioningUnavailable {
        /// Why the provider cannot deliver fixes.
        reason: String,
    },

    // ========================================================================
    // Delivery Errors
    // ========================================================================
    /// An emit was attempted while not connected.
    ///
    /// Never raised to callers of `emit`; used for diagnostics only.
    #[error("Delivery dropped: {event}")]
    DeliveryDropped {
        /// Name of the dropped event.
        event: String,
    },

    /// HTTP side-channel returned a non-success status.
    #[error("HTTP {status} from {endpoint}")]
    Http {
        /// Endpoint path that was called.
        endpoint: String,
        /// Response status code.
        status: u16,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// HTTP client error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid parameters error.
    #[inline]
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a handshake timeout error.
    #[inline]
    pub fn handshake_timeout(timeout_ms: u64) -> Self {
        Self::HandshakeTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a positioning unavailable error.
    #[inline]
    pub fn positioning_unavailable(reason: impl Into<String>) -> Self {
        Self::PositioningUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a delivery dropped error.
    #[inline]
    pub fn delivery_dropped(event: impl Into<String>) -> Self {
        Self::DeliveryDropped {
            event: event.into(),
        }
    }

    /// Creates an HTTP status error.
    #[inline]
    pub fn http(endpoint: impl Into<String>, status: u16) -> Self {
        Self::Http {
            endpoint: endpoint.into(),
            status,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a transport-level error.
    ///
    /// These are folded into the reconnection path rather than surfaced.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::HandshakeTimeout { .. }
                | Self::ConnectionClosed
                | Self::Protocol { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is caller misuse.
    #[inline]
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::InvalidParameters { .. } | Self::Config { .. })
    }

    /// Returns `true` if a later attempt may succeed without caller action.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_transport_error()
            || matches!(
                self,
                Self::DeliveryDropped { .. } | Self::Http { .. } | Self::Request(_)
            )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::transport("dns failure");
        assert_eq!(err.to_string(), "Transport error: dns failure");
    }

    #[test]
    fn test_invalid_parameters_display() {
        let err = Error::invalid_parameters("authToken is empty");
        assert_eq!(err.to_string(), "Invalid parameters: authToken is empty");
    }

    #[test]
    fn test_http_display() {
        let err = Error::http("/location/saveCurrentLocation", 503);
        assert_eq!(
            err.to_string(),
            "HTTP 503 from /location/saveCurrentLocation"
        );
    }

    #[test]
    fn test_is_transport_error() {
        assert!(Error::transport("x").is_transport_error());
        assert!(Error::handshake_timeout(10_000).is_transport_error());
        assert!(Error::ConnectionClosed.is_transport_error());
        assert!(!Error::invalid_parameters("x").is_transport_error());
        assert!(!Error::positioning_unavailable("denied").is_transport_error());
    }

    #[test]
    fn test_is_configuration_error() {
        assert!(Error::invalid_parameters("x").is_configuration_error());
        assert!(Error::config("x").is_configuration_error());
        assert!(!Error::ConnectionClosed.is_configuration_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::delivery_dropped("location_from_partner").is_recoverable());
        assert!(Error::http("/x", 500).is_recoverable());
        assert!(!Error::positioning_unavailable("denied").is_recoverable());
        assert!(!Error::invalid_parameters("x").is_recoverable());
    }

    #[test]
    fn test_from_websocket_error() {
        let err: Error = WsError::ConnectionClosed.into();
        assert!(matches!(err, Error::WebSocket(_)));
        assert!(err.is_transport_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
