//! Connection parameters and state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::UserId;

// ============================================================================
// Constants
// ============================================================================

/// Endpoint schemes the event-stream transport can map to a websocket.
const SUPPORTED_SCHEMES: [&str; 4] = ["http", "https", "ws", "wss"];

// ============================================================================
// ConnectionParameters
// ============================================================================

/// Parameters of one connection session.
///
/// Fixed for the lifetime of a session; changing any field requires a full
/// stop + start. Deserializes from the host's argument map, accepting both
/// `endpointUrl`/`authToken` and `socketUrl`/`userToken` keys.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParameters {
    /// Event-stream endpoint, e.g. `https://rt.example.com`.
    #[serde(alias = "socketUrl")]
    pub endpoint_url: String,

    /// Value sent verbatim in the `Authorization` header.
    #[serde(alias = "userToken")]
    pub auth_token: String,

    /// User the `open_app:<userId>` wake event is scoped to.
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl ConnectionParameters {
    /// Creates parameters without a user id.
    #[must_use]
    pub fn new(endpoint_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            auth_token: auth_token.into(),
            user_id: None,
        }
    }

    /// Sets the user id.
    #[inline]
    #[must_use]
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Checks preconditions and parses the endpoint.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameters`] if the endpoint or token is empty, or
    /// the endpoint is not an http(s) or ws(s) URL.
    pub fn validate(&self) -> Result<Url> {
        let endpoint = self.endpoint_url.trim();
        if endpoint.is_empty() {
            return Err(Error::invalid_parameters("endpointUrl is empty"));
        }
        if self.auth_token.trim().is_empty() {
            return Err(Error::invalid_parameters("authToken is empty"));
        }

        let url = Url::parse(endpoint)
            .map_err(|e| Error::invalid_parameters(format!("endpointUrl '{endpoint}': {e}")))?;

        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(Error::invalid_parameters(format!(
                "unsupported endpoint scheme '{}'",
                url.scheme()
            )));
        }

        Ok(url)
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("endpoint_url", &self.endpoint_url)
            .field("auth_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the single managed connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No session, or the session was given up.
    #[default]
    Disconnected,
    /// Transport opened, handshake pending.
    Connecting,
    /// Handshake complete; emits are delivered.
    Connected,
    /// Waiting for the reconnect timer.
    ReconnectScheduled,
}

impl ConnectionState {
    /// Returns `true` when emits are delivered.
    #[inline]
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReconnectScheduled => "reconnect-scheduled",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Tests
// ============================================================================
