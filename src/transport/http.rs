//! HTTP telemetry side-channel.
//!
//! Durable location checkpoints and, for deployments without a live stream,
//! relayed `location_from_partner` events.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `POST` | `location/saveCurrentLocation` | `{latitude, longitude}` |
//! | `POST` | `socket/partner/emit` | `{eventName, eventData}` |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{CheckpointBody, PartnerEmitBody};

// ============================================================================
// Constants
// ============================================================================

/// Path of the checkpoint endpoint, relative to the API base.
pub const SAVE_CURRENT_LOCATION_PATH: &str = "location/saveCurrentLocation";

/// Path of the event relay endpoint, relative to the API base.
pub const PARTNER_EMIT_PATH: &str = "socket/partner/emit";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// HttpTelemetryClient
// ============================================================================

/// JSON client for the telemetry REST endpoints.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTelemetryClient {
    client: Client,
    base_url: Url,
}

impl HttpTelemetryClient {
    /// Creates a client for the given API base URL.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the base URL does not parse
    /// - [`Error::InvalidParameters`] if it is not http(s)
    /// - [`Error::Request`] if the HTTP client cannot be built
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::invalid_parameters(format!(
                "API base URL must be http(s), got '{}'",
                base_url.scheme()
            )));
        }

        // Url::join replaces the last segment unless the path ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self { client, base_url })
    }

    /// Returns the normalised base URL.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves an endpoint path against the base URL.
    ///
    /// # Errors
    ///
    /// [`Error::Url`] if the path cannot be joined.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Stores a significant-move checkpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::Request`] on network failure
    /// - [`Error::Http`] on a non-success status
    pub async fn save_current_location(&self, token: &str, body: &CheckpointBody) -> Result<()> {
        self.post(SAVE_CURRENT_LOCATION_PATH, token, body).await
    }

    /// Relays a `location_from_partner` event through the REST API.
    ///
    /// # Errors
    ///
    /// - [`Error::Request`] on network failure
    /// - [`Error::Http`] on a non-success status
    pub async fn emit_partner_event(&self, token: &str, body: &PartnerEmitBody) -> Result<()> {
        self.post(PARTNER_EMIT_PATH, token, body).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, token: &str, body: &B) -> Result<()> {
        let url = self.endpoint(path)?;

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        debug!(path, status = status.as_u16(), "Telemetry POST completed");

        if status.is_success() {
            Ok(())
        } else {
            Err(Error::http(path, status.as_u16()))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
