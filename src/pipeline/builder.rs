//! Builder for [`Pipeline`].
//!
//! # Example
//!
//! ```ignore
//! use partner_telemetry::{ManualProvider, Pipeline, SamplerOptions};
//!
//! let pipeline = Pipeline::builder()
//!     .provider(ManualProvider::new())
//!     .api_base_url("https://api.example.com/order-management/")
//!     .sampler_options(SamplerOptions::background())
//!     .on_foreground_wake(|| bring_to_front())
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::location::{
    HttpSink, LocationSampler, PositionProvider, SamplerOptions, StreamSink, TelemetrySink,
};
use crate::manager::{ConnectionManager, ManagerOptions, SessionCallbacks, SessionEvent};
use crate::transport::{HttpTelemetryClient, SocketIoTransport, Transport};

use super::session::Pipeline;

// ============================================================================
// PipelineBuilder
// ============================================================================

/// Builder for configuring a [`Pipeline`].
///
/// Use [`Pipeline::builder()`] to create one. Only the position provider is
/// required; the transport defaults to [`SocketIoTransport`].
#[derive(Default)]
pub struct PipelineBuilder {
    transport: Option<Arc<dyn Transport>>,
    provider: Option<Arc<dyn PositionProvider>>,
    api_base_url: Option<String>,
    relay_over_http: bool,
    callbacks: Option<SessionCallbacks>,
    manager_options: ManagerOptions,
    sampler_options: SamplerOptions,
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("has_transport", &self.transport.is_some())
            .field("has_provider", &self.provider.is_some())
            .field("api_base_url", &self.api_base_url)
            .field("relay_over_http", &self.relay_over_http)
            .field("manager_options", &self.manager_options)
            .field("sampler_options", &self.sampler_options)
            .finish()
    }
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event-stream transport.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the position provider.
    #[inline]
    #[must_use]
    pub fn provider(mut self, provider: impl PositionProvider) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Enables the HTTP side-channel for checkpoints.
    ///
    /// # Arguments
    ///
    /// * `url` - API base, e.g. `https://api.example.com/order-management/`
    #[inline]
    #[must_use]
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Sends live records through `POST socket/partner/emit` instead of the
    /// event stream. Requires [`api_base_url`](Self::api_base_url).
    #[inline]
    #[must_use]
    pub fn relay_over_http(mut self, enabled: bool) -> Self {
        self.relay_over_http = enabled;
        self
    }

    /// Sets the callback run on `open_app:<userId>`.
    #[must_use]
    pub fn on_foreground_wake<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.take().unwrap_or_else(SessionCallbacks::noop);
        callbacks.on_foreground_wake = Arc::new(callback);
        self.callbacks = Some(callbacks);
        self
    }

    /// Sets the callback receiving state changes and unrouted events.
    #[must_use]
    pub fn on_session_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.take().unwrap_or_else(SessionCallbacks::noop);
        callbacks.on_session_event = Arc::new(callback);
        self.callbacks = Some(callbacks);
        self
    }

    /// Sets the connection manager options.
    #[inline]
    #[must_use]
    pub fn manager_options(mut self, options: ManagerOptions) -> Self {
        self.manager_options = options;
        self
    }

    /// Sets the location sampler options.
    #[inline]
    #[must_use]
    pub fn sampler_options(mut self, options: SamplerOptions) -> Self {
        self.sampler_options = options;
        self
    }

    /// Builds the pipeline with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no provider is set, options are invalid, or
    ///   HTTP relay is requested without an API base URL
    /// - [`Error::Url`] / [`Error::InvalidParameters`] if the API base URL is bad
    pub fn build(self) -> Result<Pipeline> {
        self.manager_options.validate()?;
        self.sampler_options.validate()?;

        let provider = self.provider.ok_or_else(|| {
            Error::config(
                "Position provider is required. Use .provider() to set it.\n\
                 Example: Pipeline::builder().provider(ManualProvider::new())",
            )
        })?;

        let http = self
            .api_base_url
            .as_deref()
            .map(HttpTelemetryClient::new)
            .transpose()?;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(SocketIoTransport::new()));
        let manager = ConnectionManager::build(transport, self.manager_options);

        let sink: Arc<dyn TelemetrySink> = match (self.relay_over_http, http) {
            (true, Some(http)) => Arc::new(HttpSink::new(http)),
            (true, None) => {
                return Err(Error::config(
                    "HTTP relay requires an API base URL. Use .api_base_url() to set it.",
                ));
            }
            (false, Some(http)) => Arc::new(StreamSink::new(manager.clone()).with_http(http)),
            (false, None) => Arc::new(StreamSink::new(manager.clone())),
        };

        let sampler = LocationSampler::build(provider, sink, self.sampler_options);
        let callbacks = self.callbacks.unwrap_or_else(SessionCallbacks::noop);

        Ok(Pipeline::from_parts(manager, sampler, callbacks))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::location::ManualProvider;
    use crate::manager::ReconnectPolicy;
    use crate::transport::mock::MockTransport;

    #[test]
    fn test_provider_is_required() {
        let err = PipelineBuilder::new().build().unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_defaults_build() {
        let pipeline = Pipeline::builder().provider(ManualProvider::new()).build();
        assert!(pipeline.is_ok());
    }

    #[test]
    fn test_relay_requires_base_url() {
        let err = Pipeline::builder()
            .provider(ManualProvider::new())
            .relay_over_http(true)
            .build()
            .unwrap_err();
        assert!(err.is_configuration_error());

        let pipeline = Pipeline::builder()
            .provider(ManualProvider::new())
            .api_base_url("https://api.example.com/order-management/")
            .relay_over_http(true)
            .build();
        assert!(pipeline.is_ok());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let result = Pipeline::builder()
            .provider(ManualProvider::new())
            .api_base_url("ftp://api.example.com")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_invalid_options() {
        let result = Pipeline::builder()
            .transport(MockTransport::new())
            .provider(ManualProvider::new())
            .manager_options(
                ManagerOptions::new()
                    .with_reconnect(ReconnectPolicy::new().with_delay(Duration::ZERO)),
            )
            .build();
        assert!(result.unwrap_err().is_configuration_error());

        let result = Pipeline::builder()
            .provider(ManualProvider::new())
            .sampler_options(SamplerOptions::new().with_min_distance(-5.0))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_callbacks_compose() {
        let builder = PipelineBuilder::new()
            .on_foreground_wake(|| {})
            .on_session_event(|_| {});
        assert!(builder.callbacks.is_some());
    }
}
