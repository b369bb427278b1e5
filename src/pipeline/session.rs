//! Caller-facing session contract.
//!
//! A [`Pipeline`] pairs the connection manager with the location sampler so
//! the host only deals with one session at a time:
//!
//! | Call | Effect |
//! |------|--------|
//! | [`start_session`](Pipeline::start_session) | Connect, then start tracking |
//! | [`stop_session`](Pipeline::stop_session) | Stop tracking, then disconnect |
//! | [`update_session`](Pipeline::update_session) | Stop + start with new order and parameters |
//! | [`is_session_active`](Pipeline::is_session_active) | Whether a session is retained |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::identifiers::OrderId;
use crate::location::{LocationSampler, TrackingParams};
use crate::manager::{ConnectionManager, ConnectionParameters, SessionCallbacks};

use super::builder::PipelineBuilder;

// ============================================================================
// SessionParams
// ============================================================================

/// Everything a session needs from the host.
///
/// Deserializes from the host argument map, e.g.
/// `{"socketUrl": "...", "userToken": "...", "userId": 42, "orderId": 7}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    /// Stream endpoint, token and user.
    #[serde(flatten)]
    pub connection: ConnectionParameters,

    /// Order attached to every telemetry record.
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

impl SessionParams {
    #[must_use]
    pub fn new(connection: ConnectionParameters) -> Self {
        Self {
            connection,
            order_id: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// Tracking identity derived from these parameters.
    #[must_use]
    pub fn tracking(&self) -> TrackingParams {
        TrackingParams {
            order_id: self.order_id,
            partner_id: self.connection.user_id,
            auth_token: self.connection.auth_token.clone(),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Connection manager plus location sampler behind one session contract.
///
/// Dropping the pipeline stops the session. Session callbacks may query the
/// pipeline but must not start or stop sessions from inside the callback.
pub struct Pipeline {
    manager: ConnectionManager,
    sampler: LocationSampler,
    callbacks: SessionCallbacks,
    /// Serializes start/stop.
    lifecycle: Mutex<()>,
    session: Mutex<Option<SessionParams>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("manager", &self.manager)
            .field("sampler", &self.sampler)
            .field("active", &self.is_session_active())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Returns a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(crate) fn from_parts(
        manager: ConnectionManager,
        sampler: LocationSampler,
        callbacks: SessionCallbacks,
    ) -> Self {
        Self {
            manager,
            sampler,
            callbacks,
            lifecycle: Mutex::new(()),
            session: Mutex::new(None),
        }
    }

    /// The connection manager, for extra listeners or raw emits.
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// The location sampler.
    #[inline]
    #[must_use]
    pub fn sampler(&self) -> &LocationSampler {
        &self.sampler
    }

    /// Parameters of the current session, if any.
    #[must_use]
    pub fn session_params(&self) -> Option<SessionParams> {
        self.session.lock().clone()
    }

    /// Starts a session: connect, then begin tracking.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameters`](crate::Error::InvalidParameters) if the
    ///   endpoint or token is empty or the scheme is unsupported; nothing is
    ///   started and a running session is left untouched
    /// - Any error from opening the transport; the previous session, if any,
    ///   is fully released
    /// - [`Error::PositioningUnavailable`](crate::Error::PositioningUnavailable)
    ///   if tracking cannot start; the connection stays up and the session
    ///   remains active without telemetry
    pub fn start_session(&self, params: SessionParams) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();

        if let Err(e) = self
            .manager
            .start_with(params.connection.clone(), self.callbacks.clone())
        {
            // A failure after the old handle was torn down leaves no session.
            if !self.manager.has_session() {
                self.sampler.stop_tracking();
                if self.session.lock().take().is_some() {
                    warn!(error = %e, "Session start failed, previous session released");
                }
            }
            return Err(e);
        }
        let tracking = self.sampler.start_tracking(params.tracking());

        info!(
            order_id = ?params.order_id,
            user_id = ?params.connection.user_id,
            tracking = tracking.is_ok(),
            "Session started"
        );
        *self.session.lock() = Some(params);

        tracking
    }

    /// Ends the session. Idempotent.
    pub fn stop_session(&self) {
        let _lifecycle = self.lifecycle.lock();

        self.sampler.stop_tracking();
        self.manager.stop();

        if self.session.lock().take().is_some() {
            info!("Session stopped");
        }
    }

    /// Restarts the session with a new order and connection parameters.
    ///
    /// # Errors
    ///
    /// Same as [`start_session`](Self::start_session).
    pub fn update_session(
        &self,
        new_order_id: Option<OrderId>,
        new_params: ConnectionParameters,
    ) -> Result<()> {
        let params = SessionParams {
            connection: new_params,
            order_id: new_order_id,
        };

        self.stop_session();
        self.start_session(params).inspect_err(|e| {
            warn!(error = %e, "Session update failed");
        })
    }

    /// Returns `true` while a session is retained.
    ///
    /// `false` after `stop_session`, or once a bounded reconnect policy
    /// has given up.
    #[must_use]
    pub fn is_session_active(&self) -> bool {
        self.session.lock().is_some() && self.manager.has_session()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.sampler.stop_tracking();
        self.manager.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
