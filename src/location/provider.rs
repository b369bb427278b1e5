//! Positioning capability seam.
//!
//! The sampler only needs three things from the platform: an availability
//! check, a push subscription and the last known fix. [`ManualProvider`] is
//! a host-fed implementation for bridges that receive fixes from elsewhere
//! (a platform callback, gpsd, a replay file).

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};

use super::sample::PositionSample;

// ============================================================================
// Types
// ============================================================================

/// Receiving end of a push subscription. Dropping it unsubscribes.
pub type PositionStream = mpsc::UnboundedReceiver<PositionSample>;

/// Cadence requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionRequest {
    /// Desired interval between fixes.
    pub interval: Duration,
    /// Fastest interval the consumer can handle.
    pub fastest_interval: Duration,
    /// Minimum displacement between pushed fixes, in metres.
    pub min_distance_m: f32,
}

/// Source of position fixes.
pub trait PositionProvider: Send + Sync + 'static {
    /// Checks permission and provider state.
    ///
    /// # Errors
    ///
    /// [`Error::PositioningUnavailable`] if fixes cannot be delivered.
    fn check_available(&self) -> Result<()>;

    /// Starts pushing fixes at the requested cadence.
    ///
    /// # Errors
    ///
    /// [`Error::PositioningUnavailable`] if the subscription is refused.
    fn subscribe(&self, request: SubscriptionRequest) -> Result<PositionStream>;

    /// Most recent fix known to the provider, if any.
    fn last_known(&self) -> Option<PositionSample>;
}

// ============================================================================
// ManualProvider
// ============================================================================

#[derive(Default)]
struct ManualState {
    subscribers: Vec<mpsc::UnboundedSender<PositionSample>>,
    requests: Vec<SubscriptionRequest>,
    last_known: Option<PositionSample>,
    unavailable: Option<String>,
}

/// Provider fed by the host through [`push`](Self::push).
///
/// Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct ManualProvider {
    state: Arc<Mutex<ManualState>>,
}

impl ManualProvider {
    /// Creates an available provider with no fix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fix and pushes it to every live subscription.
    pub fn push(&self, sample: PositionSample) {
        let mut state = self.state.lock();
        state.last_known = Some(sample);
        state.subscribers.retain(|tx| tx.send(sample).is_ok());
    }

    /// Updates the last known fix without pushing it.
    pub fn set_last_known(&self, sample: PositionSample) {
        self.state.lock().last_known = Some(sample);
    }

    /// Marks the provider unavailable (permission revoked, disabled).
    pub fn set_unavailable(&self, reason: impl Into<String>) {
        self.state.lock().unavailable = Some(reason.into());
    }

    /// Marks the provider available again.
    pub fn set_available(&self) {
        self.state.lock().unavailable = None;
    }

    /// Number of subscriptions whose receiver is still alive.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    /// Most recent subscription request.
    #[must_use]
    pub fn last_request(&self) -> Option<SubscriptionRequest> {
        self.state.lock().requests.last().copied()
    }
}

impl PositionProvider for ManualProvider {
    fn check_available(&self) -> Result<()> {
        match &self.state.lock().unavailable {
            Some(reason) => Err(Error::positioning_unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn subscribe(&self, request: SubscriptionRequest) -> Result<PositionStream> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.unavailable {
            return Err(Error::positioning_unavailable(reason.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(tx);
        state.requests.push(request);
        debug!(interval_ms = request.interval.as_millis() as u64, "Position subscription added");
        Ok(rx)
    }

    fn last_known(&self) -> Option<PositionSample> {
        self.state.lock().last_known
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SubscriptionRequest {
        SubscriptionRequest {
            interval: Duration::from_secs(6),
            fastest_interval: Duration::from_secs(6),
            min_distance_m: 10.0,
        }
    }

    #[tokio::test]
    async fn test_push_reaches_subscribers() {
        let provider = ManualProvider::new();
        let mut rx = provider.subscribe(request()).unwrap();

        let sample = PositionSample::new(1.0, 2.0);
        provider.push(sample);

        assert_eq!(rx.recv().await, Some(sample));
        assert_eq!(provider.last_known(), Some(sample));
        assert_eq!(provider.last_request(), Some(request()));
    }

    #[test]
    fn test_dropped_receiver_unsubscribes() {
        let provider = ManualProvider::new();
        let rx = provider.subscribe(request()).unwrap();
        assert_eq!(provider.active_subscriptions(), 1);

        drop(rx);
        assert_eq!(provider.active_subscriptions(), 0);
    }

    #[test]
    fn test_unavailable_refuses_subscription() {
        let provider = ManualProvider::new();
        provider.set_unavailable("permission denied");

        assert!(matches!(
            provider.check_available(),
            Err(Error::PositioningUnavailable { .. })
        ));
        assert!(provider.subscribe(request()).is_err());

        provider.set_available();
        assert!(provider.check_available().is_ok());
    }
}
