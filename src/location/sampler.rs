//! Position sampling and telemetry hand-off.
//!
//! A tracking session subscribes to the provider and, as a fallback, polls
//! the last known fix on a fixed interval. Each accepted fix is diffed
//! against the previous one:
//!
//! | Step | Outcome |
//! |------|---------|
//! | First fix | Stored as baseline, nothing published |
//! | Every later fix | `location_from_partner` record published |
//! | Step ≥ significant distance | Checkpoint stored in addition |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::identifiers::{OrderId, UserId};
use crate::protocol::TelemetryRecord;

use super::geo::{bearing_degrees, distance_m};
use super::options::SamplerOptions;
use super::provider::{PositionProvider, PositionStream};
use super::sample::PositionSample;
use super::sink::TelemetrySink;

// ============================================================================
// TrackingParams
// ============================================================================

/// Identity attached to every record of a tracking session.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingParams {
    /// Order being fulfilled.
    #[serde(default)]
    pub order_id: Option<OrderId>,

    /// Partner emitting the telemetry.
    #[serde(default, alias = "userId")]
    pub partner_id: Option<UserId>,

    /// Token for the HTTP side-channel.
    #[serde(alias = "userToken")]
    pub auth_token: String,
}

impl TrackingParams {
    #[must_use]
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            order_id: None,
            partner_id: None,
            auth_token: auth_token.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_partner_id(mut self, partner_id: UserId) -> Self {
        self.partner_id = Some(partner_id);
        self
    }
}

impl fmt::Debug for TrackingParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingParams")
            .field("order_id", &self.order_id)
            .field("partner_id", &self.partner_id)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Where a fix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixSource {
    Pushed,
    Polled,
}

/// Result of feeding one fix to the [`Tracker`].
#[derive(Debug, Clone, PartialEq)]
enum Step {
    /// Fix discarded.
    Skipped(&'static str),
    /// First fix; stored only.
    Baseline,
    /// Publish `record`; checkpoint as well when `significant`.
    Record {
        record: TelemetryRecord,
        distance_m: f64,
        significant: bool,
    },
}

/// Pure per-session state: the previous accepted fix.
struct Tracker {
    order_id: Option<OrderId>,
    partner_id: Option<UserId>,
    significant_distance_m: f64,
    require_accuracy: bool,
    previous: Option<PositionSample>,
}

impl Tracker {
    fn new(params: &TrackingParams, options: &SamplerOptions) -> Self {
        Self {
            order_id: params.order_id,
            partner_id: params.partner_id,
            significant_distance_m: options.significant_distance_m,
            require_accuracy: options.require_accuracy,
            previous: None,
        }
    }

    fn step(&mut self, sample: PositionSample, source: FixSource) -> Step {
        if self.require_accuracy && sample.accuracy.is_none() {
            return Step::Skipped("no accuracy");
        }

        let Some(previous) = self.previous.replace(sample) else {
            return Step::Baseline;
        };

        if source == FixSource::Polled && previous.is_same_fix(&sample) {
            return Step::Skipped("unchanged");
        }

        let from = previous.coordinates();
        let to = sample.coordinates();
        let distance_m = distance_m(from, to);

        Step::Record {
            record: TelemetryRecord {
                latitude: sample.latitude,
                longitude: sample.longitude,
                heading_degrees: bearing_degrees(from, to),
                speed: sample.speed,
                order_id: self.order_id,
                partner_id: self.partner_id,
            },
            distance_m,
            significant: distance_m >= self.significant_distance_m,
        }
    }
}

// ============================================================================
// LocationSampler
// ============================================================================

/// Drives one tracking session at a time.
///
/// Records go to the [`TelemetrySink`]; the sink decides whether they reach
/// the wire (a stream sink drops them while disconnected).
pub struct LocationSampler {
    provider: Arc<dyn PositionProvider>,
    sink: Arc<dyn TelemetrySink>,
    options: SamplerOptions,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for LocationSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationSampler")
            .field("options", &self.options)
            .field("tracking", &self.is_tracking())
            .finish_non_exhaustive()
    }
}

impl LocationSampler {
    /// Creates a sampler with default options.
    #[must_use]
    pub fn new(provider: impl PositionProvider, sink: impl TelemetrySink) -> Self {
        Self::build(Arc::new(provider), Arc::new(sink), SamplerOptions::default())
    }

    /// Creates a sampler with custom options.
    ///
    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) if the options are invalid.
    pub fn with_options(
        provider: impl PositionProvider,
        sink: impl TelemetrySink,
        options: SamplerOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(Arc::new(provider), Arc::new(sink), options))
    }

    pub(crate) fn build(
        provider: Arc<dyn PositionProvider>,
        sink: Arc<dyn TelemetrySink>,
        options: SamplerOptions,
    ) -> Self {
        Self {
            provider,
            sink,
            options,
            task: Mutex::new(None),
        }
    }

    /// Returns the active options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    /// Starts a tracking session, replacing any current one.
    ///
    /// The previous-fix baseline is reset. Must be called inside a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// [`Error::PositioningUnavailable`](crate::Error::PositioningUnavailable)
    /// if the provider cannot deliver fixes. Tracking does not start and is
    /// not retried.
    pub fn start_tracking(&self, params: TrackingParams) -> Result<()> {
        self.stop_tracking();

        let subscription = self
            .provider
            .check_available()
            .and_then(|()| self.provider.subscribe(self.options.subscription()));

        let fixes = match subscription {
            Ok(fixes) => fixes,
            Err(e) => {
                warn!(error = %e, "Tracking not started");
                return Err(e);
            }
        };

        let tracker = Tracker::new(&params, &self.options);
        let task = tokio::spawn(run_tracking(
            tracker,
            params.auth_token,
            fixes,
            Arc::clone(&self.provider),
            Arc::clone(&self.sink),
            self.options.effective_poll_interval(),
        ));

        let mut slot = self.task.lock();
        if let Some(previous) = slot.replace(task) {
            // Lost a race with a concurrent start.
            previous.abort();
        }

        info!(order_id = ?params.order_id, partner_id = ?params.partner_id, "Tracking started");
        Ok(())
    }

    /// Ends the tracking session. Idempotent.
    ///
    /// The subscription is released once the aborted task is dropped.
    pub fn stop_tracking(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("Tracking stopped");
        }
    }

    /// Returns `true` while a tracking session runs.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for LocationSampler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

// ============================================================================
// Tracking Loop
// ============================================================================

async fn run_tracking(
    mut tracker: Tracker,
    auth_token: String,
    mut fixes: PositionStream,
    provider: Arc<dyn PositionProvider>,
    sink: Arc<dyn TelemetrySink>,
    poll_interval: Duration,
) {
    let mut poll = tokio::time::interval_at(tokio::time::Instant::now() + poll_interval, poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pushed_open = true;

    loop {
        let (sample, source) = tokio::select! {
            fix = fixes.recv(), if pushed_open => match fix {
                Some(sample) => (sample, FixSource::Pushed),
                None => {
                    debug!("Position subscription ended, polling only");
                    pushed_open = false;
                    continue;
                }
            },

            _ = poll.tick() => match provider.last_known() {
                Some(sample) => (sample, FixSource::Polled),
                None => continue,
            },
        };

        match tracker.step(sample, source) {
            Step::Skipped(reason) => {
                debug!(?source, reason, "Fix skipped");
            }

            Step::Baseline => {
                debug!(?source, "Baseline fix stored");
            }

            Step::Record {
                record,
                distance_m,
                significant,
            } => {
                let delivery = sink.publish(&auth_token, &record);
                debug!(
                    ?source,
                    distance_m,
                    heading = record.heading_degrees,
                    sent = delivery.is_sent(),
                    "Telemetry published"
                );

                if significant {
                    info!(distance_m, "Significant move, storing checkpoint");
                    let sink = Arc::clone(&sink);
                    let token = auth_token.clone();
                    let body = record.checkpoint_body();
                    tokio::spawn(async move {
                        if let Err(e) = sink.checkpoint(&token, body).await {
                            warn!(error = %e, "Checkpoint failed");
                        }
                    });
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration as ChronoDuration, Utc};
    use tokio_test::assert_err;

    use crate::error::Error;
    use crate::location::geo::destination;
    use crate::location::provider::ManualProvider;
    use crate::location::sink::RecordingSink;

    const ORIGIN: (f64, f64) = (31.9539, 35.9106);

    fn fix_at(coords: (f64, f64), seconds: i64) -> PositionSample {
        PositionSample::new(coords.0, coords.1)
            .with_accuracy(5.0)
            .with_speed(3.0)
            .with_captured_at(Utc::now() + ChronoDuration::seconds(seconds))
    }

    fn tracker() -> Tracker {
        let params = TrackingParams::new("t")
            .with_order_id(OrderId::new(7))
            .with_partner_id(UserId::new(42));
        Tracker::new(&params, &SamplerOptions::default())
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_first_fix_is_baseline_only() {
        let mut tracker = tracker();
        assert_eq!(tracker.step(fix_at(ORIGIN, 0), FixSource::Pushed), Step::Baseline);
        assert!(tracker.previous.is_some());
    }

    #[test]
    fn test_significant_move_requests_checkpoint() {
        let mut tracker = tracker();
        tracker.step(fix_at(ORIGIN, 0), FixSource::Pushed);

        let far = destination(ORIGIN, 90.0, 600.0);
        let Step::Record {
            record,
            distance_m,
            significant,
        } = tracker.step(fix_at(far, 6), FixSource::Pushed)
        else {
            panic!("expected a record");
        };

        assert!(significant);
        assert!((distance_m - 600.0).abs() < 0.5);
        assert!((record.heading_degrees - 90.0).abs() < 0.1);
        assert_eq!(record.order_id, Some(OrderId::new(7)));
        assert_eq!(record.partner_id, Some(UserId::new(42)));
        assert_eq!(record.speed, Some(3.0));
    }

    #[test]
    fn test_short_move_is_not_significant() {
        let mut tracker = tracker();
        tracker.step(fix_at(ORIGIN, 0), FixSource::Pushed);

        let near = destination(ORIGIN, 0.0, 10.0);
        let step = tracker.step(fix_at(near, 6), FixSource::Pushed);
        assert!(matches!(step, Step::Record { significant: false, .. }));
    }

    #[test]
    fn test_fix_without_accuracy_is_skipped() {
        let mut tracker = tracker();
        let sample = PositionSample::new(ORIGIN.0, ORIGIN.1);
        assert!(matches!(tracker.step(sample, FixSource::Pushed), Step::Skipped(_)));
        assert!(tracker.previous.is_none());
    }

    #[test]
    fn test_unchanged_poll_is_skipped() {
        let mut tracker = tracker();
        let fix = fix_at(ORIGIN, 0);
        tracker.step(fix, FixSource::Pushed);

        assert_eq!(tracker.step(fix, FixSource::Polled), Step::Skipped("unchanged"));
        assert!(matches!(tracker.step(fix, FixSource::Pushed), Step::Record { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_publishes_and_checkpoints() {
        let provider = ManualProvider::new();
        let sink = RecordingSink::new();
        let sampler = LocationSampler::new(provider.clone(), sink.clone());

        sampler
            .start_tracking(TrackingParams::new("token-1").with_order_id(OrderId::new(7)))
            .unwrap();
        assert!(sampler.is_tracking());
        assert_eq!(provider.active_subscriptions(), 1);

        provider.push(fix_at(ORIGIN, 0));
        settle().await;
        assert!(sink.published().is_empty());

        provider.push(fix_at(destination(ORIGIN, 180.0, 600.0), 6));
        settle().await;
        assert_eq!(sink.published().len(), 1);
        assert_eq!(sink.checkpoints().len(), 1);
        assert_eq!(sink.tokens(), vec!["token-1".to_string()]);

        provider.push(fix_at(destination(ORIGIN, 180.0, 610.0), 12));
        settle().await;
        assert_eq!(sink.published().len(), 2);
        assert_eq!(sink.checkpoints().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fallback_feeds_tracker() {
        let provider = ManualProvider::new();
        let sink = RecordingSink::new();
        let sampler = LocationSampler::new(provider.clone(), sink.clone());
        sampler.start_tracking(TrackingParams::new("t")).unwrap();
        settle().await;

        provider.set_last_known(fix_at(ORIGIN, 0));
        tokio::time::advance(Duration::from_secs(6)).await;
        settle().await;

        // Same fix again: skipped.
        tokio::time::advance(Duration::from_secs(6)).await;
        settle().await;
        assert!(sink.published().is_empty());

        provider.set_last_known(fix_at(destination(ORIGIN, 0.0, 50.0), 12));
        tokio::time::advance(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(sink.published().len(), 1);
        assert!(sink.checkpoints().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_baseline_and_subscription() {
        let provider = ManualProvider::new();
        let sink = RecordingSink::new();
        let sampler = LocationSampler::new(provider.clone(), sink.clone());

        sampler.start_tracking(TrackingParams::new("t")).unwrap();
        provider.push(fix_at(ORIGIN, 0));
        settle().await;

        sampler.start_tracking(TrackingParams::new("t")).unwrap();
        settle().await;
        assert_eq!(provider.active_subscriptions(), 1);

        provider.push(fix_at(destination(ORIGIN, 90.0, 700.0), 6));
        settle().await;
        assert!(sink.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_tracking_is_idempotent() {
        let provider = ManualProvider::new();
        let sink = RecordingSink::new();
        let sampler = LocationSampler::new(provider.clone(), sink.clone());

        sampler.stop_tracking();
        sampler.start_tracking(TrackingParams::new("t")).unwrap();
        sampler.stop_tracking();
        sampler.stop_tracking();
        settle().await;

        assert!(!sampler.is_tracking());
        assert_eq!(provider.active_subscriptions(), 0);

        provider.push(fix_at(ORIGIN, 0));
        provider.push(fix_at(destination(ORIGIN, 0.0, 900.0), 6));
        settle().await;
        assert!(sink.published().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_provider_does_not_start() {
        let provider = ManualProvider::new();
        provider.set_unavailable("permission denied");
        let sampler = LocationSampler::new(provider.clone(), RecordingSink::new());

        let err = assert_err!(sampler.start_tracking(TrackingParams::new("t")));
        assert!(matches!(err, Error::PositioningUnavailable { .. }));
        assert!(!sampler.is_tracking());
        assert_eq!(provider.active_subscriptions(), 0);
    }

    #[test]
    fn test_tracking_params_deserialize() {
        let params: TrackingParams =
            serde_json::from_str(r#"{"orderId":7,"userId":42,"userToken":"t"}"#).unwrap();
        assert_eq!(params.order_id, Some(OrderId::new(7)));
        assert_eq!(params.partner_id, Some(UserId::new(42)));
        assert!(!format!("{params:?}").contains("\"t\""));
    }
}
