//! Location acquisition, throttling and telemetry hand-off.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`LocationSampler`] | One tracking session at a time, diffing consecutive fixes |
//! | [`PositionProvider`] | Platform seam delivering [`PositionSample`]s |
//! | [`TelemetrySink`] | Delivery target: [`StreamSink`] or [`HttpSink`] |
//! | [`SamplerOptions`] | Cadence profile and distance thresholds |

// ============================================================================
// Submodules
// ============================================================================

pub mod geo;

mod options;
mod provider;
mod sample;
mod sampler;
mod sink;

// ============================================================================
// Re-exports
// ============================================================================

pub use options::{
    DEFAULT_MIN_DISTANCE_M, DEFAULT_SIGNIFICANT_DISTANCE_M, SamplerOptions, SamplingProfile,
};
pub use provider::{ManualProvider, PositionProvider, PositionStream, SubscriptionRequest};
pub use sample::PositionSample;
pub use sampler::{LocationSampler, TrackingParams};
pub use sink::{HttpSink, StreamSink, TelemetrySink};
