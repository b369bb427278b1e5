//! Raw position fixes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One fix delivered by a [`PositionProvider`](super::PositionProvider).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
    /// Horizontal accuracy radius in metres, if the provider reports one.
    pub accuracy: Option<f32>,
    /// Ground speed in m/s.
    pub speed: Option<f32>,
    /// Provider-reported course over ground.
    pub bearing: Option<f32>,
    /// When the fix was taken.
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    /// Creates a fix taken now, with no optional measurements.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            speed: None,
            bearing: None,
            captured_at: Utc::now(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_accuracy(mut self, accuracy: f32) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_bearing(mut self, bearing: f32) -> Self {
        self.bearing = Some(bearing);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// `(latitude, longitude)` pair for the geodesy helpers.
    #[inline]
    #[must_use]
    pub const fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Returns `true` if both describe the same provider fix.
    ///
    /// Used to skip a polled last-known fix that has not changed.
    #[must_use]
    pub fn is_same_fix(&self, other: &Self) -> bool {
        self.captured_at == other.captured_at
            && self.latitude == other.latitude
            && self.longitude == other.longitude
    }
}
