//! Location sampler configuration.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

use super::provider::SubscriptionRequest;

// ============================================================================
// Constants
// ============================================================================

/// Minimum displacement between pushed fixes, in metres.
pub const DEFAULT_MIN_DISTANCE_M: f32 = 10.0;

/// Displacement that triggers a durable checkpoint, in metres.
pub const DEFAULT_SIGNIFICANT_DISTANCE_M: f64 = 500.0;

// ============================================================================
// SamplingProfile
// ============================================================================

/// Cadence preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SamplingProfile {
    /// App in the foreground: a fix every 6 seconds.
    #[default]
    Foreground,
    /// Background service: every 15 seconds, no faster than 10.
    Background,
    /// Explicit cadence.
    Custom {
        /// Desired interval.
        interval: Duration,
        /// Fastest accepted interval.
        fastest_interval: Duration,
    },
}

impl SamplingProfile {
    /// Desired interval between fixes.
    #[must_use]
    pub const fn interval(self) -> Duration {
        match self {
            Self::Foreground => Duration::from_secs(6),
            Self::Background => Duration::from_secs(15),
            Self::Custom { interval, .. } => interval,
        }
    }

    /// Fastest interval the sampler accepts.
    #[must_use]
    pub const fn fastest_interval(self) -> Duration {
        match self {
            Self::Foreground => Duration::from_secs(6),
            Self::Background => Duration::from_secs(10),
            Self::Custom {
                fastest_interval, ..
            } => fastest_interval,
        }
    }
}

// ============================================================================
// SamplerOptions
// ============================================================================

/// Location sampler options.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerOptions {
    /// Subscription cadence.
    pub profile: SamplingProfile,

    /// Fallback poll of the last known fix. Defaults to the profile interval.
    pub poll_interval: Option<Duration>,

    /// Passed to the provider as its minimum displacement.
    pub min_distance_m: f32,

    /// Step length that triggers a checkpoint.
    pub significant_distance_m: f64,

    /// Discard fixes without an accuracy estimate.
    pub require_accuracy: bool,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplerOptions {
    /// Foreground profile with default thresholds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            profile: SamplingProfile::Foreground,
            poll_interval: None,
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
            significant_distance_m: DEFAULT_SIGNIFICANT_DISTANCE_M,
            require_accuracy: true,
        }
    }

    /// Background profile with default thresholds.
    #[must_use]
    pub const fn background() -> Self {
        Self::new().with_profile(SamplingProfile::Background)
    }

    #[inline]
    #[must_use]
    pub const fn with_profile(mut self, profile: SamplingProfile) -> Self {
        self.profile = profile;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_min_distance(mut self, metres: f32) -> Self {
        self.min_distance_m = metres;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_significant_distance(mut self, metres: f64) -> Self {
        self.significant_distance_m = metres;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_require_accuracy(mut self, required: bool) -> Self {
        self.require_accuracy = required;
        self
    }

    /// Effective fallback poll interval.
    #[must_use]
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.unwrap_or_else(|| self.profile.interval())
    }

    /// Subscription request derived from these options.
    #[must_use]
    pub fn subscription(&self) -> SubscriptionRequest {
        SubscriptionRequest {
            interval: self.profile.interval(),
            fastest_interval: self.profile.fastest_interval(),
            min_distance_m: self.min_distance_m,
        }
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for zero intervals or negative distances.
    pub fn validate(&self) -> Result<()> {
        if self.profile.interval().is_zero() || self.profile.fastest_interval().is_zero() {
            return Err(Error::config("sampling interval must be greater than zero"));
        }
        if self.effective_poll_interval().is_zero() {
            return Err(Error::config("poll_interval must be greater than zero"));
        }
        if self.min_distance_m.is_nan() || self.min_distance_m < 0.0 {
            return Err(Error::config("min_distance_m must not be negative"));
        }
        if self.significant_distance_m.is_nan() || self.significant_distance_m < 0.0 {
            return Err(Error::config("significant_distance_m must not be negative"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles() {
        assert_eq!(SamplingProfile::Foreground.interval(), Duration::from_secs(6));
        assert_eq!(SamplingProfile::Background.interval(), Duration::from_secs(15));
        assert_eq!(SamplingProfile::Background.fastest_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_defaults() {
        let options = SamplerOptions::default();
        assert_eq!(options.effective_poll_interval(), Duration::from_secs(6));
        assert_eq!(options.significant_distance_m, 500.0);
        assert!(options.require_accuracy);
        assert!(options.validate().is_ok());

        let request = SamplerOptions::background().subscription();
        assert_eq!(request.interval, Duration::from_secs(15));
        assert_eq!(request.min_distance_m, 10.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(
            SamplerOptions::new()
                .with_poll_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(SamplerOptions::new().with_min_distance(-1.0).validate().is_err());
        assert!(
            SamplerOptions::new()
                .with_significant_distance(f64::NAN)
                .validate()
                .is_err()
        );
    }
}
