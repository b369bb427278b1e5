//! Connection manager configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use partner_telemetry::{ManagerOptions, ReconnectPolicy};
//!
//! let options = ManagerOptions::new()
//!     .with_device_type("android")
//!     .with_reconnect(ReconnectPolicy::new().with_max_attempts(10));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Delay before a scheduled reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Upper bound on the transport handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Platform tag sent in the `deviceType` header.
pub const DEFAULT_DEVICE_TYPE: &str = "rust";

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// How the manager retries after a connect error or disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay before each attempt.
    pub delay: Duration,

    /// Consecutive failed attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,

    /// Whether a disconnect after a successful handshake schedules a
    /// reconnect. Connect errors always do.
    pub on_disconnect: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectPolicy {
    /// Infinite retries every 10 seconds, on errors and disconnects.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: None,
            on_disconnect: true,
        }
    }

    /// Sets the delay between attempts.
    #[inline]
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Bounds the number of consecutive attempts.
    #[inline]
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Enables or disables reconnecting after a plain disconnect.
    #[inline]
    #[must_use]
    pub const fn with_reconnect_on_disconnect(mut self, enabled: bool) -> Self {
        self.on_disconnect = enabled;
        self
    }

    /// Returns `true` if another attempt is allowed after `attempts` tries.
    #[inline]
    #[must_use]
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

// ============================================================================
// ManagerOptions
// ============================================================================

/// Connection manager options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Value of the `deviceType` handshake header.
    pub device_type: String,

    /// Upper bound on the transport handshake.
    pub handshake_timeout: Duration,

    /// Retry behaviour.
    pub reconnect: ReconnectPolicy,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            reconnect: ReconnectPolicy::new(),
        }
    }

    /// Sets the `deviceType` header value.
    #[inline]
    #[must_use]
    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an empty device type or zero durations.
    pub fn validate(&self) -> Result<()> {
        if self.device_type.trim().is_empty() {
            return Err(Error::config("device_type must not be empty"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(Error::config("handshake_timeout must be greater than zero"));
        }
        if self.reconnect.delay.is_zero() {
            return Err(Error::config("reconnect delay must be greater than zero"));
        }
        if self.reconnect.max_attempts == Some(0) {
            return Err(Error::config("max_attempts must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
