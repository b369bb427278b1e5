//! Event names used on the stream channel.
//!
//! | Event | Direction | Purpose |
//! |-------|-----------|---------|
//! | `open_app:<userId>` | Remote → Local | Bring the host application to the foreground |
//! | `location_from_partner` | Local → Remote | Live position and heading |

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::UserId;

// ============================================================================
// Constants
// ============================================================================

/// Outbound live telemetry event.
pub const LOCATION_FROM_PARTNER: &str = "location_from_partner";

/// Prefix of the user-scoped foreground-wake event.
pub const OPEN_APP_PREFIX: &str = "open_app";

// ============================================================================
// Helpers
// ============================================================================

/// Returns the foreground-wake event name for a user.
///
/// # Example
///
/// ```ignore
/// assert_eq!(open_app_event(UserId::new(42)), "open_app:42");
/// ```
#[inline]
#[must_use]
pub fn open_app_event(user_id: UserId) -> String {
    format!("{OPEN_APP_PREFIX}:{user_id}")
}

/// Extracts the user id from a foreground-wake event name.
///
/// Returns `None` for any other event or a non-numeric suffix.
#[must_use]
pub fn parse_open_app(name: &str) -> Option<UserId> {
    let (prefix, user) = name.split_once(':')?;
    if prefix != OPEN_APP_PREFIX {
        return None;
    }
    user.parse::<i64>().ok().map(UserId::new)
}

// ============================================================================
// Tests
// ============================================================================
