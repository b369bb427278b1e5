//! Single-connection lifecycle management.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`ConnectionManager`] | Owns the one transport handle, reconnects on failure |
//! | [`ConnectionParameters`] | Endpoint, token and user id of a session |
//! | [`ManagerOptions`] | Device type, handshake timeout, [`ReconnectPolicy`] |
//! | [`SessionCallbacks`] | Foreground-wake and session-event callbacks |
//!
//! The manager is the only component that talks to the transport. Producers
//! call [`ConnectionManager::emit`], which drops events while disconnected.

// ============================================================================
// Submodules
// ============================================================================

mod connection;
mod listeners;
mod options;
mod params;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{ConnectionHandle, ConnectionManager, Delivery};
pub use listeners::{EventListener, SessionCallbacks, SessionEvent, SessionEventCallback, WakeCallback};
pub use options::{DEFAULT_DEVICE_TYPE, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_RECONNECT_DELAY, ManagerOptions, ReconnectPolicy};
pub use params::{ConnectionParameters, ConnectionState};
