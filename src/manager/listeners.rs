//! Inbound event listeners and session callbacks.
//!
//! Named inbound events are routed through a table keyed by event name.
//! Events with no entry fall through to the session-event callback.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::identifiers::UserId;
use crate::protocol::open_app_event;

use super::params::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// Callback bringing the host application to the foreground.
pub type WakeCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback receiving session lifecycle and unrouted inbound events.
pub type SessionEventCallback = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Listener for one named inbound event.
pub type EventListener = Arc<dyn Fn(&Value) + Send + Sync>;

// ============================================================================
// SessionEvent
// ============================================================================

/// Notification delivered to the session-event callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A named event arrived with no registered listener.
    Inbound {
        /// Event name.
        name: String,
        /// Event data.
        payload: Value,
    },
}

// ============================================================================
// SessionCallbacks
// ============================================================================

/// Callbacks retained for the lifetime of a session, across reconnects.
#[derive(Clone)]
pub struct SessionCallbacks {
    /// Invoked once per received `open_app:<userId>` event.
    pub on_foreground_wake: WakeCallback,
    /// Invoked on state changes and unrouted events.
    pub on_session_event: SessionEventCallback,
}

impl SessionCallbacks {
    /// Wraps two closures.
    pub fn new<W, E>(on_foreground_wake: W, on_session_event: E) -> Self
    where
        W: Fn() + Send + Sync + 'static,
        E: Fn(SessionEvent) + Send + Sync + 'static,
    {
        Self {
            on_foreground_wake: Arc::new(on_foreground_wake),
            on_session_event: Arc::new(on_session_event),
        }
    }

    /// Callbacks that do nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {}, |_| {})
    }
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks").finish_non_exhaustive()
    }
}

// ============================================================================
// ListenerTable
// ============================================================================

/// Named-event listeners for the current session.
#[derive(Default)]
pub(crate) struct ListenerTable {
    listeners: FxHashMap<String, EventListener>,
}

impl ListenerTable {
    /// Builds the table for a new session.
    ///
    /// Registers the foreground-wake listener when a user id is known.
    pub fn for_session(user_id: Option<UserId>, callbacks: &SessionCallbacks) -> Self {
        let mut table = Self::default();

        if let Some(user_id) = user_id {
            let wake = Arc::clone(&callbacks.on_foreground_wake);
            table.insert(open_app_event(user_id), Arc::new(move |_: &Value| wake()));
        }

        table
    }

    pub fn insert(&mut self, name: String, listener: EventListener) -> Option<EventListener> {
        self.listeners.insert(name, listener)
    }

    pub fn remove(&mut self, name: &str) -> Option<EventListener> {
        self.listeners.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<EventListener> {
        self.listeners.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_wake_listener_registered_for_user() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakes);
        let callbacks = SessionCallbacks::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            |_| {},
        );

        let table = ListenerTable::for_session(Some(UserId::new(42)), &callbacks);
        assert_eq!(table.len(), 1);
        assert!(table.get("open_app:99").is_none());

        let listener = table.get("open_app:42").unwrap();
        listener(&Value::Null);
        listener(&Value::Null);
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_no_wake_listener_without_user() {
        let table = ListenerTable::for_session(None, &SessionCallbacks::noop());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_insert_remove_clear() {
        let mut table = ListenerTable::default();
        table.insert("a".into(), Arc::new(|_: &Value| {}));
        table.insert("b".into(), Arc::new(|_: &Value| {}));
        assert!(table.remove("a").is_some());
        assert!(table.remove("a").is_none());
        table.clear();
        assert_eq!(table.len(), 0);
    }
}
