//! Connection manager: single-handle lifecycle and reconnection.
//!
//! The [`ConnectionManager`] owns at most one live transport handle. All
//! bookkeeping (handle swap, state flip, timer arming) happens under one
//! mutex that is never held across an await or a user callback.
//!
//! # State Machine
//!
//! ```text
//!              start()
//! Disconnected ───────► Connecting ──connect──► Connected
//!      ▲                 │    ▲                    │
//!      │ stop()     error│    │timer          disconnect
//!      │                 ▼    │                    │
//!      └────────── ReconnectScheduled ◄────────────┘
//! ```
//!
//! Every handle carries a [`Generation`]. Events from a handle that has
//! been superseded are discarded, and a reconnect timer only fires if it is
//! still the armed one.
//!
//! State-change notifications are numbered under the mutex and delivered in
//! that order. A notification overtaken by a later one is skipped, so the
//! last [`SessionEvent::StateChanged`] a callback sees always matches
//! [`ConnectionManager::state`].

// ============================================================================
// Imports
// ============================================================================

use std::cell::Cell;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{Generation, TimerId};
use crate::transport::{ConnectRequest, Transport, TransportEvent, TransportEvents, TransportHandle};

use super::listeners::{
    EventListener, ListenerTable, SessionCallbacks, SessionEvent, SessionEventCallback,
};
use super::options::ManagerOptions;
use super::params::{ConnectionParameters, ConnectionState};

// ============================================================================
// Constants
// ============================================================================

/// Authorization header name.
const AUTHORIZATION_HEADER: &str = "Authorization";

/// Platform tag header name.
const DEVICE_TYPE_HEADER: &str = "deviceType";

// ============================================================================
// Public Types
// ============================================================================

/// Ticket returned by [`ConnectionManager::start`].
///
/// Identifies the transport handle opened (or reused) by the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle {
    generation: Generation,
}

impl ConnectionHandle {
    /// Generation of the underlying transport handle.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }
}

/// Outcome of [`ConnectionManager::emit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the transport.
    Sent,
    /// Dropped because the manager was not connected.
    Dropped,
}

impl Delivery {
    /// Returns `true` if the event reached the transport.
    #[inline]
    #[must_use]
    pub const fn is_sent(self) -> bool {
        matches!(self, Self::Sent)
    }
}

// ============================================================================
// Internal Types
// ============================================================================

/// Session retained across reconnects until `stop()`.
struct Session {
    params: ConnectionParameters,
    url: Url,
    callbacks: SessionCallbacks,
}

/// The one armed reconnect timer.
struct ReconnectTimer {
    id: TimerId,
    task: JoinHandle<()>,
}

/// State guarded by the manager mutex.
#[derive(Default)]
struct Shared {
    state: ConnectionState,
    generation: Generation,
    handle: Option<Arc<dyn TransportHandle>>,
    dispatcher: Option<JoinHandle<()>>,
    session: Option<Session>,
    listeners: ListenerTable,
    reconnect: Option<ReconnectTimer>,
    attempts: u32,
    /// Number of state changes recorded for notification.
    transitions: u64,
}

impl Shared {
    /// Releases the handle, dispatcher, timer and listeners.
    fn teardown(&mut self) {
        if let Some(timer) = self.reconnect.take() {
            timer.task.abort();
            debug!(timer = %timer.id, "Reconnect timer cancelled");
        }
        self.release_handle();
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }
        self.listeners.clear();
    }

    /// Closes the current handle, if any.
    fn release_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
            debug!(generation = %self.generation, "Transport handle closed");
        }
    }

    fn session_callback(&self) -> Option<SessionEventCallback> {
        self.session
            .as_ref()
            .map(|s| Arc::clone(&s.callbacks.on_session_event))
    }
}

/// Work deferred until the lock is released.
#[derive(Default)]
#[must_use]
struct Deferred {
    calls: Vec<DeferredCall>,
}

enum DeferredCall {
    /// State change tagged with its transition number.
    State(SessionEventCallback, ConnectionState, u64),
    Session(SessionEventCallback, SessionEvent),
    Listener(EventListener, Value),
}

/// Highest transition number delivered so far.
///
/// Reentrant so a callback may call back into the manager.
type DeliveryOrder = ReentrantMutex<Cell<u64>>;

impl Deferred {
    fn state(&mut self, shared: &mut Shared, state: ConnectionState) {
        shared.transitions += 1;
        if let Some(callback) = shared.session_callback() {
            self.calls
                .push(DeferredCall::State(callback, state, shared.transitions));
        }
    }

    fn run(self, order: &DeliveryOrder) {
        for call in self.calls {
            match call {
                DeferredCall::State(callback, state, seq) => {
                    let delivered = order.lock();
                    if delivered.get() > seq {
                        debug!(%state, "Superseded state notification skipped");
                        continue;
                    }
                    delivered.set(seq);
                    callback(SessionEvent::StateChanged(state));
                }
                DeferredCall::Session(callback, event) => callback(event),
                DeferredCall::Listener(listener, payload) => listener(&payload),
            }
        }
    }
}

// ============================================================================
// ManagerInner
// ============================================================================

struct ManagerInner {
    transport: Arc<dyn Transport>,
    options: ManagerOptions,
    shared: Mutex<Shared>,
    delivery: DeliveryOrder,
}

impl ManagerInner {
    /// Opens a new transport handle for the retained session.
    ///
    /// Caller must have released any previous handle.
    fn open(self: &Arc<Self>, shared: &mut Shared) -> Result<Generation> {
        debug_assert!(shared.handle.is_none(), "previous handle still open");

        let session = shared
            .session
            .as_ref()
            .ok_or_else(|| Error::config("no session to open"))?;

        let request = ConnectRequest {
            url: session.url.clone(),
            headers: vec![
                (
                    AUTHORIZATION_HEADER.to_string(),
                    session.params.auth_token.clone(),
                ),
                (
                    DEVICE_TYPE_HEADER.to_string(),
                    self.options.device_type.clone(),
                ),
            ],
            handshake_timeout: self.options.handshake_timeout,
        };

        debug!(endpoint = %request.url, "Opening transport");
        let (handle, events) = self.transport.connect(request)?;
        let generation = shared.generation.next();

        shared.generation = generation;
        shared.handle = Some(Arc::from(handle));
        shared.dispatcher = Some(tokio::spawn(dispatch(
            Arc::downgrade(self),
            generation,
            events,
        )));
        shared.state = ConnectionState::Connecting;

        info!(%generation, "Transport opening");
        Ok(generation)
    }

    /// Applies one transport event. Returns `false` if it was stale.
    fn handle_event(self: &Arc<Self>, generation: Generation, event: TransportEvent) -> bool {
        let mut deferred = Deferred::default();

        {
            let mut shared = self.shared.lock();

            if shared.generation != generation || shared.handle.is_none() {
                debug!(%generation, current = %shared.generation, "Stale transport event ignored");
                return false;
            }

            match event {
                TransportEvent::Connected => {
                    shared.state = ConnectionState::Connected;
                    shared.attempts = 0;
                    info!(%generation, "Connected");
                    deferred.state(&mut shared, ConnectionState::Connected);
                }

                TransportEvent::ConnectError(reason) => {
                    warn!(%generation, %reason, "Connect error");
                    shared.release_handle();
                    shared.dispatcher = None;
                    self.schedule_reconnect(&mut shared, &mut deferred);
                }

                TransportEvent::Disconnected(reason) => {
                    warn!(%generation, %reason, "Disconnected");
                    shared.release_handle();
                    shared.dispatcher = None;

                    if self.options.reconnect.on_disconnect {
                        self.schedule_reconnect(&mut shared, &mut deferred);
                    } else {
                        shared.state = ConnectionState::Disconnected;
                        deferred.state(&mut shared, ConnectionState::Disconnected);
                    }
                }

                TransportEvent::Event { name, payload } => {
                    if let Some(listener) = shared.listeners.get(&name) {
                        debug!(event = %name, "Inbound event routed");
                        deferred.calls.push(DeferredCall::Listener(listener, payload));
                    } else if let Some(callback) = shared.session_callback() {
                        debug!(event = %name, "Inbound event without listener");
                        deferred.calls.push(DeferredCall::Session(
                            callback,
                            SessionEvent::Inbound { name, payload },
                        ));
                    }
                }
            }
        }

        deferred.run(&self.delivery);
        true
    }

    /// Arms the reconnect timer unless one is already outstanding.
    fn schedule_reconnect(self: &Arc<Self>, shared: &mut Shared, deferred: &mut Deferred) {
        if shared.reconnect.is_some() {
            debug!("Reconnect already scheduled");
            shared.state = ConnectionState::ReconnectScheduled;
            return;
        }

        let policy = self.options.reconnect;
        if !policy.allows(shared.attempts) {
            warn!(attempts = shared.attempts, "Reconnect attempts exhausted, giving up");
            deferred.state(shared, ConnectionState::Disconnected);
            shared.teardown();
            shared.session = None;
            shared.state = ConnectionState::Disconnected;
            return;
        }

        shared.attempts += 1;
        let id = TimerId::next();
        let weak = Arc::downgrade(self);
        let delay = policy.delay;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_reconnect(id);
            }
        });

        shared.reconnect = Some(ReconnectTimer { id, task });
        shared.state = ConnectionState::ReconnectScheduled;
        info!(timer = %id, attempt = shared.attempts, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        deferred.state(shared, ConnectionState::ReconnectScheduled);
    }

    /// Runs when a reconnect timer elapses.
    fn fire_reconnect(self: &Arc<Self>, id: TimerId) {
        let mut deferred = Deferred::default();

        {
            let mut shared = self.shared.lock();

            match &shared.reconnect {
                Some(timer) if timer.id == id => {}
                _ => {
                    debug!(timer = %id, "Stale reconnect timer ignored");
                    return;
                }
            }
            // Dropping our own JoinHandle only detaches it.
            shared.reconnect = None;

            if shared.state.is_connected() || shared.session.is_none() {
                debug!(state = %shared.state, "Reconnect no longer needed");
                return;
            }

            shared.release_handle();
            if let Some(dispatcher) = shared.dispatcher.take() {
                dispatcher.abort();
            }

            debug!(attempt = shared.attempts, "Attempting scheduled reconnect");
            match self.open(&mut shared) {
                Ok(_) => deferred.state(&mut shared, ConnectionState::Connecting),
                Err(e) => {
                    warn!(error = %e, "Reconnect attempt failed to open");
                    self.schedule_reconnect(&mut shared, &mut deferred);
                }
            }
        }

        deferred.run(&self.delivery);
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.shared.get_mut().teardown();
    }
}

/// Forwards one handle's events to the manager until it ends.
async fn dispatch(manager: Weak<ManagerInner>, generation: Generation, mut events: TransportEvents) {
    while let Some(event) = events.recv().await {
        let Some(inner) = manager.upgrade() else {
            break;
        };

        let terminal = event.is_terminal();
        if !inner.handle_event(generation, event) || terminal {
            break;
        }
    }

    debug!(%generation, "Dispatcher finished");
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owner of the single event-stream connection.
///
/// Cheap to clone; clones share the same connection. Construct one per
/// process or session scope and pass it to every producer.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(SocketIoTransport::new());
/// manager.start(params, || wake_host(), |event| tracing::debug!(?event))?;
///
/// manager.emit("location_from_partner", payload);
/// manager.stop();
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Constructors
// ============================================================================

impl ConnectionManager {
    /// Creates a manager with default options.
    #[must_use]
    pub fn new(transport: impl Transport) -> Self {
        Self::build(Arc::new(transport), ManagerOptions::default())
    }

    /// Creates a manager with custom options.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the options are invalid.
    pub fn with_options(transport: impl Transport, options: ManagerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(Arc::new(transport), options))
    }

    pub(crate) fn build(transport: Arc<dyn Transport>, options: ManagerOptions) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                options,
                shared: Mutex::new(Shared::default()),
                delivery: ReentrantMutex::new(Cell::new(0)),
            }),
        }
    }
}

// ============================================================================
// ConnectionManager - Lifecycle
// ============================================================================

impl ConnectionManager {
    /// Starts a session and opens the transport.
    ///
    /// Returns without waiting for the handshake; the state is
    /// [`ConnectionState::Connecting`] until the transport reports back.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameters`] if the endpoint or token is empty.
    pub fn start<W, E>(
        &self,
        params: ConnectionParameters,
        on_foreground_wake: W,
        on_session_event: E,
    ) -> Result<ConnectionHandle>
    where
        W: Fn() + Send + Sync + 'static,
        E: Fn(SessionEvent) + Send + Sync + 'static,
    {
        self.start_with(
            params,
            SessionCallbacks::new(on_foreground_wake, on_session_event),
        )
    }

    /// Same as [`start`](Self::start) with prebuilt callbacks.
    ///
    /// If already connected with identical parameters, the existing handle
    /// is returned and no new connection is opened. Otherwise any existing
    /// handle is torn down first.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameters`] if the endpoint or token is empty, or the
    /// transport rejects the request outright.
    pub fn start_with(
        &self,
        params: ConnectionParameters,
        callbacks: SessionCallbacks,
    ) -> Result<ConnectionHandle> {
        let url = params.validate()?;
        let mut deferred = Deferred::default();

        let result = {
            let mut shared = self.inner.shared.lock();

            let same_session = shared
                .session
                .as_ref()
                .is_some_and(|s| s.params == params);

            if same_session && shared.state.is_connected() {
                debug!(generation = %shared.generation, "Already connected");
                return Ok(ConnectionHandle {
                    generation: shared.generation,
                });
            }

            shared.teardown();
            shared.attempts = 0;
            shared.listeners = ListenerTable::for_session(params.user_id, &callbacks);
            shared.session = Some(Session {
                params,
                url,
                callbacks,
            });

            match self.inner.open(&mut shared) {
                Ok(generation) => {
                    deferred.state(&mut shared, ConnectionState::Connecting);
                    Ok(ConnectionHandle { generation })
                }
                Err(e) => {
                    shared.teardown();
                    shared.session = None;
                    shared.state = ConnectionState::Disconnected;
                    Err(e)
                }
            }
        };

        deferred.run(&self.inner.delivery);
        result
    }

    /// Ends the session.
    ///
    /// Removes all listeners, closes the transport and cancels any pending
    /// reconnect before returning. Idempotent.
    pub fn stop(&self) {
        let mut deferred = Deferred::default();

        {
            let mut shared = self.inner.shared.lock();

            if shared.session.is_none()
                && shared.handle.is_none()
                && shared.reconnect.is_none()
                && shared.state == ConnectionState::Disconnected
            {
                return;
            }

            if shared.state != ConnectionState::Disconnected {
                deferred.state(&mut shared, ConnectionState::Disconnected);
            }

            shared.teardown();
            shared.session = None;
            shared.attempts = 0;
            shared.state = ConnectionState::Disconnected;
            info!(generation = %shared.generation, "Connection stopped");
        }

        deferred.run(&self.inner.delivery);
    }
}

// ============================================================================
// ConnectionManager - Messaging
// ============================================================================

impl ConnectionManager {
    /// Sends a named event if connected.
    ///
    /// Never fails: while not connected the event is dropped, not queued.
    pub fn emit(&self, event: &str, payload: Value) -> Delivery {
        let handle = {
            let shared = self.inner.shared.lock();
            if shared.state.is_connected() {
                shared.handle.clone()
            } else {
                None
            }
        };

        let Some(handle) = handle else {
            let dropped = Error::delivery_dropped(event);
            debug!(reason = %dropped, "Not connected");
            return Delivery::Dropped;
        };

        match handle.emit(event, payload) {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                warn!(event, error = %e, "Emit failed");
                Delivery::Dropped
            }
        }
    }

    /// Registers a listener for a named inbound event on the current session.
    ///
    /// Replaces any listener with the same name, including the built-in
    /// foreground-wake listener. Returns `false` if no session is active.
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> bool
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut shared = self.inner.shared.lock();
        if shared.session.is_none() {
            return false;
        }
        shared.listeners.insert(event.into(), Arc::new(listener));
        true
    }

    /// Removes a named listener. Returns `true` if one was registered.
    pub fn off(&self, event: &str) -> bool {
        self.inner.shared.lock().listeners.remove(event).is_some()
    }
}

// ============================================================================
// ConnectionManager - Introspection
// ============================================================================

impl ConnectionManager {
    /// Point-in-time check for [`ConnectionState::Connected`].
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Generation of the most recently opened handle.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.inner.shared.lock().generation
    }

    /// Returns `true` while a session is retained.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.inner.shared.lock().session.is_some()
    }

    /// Number of registered named listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.shared.lock().listeners.len()
    }

    /// Returns `true` while a reconnect timer is armed.
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.inner.shared.lock().reconnect.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use crate::identifiers::UserId;
    use crate::manager::options::ReconnectPolicy;
    use crate::transport::mock::MockTransport;

    const DELAY: Duration = Duration::from_secs(10);

    fn params() -> ConnectionParameters {
        ConnectionParameters::new("https://rt.example.com", "token-1").with_user_id(UserId::new(42))
    }

    fn manager(transport: &MockTransport) -> ConnectionManager {
        ConnectionManager::new(transport.clone())
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejects_invalid_parameters() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        let err = assert_err!(manager.start_with(
            ConnectionParameters::new("", "token"),
            SessionCallbacks::noop()
        ));
        assert!(matches!(err, Error::InvalidParameters { .. }));
        assert_eq!(transport.connect_count(), 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_opens_with_handshake_headers() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        assert_ok!(manager.start_with(params(), SessionCallbacks::noop()));
        assert_eq!(manager.state(), ConnectionState::Connecting);

        let conn = transport.last();
        assert_eq!(conn.request.header("Authorization"), Some("token-1"));
        assert_eq!(conn.request.header("deviceType"), Some("rust"));
        assert_eq!(manager.listener_count(), 1);

        conn.push(TransportEvent::Connected);
        settle().await;
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_when_connected() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        let first = manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        transport.last().push(TransportEvent::Connected);
        settle().await;

        let second = manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_with_new_parameters_replaces_handle() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        transport.last().push(TransportEvent::Connected);
        settle().await;

        let other = ConnectionParameters::new("https://rt.example.com", "token-2");
        manager.start_with(other, SessionCallbacks::noop()).unwrap();

        let connections = transport.connections();
        assert_eq!(connections.len(), 2);
        assert!(connections[0].is_closed());
        assert!(!connections[1].is_closed());
        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_clears_listeners() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.stop();
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        assert!(manager.on("custom", |_| {}));
        assert_eq!(manager.listener_count(), 2);

        manager.stop();
        manager.stop();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.listener_count(), 0);
        assert_eq!(transport.open_count(), 0);
        assert!(!manager.has_session());
        assert!(!manager.on("late", |_| {}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_emit_dropped_while_not_connected() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        assert_eq!(manager.emit("location_from_partner", json!({})), Delivery::Dropped);

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        assert_eq!(manager.emit("location_from_partner", json!({"n": 1})), Delivery::Dropped);

        transport.last().push(TransportEvent::Connected);
        settle().await;
        assert_eq!(manager.emit("location_from_partner", json!({"n": 2})), Delivery::Sent);

        manager.stop();
        assert_eq!(manager.emit("location_from_partner", json!({"n": 3})), Delivery::Dropped);

        let emitted = transport.last().emitted();
        assert_eq!(emitted, vec![("location_from_partner".to_string(), json!({"n": 2}))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_error_schedules_single_reconnect() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        let conn = transport.last();
        conn.push(TransportEvent::ConnectError("refused".into()));
        conn.push(TransportEvent::ConnectError("refused again".into()));
        settle().await;

        assert_eq!(manager.state(), ConnectionState::ReconnectScheduled);
        assert!(manager.reconnect_pending());
        assert!(conn.is_closed());

        tokio::time::advance(DELAY).await;
        settle().await;
        assert_eq!(transport.connect_count(), 2);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(!manager.reconnect_pending());

        tokio::time::advance(DELAY * 3).await;
        settle().await;
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_errors_never_stack_timers() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        let generation = manager.generation();
        transport.last().push(TransportEvent::ConnectError("refused".into()));
        settle().await;

        // Replays of the same failure go through the stale-event guard.
        for _ in 0..5 {
            assert!(!manager
                .inner
                .handle_event(generation, TransportEvent::ConnectError("again".into())));
        }

        tokio::time::advance(DELAY).await;
        settle().await;
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_reconnects_and_resets_attempts() {
        let transport = MockTransport::new();
        let manager = ConnectionManager::with_options(
            transport.clone(),
            ManagerOptions::new().with_reconnect(ReconnectPolicy::new().with_max_attempts(1)),
        )
        .unwrap();

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        transport.last().push(TransportEvent::Connected);
        settle().await;

        for round in 0..3 {
            transport.last().push(TransportEvent::Disconnected("server gone".into()));
            settle().await;
            assert_eq!(manager.state(), ConnectionState::ReconnectScheduled);

            tokio::time::advance(DELAY).await;
            settle().await;
            assert_eq!(transport.connect_count(), round + 2);

            transport.last().push(TransportEvent::Connected);
            settle().await;
            assert!(manager.is_connected());
        }
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_without_reconnect_policy() {
        let transport = MockTransport::new();
        let manager = ConnectionManager::with_options(
            transport.clone(),
            ManagerOptions::new()
                .with_reconnect(ReconnectPolicy::new().with_reconnect_on_disconnect(false)),
        )
        .unwrap();

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        transport.last().push(TransportEvent::Connected);
        settle().await;
        transport.last().push(TransportEvent::Disconnected("bye".into()));
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.reconnect_pending());
        tokio::time::advance(DELAY * 2).await;
        settle().await;
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_policy_gives_up() {
        let transport = MockTransport::new();
        let manager = ConnectionManager::with_options(
            transport.clone(),
            ManagerOptions::new().with_reconnect(ReconnectPolicy::new().with_max_attempts(2)),
        )
        .unwrap();

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        for _ in 0..2 {
            transport.last().push(TransportEvent::ConnectError("refused".into()));
            settle().await;
            tokio::time::advance(DELAY).await;
            settle().await;
        }
        assert_eq!(transport.connect_count(), 3);

        transport.last().push(TransportEvent::ConnectError("refused".into()));
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.has_session());
        assert_eq!(manager.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reconnect() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        transport.last().push(TransportEvent::ConnectError("refused".into()));
        settle().await;
        assert!(manager.reconnect_pending());

        manager.stop();
        assert!(!manager.reconnect_pending());

        tokio::time::advance(DELAY * 5).await;
        settle().await;
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_events_are_discarded() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        let old_generation = manager.generation();
        let old_conn = transport.last();

        manager.stop();
        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        assert!(manager.generation() > old_generation);

        // Late delivery from the superseded handle.
        old_conn.push(TransportEvent::Connected);
        old_conn.push(TransportEvent::ConnectError("late".into()));
        settle().await;
        assert!(!manager.inner.handle_event(old_generation, TransportEvent::Connected));
        assert!(!manager
            .inner
            .handle_event(old_generation, TransportEvent::Disconnected("late".into())));

        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(!manager.reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_revive_session() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        transport.last().push(TransportEvent::ConnectError("refused".into()));
        settle().await;

        let stale = TimerId::next();
        manager.inner.fire_reconnect(stale);
        assert_eq!(transport.connect_count(), 1);
        assert!(manager.reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_wake_routing() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        let wakes = Arc::new(AtomicUsize::new(0));
        let inbound = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let wake_counter = Arc::clone(&wakes);
        let inbound_log = Arc::clone(&inbound);
        manager
            .start(
                params(),
                move || {
                    wake_counter.fetch_add(1, Ordering::SeqCst);
                },
                move |event| {
                    if let SessionEvent::Inbound { name, .. } = event {
                        inbound_log.lock().push(name);
                    }
                },
            )
            .unwrap();

        let conn = transport.last();
        conn.push(TransportEvent::Connected);
        conn.push(TransportEvent::Event {
            name: "open_app:42".into(),
            payload: Value::Null,
        });
        settle().await;
        assert_eq!(wakes.load(Ordering::SeqCst), 1);

        conn.push(TransportEvent::Event {
            name: "open_app:99".into(),
            payload: Value::Null,
        });
        settle().await;
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
        assert_eq!(*inbound.lock(), vec!["open_app:99".to_string()]);

        conn.push(TransportEvent::Event {
            name: "open_app:42".into(),
            payload: Value::Null,
        });
        conn.push(TransportEvent::Event {
            name: "open_app:42".into(),
            payload: Value::Null,
        });
        settle().await;
        assert_eq!(wakes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_listener_survives_reconnect() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        let hits = Arc::new(AtomicUsize::new(0));

        manager.start_with(params(), SessionCallbacks::noop()).unwrap();
        let counter = Arc::clone(&hits);
        manager.on("order_cancelled", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        transport.last().push(TransportEvent::ConnectError("refused".into()));
        settle().await;
        tokio::time::advance(DELAY).await;
        settle().await;

        let conn = transport.last();
        conn.push(TransportEvent::Connected);
        conn.push(TransportEvent::Event {
            name: "order_cancelled".into(),
            payload: json!({"orderId": 7}),
        });
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(manager.off("order_cancelled"));
        assert!(!manager.off("order_cancelled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_changes_are_reported() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        let states = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let log = Arc::clone(&states);
        manager
            .start(params(), || {}, move |event| {
                if let SessionEvent::StateChanged(state) = event {
                    log.lock().push(state);
                }
            })
            .unwrap();

        transport.last().push(TransportEvent::Connected);
        settle().await;
        transport.last().push(TransportEvent::Disconnected("x".into()));
        settle().await;
        manager.stop();

        assert_eq!(
            *states.lock(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::ReconnectScheduled,
                ConnectionState::Disconnected,
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_start_stop_keeps_single_handle() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        let mut tasks = Vec::new();
        for i in 0..32 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                for j in 0..20 {
                    if (i + j) % 3 == 0 {
                        manager.stop();
                    } else {
                        let token = format!("token-{}", (i + j) % 2);
                        let _ = manager.start_with(
                            ConnectionParameters::new("https://rt.example.com", token),
                            SessionCallbacks::noop(),
                        );
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(transport.open_count() <= 1);

        manager.stop();
        assert_eq!(transport.open_count(), 0);
        assert_eq!(manager.listener_count(), 0);
    }

    #[test]
    fn test_overtaken_state_notification_is_skipped() {
        let states = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = Arc::clone(&states);
        let callback: SessionEventCallback = Arc::new(move |event| {
            if let SessionEvent::StateChanged(state) = event {
                log.lock().push(state);
            }
        });
        let order = DeliveryOrder::new(Cell::new(0));

        // The stop (2) is delivered before the connect (1) that preceded it.
        let stop = Deferred {
            calls: vec![DeferredCall::State(
                Arc::clone(&callback),
                ConnectionState::Disconnected,
                2,
            )],
        };
        let connect = Deferred {
            calls: vec![DeferredCall::State(callback, ConnectionState::Connected, 1)],
        };
        stop.run(&order);
        connect.run(&order);

        assert_eq!(*states.lock(), vec![ConnectionState::Disconnected]);
        assert_eq!(order.lock().get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_may_reenter_manager() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let log = Arc::clone(&observed);
        let inner = manager.clone();
        manager
            .start(params(), || {}, move |event| {
                if let SessionEvent::StateChanged(state) = event {
                    log.lock().push((state, inner.state()));
                    if state.is_connected() {
                        inner.stop();
                    }
                }
            })
            .unwrap();

        transport.last().push(TransportEvent::Connected);
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(
            observed.lock().last(),
            Some(&(ConnectionState::Disconnected, ConnectionState::Disconnected))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_state_notification_matches_final_state() {
        for _ in 0..50 {
            let transport = MockTransport::new();
            let manager = manager(&transport);
            let states = Arc::new(parking_lot::Mutex::new(Vec::new()));

            let log = Arc::clone(&states);
            manager
                .start(params(), || {}, move |event| {
                    if let SessionEvent::StateChanged(state) = event {
                        log.lock().push(state);
                    }
                })
                .unwrap();

            let conn = transport.last();
            let stopper = manager.clone();
            let stop = tokio::spawn(async move { stopper.stop() });
            conn.push(TransportEvent::Connected);
            stop.await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;

            assert_eq!(manager.state(), ConnectionState::Disconnected);
            assert_eq!(states.lock().last(), Some(&ConnectionState::Disconnected));
        }
    }
}
