//! In-memory transport for tests.
//!
//! Every `connect` records a [`MockConnection`] that tests can drive by
//! pushing [`TransportEvent`]s and inspect for emitted frames and closure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::{ConnectRequest, Transport, TransportEvent, TransportEvents, TransportHandle};

/// One connection opened through [`MockTransport`].
#[derive(Clone)]
pub(crate) struct MockConnection {
    pub request: ConnectRequest,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    emitted: Arc<Mutex<Vec<(String, Value)>>>,
    closed: Arc<AtomicBool>,
}

impl MockConnection {
    /// Delivers an inbound event as if the server sent it.
    pub fn push(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockHandle {
    emitted: Arc<Mutex<Vec<(String, Value)>>>,
    closed: Arc<AtomicBool>,
}

impl TransportHandle for MockHandle {
    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        self.emitted.lock().push((event.to_string(), payload));
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Transport double recording every connection attempt.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    connections: Arc<Mutex<Vec<MockConnection>>>,
    refusing: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `connect` calls fail outright.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn connections(&self) -> Vec<MockConnection> {
        self.connections.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Most recent connection.
    pub fn last(&self) -> MockConnection {
        self.connections
            .lock()
            .last()
            .cloned()
            .expect("no connection opened yet")
    }

    /// Connections not yet closed by the manager.
    pub fn open_count(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }
}

impl Transport for MockTransport {
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> Result<(Box<dyn TransportHandle>, TransportEvents)> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(Error::transport("connect refused"));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        self.connections.lock().push(MockConnection {
            request,
            events_tx,
            emitted: Arc::clone(&emitted),
            closed: Arc::clone(&closed),
        });

        Ok((Box::new(MockHandle { emitted, closed }), events_rx))
    }
}
