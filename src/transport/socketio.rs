//! Socket.IO client connection and event loop.
//!
//! Speaks Engine.IO v4 over a single websocket (no polling fallback, no
//! upgrade, no built-in reconnection).
//!
//! # Event Loop
//!
//! Each connection spawns a tokio task that handles:
//!
//! - The websocket open and Engine.IO / namespace handshake
//! - Heartbeat replies and the ping watchdog
//! - Outbound event frames from [`SocketIoConnection::emit`]
//! - Inbound events, forwarded as [`TransportEvent`]s

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as WsRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{EnginePacket, OpenInfo, SocketPacket};

use super::{ConnectRequest, Transport, TransportEvent, TransportEvents, TransportHandle};

// ============================================================================
// Constants
// ============================================================================

/// Engine.IO protocol revision.
const ENGINE_IO_VERSION: &str = "4";

/// Engine.IO request path.
const ENGINE_IO_PATH: &str = "/socket.io/";

/// Watchdog used until the server announces its ping interval.
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(45);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send an encoded frame.
    Send(String),
    /// Close the connection.
    Shutdown,
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the Engine.IO open packet.
    AwaitingOpen,
    /// Namespace connect sent, waiting for the ack.
    AwaitingConnect,
    /// Handshake complete.
    Connected,
}

/// Why the event loop stopped.
enum Exit {
    /// Closed from our side; nothing to report.
    Local,
    /// Remote or network failure.
    Remote(Error),
}

// ============================================================================
// URL Mapping
// ============================================================================

/// Maps a caller-supplied endpoint to the Engine.IO websocket URL.
///
/// `https://host/any` → `wss://host/socket.io/?EIO=4&transport=websocket`.
/// Only the default namespace is supported, so any path on the endpoint is
/// ignored.
///
/// # Errors
///
/// [`Error::InvalidParameters`] for schemes other than http(s)/ws(s).
pub fn engine_url(endpoint: &Url) -> Result<Url> {
    let scheme = match endpoint.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::invalid_parameters(format!(
                "unsupported endpoint scheme '{other}'"
            )));
        }
    };

    if endpoint.path() != "/" && !endpoint.path().is_empty() {
        warn!(path = endpoint.path(), "Endpoint path ignored, using default namespace");
    }

    let mut url = endpoint.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::invalid_parameters("cannot rewrite endpoint scheme"))?;
    url.set_path(ENGINE_IO_PATH);
    url.set_fragment(None);

    let extra: Vec<(String, String)> = endpoint
        .query_pairs()
        .filter(|(k, _)| k != "EIO" && k != "transport")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.append_pair("EIO", ENGINE_IO_VERSION);
        query.append_pair("transport", "websocket");
        for (k, v) in &extra {
            query.append_pair(k, v);
        }
    }

    Ok(url)
}

/// Builds the websocket upgrade request with handshake headers.
fn build_ws_request(request: &ConnectRequest) -> Result<WsRequest> {
    let url = engine_url(&request.url)?;
    let mut ws_request = url.as_str().into_client_request()?;

    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::invalid_parameters(format!("bad header name: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::invalid_parameters(format!("bad header value for {name}: {e}")))?;
        ws_request.headers_mut().insert(name, value);
    }

    Ok(ws_request)
}

// ============================================================================
// SocketIoTransport
// ============================================================================

/// Production [`Transport`] speaking Socket.IO over tokio-tungstenite.
///
/// Requires a running tokio runtime; each `connect` spawns one task.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketIoTransport;

impl SocketIoTransport {
    /// Creates the transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Transport for SocketIoTransport {
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> Result<(Box<dyn TransportHandle>, TransportEvents)> {
        let (connection, events) = SocketIoConnection::open(request)?;
        Ok((Box::new(connection), events))
    }
}

// ============================================================================
// SocketIoConnection
// ============================================================================

/// Handle to one Socket.IO connection.
///
/// Cloning yields another handle to the same connection. Dropping handles
/// does not close the connection; call [`TransportHandle::close`].
#[derive(Debug, Clone)]
pub struct SocketIoConnection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl SocketIoConnection {
    /// Validates the request and spawns the event loop.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameters`] for an unusable URL or header.
    pub fn open(request: ConnectRequest) -> Result<(Self, TransportEvents)> {
        let ws_request = build_ws_request(&request)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_event_loop(
            ws_request,
            request.handshake_timeout,
            command_rx,
            events_tx,
        ));

        Ok((Self { command_tx }, events_rx))
    }

    /// Event loop that handles websocket I/O.
    async fn run_event_loop(
        ws_request: WsRequest,
        handshake_timeout: Duration,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let handshake_deadline = Instant::now() + handshake_timeout;

        // Phase 1: websocket upgrade, interruptible by shutdown.
        let upgrade = connect_async(ws_request);
        tokio::pin!(upgrade);

        let ws_stream = loop {
            tokio::select! {
                result = &mut upgrade => {
                    match result {
                        Ok((stream, _response)) => break stream,
                        Err(e) => {
                            let err = Error::from(e);
                            warn!(error = %err, "WebSocket connect failed");
                            let _ = events_tx.send(TransportEvent::ConnectError(err.to_string()));
                            return;
                        }
                    }
                }

                () = sleep_until(handshake_deadline) => {
                    let err = Error::handshake_timeout(handshake_timeout.as_millis() as u64);
                    let _ = events_tx.send(TransportEvent::ConnectError(err.to_string()));
                    return;
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(_)) => {
                            trace!("Frame dropped before handshake");
                        }
                        Some(ConnectionCommand::Shutdown) | None => {
                            debug!("Closed before websocket upgrade");
                            return;
                        }
                    }
                }
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut phase = Phase::AwaitingOpen;
        let mut heartbeat = DEFAULT_HEARTBEAT;
        let mut deadline = handshake_deadline;

        // Phase 2: Engine.IO session.
        let exit = loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let packet = match EnginePacket::decode(&text) {
                                Ok(packet) => packet,
                                Err(e) => {
                                    warn!(error = %e, "Failed to parse incoming frame");
                                    continue;
                                }
                            };

                            match Self::handle_packet(packet, &mut phase, &mut ws_write, &events_tx).await {
                                Ok(Some(open)) => heartbeat = open.heartbeat_deadline(),
                                Ok(None) => {
                                    if phase == Phase::Connected {
                                        deadline = Instant::now() + heartbeat;
                                    }
                                }
                                Err(exit) => break exit,
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            break Exit::Remote(Error::transport("closed by remote"));
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break Exit::Remote(e.into());
                        }

                        None => {
                            break Exit::Remote(Error::transport("stream ended"));
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                () = sleep_until(deadline) => {
                    let reason = if phase == Phase::Connected {
                        Error::transport("ping timeout")
                    } else {
                        Error::handshake_timeout(handshake_timeout.as_millis() as u64)
                    };
                    break Exit::Remote(reason);
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(frame)) => {
                            if phase != Phase::Connected {
                                trace!("Frame dropped before handshake");
                                continue;
                            }
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                break Exit::Remote(e.into());
                            }
                        }

                        Some(ConnectionCommand::Shutdown) | None => {
                            debug!("Shutdown command received");
                            let disconnect = EnginePacket::Message(SocketPacket::Disconnect).encode();
                            let _ = ws_write.send(Message::Text(disconnect.into())).await;
                            let _ = ws_write.close().await;
                            break Exit::Local;
                        }
                    }
                }
            }
        };

        if let Exit::Remote(err) = exit {
            let reason = err.to_string();
            let event = if phase == Phase::Connected {
                TransportEvent::Disconnected(reason)
            } else {
                TransportEvent::ConnectError(reason)
            };
            debug!(?event, "Connection ended");
            let _ = events_tx.send(event);
        }

        debug!("Event loop terminated");
    }

    /// Applies one inbound packet.
    ///
    /// Returns the open info when the session was just opened.
    async fn handle_packet(
        packet: EnginePacket,
        phase: &mut Phase,
        ws_write: &mut WsWrite,
        events_tx: &mpsc::UnboundedSender<TransportEvent>,
    ) -> std::result::Result<Option<OpenInfo>, Exit> {
        match packet {
            EnginePacket::Open(info) => {
                debug!(sid = %info.sid, ping_interval = info.ping_interval, "Engine session open");
                let connect = EnginePacket::Message(SocketPacket::Connect(None)).encode();
                Self::write(ws_write, connect).await?;
                *phase = Phase::AwaitingConnect;
                Ok(Some(info))
            }

            EnginePacket::Ping => {
                Self::write(ws_write, EnginePacket::Pong.encode()).await?;
                trace!("Heartbeat");
                Ok(None)
            }

            EnginePacket::Close => Err(Exit::Remote(Error::transport("engine closed by remote"))),

            EnginePacket::Message(SocketPacket::Connect(_)) => {
                *phase = Phase::Connected;
                let _ = events_tx.send(TransportEvent::Connected);
                Ok(None)
            }

            EnginePacket::Message(SocketPacket::ConnectError(data)) => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| data.to_string(), str::to_string);
                Err(Exit::Remote(Error::transport(message)))
            }

            EnginePacket::Message(SocketPacket::Disconnect) => {
                Err(Exit::Remote(Error::transport("namespace disconnected by remote")))
            }

            EnginePacket::Message(SocketPacket::Event { name, data }) => {
                trace!(event = %name, "Inbound event");
                let _ = events_tx.send(TransportEvent::Event {
                    name,
                    payload: data,
                });
                Ok(None)
            }

            EnginePacket::Message(SocketPacket::Ack)
            | EnginePacket::Pong
            | EnginePacket::Upgrade
            | EnginePacket::Noop => Ok(None),
        }
    }

    async fn write(ws_write: &mut WsWrite, frame: String) -> std::result::Result<(), Exit> {
        ws_write
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| Exit::Remote(e.into()))
    }
}

impl TransportHandle for SocketIoConnection {
    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        let frame = EnginePacket::event(event, payload).encode();
        self.command_tx
            .send(ConnectionCommand::Send(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }
}

// ============================================================================
// Tests
// ============================================================================
