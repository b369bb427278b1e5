//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Only the subset spoken over a pure websocket transport on the default
//! namespace is supported. Binary attachments are rejected.
//!
//! # Frame Format
//!
//! | Frame | Meaning |
//! |-------|---------|
//! | `0{"sid":..,"pingInterval":..,"pingTimeout":..}` | Engine open |
//! | `1` | Engine close |
//! | `2` / `3` | Ping / pong |
//! | `40` / `40{..}` | Namespace connect (request / ack) |
//! | `41` | Namespace disconnect |
//! | `42["name",data]` | Event |
//! | `44{"message":..}` | Namespace connect error |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// OpenInfo
// ============================================================================

/// Payload of the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    /// Engine session id.
    pub sid: String,

    /// Transports the server would allow upgrading to.
    #[serde(default)]
    pub upgrades: Vec<String>,

    /// Interval between server pings, in milliseconds.
    pub ping_interval: u64,

    /// Grace period after a missed ping, in milliseconds.
    pub ping_timeout: u64,

    /// Maximum payload size accepted by the server.
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl OpenInfo {
    /// Time after which a silent server is considered gone.
    #[inline]
    #[must_use]
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

// ============================================================================
// SocketPacket
// ============================================================================

/// A Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connect. Carries auth data from the client or the ack
    /// payload from the server.
    Connect(Option<Value>),
    /// Namespace disconnect.
    Disconnect,
    /// Named event with its data.
    ///
    /// A single argument is carried as-is; several are carried as an array;
    /// none as `Null`.
    Event {
        /// Event name.
        name: String,
        /// Event data.
        data: Value,
    },
    /// Acknowledgement of an earlier event. Contents are ignored.
    Ack,
    /// Namespace connect refused by the server.
    ConnectError(Value),
}

impl SocketPacket {
    /// Creates an event packet.
    #[inline]
    #[must_use]
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Self::Event {
            name: name.into(),
            data,
        }
    }

    fn encode(&self) -> String {
        match self {
            Self::Connect(None) => "0".to_string(),
            Self::Connect(Some(auth)) => format!("0{auth}"),
            Self::Disconnect => "1".to_string(),
            Self::Event { name, data } => {
                let frame = match data {
                    Value::Null => Value::Array(vec![Value::String(name.clone())]),
                    other => Value::Array(vec![Value::String(name.clone()), other.clone()]),
                };
                format!("2{frame}")
            }
            Self::Ack => "3[]".to_string(),
            Self::ConnectError(data) => format!("4{data}"),
        }
    }

    fn decode(body: &str) -> Result<Self> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::protocol("empty socket packet"))?;
        let rest = strip_ack_id(strip_namespace(chars.as_str()));

        match kind {
            '0' => {
                if rest.is_empty() {
                    Ok(Self::Connect(None))
                } else {
                    Ok(Self::Connect(Some(serde_json::from_str(rest)?)))
                }
            }
            '1' => Ok(Self::Disconnect),
            '2' => Self::decode_event(rest),
            '3' => Ok(Self::Ack),
            '4' => {
                let data = if rest.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(rest)?
                };
                Ok(Self::ConnectError(data))
            }
            '5' | '6' => Err(Error::protocol("binary socket packets are not supported")),
            other => Err(Error::protocol(format!("unknown socket packet type '{other}'"))),
        }
    }

    fn decode_event(rest: &str) -> Result<Self> {
        let Value::Array(mut items) = serde_json::from_str(rest)? else {
            return Err(Error::protocol("event payload is not an array"));
        };

        if items.is_empty() {
            return Err(Error::protocol("event payload has no name"));
        }

        let Value::String(name) = items.remove(0) else {
            return Err(Error::protocol("event name is not a string"));
        };

        let data = match items.len() {
            0 => Value::Null,
            1 => items.remove(0),
            _ => Value::Array(items),
        };

        Ok(Self::Event { name, data })
    }
}

/// Drops a leading `/namespace,` prefix.
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/')
        && let Some(idx) = body.find(',')
    {
        return &body[idx + 1..];
    }
    body
}

/// Drops a leading numeric ack id.
fn strip_ack_id(body: &str) -> &str {
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

// ============================================================================
// EnginePacket
// ============================================================================

/// An Engine.IO text packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// Session opened by the server.
    Open(OpenInfo),
    /// Session closed.
    Close,
    /// Heartbeat ping.
    Ping,
    /// Heartbeat pong.
    Pong,
    /// Socket.IO payload.
    Message(SocketPacket),
    /// Transport upgrade (unused over websocket-only sessions).
    Upgrade,
    /// No-op.
    Noop,
}

impl EnginePacket {
    /// Parses a websocket text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] for unknown or unsupported packet types
    /// - [`Error::Json`] for malformed JSON bodies
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::protocol("empty engine packet"))?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => Ok(Self::Message(SocketPacket::decode(body)?)),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(Error::protocol(format!("unknown engine packet type '{other}'"))),
        }
    }

    /// Encodes the packet as a websocket text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            // Clients never send an open packet; encode the bare type.
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Message(packet) => format!("4{}", packet.encode()),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }

    /// Shorthand for an event message.
    #[inline]
    #[must_use]
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Self::Message(SocketPacket::event(name, data))
    }
}

// ============================================================================
// Tests
// ============================================================================
