//! Wire protocol types.
//!
//! This module defines the frames exchanged with the event-stream server
//! and the telemetry payloads pushed to it.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | Engine open / ping | Remote → Local | Session setup and heartbeat |
//! | Namespace connect ack / error | Remote → Local | Handshake outcome |
//! | `open_app:<userId>` | Remote → Local | Foreground wake |
//! | `location_from_partner` | Local → Remote | Live telemetry |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Event names |
//! | `packet` | Engine.IO / Socket.IO text frame codec |
//! | `telemetry` | Telemetry record and payload shapes |

// ============================================================================
// Submodules
// ============================================================================

/// Event names.
pub mod event;

/// Engine.IO / Socket.IO packet codec.
pub mod packet;

/// Telemetry record and wire payloads.
pub mod telemetry;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{LOCATION_FROM_PARTNER, OPEN_APP_PREFIX, open_app_event, parse_open_app};
pub use packet::{EnginePacket, OpenInfo, SocketPacket};
pub use telemetry::{
    CheckpointBody, PartnerEmitBody, PartnerEmitData, SPEED_WIRE_SCALE, StreamPayload,
    TelemetryRecord,
};
