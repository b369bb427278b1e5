//! Partner telemetry - realtime connection and location pipeline.
//!
//! This library keeps one long-lived Socket.IO event stream open to a
//! backend, wakes the host application when the server asks for it, and
//! pushes throttled location telemetry over that stream.
//!
//! # Architecture
//!
//! ```text
//! PositionProvider ──► LocationSampler ──► TelemetrySink ──► ConnectionManager ──► Transport
//!                                               │                   │
//!                                               └── HTTP checkpoint └── open_app:<id> ──► wake
//! ```
//!
//! Key design principles:
//!
//! - At most one transport handle at a time, tagged with a [`Generation`]
//! - The manager owns retry timing; transports never reconnect themselves
//! - Telemetry produced while disconnected is dropped, never queued
//! - Only caller misuse surfaces as an error; network failures self-heal
//!
//! # Quick Start
//!
//! ```no_run
//! use partner_telemetry::{ConnectionParameters, ManualProvider, Pipeline, Result, SessionParams};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let provider = ManualProvider::new();
//!     let pipeline = Pipeline::builder()
//!         .provider(provider.clone())
//!         .api_base_url("https://api.example.com/order-management/")
//!         .on_foreground_wake(|| println!("bring app to front"))
//!         .build()?;
//!
//!     let params = ConnectionParameters::new("https://rt.example.com", "token");
//!     pipeline.start_session(SessionParams::new(params))?;
//!
//!     // Feed fixes from the platform into `provider.push(..)`.
//!
//!     pipeline.stop_session();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Socket.IO packet codec and telemetry payloads |
//! | [`transport`] | Transport traits, Socket.IO client, HTTP client |
//! | [`manager`] | [`ConnectionManager`] and its options |
//! | [`location`] | [`LocationSampler`], providers, sinks, geodesy |
//! | [`pipeline`] | [`Pipeline`] session contract and builder |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Location acquisition and telemetry hand-off.
pub mod location;

/// Single-connection lifecycle management.
pub mod manager;

/// Host-facing session pipeline.
pub mod pipeline;

/// Wire protocol types.
pub mod protocol;

/// Event-stream and HTTP transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{Generation, OrderId, TimerId, UserId};

// Location types
pub use location::{
    HttpSink, LocationSampler, ManualProvider, PositionProvider, PositionSample, SamplerOptions,
    SamplingProfile, StreamSink, SubscriptionRequest, TelemetrySink, TrackingParams,
};

// Manager types
pub use manager::{
    ConnectionHandle, ConnectionManager, ConnectionParameters, ConnectionState, Delivery,
    ManagerOptions, ReconnectPolicy, SessionCallbacks, SessionEvent,
};

// Pipeline types
pub use pipeline::{Pipeline, PipelineBuilder, SessionParams};

// Protocol types
pub use protocol::TelemetryRecord;

// Transport types
pub use transport::{
    ConnectRequest, HttpTelemetryClient, SocketIoTransport, Transport, TransportEvent,
    TransportHandle,
};
