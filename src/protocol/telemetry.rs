//! Telemetry records and their wire payloads.
//!
//! A [`TelemetryRecord`] is the domain value produced by the location
//! sampler. It is rendered into one of three wire shapes depending on the
//! delivery path:
//!
//! | Payload | Path |
//! |---------|------|
//! | [`StreamPayload`] | `location_from_partner` on the live stream |
//! | [`PartnerEmitBody`] | `POST /socket/partner/emit` |
//! | [`CheckpointBody`] | `POST /location/saveCurrentLocation` |

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::identifiers::{OrderId, UserId};

use super::event::LOCATION_FROM_PARTNER;

// ============================================================================
// Constants
// ============================================================================

/// Factor applied to speed (m/s) before it goes on the wire.
///
/// The consuming backend expects speed in thousandths of m/s.
pub const SPEED_WIRE_SCALE: f32 = 1000.0;

// ============================================================================
// TelemetryRecord
// ============================================================================

/// One accepted position fix, ready for delivery.
///
/// Immutable and consumed once; never retained after emit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRecord {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Bearing from the previous fix, degrees clockwise from true north.
    pub heading_degrees: f32,
    /// Ground speed in m/s, when the provider reports it.
    pub speed: Option<f32>,
    /// Order being fulfilled.
    pub order_id: Option<OrderId>,
    /// Partner emitting the telemetry.
    pub partner_id: Option<UserId>,
}

impl TelemetryRecord {
    /// Renders the live-stream payload, stamped with the current time.
    #[must_use]
    pub fn stream_payload(&self) -> StreamPayload {
        self.stream_payload_at(Utc::now())
    }

    /// Renders the live-stream payload with an explicit timestamp.
    #[must_use]
    pub fn stream_payload_at(&self, timestamp: DateTime<Utc>) -> StreamPayload {
        StreamPayload {
            latitude: self.latitude,
            longitude: self.longitude,
            heading: self.heading_degrees,
            speed: self.speed.map(|s| s * SPEED_WIRE_SCALE),
            order_id: self.order_id,
            partner_id: self.partner_id,
            timestamp,
        }
    }

    /// Renders the HTTP relay body.
    #[must_use]
    pub fn partner_emit_body(&self) -> PartnerEmitBody {
        PartnerEmitBody {
            event_name: LOCATION_FROM_PARTNER,
            event_data: PartnerEmitData {
                latitude: self.latitude,
                longitude: self.longitude,
                heading: self.heading_degrees,
                order_id: self.order_id,
            },
        }
    }

    /// Renders the significant-move checkpoint body.
    #[inline]
    #[must_use]
    pub fn checkpoint_body(&self) -> CheckpointBody {
        CheckpointBody {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

// ============================================================================
// Wire Payloads
// ============================================================================

/// `location_from_partner` payload on the live stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(rename = "orderId", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<UserId>,
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /socket/partner/emit`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerEmitBody {
    pub event_name: &'static str,
    pub event_data: PartnerEmitData,
}

/// `eventData` of [`PartnerEmitBody`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerEmitData {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
}

/// Body of `POST /location/saveCurrentLocation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CheckpointBody {
    pub latitude: f64,
    pub longitude: f64,
}

// ============================================================================
// Tests
// ============================================================================
