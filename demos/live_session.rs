//! Live session demo.
//!
//! Connects to a Socket.IO backend, then replays a simulated drive through a
//! [`ManualProvider`] so the sampler streams `location_from_partner` events.
//!
//! ```text
//! TELEMETRY_SOCKET_URL=https://rt.example.com \
//! TELEMETRY_TOKEN=... TELEMETRY_USER_ID=42 \
//! RUST_LOG=partner_telemetry=debug cargo run --example live_session
//! ```

use std::env;
use std::time::Duration;

use anyhow::Context;
use partner_telemetry::location::geo::destination;
use partner_telemetry::{
    ConnectionParameters, ManualProvider, OrderId, Pipeline, PositionSample, SamplerOptions,
    SessionEvent, SessionParams, UserId,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Configuration
// ============================================================================

const START: (f64, f64) = (31.9539, 35.9106);
const STEPS: usize = 20;
const STEP_METRES: f64 = 120.0;
const STEP_INTERVAL: Duration = Duration::from_secs(3);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let socket_url = env::var("TELEMETRY_SOCKET_URL").context("TELEMETRY_SOCKET_URL not set")?;
    let token = env::var("TELEMETRY_TOKEN").context("TELEMETRY_TOKEN not set")?;
    let user_id: i64 = env::var("TELEMETRY_USER_ID")
        .unwrap_or_else(|_| "42".to_string())
        .parse()
        .context("TELEMETRY_USER_ID must be an integer")?;

    let provider = ManualProvider::new();
    let mut builder = Pipeline::builder()
        .provider(provider.clone())
        .sampler_options(SamplerOptions::new().with_poll_interval(STEP_INTERVAL))
        .on_foreground_wake(|| info!("Server asked to bring the app to the foreground"))
        .on_session_event(|event| match event {
            SessionEvent::StateChanged(state) => info!(%state, "Connection state"),
            SessionEvent::Inbound { name, payload } => info!(event = %name, %payload, "Inbound"),
        });

    if let Ok(api) = env::var("TELEMETRY_API_URL") {
        builder = builder.api_base_url(api);
    }
    let pipeline = builder.build()?;

    let params = SessionParams::new(
        ConnectionParameters::new(socket_url, token).with_user_id(UserId::new(user_id)),
    )
    .with_order_id(OrderId::new(1));
    pipeline.start_session(params)?;

    let mut position = START;
    for step in 0..STEPS {
        provider.push(
            PositionSample::new(position.0, position.1)
                .with_accuracy(5.0)
                .with_speed((STEP_METRES / STEP_INTERVAL.as_secs_f64()) as f32),
        );
        info!(step, connected = pipeline.manager().is_connected(), "Fix pushed");

        // Every fifth step jumps far enough to trigger a checkpoint.
        let metres = if step % 5 == 4 { STEP_METRES * 5.0 } else { STEP_METRES };
        position = destination(position, 45.0, metres);
        tokio::time::sleep(STEP_INTERVAL).await;
    }

    pipeline.stop_session();
    info!("Session stopped");
    Ok(())
}
