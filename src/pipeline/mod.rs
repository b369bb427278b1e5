//! Host-facing session pipeline.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Pipeline`] | `start_session` / `stop_session` / `update_session` / `is_session_active` |
//! | [`PipelineBuilder`] | Transport, provider, HTTP side-channel, callbacks, options |
//! | [`SessionParams`] | Connection parameters plus order id |

// ============================================================================
// Submodules
// ============================================================================

mod builder;
mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::PipelineBuilder;
pub use session::{Pipeline, SessionParams};
