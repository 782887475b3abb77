//! Tracing bootstrap for Mingle clients.
//!
//! Presence failures are deliberately absorbed rather than surfaced to
//! screens, so the structured log stream set up here is the only place
//! a systemic presence-API outage becomes visible. Every suppressed
//! error in the subsystem is emitted through `tracing`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::MingleError;

const DEFAULT_FILTER: &str = "info,mingle_core=debug,mingle_api=debug,mingle_presence=debug";

/// Initialize the global subscriber from `RUST_LOG`, falling back to the
/// crate defaults. Call once at startup.
pub fn init() -> Result<(), MingleError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    init_with_filter(filter)
}

/// Initialize with a base level from configuration (`[logging] level`),
/// still honoring `RUST_LOG` when present.
pub fn init_with_level(level: &str) -> Result<(), MingleError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},mingle_presence={level}")));
    init_with_filter(filter)
}

fn init_with_filter(filter: EnvFilter) -> Result<(), MingleError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| MingleError::Telemetry(e.to_string()))
}
