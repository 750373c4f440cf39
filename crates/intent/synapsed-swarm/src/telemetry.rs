//! Tracing subscriber setup for hosts

use crate::error::{SwarmError, SwarmResult};
use tracing_subscriber::EnvFilter;

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a human-readable subscriber filtered by `RUST_LOG` (default `info`)
pub fn init_tracing() -> SwarmResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_target(false)
        .try_init()
        .map_err(|e| SwarmError::Other(anyhow::anyhow!("tracing already initialized: {e}")))
}

/// Installs a JSON subscriber, one object per event
pub fn init_json_tracing() -> SwarmResult<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter())
        .with_current_span(true)
        .try_init()
        .map_err(|e| SwarmError::Other(anyhow::anyhow!("tracing already initialized: {e}")))
}
