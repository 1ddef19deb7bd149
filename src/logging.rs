//! Log output through `tracing-subscriber`.
//!
//! The library itself only emits `tracing` events; binaries, tests and
//! benchmarks decide whether and where they are printed.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{PropbagError, Result};

/// Installs a global fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| PropbagError::Config(e.to_string()))?;
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| PropbagError::Config(e.to_string()))
}

/// Like [`init`] with a `warn` default, and quiet when a subscriber is
/// already installed. Meant for tests.
pub fn try_init() {
    let _ = init("warn");
}
