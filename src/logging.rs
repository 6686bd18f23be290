//! Subscriber setup for applications embedding the vault core.
//!
//! The library itself only emits `tracing` events. Hosts that have no
//! subscriber of their own can call `init` once at startup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::errors::{Result, VaultCoreError};

/// Install a formatted subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter` (e.g. `"zkvault=info"`).
/// Fails with `Config` if a global subscriber is already set.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| VaultCoreError::Config(format!("invalid log filter: {e}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| VaultCoreError::Config(format!("logging already initialized: {e}")))
}
