//! MQTT bridge for `nvidia-smi dmon` telemetry.
//!
//! Samples per-GPU metrics from a long-running `nvidia-smi dmon` subprocess
//! and republishes them over MQTT, together with the retained Home Assistant
//! discovery messages that let the platform auto-create a typed sensor
//! entity for every metric of every GPU:
//!
//! - [`gpu`] - one-shot device enumeration
//! - [`stream`] - streaming parser for the dmon CSV protocol
//! - [`metrics`] - static descriptor table for the dmon columns
//! - [`discovery`] - discovery/availability publishing
//! - [`router`] - sample-to-device correlation
//! - [`bridge`] - connection lifecycle and subprocess supervision
//! - [`topics`] - MQTT topic construction
//! - [`config`] - JSON5 configuration
//! - [`args`] - CLI argument parsing
//! - [`error`] - error types

pub mod args;
pub mod bridge;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gpu;
pub mod metrics;
pub mod router;
pub mod stream;
pub mod topics;

pub use args::BridgeArgs;
pub use bridge::Bridge;
pub use config::{LogFormat, LoggingConfig, NvsmiBridgeConfig};
pub use error::{BridgeError, Result};

/// Initialize tracing from the logging configuration.
///
/// Emits human-readable text by default, or structured JSON for log
/// aggregation systems. A `RUST_LOG` environment filter, when set, takes
/// precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    }
    .map_err(|e| BridgeError::config(format!("failed to initialize tracing: {e}")))
}
