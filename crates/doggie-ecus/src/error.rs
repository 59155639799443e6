//! Error types for ECUs, configuration and the car orchestrator

use std::time::Duration;

use doggie_core::{IsoTpError, TransportError};
use thiserror::Error;

/// Errors raised by an ECU's lifecycle or its execution loop
#[derive(Debug, Error)]
pub enum EcuError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("ISO-TP error: {0}")]
    IsoTp(#[from] IsoTpError),

    /// The ECU's task was aborted and its state is gone
    #[error("ECU '{0}' is unavailable")]
    Unavailable(String),

    #[error("ECU '{name}' did not stop within {timeout:?}")]
    StopTimeout { name: String, timeout: Duration },

    #[error("ECU '{name}' task failed: {reason}")]
    TaskFailed { name: String, reason: String },

    #[error("ECU '{0}' is not accepting commands")]
    CommandChannelClosed(String),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while building or running the car
#[derive(Debug, Error)]
pub enum CarError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// One or more ECUs failed a collective start/stop; the rest were still processed
    #[error("{} ECU(s) failed: {}", .0.len(), summarize(.0))]
    Lifecycle(Vec<(String, EcuError)>),
}

fn summarize(failures: &[(String, EcuError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{}: {}", name, err))
        .collect::<Vec<_>>()
        .join("; ")
}
