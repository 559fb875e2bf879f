//! Error taxonomy
//!
//! None of these are fatal to monitoring. The decision loop logs them and
//! skips the current cycle.

use thiserror::Error;

/// Sample source failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to spawn scanner `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("scanner produced no stdout handle")]
    NoStdout,
    #[error("sample source is already running")]
    AlreadyRunning,
}

/// Lock, unlock and probe failures
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("accessibility permission required for {0}")]
    PermissionDenied(&'static str),
    #[error("no password stored under keychain item `{0}`")]
    CredentialMissing(String),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("actuator I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration load/save failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unlock_rssi ({unlock}) must be strictly greater than lock_rssi ({lock})")]
    InvalidThresholds { unlock: i16, lock: i16 },
}

/// Monitor lifecycle failures
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("sample source is still held by a previous session")]
    SourceUnavailable,
    #[error("monitor loop did not stop within {0:?}")]
    StopTimeout(std::time::Duration),
    #[error("monitor loop panicked")]
    LoopPanicked,
}
