//! # Error Types
//!
//! Custom error types for RC Link using `thiserror`.
//!
//! The link engine itself never fails a tick: lost packets are counters and
//! state transitions. These errors only surface at the API edges (packet
//! decoding, parameter requests, configuration and log files).

use thiserror::Error;

/// Main error type for RC Link
#[derive(Debug, Error)]
pub enum RcLinkError {
    /// Wire protocol errors
    #[error("Wire protocol error: {0}")]
    Protocol(String),

    /// Parameter id outside the known range (or zero)
    #[error("Invalid parameter id: {0}")]
    InvalidParameter(u16),

    /// Parameter queue lacks room for another full set of repeats
    #[error("Parameter queue full: {requested} slots requested, {free} free")]
    ParameterQueueFull { requested: usize, free: usize },

    /// Parameters can only be queued once the peer is bound and matched
    #[error("Link not ready: peer must be bound and model-matched")]
    LinkNotReady,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Telemetry serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for RC Link
pub type Result<T> = std::result::Result<T, RcLinkError>;
