//! Error types for roster-scan.

use std::time::Duration;

/// Errors surfaced by a scan pass and its wiring. Configuration, delivery and
/// per-group failures are reported through their own types where they occur.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Directory collaborator call failed or timed out.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Rate limited on {endpoint}, retry after {retry_after:?}")]
    RateLimited {
        endpoint: String,
        retry_after: Option<Duration>,
    },

    #[error("Unexpected response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

/// Notification sink rejected or failed to accept an event.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery request failed: {0}")]
    Request(String),

    #[error("Sink rejected event with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An uncaught failure while scanning one group. Isolated to that group.
#[derive(Debug, thiserror::Error)]
pub enum GroupScanError {
    #[error("Scan of group {group} aborted: {reason}")]
    Aborted { group: String, reason: String },
}

/// Result type alias for the scanner.
pub type Result<T> = std::result::Result<T, Error>;
