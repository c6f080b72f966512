//! Error types for hytrack.

use std::path::PathBuf;

/// Top-level error type for a run of the tracker.
///
/// Only structural failures end up here; each one ends the process. Per-shipment failures (resolve,
/// dispatch) are handled at the orchestration boundary and reported through
/// the cycle report instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cannot open log file: {0}")]
    Logging(#[from] tracing_appender::rolling::InitError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// A string that is not an 11-digit waybill number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid waybill number: {0:?}")]
pub struct InvalidWaybill(pub String);

/// Shipment store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store file exists but cannot be parsed. Fatal: the engine must not
    /// continue and must not overwrite the file.
    #[error("Store file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Store I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode store: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures reported by a status source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Network or site error. Transient.
    #[error("Status source unavailable: {0}")]
    Unavailable(String),

    /// The site answered but its page no longer has the expected shape.
    #[error("Unexpected status page format: {0}")]
    Parse(String),
}

/// Failures from resolving a shipment's latest event.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Tracking for {waybill} unavailable: {reason}")]
    Unavailable { waybill: String, reason: String },

    #[error("Tracking page for {waybill} could not be parsed: {reason}")]
    Parse { waybill: String, reason: String },
}

/// Failure to hand a notification to the outbound mail transport.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build notification: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    Transport(String),
}

/// Mailbox collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox connection failed: {0}")]
    Connection(String),

    #[error("Mailbox login failed for {user}")]
    AuthFailed { user: String },

    #[error("Mailbox command {command} failed: {response}")]
    Command { command: String, response: String },

    #[error("Mailbox I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mailbox task failed: {0}")]
    Task(String),
}

/// Result type alias for hytrack.
pub type Result<T> = std::result::Result<T, Error>;
