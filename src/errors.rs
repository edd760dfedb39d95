//! Error types for the respkv server
//! Provides structured error handling using thiserror for better error reporting

use thiserror::Error;

/// Main error type for the respkv server.
///
/// Client-visible command failures (`-ERR ...`, `-WRONGTYPE ...`) are RESP
/// error frames, not `ServerError`s; this type covers the failures that
/// terminate a connection or the process: framing violations, IO, bad
/// configuration, and replication handshake breakdowns.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// RESP framing errors; the offending connection is closed
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Replication handshake or propagation errors
    #[error("Replication error: {message}")]
    Replication {
        message: String,
        context: Option<String>,
    },

    /// RDB snapshot decoding errors
    #[error("Snapshot error: {message}")]
    Snapshot { message: String },

    /// Network/IO related errors
    #[error("Network IO error")]
    NetworkIO(#[from] std::io::Error),

    /// String conversion errors
    #[error("String conversion error")]
    StringConversion(#[from] std::string::FromUtf8Error),

    /// Task execution errors for async operations
    #[error("Task execution error")]
    TaskExecution(#[from] tokio::task::JoinError),

    /// Generic error for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for convenience
pub type ServerResult<T> = std::result::Result<T, ServerError>;

impl ServerError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a protocol framing error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a replication error
    pub fn replication<S: Into<String>>(message: S) -> Self {
        Self::Replication {
            message: message.into(),
            context: None,
        }
    }

    /// Create a replication error with context
    pub fn replication_with_context<S: Into<String>, C: Into<String>>(
        message: S,
        context: C,
    ) -> Self {
        Self::Replication {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a snapshot decoding error
    pub fn snapshot<S: Into<String>>(message: S) -> Self {
        Self::Snapshot {
            message: message.into(),
        }
    }
}
