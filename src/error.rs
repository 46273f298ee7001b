//! Error types for the tunneling core.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the tunneling core.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing configuration. Fatal to a connect attempt and
    /// surfaced before any transport work begins.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The transport connection could not be opened.
    #[error("Transport open failed: {0}")]
    TransportOpen(String),

    /// A send or receive failure mid-session. Ends the affected pump
    /// and triggers teardown of its sibling.
    #[error("Transport I/O error: {0}")]
    TransportIo(String),

    /// Unexpected message tag or duplicate address assignment. Recovered
    /// locally by dropping the offending unit of work.
    #[error("Protocol anomaly: {0}")]
    ProtocolAnomaly(String),

    /// Illegal state/stage combination. A programming defect, not a
    /// user-facing failure.
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new transport-open error.
    pub fn transport_open<S: Into<String>>(msg: S) -> Self {
        Self::TransportOpen(msg.into())
    }

    /// Create a new transport I/O error.
    pub fn transport_io<S: Into<String>>(msg: S) -> Self {
        Self::TransportIo(msg.into())
    }

    /// Create a new protocol anomaly error.
    pub fn anomaly<S: Into<String>>(msg: S) -> Self {
        Self::ProtocolAnomaly(msg.into())
    }

    /// Create a new internal consistency error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalConsistency(msg.into())
    }
}
