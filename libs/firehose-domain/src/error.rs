//! Domain errors for stream sessions and consumers
//!
//! Every way a session can end is mapped onto a [`FaultClass`], and every class
//! belongs to one [`FaultKind`] which decides how the reconnect backoff reacts.
//! These errors abstract away transport details (no reqwest or hyper types here).

use std::fmt;

use thiserror::Error;

/// How a fault class influences the reconnect backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// TLS, socket or URL level failure; escalates the delay
    Transport,
    /// Malformed or incomplete HTTP exchange; reconnect at the current delay
    Protocol,
    /// Decompression or reassembly failure; connection force-closed, escalates
    Stream,
    /// The remote end closed the stream cleanly; delay resets to the floor
    CleanEof,
}

/// Classification of the event that ended a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultClass {
    ForcedDisconnect,
    Tls,
    IncompleteRead,
    Http,
    Connection,
    StreamProcessing,
}

impl FaultClass {
    /// Backoff category of this class
    pub fn kind(self) -> FaultKind {
        match self {
            FaultClass::ForcedDisconnect => FaultKind::CleanEof,
            FaultClass::Tls | FaultClass::Connection => FaultKind::Transport,
            FaultClass::IncompleteRead | FaultClass::Http => FaultKind::Protocol,
            FaultClass::StreamProcessing => FaultKind::Stream,
        }
    }

    /// Whether this class grows the reconnect delay
    pub fn escalates(self) -> bool {
        matches!(self.kind(), FaultKind::Transport | FaultKind::Stream)
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultClass::ForcedDisconnect => "forced_disconnect",
            FaultClass::Tls => "tls",
            FaultClass::IncompleteRead => "incomplete_read",
            FaultClass::Http => "http",
            FaultClass::Connection => "connection",
            FaultClass::StreamProcessing => "stream_processing",
        };
        f.write_str(name)
    }
}

/// Errors that can end a stream session
#[derive(Error, Debug)]
pub enum StreamError {
    /// TLS handshake or certificate failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// The chunked body ended in the middle of a chunk (data chunk lost)
    #[error("Streaming chunked-read error (data chunk lost): {0}")]
    IncompleteRead(String),

    /// The upstream answered with a non-success status
    #[error("HTTP error: status {status}: {message}")]
    Http { status: u16, message: String },

    /// DNS, socket, timeout or URL level failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// The gzip framing of the stream could not be inflated
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Failure while handling reassembled data
    #[error("Buffer processing error: {0}")]
    Processing(String),
}

impl StreamError {
    /// Create a TLS error with a message
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create an incomplete read error with a message
    pub fn incomplete_read(msg: impl Into<String>) -> Self {
        Self::IncompleteRead(msg.into())
    }

    /// Create an HTTP status error
    pub fn http(status: u16, msg: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: msg.into(),
        }
    }

    /// Create a connection error with a message
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a decompression error with a message
    pub fn decompression(msg: impl Into<String>) -> Self {
        Self::Decompression(msg.into())
    }

    /// Create a processing error with a message
    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }

    /// Fault class used by the supervisor to pick the next delay
    pub fn fault_class(&self) -> FaultClass {
        match self {
            StreamError::Tls(_) => FaultClass::Tls,
            StreamError::IncompleteRead(_) => FaultClass::IncompleteRead,
            StreamError::Http { .. } => FaultClass::Http,
            StreamError::Connection(_) => FaultClass::Connection,
            StreamError::Decompression(_) | StreamError::Processing(_) => {
                FaultClass::StreamProcessing
            }
        }
    }
}

/// Result type alias for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors reported by a downstream consumer
///
/// The engine never acts on these; dispatch workers only log them.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Filesystem or other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The consumer is missing a required option or got an invalid one
    #[error("Consumer configuration error: {0}")]
    Config(String),

    /// Any other failure while handling a batch
    #[error("Consumer failed: {0}")]
    Failed(String),
}

impl ConsumerError {
    /// Create a config error with a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic failure with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}
