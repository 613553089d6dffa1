//! Error types for flexstream

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// flexstream error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed packet or payload
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Datagram shorter than its declared size
    #[error("Truncated packet: declared {declared} bytes, got {actual}")]
    Truncated {
        /// Size announced in the header, in bytes
        declared: usize,
        /// Bytes actually received
        actual: usize,
    },

    /// Codec encode/decode failure
    #[error("Codec error: {0}")]
    Codec(String),

    /// Audio device unavailable or failed
    #[error("Audio device error: {0}")]
    Device(String),

    /// Configuration could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),

    /// Reader or pipeline was closed
    #[error("Stream closed")]
    Closed,

    /// Worker thread failed to start or join
    #[error("Thread error: {0}")]
    Thread(String),
}
