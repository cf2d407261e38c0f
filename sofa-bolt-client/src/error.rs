//! Client error types.

use thiserror::Error;

/// Transport-level client errors. Per-call protocol failures are
/// recorded on the controller instead.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("unrecognized bytes on stream, connection dropped")]
    CorruptStream,
}

impl ClientError {
    /// Returns whether retrying on a fresh connection may help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Timeout | ClientError::ConnectionClosed
        )
    }
}
