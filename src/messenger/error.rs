//! Error types for messenger operations.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the messenger's caller-facing operations.
///
/// Most failure modes (write errors, transient receive errors, unexpected
/// EOF) are reported through logging and the disconnect notification stream
/// rather than a return value, because sends and loops are asynchronous.
/// Only the disconnect handshake has a caller waiting on a result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessengerError {
    /// The disconnect frame was not flushed within the configured timeout.
    /// The messenger has been stopped regardless.
    #[error("disconnect frame was not flushed within {timeout:?}")]
    DisconnectTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The send loop ended before the disconnect frame could be flushed,
    /// typically because a write failed. The messenger has been stopped.
    #[error("connection closed before the disconnect frame was flushed")]
    ConnectionClosed,
}

/// Result type for messenger operations.
pub type MessengerResult<T> = Result<T, MessengerError>;
