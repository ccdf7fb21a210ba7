//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Message is too short to carry a session id
    #[error("Truncated message: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Data frames must carry at least one byte; an empty payload means close
    #[error("Empty data payload for {0}")]
    EmptyPayload(crate::session::SessionId),

    /// Message exceeds maximum size
    #[error("Message too large: {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
