//! Core error types for relaybaton

use rb_protocol::{ProtocolError, SessionId};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the relaybaton ecosystem
#[derive(Error, Debug)]
pub enum RbError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Multiplexer error
    #[error("Multiplexer error: {0}")]
    Mux(#[from] MuxError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the tunnel transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer closed the transport
    #[error("Transport closed")]
    Closed,

    /// Message could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session-related errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// A live handle is already registered for this id
    #[error("Session already exists: {0}")]
    AlreadyExists(SessionId),
}

/// Errors from the multiplexing engine
#[derive(Error, Debug)]
pub enum MuxError {
    /// The multiplexer has been shut down
    #[error("Multiplexer is shut down")]
    Shutdown,

    /// Session registration failed
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Outbound message could not be prepared
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
