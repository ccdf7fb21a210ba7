//! Session identifier type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one logical stream inside a tunnel.
///
/// The namespace is per tunnel. An id may be reused once the previous
/// session with the same id has been fully removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u16);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Big-endian wire representation
    pub fn to_be_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

impl From<u16> for SessionId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}
