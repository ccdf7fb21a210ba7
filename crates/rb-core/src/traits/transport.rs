//! Transport traits
//!
//! The tunnel is split into two halves. The sink is owned by the single
//! writer task; the source is owned by the dispatch loop.

use async_trait::async_trait;

use crate::error::TransportError;
use rb_protocol::{Frame, PreparedMessage};

/// Write half of a tunnel
#[async_trait]
pub trait TransportSink: Send {
    /// Send one prepared message, preserving call order
    async fn send(&mut self, message: PreparedMessage) -> Result<(), TransportError>;

    /// Flush and close the write half
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Read half of a tunnel
#[async_trait]
pub trait TransportSource: Send {
    /// Receive the next decoded frame
    ///
    /// Returns `Ok(None)` once the remote side has closed the tunnel.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;
}
