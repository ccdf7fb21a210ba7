//! rb-peer: Session multiplexing engine for relaybaton
//!
//! One [`Multiplexer`] serves one tunnel. Outbound bytes from every session
//! pass through a single writer task with two priority levels; inbound frames
//! are routed by [`run_dispatch`]. Any [`rb_core::TransportSink`] /
//! [`rb_core::TransportSource`] pair can carry the tunnel; [`StreamTransport`]
//! provides one over a plain byte stream.

pub mod dispatch;
pub mod multiplexer;
pub mod outbound;
pub mod session;
pub mod transport;

pub use dispatch::run_dispatch;
pub use multiplexer::Multiplexer;
pub use session::{Downstream, SessionTable};
pub use transport::StreamTransport;
