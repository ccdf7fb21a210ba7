//! Core trait definitions

mod transport;

pub use transport::{TransportSink, TransportSource};
