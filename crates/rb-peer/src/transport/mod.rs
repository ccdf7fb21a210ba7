//! Transport adapters

mod stream;

pub use stream::{StreamSink, StreamSource, StreamTransport};
