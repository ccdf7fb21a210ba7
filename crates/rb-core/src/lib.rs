//! rb-core: Core abstractions and configuration for relaybaton
//!
//! This crate provides the error types, configuration structures and the
//! transport traits shared by the multiplexing engine and its embedders.

pub mod config;
pub mod error;
pub mod traits;

pub use config::MuxConfig;
pub use error::RbError;
pub use traits::{TransportSink, TransportSource};
