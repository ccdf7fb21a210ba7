//! Outbound message scheduling

mod scheduler;

pub use scheduler::{channel, run_writer, OutboundQueue, OutboundScheduler};
