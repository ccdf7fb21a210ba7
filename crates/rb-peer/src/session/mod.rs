//! Session bookkeeping

mod downstream;
mod table;

pub use downstream::Downstream;
pub use table::{Lookup, SessionTable};
