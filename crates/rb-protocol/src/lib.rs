//! rb-protocol: Wire format for relaybaton session multiplexing
//!
//! This crate defines how session frames are laid out inside the messages
//! carried by a tunnel, and a length-prefixed codec for running those
//! messages over a plain byte stream.

pub mod codec;
pub mod error;
pub mod frame;
pub mod session;

pub use codec::{MessageCodec, LENGTH_PREFIX_SIZE, MAX_MESSAGE_SIZE};
pub use error::ProtocolError;
pub use frame::{Frame, FrameCodec, MessageKind, PreparedMessage, SESSION_ID_SIZE};
pub use session::SessionId;
