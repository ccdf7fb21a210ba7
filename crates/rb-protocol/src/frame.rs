//! Application message layout
//!
//! Every message carried by the tunnel starts with the session it belongs to:
//! - session_id: 2 bytes (u16, big-endian)
//! - payload: remaining bytes
//!
//! A message with an empty payload is the close marker for its session.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::session::SessionId;

/// Size of the session id prefix in bytes
pub const SESSION_ID_SIZE: usize = 2;

/// A decoded unit of tunnel traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Payload bytes for a session
    Data {
        /// Session the bytes belong to
        session_id: SessionId,
        /// Non-empty payload
        payload: Bytes,
    },
    /// The sender has torn the session down
    Close {
        /// Session being closed
        session_id: SessionId,
    },
}

impl Frame {
    /// Create a data frame
    pub fn data(session_id: SessionId, payload: impl Into<Bytes>) -> Self {
        Self::Data {
            session_id,
            payload: payload.into(),
        }
    }

    /// Create a close frame
    pub fn close(session_id: SessionId) -> Self {
        Self::Close { session_id }
    }

    /// Session this frame is addressed to
    pub fn session_id(&self) -> SessionId {
        match self {
            Frame::Data { session_id, .. } | Frame::Close { session_id } => *session_id,
        }
    }

    /// Kind of message this frame encodes to
    pub fn kind(&self) -> MessageKind {
        match self {
            Frame::Data { .. } => MessageKind::Data,
            Frame::Close { .. } => MessageKind::Close,
        }
    }
}

/// Scheduling class of an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Ordinary session payload
    Data,
    /// Session close marker, sent with priority
    Close,
}

/// A frame encoded once and ready to hand to the transport.
///
/// Cloning is cheap; the encoded bytes are shared and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMessage {
    session_id: SessionId,
    kind: MessageKind,
    bytes: Bytes,
}

impl PreparedMessage {
    /// Session this message belongs to
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Message kind
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Whether this is a control (close) message
    pub fn is_control(&self) -> bool {
        self.kind == MessageKind::Close
    }

    /// Encoded bytes including the session id prefix
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Payload portion of the encoded message
    pub fn payload(&self) -> Bytes {
        self.bytes.slice(SESSION_ID_SIZE..)
    }

    /// Encoded length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: a message carries at least its session id
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume into the encoded bytes
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Stateless transform between frames and application messages
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame into a prepared message
    pub fn prepare(frame: &Frame) -> Result<PreparedMessage, ProtocolError> {
        let session_id = frame.session_id();
        let bytes = match frame {
            Frame::Data { payload, .. } => {
                if payload.is_empty() {
                    return Err(ProtocolError::EmptyPayload(session_id));
                }
                let mut buf = BytesMut::with_capacity(SESSION_ID_SIZE + payload.len());
                buf.put_u16(session_id.as_u16());
                buf.extend_from_slice(payload);
                buf.freeze()
            }
            Frame::Close { .. } => Bytes::copy_from_slice(&session_id.to_be_bytes()),
        };

        Ok(PreparedMessage {
            session_id,
            kind: frame.kind(),
            bytes,
        })
    }

    /// Prepare a data message for a session
    pub fn data(session_id: SessionId, payload: Bytes) -> Result<PreparedMessage, ProtocolError> {
        Self::prepare(&Frame::Data {
            session_id,
            payload,
        })
    }

    /// Prepare the close marker for a session
    pub fn close(session_id: SessionId) -> PreparedMessage {
        PreparedMessage {
            session_id,
            kind: MessageKind::Close,
            bytes: Bytes::copy_from_slice(&session_id.to_be_bytes()),
        }
    }

    /// Decode one application message
    pub fn decode(message: Bytes) -> Result<Frame, ProtocolError> {
        if message.len() < SESSION_ID_SIZE {
            return Err(ProtocolError::Truncated {
                expected: SESSION_ID_SIZE,
                actual: message.len(),
            });
        }

        let session_id = SessionId::new(u16::from_be_bytes([message[0], message[1]]));
        if message.len() == SESSION_ID_SIZE {
            return Ok(Frame::Close { session_id });
        }

        Ok(Frame::Data {
            session_id,
            payload: message.slice(SESSION_ID_SIZE..),
        })
    }
}
