//! Tokio codec for running tunnel messages over a byte stream
//!
//! Each message is preceded by a 4-byte big-endian length:
//! - length: 4 bytes (u32, big-endian)
//! - message: `length` bytes, laid out as described in `frame.rs`

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{Frame, FrameCodec, PreparedMessage};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound for a single message (1 MiB)
pub const MAX_MESSAGE_SIZE: usize = 1 << 20;

/// Largest length the prefix can carry
const MAX_ENCODABLE_SIZE: usize = u32::MAX as usize;

/// Length-prefixed codec: encodes prepared messages, decodes frames
#[derive(Debug)]
pub struct MessageCodec {
    /// Largest message accepted in either direction
    max_message_size: usize,
    /// Length of the message being decoded (if the prefix was already read)
    pending_length: Option<usize>,
}

impl MessageCodec {
    /// Create a codec with the default size limit
    pub fn new() -> Self {
        Self::with_max_message_size(MAX_MESSAGE_SIZE)
    }

    /// Create a codec with a custom size limit
    ///
    /// The limit is capped at what the 4-byte length prefix can express.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            max_message_size: max_message_size.min(MAX_ENCODABLE_SIZE),
            pending_length: None,
        }
    }

    /// Configured size limit
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let length = match self.pending_length.take() {
            Some(len) => len,
            None => {
                if src.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }
                src.get_u32() as usize
            }
        };

        if length > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: length,
                max: self.max_message_size,
            });
        }

        if src.len() < length {
            self.pending_length = Some(length);
            src.reserve(length - src.len());
            return Ok(None);
        }

        let message = src.split_to(length).freeze();
        FrameCodec::decode(message).map(Some)
    }
}

impl Encoder<PreparedMessage> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: PreparedMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = item.len();
        if length > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: length,
                max: self.max_message_size,
            });
        }

        let prefix = u32::try_from(length).map_err(|_| ProtocolError::MessageTooLarge {
            size: length,
            max: MAX_ENCODABLE_SIZE,
        })?;

        dst.reserve(LENGTH_PREFIX_SIZE + length);
        dst.put_u32(prefix);
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use bytes::Bytes;

    #[test]
    fn test_codec_data_message() {
        let mut codec = MessageCodec::new();
        let msg = FrameCodec::data(SessionId::new(42), Bytes::from("Hello, world!")).unwrap();

        let mut buf = BytesMut::new();
        codec.encode(msg, &mut buf).unwrap();
        assert_eq!(buf.len(), LENGTH_PREFIX_SIZE + 2 + 13);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            decoded,
            Frame::data(SessionId::new(42), Bytes::from("Hello, world!"))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = MessageCodec::new();

        let mut full_buf = BytesMut::new();
        codec
            .encode(FrameCodec::close(SessionId::new(5)), &mut full_buf)
            .unwrap();

        // Prefix only
        let mut partial = full_buf.split_to(LENGTH_PREFIX_SIZE);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full_buf);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded, Frame::close(SessionId::new(5)));
    }

    #[test]
    fn test_codec_back_to_back_messages() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                FrameCodec::data(SessionId::new(1), Bytes::from_static(b"x")).unwrap(),
                &mut buf,
            )
            .unwrap();
        codec.encode(FrameCodec::close(SessionId::new(1)), &mut buf).unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::data(SessionId::new(1), Bytes::from_static(b"x")))
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::close(SessionId::new(1)))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let mut codec = MessageCodec::with_max_message_size(8);

        let mut buf = BytesMut::new();
        buf.put_u32(9);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::MessageTooLarge { size: 9, max: 8 })
        ));

        let msg = FrameCodec::data(SessionId::new(1), Bytes::from_static(b"too long")).unwrap();
        assert!(codec.encode(msg, &mut BytesMut::new()).is_err());
    }

    #[test]
    fn test_limit_capped_at_prefix_range() {
        let codec = MessageCodec::with_max_message_size(usize::MAX);
        assert_eq!(codec.max_message_size(), u32::MAX as usize);

        let codec = MessageCodec::with_max_message_size(64);
        assert_eq!(codec.max_message_size(), 64);
    }
}
