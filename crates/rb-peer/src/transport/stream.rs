//! Tunnel transport over a plain byte stream
//!
//! Frames messages with [`MessageCodec`] and splits the stream into the
//! write half handed to the multiplexer's writer and the read half handed to
//! the dispatch loop.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use rb_core::error::TransportError;
use rb_core::{MuxConfig, TransportSink, TransportSource};
use rb_protocol::{Frame, MessageCodec, PreparedMessage};

/// Builds the two halves of a stream-backed tunnel
pub struct StreamTransport;

impl StreamTransport {
    /// Split `io` into a sink and a source using the default message limit
    pub fn split<T>(io: T) -> (StreamSink<T>, StreamSource<T>)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::split_with_codec(io, MessageCodec::new())
    }

    /// Split `io` with the message limit from `config`
    pub fn from_config<T>(io: T, config: &MuxConfig) -> (StreamSink<T>, StreamSource<T>)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::split_with_codec(io, MessageCodec::with_max_message_size(config.max_message_size))
    }

    /// Split `io` using a configured codec
    pub fn split_with_codec<T>(io: T, codec: MessageCodec) -> (StreamSink<T>, StreamSource<T>)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (sink, stream) = Framed::new(io, codec).split();
        (StreamSink { inner: sink }, StreamSource { inner: stream })
    }
}

/// Write half of a stream-backed tunnel
pub struct StreamSink<T> {
    inner: SplitSink<Framed<T, MessageCodec>, PreparedMessage>,
}

/// Read half of a stream-backed tunnel
pub struct StreamSource<T> {
    inner: SplitStream<Framed<T, MessageCodec>>,
}

#[async_trait]
impl<T> TransportSink for StreamSink<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn send(&mut self, message: PreparedMessage) -> Result<(), TransportError> {
        self.inner.send(message).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close().await?;
        Ok(())
    }
}

#[async_trait]
impl<T> TransportSource for StreamSource<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.inner.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}
