//! Downstream socket handle
//!
//! Wraps the byte stream a session is relayed to. Reads are only issued by
//! the session's forward task, writes by the dispatch path. Closing cancels
//! whatever read or write is in flight.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Handle to the socket behind one session
pub struct Downstream {
    /// Read half, used by the forward task
    reader: Mutex<Box<dyn AsyncRead + Send + Unpin>>,
    /// Write half, used for inbound frames
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    /// Fired once by `close`
    closed: CancellationToken,
}

impl Downstream {
    /// Wrap a byte stream
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(Box::new(reader)),
            writer: Mutex::new(Box::new(writer)),
            closed: CancellationToken::new(),
        }
    }

    /// Read into `buf`; `Ok(0)` means end-of-stream
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(closed_error()),
            reader = self.reader.lock() => reader,
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(closed_error()),
            result = reader.read(buf) => result,
        }
    }

    /// Write all of `data` and flush
    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut writer = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(closed_error()),
            writer = self.writer.lock() => writer,
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(closed_error()),
            result = async {
                writer.write_all(data).await?;
                writer.flush().await
            } => result,
        }
    }

    /// Close the handle, failing any in-flight read or write.
    ///
    /// Returns `true` for the call that actually closed it. The socket itself
    /// is released when the last reference to the handle is dropped.
    pub fn close(&self) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        self.closed.cancel();
        true
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl std::fmt::Debug for Downstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downstream")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "downstream handle closed")
}
