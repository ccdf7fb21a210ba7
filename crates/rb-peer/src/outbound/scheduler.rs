//! Two-level priority scheduler in front of the tunnel's write half
//!
//! Producers push into one of two bounded queues and block while it is full.
//! A single writer drains them: a pending control message always goes out
//! before any data message. Waiting on both queues at once (a biased select)
//! replaces any separate "message available" counter.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use rb_core::error::{MuxError, TransportError};
use rb_core::TransportSink;
use rb_protocol::PreparedMessage;

/// How often the writer reports its progress at trace level
const PROGRESS_LOG_INTERVAL: u64 = 50;

/// Entry in the data queue
#[derive(Debug)]
enum DataItem {
    /// A message to write
    Message(PreparedMessage),
    /// Acknowledged once every earlier data message has been written
    Barrier(oneshot::Sender<()>),
}

/// Producer side of the scheduler; cheap to clone
#[derive(Debug, Clone)]
pub struct OutboundScheduler {
    control_tx: mpsc::Sender<PreparedMessage>,
    data_tx: mpsc::Sender<DataItem>,
    shutdown: CancellationToken,
}

/// Consumer side of the scheduler, owned by the writer
#[derive(Debug)]
pub struct OutboundQueue {
    control_rx: mpsc::Receiver<PreparedMessage>,
    data_rx: mpsc::Receiver<DataItem>,
}

/// Create a scheduler with the given queue capacities.
///
/// Both capacities must be non-zero. Enqueue calls fail with
/// [`MuxError::Shutdown`] once `shutdown` is cancelled.
pub fn channel(
    control_capacity: usize,
    data_capacity: usize,
    shutdown: CancellationToken,
) -> (OutboundScheduler, OutboundQueue) {
    let (control_tx, control_rx) = mpsc::channel(control_capacity);
    let (data_tx, data_rx) = mpsc::channel(data_capacity);

    (
        OutboundScheduler {
            control_tx,
            data_tx,
            shutdown,
        },
        OutboundQueue {
            control_rx,
            data_rx,
        },
    )
}

impl OutboundScheduler {
    /// Queue a control message, waiting while the control queue is full
    pub async fn enqueue_control(&self, message: PreparedMessage) -> Result<(), MuxError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(MuxError::Shutdown),
            result = self.control_tx.send(message) => result.map_err(|_| MuxError::Shutdown),
        }
    }

    /// Queue a data message, waiting while the data queue is full
    pub async fn enqueue_data(&self, message: PreparedMessage) -> Result<(), MuxError> {
        self.push_data(DataItem::Message(message)).await
    }

    /// Wait until every data message queued before this call has been written
    pub async fn flush_data(&self) -> Result<(), MuxError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.push_data(DataItem::Barrier(done_tx)).await?;

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(MuxError::Shutdown),
            result = done_rx => result.map_err(|_| MuxError::Shutdown),
        }
    }

    async fn push_data(&self, item: DataItem) -> Result<(), MuxError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(MuxError::Shutdown),
            result = self.data_tx.send(item) => result.map_err(|_| MuxError::Shutdown),
        }
    }
}

impl OutboundQueue {
    /// Next item in priority order; `None` once every producer is gone
    async fn next(&mut self) -> Option<Outgoing> {
        tokio::select! {
            biased;
            Some(message) = self.control_rx.recv() => Some(Outgoing::Message(message)),
            Some(item) = self.data_rx.recv() => Some(match item {
                DataItem::Message(message) => Outgoing::Message(message),
                DataItem::Barrier(done) => Outgoing::Barrier(done),
            }),
            else => None,
        }
    }
}

enum Outgoing {
    Message(PreparedMessage),
    Barrier(oneshot::Sender<()>),
}

/// Drain the queues onto the transport until shutdown.
///
/// Returns `Ok(())` when `shutdown` fires or every producer has been dropped,
/// and the transport error if a write fails. Messages still queued at that
/// point are discarded.
pub async fn run_writer<S>(
    mut queue: OutboundQueue,
    mut sink: S,
    shutdown: CancellationToken,
) -> Result<(), TransportError>
where
    S: TransportSink,
{
    let mut written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = queue.next() => next,
        };

        let message = match next {
            Some(Outgoing::Message(message)) => message,
            Some(Outgoing::Barrier(done)) => {
                let _ = done.send(());
                continue;
            }
            None => {
                tracing::debug!("All producers dropped, writer exiting");
                break;
            }
        };

        tracing::trace!(
            "Writing {:?} message for {} ({} bytes)",
            message.kind(),
            message.session_id(),
            message.len()
        );

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            result = sink.send(message) => result?,
        }

        written += 1;
        if written % PROGRESS_LOG_INTERVAL == 0 {
            tracing::trace!("Writer has sent {} messages", written);
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!("Failed to close transport sink: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use rb_protocol::{FrameCodec, SessionId};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Sink that records everything written to it
    #[derive(Clone, Default)]
    struct VecSink {
        sent: Arc<Mutex<Vec<PreparedMessage>>>,
        fail: bool,
    }

    #[async_trait]
    impl TransportSink for VecSink {
        async fn send(&mut self, message: PreparedMessage) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Closed);
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn data(id: u16, payload: &'static [u8]) -> PreparedMessage {
        FrameCodec::data(SessionId::new(id), Bytes::from_static(payload)).unwrap()
    }

    #[tokio::test]
    async fn test_control_written_before_pending_data() {
        let (scheduler, queue) = channel(8, 8, CancellationToken::new());

        scheduler.enqueue_data(data(1, b"a")).await.unwrap();
        scheduler.enqueue_data(data(1, b"b")).await.unwrap();
        scheduler.enqueue_control(FrameCodec::close(SessionId::new(2))).await.unwrap();
        scheduler.enqueue_data(data(1, b"c")).await.unwrap();
        drop(scheduler);

        let sink = VecSink::default();
        run_writer(queue, sink.clone(), CancellationToken::new())
            .await
            .unwrap();

        let sent = sink.sent.lock().unwrap();
        let order: Vec<_> = sent.iter().map(|m| m.as_bytes().clone()).collect();
        assert_eq!(
            order,
            vec![
                FrameCodec::close(SessionId::new(2)).into_bytes(),
                data(1, b"a").into_bytes(),
                data(1, b"b").into_bytes(),
                data(1, b"c").into_bytes(),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_queue_blocks_until_shutdown() {
        let shutdown = CancellationToken::new();
        let (scheduler, _queue) = channel(1, 1, shutdown.clone());

        scheduler.enqueue_data(data(1, b"a")).await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), scheduler.enqueue_data(data(1, b"b")))
                .await;
        assert!(blocked.is_err(), "second enqueue should wait for room");

        shutdown.cancel();
        assert!(matches!(
            scheduler.enqueue_data(data(1, b"b")).await,
            Err(MuxError::Shutdown)
        ));
        assert!(matches!(
            scheduler.enqueue_control(FrameCodec::close(SessionId::new(1))).await,
            Err(MuxError::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_flush_waits_for_earlier_data() {
        let shutdown = CancellationToken::new();
        let (scheduler, queue) = channel(4, 4, shutdown.clone());
        let sink = VecSink::default();
        let writer = tokio::spawn(run_writer(queue, sink.clone(), shutdown.clone()));

        scheduler.enqueue_data(data(3, b"x")).await.unwrap();
        scheduler.enqueue_data(data(3, b"y")).await.unwrap();
        scheduler.flush_data().await.unwrap();
        assert_eq!(sink.sent.lock().unwrap().len(), 2);

        shutdown.cancel();
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_stops_writer() {
        let shutdown = CancellationToken::new();
        let (scheduler, queue) = channel(4, 4, shutdown.clone());
        let sink = VecSink {
            fail: true,
            ..VecSink::default()
        };

        scheduler.enqueue_data(data(1, b"a")).await.unwrap();
        let result = run_writer(queue, sink, shutdown).await;
        assert!(matches!(result, Err(TransportError::Closed)));

        // Receivers are gone, so producers fail instead of blocking
        assert!(matches!(
            scheduler.enqueue_data(data(1, b"b")).await,
            Err(MuxError::Shutdown)
        ));
    }
}
