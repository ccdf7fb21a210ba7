//! Shared helpers for multiplexer integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use rb_core::error::TransportError;
use rb_core::{MuxConfig, TransportSink, TransportSource};
use rb_peer::Multiplexer;
use rb_protocol::{Frame, PreparedMessage, SessionId};

/// How long a test waits for something that should happen
pub const WAIT: Duration = Duration::from_secs(5);

/// How long a test waits to be sure something does not happen
pub const QUIET: Duration = Duration::from_millis(100);

static TRACING: Once = Once::new();

/// Install a subscriber so `RUST_LOG` works under `cargo test`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Sink forwarding every message to a channel, optionally failing
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<PreparedMessage>,
    /// Number of sends that succeed before every later send fails
    fail_after: Option<usize>,
    /// Shared count of attempted sends
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl TransportSink for RecordingSink {
    async fn send(&mut self, message: PreparedMessage) -> Result<(), TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| attempt >= limit) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "tunnel is gone",
            )));
        }
        let _ = self.tx.send(message);
        Ok(())
    }
}

/// Source fed from a channel; a dropped sender reads as the tunnel closing
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

#[async_trait]
impl TransportSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Create a source and the sender that feeds it
pub fn channel_source() -> (
    mpsc::UnboundedSender<Result<Frame, TransportError>>,
    ChannelSource,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ChannelSource { rx })
}

/// A running multiplexer plus everything it wrote
pub struct Harness {
    pub mux: Arc<Multiplexer>,
    pub writer: JoinHandle<()>,
    pub sent: mpsc::UnboundedReceiver<PreparedMessage>,
    pub attempts: Arc<AtomicUsize>,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_with(MuxConfig::default(), None)
    }

    pub fn start_failing(fail_after: usize) -> Self {
        Self::start_with(MuxConfig::default(), Some(fail_after))
    }

    pub fn start_with(config: MuxConfig, fail_after: Option<usize>) -> Self {
        init_tracing();
        let (tx, sent) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicUsize::new(0));
        let sink = RecordingSink {
            tx,
            fail_after,
            attempts: Arc::clone(&attempts),
        };
        let (mux, writer) = Multiplexer::start(sink, config).expect("valid config");
        Self {
            mux,
            writer,
            sent,
            attempts,
        }
    }

    /// Next message written to the tunnel
    pub async fn next_sent(&mut self) -> PreparedMessage {
        tokio::time::timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for an outbound message")
            .expect("writer stopped")
    }

    /// Assert that nothing more is written for a while
    pub async fn assert_quiet(&mut self) {
        match tokio::time::timeout(QUIET, self.sent.recv()).await {
            Err(_) | Ok(None) => {}
            Ok(Some(message)) => panic!(
                "unexpected {:?} message for {}",
                message.kind(),
                message.session_id()
            ),
        }
    }

    /// Collect everything written until `QUIET` passes without a message
    pub async fn drain_sent(&mut self) -> Vec<PreparedMessage> {
        let mut out = Vec::new();
        while let Ok(Some(message)) = tokio::time::timeout(QUIET, self.sent.recv()).await {
            out.push(message);
        }
        out
    }
}

/// Count close messages for one session
pub fn closes_for(messages: &[PreparedMessage], id: SessionId) -> usize {
    messages
        .iter()
        .filter(|m| m.is_control() && m.session_id() == id)
        .count()
}
