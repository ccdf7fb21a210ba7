//! The per-tunnel multiplexer
//!
//! Owns the session table and the outbound scheduler, and implements the
//! session lifecycle on top of them:
//!
//! ```text
//! Absent --register--> Active --EOF / I/O error / remote close--> Closing --removed--> Absent
//! ```
//!
//! Every path out of `Active` claims the session's close through the table,
//! so exactly one close message is emitted per session no matter how many
//! of those paths race.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use rb_core::config::MuxConfig;
use rb_core::error::MuxError;
use rb_core::TransportSink;
use rb_protocol::{FrameCodec, SessionId};

use crate::outbound::{self, OutboundScheduler};
use crate::session::{Downstream, Lookup, SessionTable};

/// Multiplexes sessions over one tunnel
pub struct Multiplexer {
    /// Live sessions and close bookkeeping
    sessions: SessionTable,
    /// Producer side of the outbound queues
    outbound: OutboundScheduler,
    /// Broadcast observed by the writer, enqueue waits and dispatch
    shutdown: CancellationToken,
    /// Set by the first `shutdown` call
    shut_down: AtomicBool,
    /// Running forward tasks
    forward_tasks: TaskTracker,
    /// Engine configuration
    config: MuxConfig,
}

impl Multiplexer {
    /// Start a multiplexer writing to `sink`.
    ///
    /// Spawns the writer task and returns its handle. A failed transport
    /// write shuts the whole multiplexer down.
    pub fn start<S>(sink: S, config: MuxConfig) -> Result<(Arc<Self>, JoinHandle<()>), MuxError>
    where
        S: TransportSink + 'static,
    {
        config.validate()?;

        let shutdown = CancellationToken::new();
        let (outbound, queue) = outbound::channel(
            config.control_queue_capacity,
            config.data_queue_capacity,
            shutdown.clone(),
        );

        let mux = Arc::new(Self {
            sessions: SessionTable::new(),
            outbound,
            shutdown: shutdown.clone(),
            shut_down: AtomicBool::new(false),
            forward_tasks: TaskTracker::new(),
            config,
        });

        // Weak so that dropping every handle to the multiplexer ends the writer
        let weak = Arc::downgrade(&mux);
        let writer = tokio::spawn(async move {
            match outbound::run_writer(queue, sink, shutdown).await {
                Ok(()) => tracing::debug!("Writer loop stopped"),
                Err(e) => {
                    tracing::error!("Tunnel write failed, shutting down: {}", e);
                    if let Some(mux) = weak.upgrade() {
                        mux.shutdown();
                    }
                }
            }
        });

        Ok((mux, writer))
    }

    /// Engine configuration
    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Register a downstream socket for a session.
    ///
    /// A live session with the same id is kept and the new socket is closed.
    pub fn register<S>(&self, session_id: SessionId, stream: S) -> Result<(), MuxError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        if self.is_shut_down() {
            return Err(MuxError::Shutdown);
        }

        let handle = Arc::new(Downstream::new(stream));
        self.sessions.put(session_id, Arc::clone(&handle))?;

        // Shutdown may have drained the table between the check and the put
        if self.is_shut_down() {
            handle.close();
            self.sessions.retire(session_id, &handle);
            return Err(MuxError::Shutdown);
        }

        tracing::debug!("Registered {}", session_id);
        Ok(())
    }

    /// Relay bytes from the session's socket into the tunnel until the socket
    /// ends or fails, then close the session.
    pub async fn forward(&self, session_id: SessionId) {
        let Some(handle) = self.sessions.get(session_id) else {
            tracing::debug!("Not forwarding {}: no such session", session_id);
            return;
        };

        let mut buf = vec![0u8; self.config.read_buffer_size];
        let mut forwarded = false;

        loop {
            match handle.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!("{} reached end of stream", session_id);
                    break;
                }
                Ok(n) => {
                    let payload = Bytes::copy_from_slice(&buf[..n]);
                    let message = match FrameCodec::data(session_id, payload) {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::warn!("Failed to prepare data for {}: {}", session_id, e);
                            break;
                        }
                    };
                    if let Err(e) = self.outbound.enqueue_data(message).await {
                        tracing::debug!("Stopped forwarding {}: {}", session_id, e);
                        break;
                    }
                    forwarded = true;
                }
                Err(e) => {
                    if handle.is_closed() {
                        tracing::debug!("{} closed while forwarding", session_id);
                    } else {
                        tracing::warn!("Read from {} failed: {}", session_id, e);
                    }
                    break;
                }
            }
        }

        // The close travels on the priority queue; let our data reach the
        // tunnel first so the peer does not drop it as late.
        if forwarded && !handle.is_closed() {
            if let Err(e) = self.outbound.flush_data().await {
                tracing::debug!("Flush for {} abandoned: {}", session_id, e);
            }
        }

        self.teardown(session_id, &handle).await;
    }

    /// Spawn `forward` as a tracked task
    pub fn spawn_forward(self: &Arc<Self>, session_id: SessionId) -> JoinHandle<()> {
        let mux = Arc::clone(self);
        self.forward_tasks.spawn(async move { mux.forward(session_id).await })
    }

    /// Deliver one inbound payload to its session
    pub async fn receive(&self, session_id: SessionId, payload: Bytes) {
        match self.sessions.resolve(session_id) {
            Lookup::Active(handle) => {
                if let Err(e) = handle.write_all(&payload).await {
                    if handle.is_closed() {
                        tracing::debug!(
                            "Dropped {} bytes for closing {}",
                            payload.len(),
                            session_id
                        );
                    } else {
                        tracing::warn!("Write to {} failed: {}", session_id, e);
                    }
                    self.teardown(session_id, &handle).await;
                }
            }
            Lookup::Unknown { send_close: true } => {
                tracing::debug!("Frame for unknown {}, answering with close", session_id);
                self.send_close(session_id).await;
            }
            Lookup::Unknown { send_close: false } => {
                tracing::trace!("Dropped late frame for closed {}", session_id);
            }
        }
    }

    /// Tear down a session at the remote side's request.
    ///
    /// Later frames for the id are dropped silently. If a live session was
    /// torn down and no close had gone out for it yet, one close is sent
    /// back as the acknowledgement.
    pub async fn delete(&self, session_id: SessionId) {
        let (handle, first) = self.sessions.remove_and_mark(session_id);
        let Some(handle) = handle else {
            tracing::trace!("Delete for absent {}", session_id);
            return;
        };

        handle.close();
        tracing::debug!("{} deleted", session_id);
        if first {
            self.send_close(session_id).await;
        }
    }

    /// Shut the tunnel down: stop the writer, close every session socket and
    /// with them the forward tasks.
    ///
    /// Safe to call from any number of tasks; returns `true` only for the
    /// call that performed the teardown.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }

        tracing::info!("Shutting down multiplexer");
        self.shutdown.cancel();
        self.forward_tasks.close();

        let drained = self.sessions.drain();
        let count = drained.len();
        for (session_id, handle) in drained {
            handle.close();
            tracing::trace!("Closed {} on shutdown", session_id);
        }
        tracing::debug!("Closed {} sessions on shutdown", count);
        true
    }

    /// Shut down and wait up to `shutdown_grace` for forward tasks to exit
    pub async fn shutdown_and_wait(&self) {
        self.shutdown();
        if tokio::time::timeout(self.config.shutdown_grace, self.forward_tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                "{} forward tasks still running after {:?}",
                self.forward_tasks.len(),
                self.config.shutdown_grace
            );
        }
    }

    /// Whether `shutdown` has run
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Resolves once shutdown has been triggered
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Token cancelled on shutdown, for loops sharing the tunnel
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether a socket is registered for the session
    pub fn has_session(&self, session_id: SessionId) -> bool {
        self.sessions.get(session_id).is_some()
    }

    /// Whether a close has been sent or received for the session
    pub fn is_close_sent(&self, session_id: SessionId) -> bool {
        self.sessions.is_close_sent(session_id)
    }

    /// Number of registered sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close the handle and, if this path owns the close, tell the peer
    async fn teardown(&self, session_id: SessionId, handle: &Arc<Downstream>) {
        handle.close();
        if self.sessions.retire(session_id, handle) {
            self.send_close(session_id).await;
        }
    }

    async fn send_close(&self, session_id: SessionId) {
        if let Err(e) = self.outbound.enqueue_control(FrameCodec::close(session_id)).await {
            tracing::debug!("Close for {} not sent: {}", session_id, e);
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
