//! Inbound frame dispatch loop

use std::sync::Arc;

use rb_core::TransportSource;
use rb_protocol::Frame;

use crate::multiplexer::Multiplexer;

/// Route frames from the tunnel's read half to the multiplexer.
///
/// Data frames go to [`Multiplexer::receive`] and close frames to
/// [`Multiplexer::delete`], one at a time so that each session sees its bytes
/// in order. Returns when the multiplexer shuts down; a read error or the
/// remote closing the tunnel triggers that shutdown.
pub async fn run_dispatch<S>(mux: Arc<Multiplexer>, mut source: S)
where
    S: TransportSource,
{
    let shutdown = mux.shutdown_token();

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                tracing::debug!("Dispatch loop stopped by shutdown");
                return;
            }
            next = source.recv() => next,
        };

        match next {
            Ok(Some(Frame::Data {
                session_id,
                payload,
            })) => mux.receive(session_id, payload).await,
            Ok(Some(Frame::Close { session_id })) => {
                tracing::debug!("Remote closed {}", session_id);
                mux.delete(session_id).await;
            }
            Ok(None) => {
                tracing::info!("Tunnel closed by remote");
                mux.shutdown();
                return;
            }
            Err(e) => {
                tracing::error!("Tunnel read failed, shutting down: {}", e);
                mux.shutdown();
                return;
            }
        }
    }
}
