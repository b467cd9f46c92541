// ============================
// crates/backend-lib/src/peer.rs
// ============================
//! One accepted connection as seen by the rest of the server.
//!
//! A [`Peer`] never touches the socket directly. Outgoing frames go through a bounded queue
//! drained by a single writer task that owns the write half, so concurrent senders can never
//! interleave bytes on the wire. Closing is a one-shot flag plus a cancellation token shared
//! with the read loop and the writer task.

use crate::error::AppError;
use crate::frame::{self, Frame};
use scorched_common::{events, PeerId, ServerEnvelope};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Frames buffered per peer before senders start waiting
pub const OUTBOUND_QUEUE: usize = 64;

/// A live connection
#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    outbound: mpsc::Sender<Frame>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl Peer {
    /// Create a peer whose frames are written to `writer` by a dedicated task
    pub fn spawn<W>(id: PeerId, writer: W) -> (Arc<Self>, JoinHandle<()>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let peer = Arc::new(Self {
            id,
            outbound,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        });
        let task = tokio::spawn(pump_writes(Arc::clone(&peer), writer, rx));
        (peer, task)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the peer closed and stop its read loop and writer. Returns `true` only for the
    /// call that actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();
        true
    }

    /// Resolves once the peer has been closed from any side
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }

    /// Serialize `{type, payload, requestId?}` and queue it as one text frame.
    /// A no-op once the peer is closed.
    pub async fn send<T: Serialize>(&self, kind: &str, payload: T, request_id: Option<&str>) {
        if self.is_closed() {
            return;
        }
        let envelope = ServerEnvelope {
            kind: kind.to_string(),
            payload,
            request_id: request_id.map(str::to_string),
        };
        match serde_json::to_vec(&envelope) {
            Ok(bytes) => self.enqueue(Frame::text(bytes)).await,
            Err(err) => tracing::error!(peer_id = %self.id, error = %err, "failed to encode envelope"),
        }
    }

    /// Send an `error` envelope describing `err`
    pub async fn send_error(&self, err: &AppError, request_id: Option<&str>) {
        self.send(events::ERROR, err.to_payload(), request_id).await;
    }

    /// Answer a ping
    pub async fn send_pong(&self) {
        if !self.is_closed() {
            self.enqueue(Frame::pong()).await;
        }
    }

    async fn enqueue(&self, frame: Frame) {
        // The writer task is gone only after a close; dropping the frame is the contract then
        let _ = self.outbound.send(frame).await;
    }
}

async fn pump_writes<W>(peer: Arc<Peer>, mut writer: W, mut rx: mpsc::Receiver<Frame>)
where
    W: AsyncWrite + Send + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = peer.shutdown.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if let Err(err) = frame::write_frame(&mut writer, frame.opcode, &frame.payload).await {
            tracing::debug!(peer_id = %peer.id, error = %err, "write failed, closing peer");
            peer.close();
            let _ = writer.shutdown().await;
            return;
        }
    }

    // Frames queued before the close still go out; later sends were already refused
    rx.close();
    while let Ok(frame) = rx.try_recv() {
        if let Err(err) = frame::write_frame(&mut writer, frame.opcode, &frame.payload).await {
            tracing::debug!(peer_id = %peer.id, error = %err, "write failed while flushing");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
