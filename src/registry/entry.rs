//! Per-client state and writer task
//!
//! Each registered client owns a bounded queue. The registry only ever does a
//! non-blocking enqueue; the actual socket write happens in the client's own
//! writer task, so a slow peer can only ever stall itself.

use std::fmt;
use std::sync::Weak;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::sink::ClientSink;
use super::store::ClientRegistry;

/// Identifier assigned to a client at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a chunk could not be queued for a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The client's queue is full; its peer is not keeping up
    Stalled,
    /// The writer task has ended
    Closed,
}

impl EnqueueError {
    pub fn as_str(self) -> &'static str {
        match self {
            EnqueueError::Stalled => "queue full",
            EnqueueError::Closed => "writer closed",
        }
    }
}

/// Entry for a single client in the registry
pub struct ClientEntry {
    tx: mpsc::Sender<Bytes>,

    /// When the client finished registration
    connected_at: Instant,
}

impl ClientEntry {
    pub(super) fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            tx,
            connected_at: Instant::now(),
        }
    }

    /// How long the client has been registered
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Queue a chunk without waiting
    pub(super) fn enqueue(&self, chunk: Bytes) -> Result<(), EnqueueError> {
        self.tx.try_send(chunk).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Stalled,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Drain a client's queue into its sink
///
/// Ends when the queue is closed (client unregistered) or on the first failed
/// write, in which case the client removes itself from the registry.
pub(super) async fn run_writer<S: ClientSink>(
    id: ClientId,
    mut sink: S,
    mut rx: mpsc::Receiver<Bytes>,
    registry: Weak<ClientRegistry>,
) {
    while let Some(chunk) = rx.recv().await {
        if let Err(e) = sink.send(chunk).await {
            tracing::debug!(client_id = %id, error = %e, "Client write failed");
            if let Some(registry) = registry.upgrade() {
                registry.drop_client(id, "write failed").await;
            }
            return;
        }
    }

    sink.close().await;
    tracing::trace!(client_id = %id, "Client writer finished");
}
