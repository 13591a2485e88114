//! Client registry implementation
//!
//! The set of connected streaming clients and the fan-out path from the
//! broadcast relay to every one of them.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

use crate::error::{Error, Result};
use crate::protocol::StreamHeader;
use crate::stats::RelayStats;

use super::config::RegistryConfig;
use super::entry::{run_writer, ClientEntry, ClientId};
use super::sink::ClientSink;

/// Registry of connected streaming clients
///
/// Thread-safe via `RwLock`: broadcasts take the read lock, registration and
/// removal take the write lock, so the client set is never mutated while a
/// broadcast is iterating it.
pub struct ClientRegistry {
    /// Connected clients by ID
    clients: RwLock<HashMap<ClientId, ClientEntry>>,

    /// Encoded stream header, sent to every client before any chunk
    header: Bytes,

    config: RegistryConfig,
    stats: Arc<RelayStats>,
    next_client_id: AtomicU64,

    /// Set once by `close_all`; later registrations are refused
    closed: AtomicBool,
}

impl ClientRegistry {
    /// Create a registry with default configuration
    pub fn new(header: StreamHeader) -> Self {
        Self::with_config(header, RegistryConfig::default(), Arc::new(RelayStats::new()))
    }

    /// Create a registry with custom configuration and a shared stats tracker
    pub fn with_config(header: StreamHeader, config: RegistryConfig, stats: Arc<RelayStats>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            header: header.encode(),
            config,
            stats,
            next_client_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Encoded header sent to new clients
    pub fn header(&self) -> &Bytes {
        &self.header
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Register a new client
    ///
    /// The stream header is written to the sink before the client joins the
    /// broadcast set, so no chunk can overtake it. If the header cannot be
    /// written the client is not registered.
    pub async fn register<S: ClientSink>(self: &Arc<Self>, mut sink: S) -> Result<ClientId> {
        sink.send(self.header.clone())
            .await
            .map_err(Error::Transport)?;

        let id = ClientId(self.next_client_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);

        {
            let mut clients = self.clients.write().await;
            if self.closed.load(Ordering::Acquire) {
                sink.close().await;
                return Err(Error::Transport(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "registry is shut down",
                )));
            }
            clients.insert(id, ClientEntry::new(tx));

            tracing::info!(client_id = %id, clients = clients.len(), "Client registered");
        }

        self.stats.record_registered();
        tokio::spawn(run_writer(id, sink, rx, Arc::downgrade(self)));

        Ok(id)
    }

    /// Remove a client
    ///
    /// Returns `true` if the client was registered. Calling this for an
    /// unknown or already removed client is a no-op.
    pub async fn unregister(&self, id: ClientId) -> bool {
        let mut clients = self.clients.write().await;

        if let Some(entry) = clients.remove(&id) {
            tracing::info!(
                client_id = %id,
                connected_for = ?entry.connected_for(),
                clients = clients.len(),
                "Client unregistered"
            );
            true
        } else {
            false
        }
    }

    /// Remove a client after a failed or stalled write
    pub(crate) async fn drop_client(&self, id: ClientId, reason: &str) -> bool {
        let mut clients = self.clients.write().await;

        if let Some(entry) = clients.remove(&id) {
            self.stats.record_dropped();
            tracing::warn!(
                client_id = %id,
                reason = reason,
                connected_for = ?entry.connected_for(),
                clients = clients.len(),
                "Client dropped"
            );
            true
        } else {
            false
        }
    }

    /// Queue a chunk for every registered client
    ///
    /// Never waits on a client socket. Clients whose queue is full or whose
    /// writer has ended are removed; the rest still receive the chunk.
    /// Returns the number of clients the chunk was queued for.
    pub async fn broadcast(&self, chunk: Bytes) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        {
            let clients = self.clients.read().await;
            for (id, entry) in clients.iter() {
                match entry.enqueue(chunk.clone()) {
                    Ok(()) => delivered += 1,
                    Err(e) => failed.push((*id, e)),
                }
            }
        }

        for (id, e) in failed {
            self.drop_client(id, e.as_str()).await;
        }

        delivered
    }

    /// Number of registered clients
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Check whether a client is still registered
    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.read().await.contains_key(&id)
    }

    /// Drop every client and refuse new registrations
    ///
    /// Writer tasks flush what is already queued and then close their sinks.
    /// Returns the number of clients that were removed.
    pub async fn close_all(&self) -> usize {
        let mut clients = self.clients.write().await;
        self.closed.store(true, Ordering::Release);

        let count = clients.len();
        clients.clear();

        if count > 0 {
            tracing::info!(clients = count, "Closed all clients");
        }
        count
    }
}
