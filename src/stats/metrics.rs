//! Statistics for the relay pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters shared by the registry and the broadcast relay
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    chunks_relayed: AtomicU64,
    bytes_relayed: AtomicU64,
    clients_registered: AtomicU64,
    clients_dropped: AtomicU64,
}

impl RelayStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            chunks_relayed: AtomicU64::new(0),
            bytes_relayed: AtomicU64::new(0),
            clients_registered: AtomicU64::new(0),
            clients_dropped: AtomicU64::new(0),
        }
    }

    /// Record one chunk read from the transcoder
    pub fn record_chunk(&self, len: usize) {
        self.chunks_relayed.fetch_add(1, Ordering::Relaxed);
        self.bytes_relayed.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_registered(&self) {
        self.clients_registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a client removed because of a failed or stalled write
    pub fn record_dropped(&self) {
        self.clients_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of the counters
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            uptime: self.started_at.elapsed(),
            chunks_relayed: self.chunks_relayed.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
            clients_registered: self.clients_registered.load(Ordering::Relaxed),
            clients_dropped: self.clients_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    /// Time since the stats tracker was created
    pub uptime: Duration,
    /// Chunks read from the transcoder
    pub chunks_relayed: u64,
    /// Bytes read from the transcoder
    pub bytes_relayed: u64,
    /// Clients that completed registration
    pub clients_registered: u64,
    /// Clients removed after a write failure or queue overflow
    pub clients_dropped: u64,
}

impl RelayStatsSnapshot {
    /// Average output bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_relayed * 8) / secs
        } else {
            0
        }
    }
}
