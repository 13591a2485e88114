//! Error types
//!
//! Component-local problems (a dropped client, an unknown path, an unknown
//! control command) never surface here; they are absorbed where they happen.
//! What remains are the errors that end a run or prevent it from starting.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors produced by the relay
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Generic I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A listener could not be bound at startup
    #[error("failed to bind {service} listener on {addr}: {source}")]
    Bind {
        /// Which service tried to bind
        service: &'static str,
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A static asset could not be read at startup
    #[error("failed to load asset {}: {source}", path.display())]
    Asset {
        /// Path of the asset
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The capture device could not be acquired
    #[error("capture device unavailable: {0}")]
    CaptureUnavailable(String),

    /// The capture source stopped producing frames
    #[error("capture ended unexpectedly")]
    CaptureEnded,

    /// The capture source failed while running
    #[error("capture failed: {0}")]
    CaptureFailed(#[source] std::io::Error),

    /// The transcoder process could not be started
    #[error("failed to start transcoder `{program}`: {source}")]
    TranscoderSpawn {
        /// Program that was launched
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Write attempted on a transcoder whose input is closed
    #[error("transcoder input pipe is closed")]
    PipeClosed,

    /// The transcoder process went away while the pipeline was running
    #[error("transcoder exited unexpectedly")]
    TranscoderExited,

    /// Write or read failure on a single client connection
    #[error("client transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// Background task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = Error::Bind {
            service: "content",
            addr: "127.0.0.1:8082".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };

        let text = err.to_string();
        assert!(text.contains("content"));
        assert!(text.contains("127.0.0.1:8082"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: Error = io.into();

        assert!(matches!(err, Error::Io(_)));
    }
}
