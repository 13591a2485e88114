//! Broadcast relay
//!
//! Pulls encoded chunks out of the transcoder and hands each one to the
//! client registry, in order, until the transcoder process is gone.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::registry::ClientRegistry;

use super::transcoder::{ProcessState, TranscoderOutput};

/// What the relay moved before it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    pub chunks: u64,
    pub bytes: u64,
    /// Transcoder state observed when the loop ended
    pub exit: ProcessState,
}

/// Moves encoded output from the transcoder to every registered client
pub struct BroadcastRelay {
    registry: Arc<ClientRegistry>,
}

impl BroadcastRelay {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Run the relay on a background task
    pub fn spawn(self, output: TranscoderOutput) -> JoinHandle<Result<RelaySummary>> {
        tokio::spawn(self.run(output))
    }

    /// Relay until the transcoder output ends and the process has exited
    ///
    /// An empty read alone does not end the loop: the relay keeps going
    /// until the process is observed to have exited. The output handle is
    /// released when this returns.
    pub async fn run(self, mut output: TranscoderOutput) -> Result<RelaySummary> {
        let stats = Arc::clone(self.registry.stats());
        let mut chunks = 0u64;
        let mut bytes = 0u64;

        tracing::debug!("Broadcast relay started");

        loop {
            let chunk = output.read_chunk().await.map_err(|e| {
                tracing::warn!(error = %e, "Transcoder output read failed");
                Error::Io(e)
            })?;

            if !chunk.is_empty() {
                chunks += 1;
                bytes += chunk.len() as u64;
                stats.record_chunk(chunk.len());
                self.registry.broadcast(chunk).await;
                continue;
            }

            if output.has_exited() {
                break;
            }

            // End of stream while the process is still alive: wait for it
            // rather than spinning on empty reads.
            output.wait_exited().await;
        }

        let exit = output.wait_exited().await;
        drop(output);

        tracing::info!(chunks = chunks, bytes = bytes, exit = ?exit, "Broadcast relay finished");

        Ok(RelaySummary {
            chunks,
            bytes,
            exit,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::media::transcoder::{Transcoder, TranscoderConfig};
    use crate::protocol::StreamHeader;

    #[tokio::test]
    async fn test_relays_until_process_exit() {
        let registry = Arc::new(ClientRegistry::new(StreamHeader::new(16, 16)));
        let (tx, mut rx) = mpsc::channel::<Bytes>(64);
        registry.register(tx).await.unwrap();

        let config = TranscoderConfig::default().program("cat").args(Vec::<String>::new());
        let mut transcoder = Transcoder::spawn(&config).unwrap();
        let relay = BroadcastRelay::new(Arc::clone(&registry)).spawn(transcoder.take_output().unwrap());

        transcoder.write(&[1u8; 1024]).await.unwrap();
        transcoder.write(&[2u8; 100]).await.unwrap();
        transcoder.flush().await;

        let summary = tokio::time::timeout(Duration::from_secs(5), relay)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(summary.bytes, 1124);
        assert_eq!(summary.exit, ProcessState::Exited(Some(0)));

        let header = rx.recv().await.unwrap();
        assert_eq!(header.len(), 8);

        let mut received = Vec::new();
        while received.len() < 1124 {
            let chunk = rx.recv().await.unwrap();
            assert!(chunk.len() <= 512);
            received.extend_from_slice(&chunk);
        }
        assert!(received[..1024].iter().all(|b| *b == 1));
        assert!(received[1024..].iter().all(|b| *b == 2));

        assert_eq!(registry.stats().snapshot().bytes_relayed, 1124);
    }

    #[tokio::test]
    async fn test_process_without_output() {
        let registry = Arc::new(ClientRegistry::new(StreamHeader::new(16, 16)));
        let config = TranscoderConfig::default().program("true").args(Vec::<String>::new());
        let mut transcoder = Transcoder::spawn(&config).unwrap();

        let summary = BroadcastRelay::new(registry)
            .run(transcoder.take_output().unwrap())
            .await
            .unwrap();

        assert_eq!(summary.chunks, 0);
        assert_eq!(summary.exit, ProcessState::Exited(Some(0)));
    }
}
