//! Client transport seam
//!
//! The registry does not know what a client socket is. Anything that can
//! accept a chunk of bytes implements [`ClientSink`]; the websocket
//! implementation lives next to the streaming listener.

use std::future::Future;
use std::io;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Outbound half of a streaming client connection
pub trait ClientSink: Send + 'static {
    /// Write one message to the client
    ///
    /// Resolves once the transport has accepted the data. An error means the
    /// connection is unusable and the client will be dropped.
    fn send(&mut self, data: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Close the connection after the last queued chunk was written
    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

impl ClientSink for mpsc::Sender<Bytes> {
    async fn send(&mut self, data: Bytes) -> io::Result<()> {
        mpsc::Sender::send(self, data)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (mut tx, mut rx) = mpsc::channel::<Bytes>(4);

        ClientSink::send(&mut tx, Bytes::from_static(b"abc"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_channel_sink_reports_broken_pipe() {
        let (mut tx, rx) = mpsc::channel::<Bytes>(4);
        drop(rx);

        let err = ClientSink::send(&mut tx, Bytes::from_static(b"abc"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
