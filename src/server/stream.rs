//! Streaming websocket server
//!
//! Every websocket connection, on any path, becomes a streaming client: it
//! gets the stream header, then the encoded video as binary messages.
//! Anything the client sends is ignored except a close.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::registry::{ClientRegistry, ClientSink};

use super::listener::{serve_router, ServingAddr};

/// Outbound half of a streaming websocket
pub struct WebSocketSink(SplitSink<WebSocket, Message>);

impl ClientSink for WebSocketSink {
    async fn send(&mut self, data: Bytes) -> io::Result<()> {
        self.0
            .send(Message::Binary(data))
            .await
            .map_err(io::Error::other)
    }

    async fn close(&mut self) {
        let _ = SinkExt::close(&mut self.0).await;
    }
}

#[derive(Clone)]
struct StreamState {
    registry: Arc<ClientRegistry>,
    shutdown: CancellationToken,
}

/// Accepts streaming clients and hands them to the registry
pub struct StreamServer {
    registry: Arc<ClientRegistry>,
}

impl StreamServer {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Router accepting websocket upgrades on every path
    ///
    /// Open connections end when `shutdown` is cancelled.
    pub fn router(&self, shutdown: CancellationToken) -> Router {
        Router::new()
            .fallback(stream_upgrade)
            .with_state(StreamState {
                registry: Arc::clone(&self.registry),
                shutdown,
            })
    }

    /// Serve until `shutdown` is cancelled
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> io::Result<()> {
        let router = self.router(shutdown.clone());
        serve_router("stream", listener, router, shutdown).await
    }
}

async fn stream_upgrade(
    State(state): State<StreamState>,
    ConnectInfo(addr): ConnectInfo<ServingAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_client(socket, state, addr.peer))
}

async fn serve_client(socket: WebSocket, state: StreamState, peer: SocketAddr) {
    let (sink, mut incoming) = socket.split();

    let id = match state.registry.register(WebSocketSink(sink)).await {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(peer = %peer, error = %e, "Streaming client rejected");
            return;
        }
    };
    tracing::debug!(client_id = %id, peer = %peer, "Streaming client connected");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            msg = incoming.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(client_id = %id, error = %e, "Streaming client read failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    state.registry.unregister(id).await;
}
