//! Listener plumbing shared by the HTTP and websocket services
//!
//! Binds TCP listeners and runs an axum router on them until the shutdown
//! token fires.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use axum::extract::connect_info::Connected;
use axum::serve::IncomingStream;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Both ends of an accepted connection
///
/// Handlers need the local end: the served page advertises the address the
/// client reached us on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServingAddr {
    /// Local address of the accepted socket
    pub local: SocketAddr,
    /// Remote peer address
    pub peer: SocketAddr,
}

impl Connected<IncomingStream<'_, TcpListener>> for ServingAddr {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        let peer = *stream.remote_addr();
        let local = stream
            .io()
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));

        Self { local, peer }
    }
}

/// Bind a listener, mapping failure to a fatal startup error
pub async fn bind(service: &'static str, addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind {
            service,
            addr,
            source,
        })?;

    let bound = listener.local_addr().unwrap_or(addr);
    tracing::info!(service = service, addr = %bound, "Listening");
    Ok(listener)
}

/// Serve `router` on `listener` until `shutdown` is cancelled
pub async fn serve_router(
    service: &'static str,
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let result = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<ServingAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await;

    match result {
        Ok(()) => tracing::info!(service = service, "Listener stopped"),
        Err(ref e) => tracing::error!(service = service, error = %e, "Listener failed"),
    }
    result
}
