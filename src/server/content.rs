//! HTTP content server
//!
//! Serves the viewer page and the decoder script:
//!
//! | Path          | Response                                             |
//! |---------------|------------------------------------------------------|
//! | `/`           | 301 to `/index.html`                                 |
//! | `/jsmpg.js`   | decoder script                                       |
//! | `/index.html` | page template with `@ADDRESS@` set to the stream URL |
//! | anything else | 404                                                  |
//!
//! HEAD runs the same logic and sends the same headers without a body.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::listener::{serve_router, ServingAddr};

/// Placeholder in the page template replaced with the stream address
pub const ADDRESS_PLACEHOLDER: &str = "@ADDRESS@";

const INDEX_FILE: &str = "index.html";
const SCRIPT_FILE: &str = "jsmpg.js";

/// Immutable assets loaded at startup
#[derive(Debug, Clone)]
pub struct StaticContent {
    index_template: String,
    script: String,
}

impl StaticContent {
    pub fn new(index_template: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            index_template: index_template.into(),
            script: script.into(),
        }
    }

    /// Read `index.html` and `jsmpg.js` from `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|source| Error::Asset { path, source })
        };

        Ok(Self::new(read(INDEX_FILE)?, read(SCRIPT_FILE)?))
    }

    /// Render the page for a client that reached the stream server at `addr`
    pub fn render_index(&self, addr: SocketAddr) -> String {
        self.index_template
            .replace(ADDRESS_PLACEHOLDER, &addr.to_string())
    }

    pub fn script(&self) -> &str {
        &self.script
    }
}

#[derive(Clone)]
struct ContentState {
    content: Arc<StaticContent>,
    stream_port: u16,
}

/// The HTTP front end
#[derive(Clone)]
pub struct ContentServer {
    state: ContentState,
}

impl ContentServer {
    /// Create a server advertising the streaming listener on `stream_port`
    pub fn new(content: StaticContent, stream_port: u16) -> Self {
        Self {
            state: ContentState {
                content: Arc::new(content),
                stream_port,
            },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(redirect_index))
            .route("/jsmpg.js", get(serve_script))
            .route("/index.html", get(serve_index))
            .fallback(not_found)
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` is cancelled
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> io::Result<()> {
        serve_router("content", listener, self.router(), shutdown).await
    }
}

async fn redirect_index() -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, "/index.html")],
    )
        .into_response()
}

async fn serve_script(method: Method, State(state): State<ContentState>) -> Response {
    document(
        &method,
        "application/javascript",
        state.content.script().to_string(),
    )
}

async fn serve_index(
    method: Method,
    State(state): State<ContentState>,
    ConnectInfo(addr): ConnectInfo<ServingAddr>,
) -> Response {
    let stream_addr = SocketAddr::new(addr.local.ip(), state.stream_port);
    document(
        &method,
        "text/html; charset=utf-8",
        state.content.render_index(stream_addr),
    )
}

async fn not_found(method: Method) -> Response {
    let body = "<html><body><h1>404 File not found</h1></body></html>\n";
    let headers = [
        (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
        (header::CONTENT_LENGTH, body.len().to_string()),
    ];

    if method == Method::HEAD {
        (StatusCode::NOT_FOUND, headers).into_response()
    } else {
        (StatusCode::NOT_FOUND, headers, body).into_response()
    }
}

fn document(method: &Method, content_type: &'static str, body: String) -> Response {
    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (header::CONTENT_LENGTH, body.len().to_string()),
        (header::LAST_MODIFIED, http_date()),
    ];

    if method == Method::HEAD {
        (StatusCode::OK, headers).into_response()
    } else {
        (StatusCode::OK, headers, body).into_response()
    }
}

/// Current time as an IMF-fixdate (RFC 7231)
fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
