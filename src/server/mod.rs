//! Network services
//!
//! Three independent listeners, each an axum router on its own port:
//! - [`ContentServer`]: the viewer page and decoder script over HTTP
//! - [`StreamServer`]: websocket clients receiving the video stream
//! - [`ControlChannel`]: websocket clients steering the pan/tilt actuator
//!
//! They share nothing but the supervisor's shutdown token.

pub mod config;
pub mod content;
pub mod control;
pub mod listener;
pub mod stream;

pub use config::ServerConfig;
pub use content::{ContentServer, StaticContent, ADDRESS_PLACEHOLDER};
pub use control::{ControlChannel, CONTROL_PATH};
pub use listener::ServingAddr;
pub use stream::{StreamServer, WebSocketSink};
