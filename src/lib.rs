//! camrelay: a camera relay for browsers
//!
//! Raw frames from a camera are piped through an external MPEG-1
//! transcoder, and the encoded output is fanned out to every connected
//! websocket client. A second websocket steers a pan/tilt actuator, and a
//! small HTTP server delivers the viewer page and its decoder script.
//!
//! # Example
//!
//! ```no_run
//! use camrelay::media::TestPattern;
//! use camrelay::{ServerConfig, Supervisor};
//!
//! # async fn run() -> camrelay::Result<()> {
//! let supervisor = Supervisor::new(ServerConfig::default(), TestPattern::new());
//! let handle = supervisor.handle();
//!
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     handle.shutdown();
//! });
//!
//! supervisor.run().await
//! # }
//! ```

pub mod actuator;
pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;
pub mod supervisor;

pub use error::{Error, Result};
pub use server::ServerConfig;
pub use supervisor::{BoundAddrs, LifecycleState, Supervisor, SupervisorHandle};
