//! Client registry for stream fan-out
//!
//! The registry tracks connected streaming clients and delivers every encoded
//! chunk to each of them.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<ClientRegistry>
//!                   ┌──────────────────────────┐
//!                   │ clients: HashMap<Id,     │
//!                   │   ClientEntry {          │
//!                   │     tx: mpsc::Sender,    │
//!                   │   }                      │
//!                   │ >                        │
//!                   └────────────┬─────────────┘
//!                                │ try_send (never blocks)
//!         ┌──────────────────────┼──────────────────────┐
//!         ▼                      ▼                      ▼
//!   [writer task]          [writer task]          [writer task]
//!   sink.send()            sink.send()            sink.send()
//!         │                      │                      │
//!         ▼                      ▼                      ▼
//!     websocket              websocket              websocket
//! ```
//!
//! # Zero-Copy Design
//!
//! Chunks are `bytes::Bytes`, so every queue holds a reference-counted handle
//! to the same allocation rather than a copy.

pub mod config;
pub mod entry;
pub mod sink;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{ClientEntry, ClientId, EnqueueError};
pub use sink::ClientSink;
pub use store::ClientRegistry;
