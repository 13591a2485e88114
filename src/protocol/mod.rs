//! Wire-level definitions
//!
//! - The 8-byte header sent to streaming clients
//! - The control command vocabulary

pub mod command;
pub mod header;

pub use command::{Axis, Command, UnknownCommand, STEP};
pub use header::{StreamHeader, CHUNK_SIZE, HEADER_SIZE, STREAM_MAGIC};
