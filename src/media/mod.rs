//! Video pipeline
//!
//! This module provides:
//! - Frame capture sources and the capture session
//! - The external transcoder process wrapper
//! - The broadcast relay from transcoder output to clients

pub mod capture;
pub mod relay;
pub mod transcoder;

pub use capture::{CaptureConfig, CaptureSession, CommandSource, FrameSource, TestPattern};
pub use relay::{BroadcastRelay, RelaySummary};
pub use transcoder::{ProcessState, Transcoder, TranscoderConfig, TranscoderOutput};
