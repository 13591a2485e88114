//! Supervisor lifecycle state machine
//!
//! ```text
//! Idle ──► Initializing ──► Running ──► Draining ──► Stopped
//!                │                         ▲
//!                └─────── (failure) ───────┘
//! ```

use std::fmt;

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Created, nothing started
    Idle,
    /// Acquiring the camera, spawning the transcoder, binding listeners
    Initializing,
    /// Capturing and relaying until interrupted or a component fails
    Running,
    /// Tearing everything down in order
    Draining,
    /// All resources released
    Stopped,
}

impl LifecycleState {
    /// Check whether moving to `next` is a legal transition
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Running)
                | (Initializing, Draining)
                | (Running, Draining)
                | (Draining, Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Stopped
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
