//! Registry configuration

/// Configuration for the client registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Chunks buffered per client before the client is considered stalled
    ///
    /// At 512 bytes per chunk the default holds roughly 128KB, a little over
    /// one second of video at 800 kbit/s.
    pub queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

impl RegistryConfig {
    /// Set the per-client queue capacity (minimum 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}
