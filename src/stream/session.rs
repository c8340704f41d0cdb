//! Per-session delivery counters.

/// Counters for one streaming session.  Monotonic while the session runs;
/// reset when the next session starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    /// Slots accepted in full by the transport.
    pub good: u64,
    /// Send attempts refused because the link was saturated.
    pub would_block: u64,
    /// Overflow events (one per latch, not one per lost slot).
    pub overflow: u64,
    /// Slots completed by the pipeline.
    pub total: u64,
}

impl SessionCounters {
    /// `(good + 1) / (total + 1)`, reported as the audio success ratio.
    pub fn audio_ratio(&self) -> f32 {
        (self.good + 1) as f32 / (self.total + 1) as f32
    }
}
