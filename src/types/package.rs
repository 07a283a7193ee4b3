//! Sample package type flowing from the producer callback to the consumer

use std::sync::Arc;

/// One device tick worth of channel readings
///
/// This is the fundamental data unit that flows through the system. Readings are
/// shared via `Arc` so draining the buffer without a reset clones cheaply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePackage {
    /// Driver-assigned sequence number
    pub seq: i64,

    /// One reading per active channel, in channel order
    pub values: Arc<[i32]>,
}

impl SamplePackage {
    /// Create a new sample package
    pub fn new(seq: i64, values: impl Into<Arc<[i32]>>) -> Self {
        Self { seq, values: values.into() }
    }

    /// Number of channel readings in this package
    pub fn channel_count(&self) -> usize {
        self.values.len()
    }

    /// Reading for a channel by position, if present
    pub fn channel(&self, index: usize) -> Option<i32> {
        self.values.get(index).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
