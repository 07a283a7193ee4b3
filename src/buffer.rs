//! Bounded sample buffer shared by the producer callback and the polling consumer
//!
//! One writer (the driver's communication loop) and one reader (the host's poll)
//! share the buffer behind a single coarse lock. Every operation holds the lock for
//! a bounded, short time and never calls out while holding it.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::trace;

use crate::config::BufferConfig;
use crate::types::SamplePackage;

/// Result of pushing one package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stored, sequence number was the expected successor
    Stored,

    /// Stored, but the sequence number broke continuity
    Gap { expected: i64, received: i64 },

    /// Not stored: the package carried no readings
    Rejected,
}

/// Cumulative counters since the last reinitialization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct BufferStats {
    pub pushed: u64,
    pub evicted: u64,
    pub continuity_faults: u64,
    pub rejected: u64,
}

/// Tracks the expected next sequence number
#[derive(Debug, Clone)]
struct SequenceTracker {
    origin: Option<i64>,
    modulus: Option<u32>,
    last: Option<i64>,
}

impl SequenceTracker {
    /// A zero modulus means the counter never wraps
    fn new(origin: Option<i64>, modulus: Option<u32>) -> Self {
        Self { origin, modulus: modulus.filter(|&m| m > 0), last: None }
    }

    fn successor(&self, seq: i64) -> i64 {
        let next = seq.wrapping_add(1);
        match self.modulus {
            Some(m) => next.rem_euclid(i64::from(m)),
            None => next,
        }
    }

    /// Returns `(expected, received)` on a discontinuity.
    ///
    /// The tracker resynchronizes on the received number either way, so one gap is
    /// reported once rather than on every following package.
    fn observe(&mut self, seq: i64) -> Option<(i64, i64)> {
        let expected = match (self.last, self.origin) {
            (Some(last), _) => Some(self.successor(last)),
            (None, origin) => origin,
        };
        self.last = Some(seq);

        match expected {
            Some(expected) if expected != seq => Some((expected, seq)),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Debug)]
struct BufferInner {
    packages: VecDeque<SamplePackage>,
    tracker: SequenceTracker,
    stats: BufferStats,
}

impl BufferInner {
    fn push(&mut self, capacity: usize, package: SamplePackage) -> PushOutcome {
        if package.is_empty() {
            self.stats.rejected += 1;
            return PushOutcome::Rejected;
        }

        let gap = self.tracker.observe(package.seq);
        if self.packages.len() == capacity {
            self.packages.pop_front();
            self.stats.evicted += 1;
        }
        self.packages.push_back(package);
        self.stats.pushed += 1;

        match gap {
            Some((expected, received)) => {
                self.stats.continuity_faults += 1;
                PushOutcome::Gap { expected, received }
            }
            None => PushOutcome::Stored,
        }
    }
}

/// Bounded FIFO of sample packages with continuity checking
#[derive(Debug)]
pub struct SampleBuffer {
    capacity: usize,
    inner: Mutex<BufferInner>,
}

impl SampleBuffer {
    /// Buffer of `capacity` packages expecting sequence numbers from 0
    pub fn new(capacity: usize) -> Self {
        Self::with_config(&BufferConfig { capacity, ..BufferConfig::default() })
    }

    pub fn with_config(config: &BufferConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(BufferInner {
                packages: VecDeque::with_capacity(capacity),
                tracker: SequenceTracker::new(config.sequence_origin, config.sequence_modulus),
                stats: BufferStats::default(),
            }),
        }
    }

    /// Append a package, evicting the oldest one at capacity
    ///
    /// Never fails. A sequence discontinuity is reported through the outcome but the
    /// package is still stored; an empty package is dropped and reported as rejected.
    pub fn push(&self, package: SamplePackage) -> PushOutcome {
        self.inner.lock().push(self.capacity, package)
    }

    /// Push only if `live()` still holds once the buffer lock is taken
    ///
    /// Returns `None` without touching the buffer otherwise. A writer that flips
    /// `live` to false before calling [`reinitialize`](Self::reinitialize) is
    /// guaranteed no further writes land after the reset.
    pub fn push_if(&self, package: SamplePackage, live: impl FnOnce() -> bool) -> Option<PushOutcome> {
        let mut inner = self.inner.lock();
        if !live() {
            return None;
        }
        Some(inner.push(self.capacity, package))
    }

    /// Resident packages in insertion order, or `None` when empty
    ///
    /// With `reset_after` the buffer is emptied; continuity tracking carries on so a
    /// gap spanning two polls is still detected.
    pub fn drain(&self, reset_after: bool) -> Option<Vec<SamplePackage>> {
        let mut inner = self.inner.lock();
        if inner.packages.is_empty() {
            return None;
        }

        let packages: Vec<SamplePackage> = if reset_after {
            std::mem::take(&mut inner.packages).into()
        } else {
            inner.packages.iter().cloned().collect()
        };
        drop(inner);

        trace!(count = packages.len(), reset_after, "Drained sample buffer");
        Some(packages)
    }

    /// Empty storage, clear counters and forget the last sequence number
    pub fn reinitialize(&self) {
        let mut inner = self.inner.lock();
        inner.packages.clear();
        inner.tracker.reset();
        inner.stats = BufferStats::default();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().packages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BufferStats {
        self.inner.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn package(seq: i64, values: &[i32]) -> SamplePackage {
        SamplePackage::new(seq, values.to_vec())
    }

    #[test]
    fn scenario_four_packages_drain_in_order() {
        let buffer = SampleBuffer::new(10_000);
        let readings = [[10, 20], [11, 21], [12, 22], [13, 23]];
        for (seq, values) in readings.iter().enumerate() {
            assert_eq!(buffer.push(package(seq as i64, values)), PushOutcome::Stored);
        }

        let drained = buffer.drain(true).expect("four packages resident");
        assert_eq!(drained.len(), 4);
        for (seq, (got, want)) in drained.iter().zip(readings.iter()).enumerate() {
            assert_eq!(got.seq, seq as i64);
            assert_eq!(&*got.values, want);
        }
        assert_eq!(buffer.stats().continuity_faults, 0);
        assert_eq!(buffer.drain(false), None);
    }

    #[test]
    fn gap_is_flagged_once_and_package_kept() {
        let buffer = SampleBuffer::new(16);
        let outcomes: Vec<_> = [0, 1, 2, 4].iter().map(|&seq| buffer.push(package(seq, &[1]))).collect();

        assert_eq!(
            outcomes,
            vec![
                PushOutcome::Stored,
                PushOutcome::Stored,
                PushOutcome::Stored,
                PushOutcome::Gap { expected: 3, received: 4 }
            ]
        );
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.stats().continuity_faults, 1);

        // resynchronized on 4
        assert_eq!(buffer.push(package(5, &[1])), PushOutcome::Stored);
    }

    #[test]
    fn duplicates_and_regressions_break_continuity() {
        let buffer = SampleBuffer::new(16);
        buffer.push(package(0, &[1]));
        buffer.push(package(1, &[1]));

        assert_eq!(buffer.push(package(1, &[1])), PushOutcome::Gap { expected: 2, received: 1 });
        assert_eq!(buffer.push(package(0, &[1])), PushOutcome::Gap { expected: 2, received: 0 });
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn first_package_must_match_origin() {
        let buffer = SampleBuffer::new(4);
        assert_eq!(buffer.push(package(3, &[1])), PushOutcome::Gap { expected: 0, received: 3 });

        let any_origin = SampleBuffer::with_config(&BufferConfig {
            capacity: 4,
            sequence_origin: None,
            sequence_modulus: None,
        });
        assert_eq!(any_origin.push(package(3, &[1])), PushOutcome::Stored);
        assert_eq!(any_origin.push(package(4, &[1])), PushOutcome::Stored);
    }

    #[test]
    fn wrapping_counters_stay_continuous() {
        let buffer = SampleBuffer::with_config(&BufferConfig {
            capacity: 64,
            sequence_origin: Some(0),
            sequence_modulus: Some(16),
        });
        for n in 0..40 {
            assert_eq!(buffer.push(package(n % 16, &[n as i32])), PushOutcome::Stored);
        }
        assert_eq!(buffer.push(package(9, &[0])), PushOutcome::Gap { expected: 8, received: 9 });
    }

    #[test]
    fn extreme_sequence_numbers_do_not_overflow() {
        let buffer = SampleBuffer::new(8);
        buffer.push(package(0, &[1]));
        assert_eq!(
            buffer.push(package(i64::MAX, &[2])),
            PushOutcome::Gap { expected: 1, received: i64::MAX }
        );
        assert_eq!(
            buffer.push(package(i64::MAX, &[3])),
            PushOutcome::Gap { expected: i64::MIN, received: i64::MAX }
        );
        assert_eq!(buffer.push(package(5, &[4])), PushOutcome::Gap { expected: i64::MIN, received: 5 });
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn zero_modulus_never_wraps() {
        let buffer = SampleBuffer::with_config(&BufferConfig {
            capacity: 8,
            sequence_origin: Some(0),
            sequence_modulus: Some(0),
        });
        for seq in 0..4 {
            assert_eq!(buffer.push(package(seq, &[1])), PushOutcome::Stored);
        }
        assert_eq!(buffer.push(package(0, &[1])), PushOutcome::Gap { expected: 4, received: 0 });
    }

    #[test]
    fn push_if_checks_liveness_under_the_lock() {
        let buffer = SampleBuffer::new(4);
        assert_eq!(buffer.push_if(package(0, &[1]), || true), Some(PushOutcome::Stored));
        assert_eq!(buffer.push_if(package(1, &[1]), || false), None);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.push(package(1, &[1])), PushOutcome::Stored);
    }

    #[test]
    fn empty_package_is_rejected_without_touching_continuity() {
        let buffer = SampleBuffer::new(4);
        buffer.push(package(0, &[1]));
        assert_eq!(buffer.push(package(1, &[])), PushOutcome::Rejected);
        assert_eq!(buffer.push(package(1, &[2])), PushOutcome::Stored);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.stats().rejected, 1);
    }

    #[test]
    fn drain_without_reset_is_idempotent() {
        let buffer = SampleBuffer::new(8);
        for seq in 0..5 {
            buffer.push(package(seq, &[seq as i32, -(seq as i32)]));
        }

        let first = buffer.drain(false);
        let second = buffer.drain(false);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn drain_with_reset_then_empty() {
        let buffer = SampleBuffer::new(8);
        for seq in 0..3 {
            buffer.push(package(seq, &[7]));
        }

        assert_eq!(buffer.drain(true).map(|p| p.len()), Some(3));
        assert_eq!(buffer.drain(false), None);
        assert!(buffer.is_empty());

        // continuity survives the reset
        assert_eq!(buffer.push(package(5, &[7])), PushOutcome::Gap { expected: 3, received: 5 });
    }

    #[test]
    fn reinitialize_clears_everything() {
        let buffer = SampleBuffer::new(2);
        for seq in [0, 1, 5] {
            buffer.push(package(seq, &[1]));
        }
        buffer.reinitialize();

        assert!(buffer.is_empty());
        assert_eq!(buffer.stats(), BufferStats::default());
        assert_eq!(buffer.push(package(0, &[1])), PushOutcome::Stored);
    }

    proptest! {
        #[test]
        fn capacity_evicts_oldest(capacity in 1usize..64, extra in 0usize..64) {
            let buffer = SampleBuffer::new(capacity);
            let total = capacity + extra;
            for seq in 0..total {
                prop_assert_eq!(buffer.push(package(seq as i64, &[seq as i32])), PushOutcome::Stored);
            }

            let drained = buffer.drain(false).unwrap();
            prop_assert_eq!(drained.len(), capacity);
            let seqs: Vec<i64> = drained.iter().map(|p| p.seq).collect();
            let expected: Vec<i64> = (extra as i64..total as i64).collect();
            prop_assert_eq!(seqs, expected);
            prop_assert_eq!(buffer.stats().evicted, extra as u64);
        }

        #[test]
        fn every_gap_is_counted_once(steps in prop::collection::vec(1i64..4, 1..200)) {
            let buffer = SampleBuffer::new(1024);
            let mut seq = 0;
            buffer.push(package(seq, &[0]));
            for step in &steps {
                seq += step;
                buffer.push(package(seq, &[0]));
            }

            let gaps = steps.iter().filter(|&&s| s != 1).count() as u64;
            prop_assert_eq!(buffer.stats().continuity_faults, gaps);
            prop_assert_eq!(buffer.len(), steps.len() + 1);
        }
    }
}
