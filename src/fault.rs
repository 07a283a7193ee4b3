//! Shared fault indicator bridging the producer callback and the polling consumer
//!
//! The producer side never returns errors across the driver callback boundary. Every
//! abnormal condition is recorded here instead and surfaced to the consumer on its
//! next poll. Reading the flag clears it, so each occurrence is reported at most once.

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::types::DisconnectReason;

/// Abnormal condition detected on the producer side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Sequence number was not the successor of the previous package
    Continuity { expected: i64, received: i64 },

    /// The driver delivered an empty package
    InvalidPackage { seq: i64 },

    /// The driver reported an internal exception
    Driver { code: i32, message: String },

    /// The device dropped the link
    Disconnected { reason: DisconnectReason },

    /// The communication loop ended without a stop request
    LoopExited { detail: String },
}

impl Fault {
    /// Whether the acquisition can no longer continue after this fault
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Fault::Continuity { .. } | Fault::InvalidPackage { .. })
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::Continuity { expected, received } => {
                write!(f, "sequence gap (expected {}, received {})", expected, received)
            }
            Fault::InvalidPackage { seq } => write!(f, "empty sample package at sequence {}", seq),
            Fault::Driver { code, message } => write!(f, "driver exception {}: {}", code, message),
            Fault::Disconnected { reason } => write!(f, "device disconnected ({})", reason),
            Fault::LoopExited { detail } => write!(f, "communication loop exited: {}", detail),
        }
    }
}

/// A pending fault as seen by the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultReport {
    /// Most severe fault raised since the last check
    pub fault: Fault,
    /// Number of raises coalesced into this report
    pub occurrences: u32,
}

/// Boolean-with-memory fault indicator
#[derive(Debug, Default)]
pub struct FaultFlag {
    pending: Mutex<Option<FaultReport>>,
}

impl FaultFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fault
    ///
    /// Safe to call from the producer thread at any time. When a fault is already
    /// pending, a terminal fault replaces a non-terminal one; otherwise the first
    /// fault is kept and only the occurrence count grows.
    pub fn raise(&self, fault: Fault) {
        self.raise_if(fault, || true);
    }

    /// Record a fault only if `live()` still holds once the flag's lock is taken
    ///
    /// Returns whether the fault was recorded.
    pub fn raise_if(&self, fault: Fault, live: impl FnOnce() -> bool) -> bool {
        let description = fault.to_string();

        // (superseded, occurrences) when coalesced into an existing report
        let coalesced = {
            let mut pending = self.pending.lock();
            if !live() {
                return false;
            }
            match pending.as_mut() {
                None => {
                    *pending = Some(FaultReport { fault, occurrences: 1 });
                    None
                }
                Some(report) => {
                    report.occurrences = report.occurrences.saturating_add(1);
                    let supersedes = fault.is_terminal() && !report.fault.is_terminal();
                    if supersedes {
                        report.fault = fault;
                    }
                    Some((supersedes, report.occurrences))
                }
            }
        };

        match coalesced {
            None => warn!(fault = %description, "Acquisition fault raised"),
            Some((true, _)) => warn!(fault = %description, "Terminal fault supersedes pending fault"),
            Some((false, occurrences)) => {
                debug!(fault = %description, occurrences, "Fault coalesced")
            }
        }
        true
    }

    /// Whether a fault was pending; clears it in the same critical section
    pub fn check_and_clear(&self) -> bool {
        self.take().is_some()
    }

    /// Take the pending fault, leaving the flag inactive
    pub fn take(&self) -> Option<FaultReport> {
        self.pending.lock().take()
    }

    /// Peek at the flag without clearing it
    pub fn is_active(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Deactivate without reporting
    pub fn reset(&self) {
        *self.pending.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn check_and_clear_reports_once() {
        let flag = FaultFlag::new();
        assert!(!flag.check_and_clear());

        flag.raise(Fault::Continuity { expected: 3, received: 5 });
        flag.raise(Fault::Continuity { expected: 6, received: 9 });

        assert!(flag.is_active());
        assert!(flag.check_and_clear());
        assert!(!flag.check_and_clear());
        assert!(!flag.is_active());
    }

    #[test]
    fn terminal_fault_supersedes_continuity() {
        let flag = FaultFlag::new();
        flag.raise(Fault::Continuity { expected: 1, received: 2 });
        flag.raise(Fault::Disconnected { reason: DisconnectReason::Timeout });
        flag.raise(Fault::Continuity { expected: 3, received: 7 });

        let report = flag.take().unwrap();
        assert_eq!(report.fault, Fault::Disconnected { reason: DisconnectReason::Timeout });
        assert_eq!(report.occurrences, 3);
    }

    #[test]
    fn first_terminal_fault_is_kept() {
        let flag = FaultFlag::new();
        flag.raise(Fault::Driver { code: 7, message: "usb stall".into() });
        flag.raise(Fault::LoopExited { detail: "returned early".into() });

        let report = flag.take().unwrap();
        assert_eq!(report.fault, Fault::Driver { code: 7, message: "usb stall".into() });
    }

    #[test]
    fn concurrent_raises_are_reported_once() {
        let flag = Arc::new(FaultFlag::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let flag = Arc::clone(&flag);
                std::thread::spawn(move || {
                    for n in 0..100 {
                        flag.raise(Fault::Continuity { expected: n, received: n + i + 1 });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let report = flag.take().unwrap();
        assert_eq!(report.occurrences, 400);
        assert!(flag.take().is_none());
    }

    #[test]
    fn raise_if_drops_faults_once_no_longer_live() {
        let flag = FaultFlag::new();
        assert!(!flag.raise_if(Fault::LoopExited { detail: "late".into() }, || false));
        assert!(!flag.is_active());

        assert!(flag.raise_if(Fault::InvalidPackage { seq: 3 }, || true));
        assert_eq!(flag.take().map(|r| r.fault), Some(Fault::InvalidPackage { seq: 3 }));
    }
}
