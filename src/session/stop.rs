//! Waiting for the driver to leave its communication loop

use std::thread;
use std::time::{Duration, Instant};

use crate::config::StopPolicy;
use crate::device::DeviceDriver;

/// How the wait for loop exit ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopWait {
    /// The driver cleared its communication flag
    Confirmed { polls: u32, elapsed: Duration },

    /// The policy's timeout elapsed first
    TimedOut { polls: u32, elapsed: Duration },
}

/// Poll `is_communication_active` until it reports `false`
///
/// Backs off between polls per the policy. Without a timeout this blocks for as
/// long as the driver keeps its flag set.
pub(crate) fn wait_for_loop_exit(driver: &dyn DeviceDriver, policy: &StopPolicy) -> LoopWait {
    let started = Instant::now();
    let timeout = policy.timeout();
    let mut polls = 0;

    loop {
        polls += 1;
        if !driver.is_communication_active() {
            return LoopWait::Confirmed { polls, elapsed: started.elapsed() };
        }

        let elapsed = started.elapsed();
        if timeout.is_some_and(|timeout| elapsed >= timeout) {
            return LoopWait::TimedOut { polls, elapsed };
        }

        let mut delay = policy.backoff(polls - 1);
        if let Some(timeout) = timeout {
            delay = delay.min(timeout.saturating_sub(elapsed)).max(Duration::from_micros(100));
        }
        thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualDriver;

    #[test]
    fn returns_immediately_when_loop_already_idle() {
        let driver = ManualDriver::new();
        let outcome = wait_for_loop_exit(&driver, &StopPolicy::default());
        assert!(matches!(outcome, LoopWait::Confirmed { polls: 1, .. }));
    }

    #[test]
    fn times_out_while_flag_is_held() {
        let driver = ManualDriver::new();
        driver.set_communication_active(true);

        let policy = StopPolicy { poll_interval_ms: 1, max_poll_interval_ms: 5, timeout_ms: Some(40) };
        match wait_for_loop_exit(&driver, &policy) {
            LoopWait::TimedOut { polls, elapsed } => {
                assert!(polls > 1);
                assert!(elapsed >= Duration::from_millis(40));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn confirms_once_flag_clears() {
        let driver = std::sync::Arc::new(ManualDriver::new());
        driver.set_communication_active(true);

        let clearer = {
            let driver = std::sync::Arc::clone(&driver);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                driver.set_communication_active(false);
            })
        };

        let outcome = wait_for_loop_exit(driver.as_ref(), &StopPolicy::unbounded());
        clearer.join().unwrap();
        match outcome {
            LoopWait::Confirmed { elapsed, .. } => assert!(elapsed >= Duration::from_millis(30)),
            other => panic!("expected confirmation, got {:?}", other),
        }
    }
}
