//! Acquisition thread hosting the driver's blocking communication loop

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::producer::Producer;
use crate::config::StopPolicy;
use crate::device::DeviceDriver;
use crate::fault::Fault;
use crate::types::SessionState;
use crate::{AcquisitionError, Result};

/// Handle to a running acquisition thread
pub(crate) struct Worker {
    name: String,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    stop_requested: Arc<AtomicBool>,
}

impl Worker {
    /// Spawn the acquisition thread
    ///
    /// The thread moves the session from `Starting` to `Running` once it is about
    /// to enter the driver loop, then runs the loop to completion. Loop exits the
    /// session did not ask for become terminal faults.
    pub(crate) fn spawn(
        generation: u64,
        driver: Arc<dyn DeviceDriver>,
        producer: Producer,
        state: Arc<watch::Sender<SessionState>>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let name = format!("biostream-acq-{}", generation);
        let stop_requested = Arc::new(AtomicBool::new(false));

        let thread_cancel = cancel.clone();
        let thread_stop = Arc::clone(&stop_requested);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                Self::communication_thread(driver, producer, state, thread_cancel, thread_stop);
            })
            .map_err(|source| AcquisitionError::Thread { thread: name.clone(), source })?;

        debug!(thread = %name, "Acquisition thread spawned");
        Ok(Self { name, handle, cancel, stop_requested })
    }

    fn communication_thread(
        driver: Arc<dyn DeviceDriver>,
        producer: Producer,
        state: Arc<watch::Sender<SessionState>>,
        cancel: CancellationToken,
        stop_requested: Arc<AtomicBool>,
    ) {
        let entered = state.send_if_modified(|current| {
            if *current == SessionState::Starting {
                *current = SessionState::Running;
                true
            } else {
                false
            }
        });
        if !entered {
            debug!("Stop requested before the communication loop started");
            return;
        }

        info!("Communication loop started");
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| driver.run_loop(&producer, &cancel)));
        let expected = stop_requested.load(Ordering::Acquire) || cancel.is_cancelled();

        match result {
            Ok(Ok(())) if expected => {
                info!("Communication loop ended after {:?}", started.elapsed());
            }
            Ok(Ok(())) => {
                warn!("Communication loop returned without a stop request");
                producer.raise(Fault::LoopExited {
                    detail: "driver returned without a stop request".to_string(),
                });
            }
            Ok(Err(e)) if expected => {
                debug!("Communication loop ended with error during stop: {}", e);
            }
            Ok(Err(e)) => {
                warn!("Communication loop failed: {}", e);
                producer.raise(Fault::Driver { code: -1, message: e.to_string() });
            }
            Err(payload) if expected => {
                debug!("Communication loop panicked during stop: {}", panic_message(payload.as_ref()));
            }
            Err(payload) => {
                let detail = format!("driver panicked: {}", panic_message(payload.as_ref()));
                warn!("{}", detail);
                producer.raise(Fault::LoopExited { detail });
            }
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Mark the upcoming loop exit as requested
    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Signal the loop's cancellation token
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Join the thread if it exits within the policy's timeout
    ///
    /// Returns `false` and detaches the thread when it does not.
    pub(crate) fn join_within(self, policy: &StopPolicy) -> bool {
        let started = Instant::now();
        let mut attempt = 0;
        while !self.handle.is_finished() {
            if policy.timeout().is_some_and(|timeout| started.elapsed() >= timeout) {
                warn!(thread = %self.name, "Acquisition thread did not exit, detaching");
                return false;
            }
            thread::sleep(policy.backoff(attempt));
            attempt += 1;
        }

        if self.handle.join().is_err() {
            warn!(thread = %self.name, "Acquisition thread panicked outside the driver loop");
        }
        true
    }

    /// Cancel the loop and let the thread go without waiting for it
    pub(crate) fn abandon(self) {
        self.cancel.cancel();
        if self.handle.is_finished() {
            if self.handle.join().is_err() {
                warn!(thread = %self.name, "Acquisition thread panicked outside the driver loop");
            }
        } else {
            debug!(thread = %self.name, "Detaching acquisition thread");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
