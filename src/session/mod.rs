//! Acquisition lifecycle: start, poll, stop
//!
//! An [`AcquisitionSession`] owns one device's acquisition thread. The driver's
//! blocking communication loop runs on that thread and feeds a [`SampleBuffer`]
//! through the session's producer; the host drains the buffer from its own thread
//! with [`get_package_of_data`](AcquisitionSession::get_package_of_data).
//!
//! ```rust
//! use std::sync::Arc;
//! use biostream::{AcquisitionConfig, AcquisitionSession, DeviceDriver, ManagerConfig, SimulatedDriver};
//!
//! let driver = Arc::new(SimulatedDriver::default());
//! driver.connect("BTH00:07:80:4D:2E:76")?;
//! let session = AcquisitionSession::new(driver, &ManagerConfig::default());
//!
//! session.start(AcquisitionConfig::ChannelCount { sampling_rate: 100, count: 2, resolution: 16 })?;
//! std::thread::sleep(std::time::Duration::from_millis(50));
//! let packages = session.get_package_of_data(true)?;
//! session.stop(true);
//! # let _ = packages;
//! # Ok::<(), biostream::AcquisitionError>(())
//! ```

mod producer;
mod stop;
mod worker;


use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::{BufferStats, SampleBuffer};
use crate::config::{ManagerConfig, StopPolicy};
use crate::device::DeviceDriver;
use crate::fault::FaultFlag;
use crate::types::{AcquisitionConfig, DeviceEvent, SamplePackage, SessionState, StopOutcome};
use crate::{AcquisitionError, Result};

use producer::Producer;
use stop::{LoopWait, wait_for_loop_exit};
use worker::Worker;

#[derive(Default)]
struct Control {
    worker: Option<Worker>,
    generation: u64,
}

/// One device's acquisition lifecycle
///
/// `start` and `stop` serialize on an internal control lock. Polling never takes
/// that lock, so a consumer can keep draining while a stop is in progress.
pub struct AcquisitionSession {
    driver: Arc<dyn DeviceDriver>,
    buffer: Arc<SampleBuffer>,
    fault: Arc<FaultFlag>,
    events: broadcast::Sender<DeviceEvent>,
    state: Arc<watch::Sender<SessionState>>,
    policy: StopPolicy,
    control: Mutex<Control>,
    active_config: Mutex<Option<AcquisitionConfig>>,
}

impl AcquisitionSession {
    pub fn new(driver: Arc<dyn DeviceDriver>, config: &ManagerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (state, _) = watch::channel(SessionState::Idle);

        Self {
            driver,
            buffer: Arc::new(SampleBuffer::with_config(&config.buffer)),
            fault: Arc::new(FaultFlag::new()),
            events,
            state: Arc::new(state),
            policy: config.stop.clone(),
            control: Mutex::new(Control::default()),
            active_config: Mutex::new(None),
        }
    }

    /// Begin acquiring with `config`
    ///
    /// Fails without side effects when the session is not idle or a fault from the
    /// previous run has not been polled yet. Otherwise the buffer and fault flag are
    /// reset, the driver is armed and the acquisition thread is spawned. Returns once
    /// the thread exists; the session reports `Running` as soon as the thread enters
    /// the driver loop.
    pub fn start(&self, config: AcquisitionConfig) -> Result<()> {
        let mut control = self.control.lock();

        let current = *self.state.borrow();
        if current != SessionState::Idle || control.worker.is_some() {
            return Err(AcquisitionError::precondition(
                "start acquisition",
                format!("session is {:?}", current),
            ));
        }
        if self.fault.is_active() {
            return Err(AcquisitionError::precondition(
                "start acquisition",
                "a fault from the previous acquisition is still pending",
            ));
        }
        config.validate()?;

        self.buffer.reinitialize();
        self.fault.reset();
        self.driver.start_acquisition(&config)?;

        control.generation += 1;
        self.state.send_replace(SessionState::Starting);

        let cancel = CancellationToken::new();
        let producer = Producer::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.fault),
            self.events.clone(),
            cancel.clone(),
        );
        let worker = match Worker::spawn(
            control.generation,
            Arc::clone(&self.driver),
            producer,
            Arc::clone(&self.state),
            cancel,
        ) {
            Ok(worker) => worker,
            Err(e) => {
                self.state.send_replace(SessionState::Idle);
                if let Err(stop_err) = self.driver.stop_acquisition() {
                    warn!("Failed to disarm driver after spawn failure: {}", stop_err);
                }
                return Err(e);
            }
        };

        info!(
            thread = worker.name(),
            sampling_rate = config.sampling_rate(),
            channels = config.active_channel_count(),
            "Acquisition started"
        );
        control.worker = Some(worker);
        *self.active_config.lock() = Some(config);
        Ok(())
    }

    /// Stop the acquisition
    ///
    /// A voluntary stop interrupts the driver, waits for it to confirm its loop has
    /// exited, disarms it and joins the thread. If the confirmation does not arrive
    /// within the stop policy's timeout the stop escalates to forced.
    ///
    /// A forced stop never consults the driver: it cancels the loop and detaches the
    /// thread. Use it when the driver may be wedged or has already failed.
    ///
    /// Both end with the session idle, the active configuration cleared and the
    /// buffer reinitialized. Stopping an idle session is a no-op.
    pub fn stop(&self, voluntary: bool) -> StopOutcome {
        let mut control = self.control.lock();
        let Some(worker) = control.worker.take() else {
            debug!("Stop requested with no acquisition running");
            return StopOutcome::AlreadyStopped;
        };

        self.state.send_replace(SessionState::Stopping);
        worker.request_stop();

        let outcome =
            if voluntary { self.stop_voluntary(worker) } else { self.stop_forced(worker) };

        *self.active_config.lock() = None;
        self.buffer.reinitialize();
        self.state.send_replace(SessionState::Idle);

        info!(?outcome, "Acquisition stopped");
        outcome
    }

    fn stop_voluntary(&self, worker: Worker) -> StopOutcome {
        if let Err(e) = self.driver.interrupt() {
            warn!("Driver interrupt failed: {}", e);
        }

        match wait_for_loop_exit(self.driver.as_ref(), &self.policy) {
            LoopWait::Confirmed { polls, elapsed } => {
                debug!(polls, "Driver confirmed loop exit after {:?}", elapsed);
                if let Err(e) = self.driver.stop_acquisition() {
                    warn!("Driver failed to stop acquisition: {}", e);
                }
                worker.cancel();
                if worker.join_within(&self.policy) {
                    StopOutcome::Clean
                } else {
                    StopOutcome::Escalated
                }
            }
            LoopWait::TimedOut { polls, elapsed } => {
                warn!(polls, "Driver did not confirm loop exit within {:?}, forcing stop", elapsed);
                worker.abandon();
                StopOutcome::Escalated
            }
        }
    }

    fn stop_forced(&self, worker: Worker) -> StopOutcome {
        debug!(thread = worker.name(), finished = worker.is_finished(), "Forcing acquisition stop");
        worker.abandon();
        StopOutcome::Forced
    }

    /// Take the packages received since the last reset
    ///
    /// A pending fault is reported first, once, as
    /// [`AcquisitionError::RecoverableFault`], and the buffer is left untouched. The
    /// next call resumes normal draining. `Ok(None)` means nothing arrived yet.
    pub fn get_package_of_data(&self, reset_after: bool) -> Result<Option<Vec<SamplePackage>>> {
        if let Some(report) = self.fault.take() {
            debug!(occurrences = report.occurrences, fault = %report.fault, "Reporting pending fault");
            return Err(AcquisitionError::RecoverableFault { fault: report.fault });
        }
        Ok(self.buffer.drain(reset_after))
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Whether a fault is waiting to be polled
    pub fn is_faulted(&self) -> bool {
        self.fault.is_active()
    }

    pub fn active_config(&self) -> Option<AcquisitionConfig> {
        self.active_config.lock().clone()
    }

    pub fn buffer_stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    pub fn stop_policy(&self) -> &StopPolicy {
        &self.policy
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// State transitions, starting with the current state
    pub fn state_updates(&self) -> WatchStream<SessionState> {
        WatchStream::new(self.state.subscribe())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Device events received from now on
    pub fn event_stream(&self) -> BroadcastStream<DeviceEvent> {
        BroadcastStream::new(self.events.subscribe())
    }
}

impl Drop for AcquisitionSession {
    fn drop(&mut self) {
        if let Some(worker) = self.control.get_mut().worker.take() {
            warn!(thread = worker.name(), "Session dropped while acquiring, cancelling loop");
            worker.request_stop();
            worker.abandon();
        }
    }
}
