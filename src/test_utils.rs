//! Scriptable driver and helpers for exercising the acquisition lifecycle
//!
//! [`ManualDriver`] runs a communication loop that does nothing until the test
//! feeds it [`LoopCommand`]s, and it counts every call the session makes into it.
//! Its communication flag can be held high after the loop exits to model a driver
//! that is slow to acknowledge an interrupt.

#![cfg(any(test, feature = "benchmark"))]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::device::{DeviceDriver, FrameSink};
use crate::types::{AcquisitionConfig, DeviceEvent, DeviceInfo, ScanDomain};
use crate::{AcquisitionError, Result};

/// One step executed by [`ManualDriver`]'s communication loop
#[derive(Debug)]
pub enum LoopCommand {
    Frame { seq: i64, values: Vec<i32> },
    Fault { code: i32, message: String },
    Event(DeviceEvent),
    /// Leave the loop with this result as if the device stopped on its own
    Return(Result<()>),
    Panic(String),
}

/// Call counters recorded by [`ManualDriver`]
#[derive(Debug, Default)]
pub struct CallCounts {
    pub scan: AtomicUsize,
    pub connect: AtomicUsize,
    pub disconnect: AtomicUsize,
    pub start_acquisition: AtomicUsize,
    pub run_loop: AtomicUsize,
    pub interrupt: AtomicUsize,
    pub flag_polls: AtomicUsize,
    pub stop_acquisition: AtomicUsize,
    pub set_parameter: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Test double for [`DeviceDriver`]
pub struct ManualDriver {
    pub calls: CallCounts,
    commands_tx: Mutex<Sender<LoopCommand>>,
    commands_rx: Mutex<Receiver<LoopCommand>>,
    communicating: AtomicBool,
    hold_flag: AtomicBool,
    interrupted: AtomicBool,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
    fail_start: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
    scan_results: Mutex<HashMap<ScanDomain, Result<Vec<String>, String>>>,
    info: DeviceInfo,
}

impl Default for ManualDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualDriver {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            calls: CallCounts::default(),
            commands_tx: Mutex::new(tx),
            commands_rx: Mutex::new(rx),
            communicating: AtomicBool::new(false),
            hold_flag: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            connect_delay: Mutex::new(None),
            scan_results: Mutex::new(HashMap::new()),
            info: DeviceInfo {
                device_type: "biosignalsplux".to_string(),
                product_id: 513,
                battery_level: 87,
                channel_count: 8,
            },
        }
    }

    pub fn send(&self, command: LoopCommand) {
        // the receiver lives as long as self
        let _ = self.commands_tx.lock().send(command);
    }

    pub fn push_frame(&self, seq: i64, values: &[i32]) {
        self.send(LoopCommand::Frame { seq, values: values.to_vec() });
    }

    pub fn push_frames(&self, seqs: impl IntoIterator<Item = i64>, channels: usize) {
        for seq in seqs {
            let values: Vec<i32> = (0..channels).map(|ch| (seq as i32) * 10 + ch as i32).collect();
            self.push_frame(seq, &values);
        }
    }

    pub fn push_fault(&self, code: i32, message: &str) {
        self.send(LoopCommand::Fault { code, message: message.to_string() });
    }

    pub fn push_event(&self, event: DeviceEvent) {
        self.send(LoopCommand::Event(event));
    }

    /// Keep reporting an active loop after it exits, until released
    pub fn hold_communication_flag(&self, hold: bool) {
        self.hold_flag.store(hold, Ordering::SeqCst);
    }

    pub fn set_communication_active(&self, active: bool) {
        self.communicating.store(active, Ordering::SeqCst);
    }

    pub fn communication_flag(&self) -> bool {
        self.communicating.load(Ordering::SeqCst)
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *self.connect_delay.lock() = delay;
    }

    pub fn set_scan_results(&self, domain: ScanDomain, devices: &[&str]) {
        let devices = devices.iter().map(|d| d.to_string()).collect();
        self.scan_results.lock().insert(domain, Ok(devices));
    }

    pub fn fail_scan(&self, domain: ScanDomain, message: &str) {
        self.scan_results.lock().insert(domain, Err(message.to_string()));
    }

    fn execute(&self, command: LoopCommand, sink: &dyn FrameSink) -> Option<Result<()>> {
        match command {
            LoopCommand::Frame { seq, values } => sink.on_raw_frame(seq, &values),
            LoopCommand::Fault { code, message } => sink.on_fault(code, &message),
            LoopCommand::Event(event) => sink.on_event(event),
            LoopCommand::Return(result) => return Some(result),
            LoopCommand::Panic(message) => panic!("{}", message),
        }
        None
    }

    fn leave_loop(&self) {
        if !self.hold_flag.load(Ordering::SeqCst) {
            self.communicating.store(false, Ordering::SeqCst);
        }
    }
}

impl DeviceDriver for ManualDriver {
    fn scan(&self, domain: ScanDomain) -> Result<Vec<String>> {
        self.calls.scan.fetch_add(1, Ordering::SeqCst);
        match self.scan_results.lock().get(&domain) {
            Some(Ok(devices)) => Ok(devices.clone()),
            Some(Err(message)) => Err(AcquisitionError::driver("scan", message.clone())),
            None => Ok(Vec::new()),
        }
    }

    fn connect(&self, address: &str) -> Result<()> {
        self.calls.connect.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(AcquisitionError::driver("connect", format!("{} unreachable", address)));
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.calls.disconnect.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(AcquisitionError::driver("disconnect", "device already unreachable"));
        }
        Ok(())
    }

    fn start_acquisition(&self, _config: &AcquisitionConfig) -> Result<()> {
        self.calls.start_acquisition.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(AcquisitionError::driver("start acquisition", "device refused configuration"));
        }
        self.interrupted.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn run_loop(&self, sink: &dyn FrameSink, cancel: &CancellationToken) -> Result<()> {
        self.calls.run_loop.fetch_add(1, Ordering::SeqCst);
        let commands = self.commands_rx.lock();
        self.communicating.store(true, Ordering::SeqCst);

        let result = loop {
            if cancel.is_cancelled() || self.interrupted.load(Ordering::SeqCst) {
                break Ok(());
            }
            match commands.recv_timeout(Duration::from_millis(1)) {
                Ok(command) => {
                    if let Some(result) = self.execute(command, sink) {
                        break result;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break Ok(()),
            }
        };
        self.leave_loop();
        drop(commands);
        result
    }

    fn interrupt(&self) -> Result<()> {
        self.calls.interrupt.fetch_add(1, Ordering::SeqCst);
        self.interrupted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_communication_active(&self) -> bool {
        self.calls.flag_polls.fetch_add(1, Ordering::SeqCst);
        self.communicating.load(Ordering::SeqCst)
    }

    fn stop_acquisition(&self) -> Result<()> {
        self.calls.stop_acquisition.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn device_info(&self) -> Result<DeviceInfo> {
        Ok(self.info.clone())
    }

    fn set_parameter(&self, port: u8, _index: u8, data: &[i32]) -> Result<()> {
        self.calls.set_parameter.fetch_add(1, Ordering::SeqCst);
        if data.is_empty() {
            return Err(AcquisitionError::driver("set parameter", format!("empty data for port {}", port)));
        }
        Ok(())
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// A two-channel profile accepted by every driver
pub fn two_channel_config() -> AcquisitionConfig {
    AcquisitionConfig::ChannelCount { sampling_rate: 1000, count: 2, resolution: 16 }
}
