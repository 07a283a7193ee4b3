//! Simulated acquisition device
//!
//! Generates a sine wave per active channel at the configured sampling rate,
//! scaled to the configured resolution. Frames are delivered in 10 ms batches,
//! paced against a monotonic clock so the long-run rate matches the request.
//! Optional behaviors model an unreliable link: dropped packages, a device that
//! disconnects mid-acquisition and a toggling digital input.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::device::{DeviceDriver, FrameSink};
use crate::types::{
    AcquisitionConfig, ClockSource, DeviceAddress, DeviceEvent, DeviceInfo, DisconnectReason,
    EventClock, MAX_ANALOG_CHANNELS, ScanDomain,
};
use crate::{AcquisitionError, Result};

const BATCH_PERIOD: Duration = Duration::from_millis(10);

/// Link misbehavior injected into the simulated loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedBehavior {
    /// Skip one sequence number every `n` frames
    pub skip_every: Option<u64>,
    /// Report a disconnect and end the loop after this many frames
    pub disconnect_after: Option<u64>,
    /// Toggle digital input 1 every `n` frames
    pub digital_toggle_every: Option<u64>,
    /// Wrap the sequence counter at this value
    pub sequence_modulus: Option<u32>,
}

/// Static description of the simulated hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedDevice {
    /// Identifiers returned by `scan`, domain-prefixed
    pub addresses: Vec<String>,
    pub info: DeviceInfo,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self {
            addresses: vec!["BTH00:07:80:4D:2E:76".to_string(), "BLE00:07:80:0F:30:6A".to_string()],
            info: DeviceInfo {
                device_type: "biosignalsplux".to_string(),
                product_id: 513,
                battery_level: 100,
                channel_count: u32::from(MAX_ANALOG_CHANNELS),
            },
        }
    }
}

#[derive(Debug, Default)]
struct Link {
    connected: Option<String>,
    armed: Option<AcquisitionConfig>,
    parameters: HashMap<(u8, u8), Vec<i32>>,
}

/// In-process [`DeviceDriver`] producing synthetic data
#[derive(Debug, Default)]
pub struct SimulatedDriver {
    device: SimulatedDevice,
    behavior: SimulatedBehavior,
    link: Mutex<Link>,
    communicating: AtomicBool,
    interrupted: AtomicBool,
}

impl SimulatedDriver {
    pub fn new(device: SimulatedDevice, behavior: SimulatedBehavior) -> Self {
        Self { device, behavior, ..Self::default() }
    }

    pub fn with_behavior(behavior: SimulatedBehavior) -> Self {
        Self::new(SimulatedDevice::default(), behavior)
    }

    /// Address of the connected device, if any
    pub fn connected_address(&self) -> Option<String> {
        self.link.lock().connected.clone()
    }

    /// Last value written with `set_parameter`
    pub fn parameter(&self, port: u8, index: u8) -> Option<Vec<i32>> {
        self.link.lock().parameters.get(&(port, index)).cloned()
    }

    fn require_connection(&self, operation: &str) -> Result<()> {
        if self.link.lock().connected.is_none() {
            return Err(AcquisitionError::driver(operation, "no device connected"));
        }
        Ok(())
    }
}

/// Per-acquisition waveform state
struct Waveform {
    sampling_rate: f64,
    channels: usize,
    midpoint: f64,
    amplitude: f64,
}

impl Waveform {
    fn new(config: &AcquisitionConfig) -> Self {
        let bits = i32::from(resolution_bits(config).clamp(2, 24));
        let midpoint = 2f64.powi(bits - 1);
        Self {
            sampling_rate: f64::from(config.sampling_rate()),
            channels: config.active_channel_count(),
            midpoint,
            amplitude: midpoint * 0.8,
        }
    }

    /// Channel `n` oscillates at `n + 1` Hz
    fn sample(&self, frame: u64, channel: usize) -> i32 {
        let t = frame as f64 / self.sampling_rate;
        let phase = TAU * (channel as f64 + 1.0) * t;
        (self.midpoint + self.amplitude * phase.sin()).round() as i32
    }

    fn frame(&self, frame: u64, out: &mut Vec<i32>) {
        out.clear();
        out.extend((0..self.channels).map(|ch| self.sample(frame, ch)));
    }
}

fn resolution_bits(config: &AcquisitionConfig) -> u8 {
    match config {
        AcquisitionConfig::Sources { sources, .. } => {
            sources.first().map(|source| source.n_bits).unwrap_or(16)
        }
        AcquisitionConfig::Channels { resolution, .. }
        | AcquisitionConfig::ChannelCount { resolution, .. }
        | AcquisitionConfig::MuscleBan { resolution, .. } => *resolution,
    }
}

impl DeviceDriver for SimulatedDriver {
    fn scan(&self, domain: ScanDomain) -> Result<Vec<String>> {
        let found: Vec<String> = self
            .device
            .addresses
            .iter()
            .filter(|raw| DeviceAddress::parse(raw.as_str()).domain() == Some(domain))
            .cloned()
            .collect();
        debug!(%domain, count = found.len(), "Simulated scan");
        Ok(found)
    }

    fn connect(&self, address: &str) -> Result<()> {
        let mut link = self.link.lock();
        if let Some(current) = &link.connected {
            return Err(AcquisitionError::driver(
                "connect",
                format!("already connected to {}", current),
            ));
        }

        let wanted = DeviceAddress::parse(address);
        let known = self
            .device
            .addresses
            .iter()
            .any(|raw| raw == address || DeviceAddress::parse(raw.as_str()).address() == wanted.address());
        if !known {
            return Err(AcquisitionError::driver("connect", format!("no device at {}", address)));
        }

        link.connected = Some(address.to_string());
        info!(address, "Simulated device connected");
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let mut link = self.link.lock();
        link.armed = None;
        match link.connected.take() {
            Some(address) => {
                info!(%address, "Simulated device disconnected");
                Ok(())
            }
            None => Err(AcquisitionError::driver("disconnect", "no device connected")),
        }
    }

    fn start_acquisition(&self, config: &AcquisitionConfig) -> Result<()> {
        self.require_connection("start acquisition")?;
        config.validate()?;
        if config.active_channel_count() > self.device.info.channel_count as usize {
            return Err(AcquisitionError::driver(
                "start acquisition",
                format!(
                    "{} channels requested, device has {}",
                    config.active_channel_count(),
                    self.device.info.channel_count
                ),
            ));
        }

        self.interrupted.store(false, Ordering::SeqCst);
        self.link.lock().armed = Some(config.clone());
        Ok(())
    }

    fn run_loop(&self, sink: &dyn FrameSink, cancel: &CancellationToken) -> Result<()> {
        let config = self
            .link
            .lock()
            .armed
            .clone()
            .ok_or_else(|| AcquisitionError::driver("run loop", "acquisition not armed"))?;

        let waveform = Waveform::new(&config);
        let per_batch = (waveform.sampling_rate * BATCH_PERIOD.as_secs_f64()).ceil().max(1.0) as u64;
        let batch_period = Duration::from_secs_f64(per_batch as f64 / waveform.sampling_rate);

        self.communicating.store(true, Ordering::SeqCst);
        let started = Instant::now();
        let mut values = Vec::with_capacity(waveform.channels);
        let mut frame: u64 = 0;
        let mut seq: i64 = 0;
        let mut digital = false;
        let mut batches: u32 = 0;

        'acquisition: loop {
            for _ in 0..per_batch {
                if cancel.is_cancelled() || self.interrupted.load(Ordering::SeqCst) {
                    break 'acquisition;
                }
                if self.behavior.disconnect_after == Some(frame) {
                    sink.on_event(DeviceEvent::Disconnect { reason: DisconnectReason::Timeout });
                    break 'acquisition;
                }
                if self.behavior.skip_every.is_some_and(|n| n > 0 && frame > 0 && frame % n == 0) {
                    trace!(seq, "Simulating a dropped package");
                    seq += 1;
                }
                if let Some(modulus) = self.behavior.sequence_modulus {
                    seq = seq.rem_euclid(i64::from(modulus.max(1)));
                }

                waveform.frame(frame, &mut values);
                sink.on_raw_frame(seq, &values);

                if self.behavior.digital_toggle_every.is_some_and(|n| n > 0 && (frame + 1) % n == 0) {
                    digital = !digital;
                    sink.on_event(DeviceEvent::DigitalInputUpdate {
                        timestamp: EventClock { source: ClockSource::FrameCount, value: frame as i64 },
                        channel: 1,
                        state: digital,
                    });
                }

                seq += 1;
                frame += 1;
            }

            batches += 1;
            let due = started + batch_period * batches;
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                std::thread::sleep(wait);
            }
        }

        debug!(frames = frame, "Simulated loop exited");
        self.communicating.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn interrupt(&self) -> Result<()> {
        self.interrupted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_communication_active(&self) -> bool {
        self.communicating.load(Ordering::SeqCst)
    }

    fn stop_acquisition(&self) -> Result<()> {
        self.link.lock().armed = None;
        Ok(())
    }

    fn device_info(&self) -> Result<DeviceInfo> {
        self.require_connection("device info")?;
        Ok(self.device.info.clone())
    }

    fn set_parameter(&self, port: u8, index: u8, data: &[i32]) -> Result<()> {
        self.require_connection("set parameter")?;
        if data.is_empty() {
            return Err(AcquisitionError::driver("set parameter", "parameter data is empty"));
        }
        self.link.lock().parameters.insert((port, index), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::wait_until;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<(i64, Vec<i32>)>>,
        events: Mutex<Vec<DeviceEvent>>,
    }

    impl FrameSink for Recorder {
        fn on_raw_frame(&self, seq: i64, values: &[i32]) {
            self.frames.lock().push((seq, values.to_vec()));
        }

        fn on_fault(&self, _code: i32, _message: &str) {}

        fn on_event(&self, event: DeviceEvent) {
            self.events.lock().push(event);
        }
    }

    fn connected(behavior: SimulatedBehavior) -> SimulatedDriver {
        let driver = SimulatedDriver::with_behavior(behavior);
        driver.connect("BTH00:07:80:4D:2E:76").unwrap();
        driver
    }

    #[test]
    fn scan_filters_by_domain() {
        let driver = SimulatedDriver::default();
        assert_eq!(driver.scan(ScanDomain::Bth).unwrap(), vec!["BTH00:07:80:4D:2E:76"]);
        assert_eq!(driver.scan(ScanDomain::Ble).unwrap(), vec!["BLE00:07:80:0F:30:6A"]);
        assert!(driver.scan(ScanDomain::Usb).unwrap().is_empty());
    }

    #[test]
    fn connect_requires_a_known_address() {
        let driver = SimulatedDriver::default();
        assert!(driver.connect("BTH11:22:33:44:55:66").is_err());
        driver.connect("00:07:80:4D:2E:76").unwrap();
        assert!(driver.connect("00:07:80:4D:2E:76").is_err());
        driver.disconnect().unwrap();
        assert!(driver.disconnect().is_err());
    }

    #[test]
    fn start_requires_connection_and_enough_channels() {
        let driver = SimulatedDriver::default();
        let config = AcquisitionConfig::ChannelCount { sampling_rate: 100, count: 2, resolution: 12 };
        assert!(driver.start_acquisition(&config).is_err());

        driver.connect("BTH00:07:80:4D:2E:76").unwrap();
        driver.start_acquisition(&config).unwrap();

        let too_many = AcquisitionConfig::ChannelCount { sampling_rate: 100, count: 12, resolution: 12 };
        assert!(driver.start_acquisition(&too_many).is_err());
    }

    #[test]
    fn loop_produces_contiguous_frames_within_resolution() {
        let driver = Arc::new(connected(SimulatedBehavior::default()));
        let config = AcquisitionConfig::ChannelCount { sampling_rate: 1000, count: 3, resolution: 12 };
        driver.start_acquisition(&config).unwrap();

        let recorder = Arc::new(Recorder::default());
        let cancel = CancellationToken::new();
        let handle = {
            let (driver, recorder, cancel) = (Arc::clone(&driver), Arc::clone(&recorder), cancel.clone());
            std::thread::spawn(move || driver.run_loop(recorder.as_ref(), &cancel))
        };

        assert!(wait_until(Duration::from_secs(2), || recorder.frames.lock().len() >= 100));
        assert!(driver.is_communication_active());
        driver.interrupt().unwrap();
        handle.join().unwrap().unwrap();
        assert!(!driver.is_communication_active());

        let frames = recorder.frames.lock();
        for (n, (seq, values)) in frames.iter().enumerate() {
            assert_eq!(*seq, n as i64);
            assert_eq!(values.len(), 3);
            assert!(values.iter().all(|&v| (0..4096).contains(&v)));
        }
    }

    #[test]
    fn behaviors_drop_packages_and_disconnect() {
        let behavior = SimulatedBehavior {
            skip_every: Some(10),
            disconnect_after: Some(25),
            digital_toggle_every: Some(5),
            sequence_modulus: None,
        };
        let driver = connected(behavior);
        driver
            .start_acquisition(&AcquisitionConfig::ChannelCount { sampling_rate: 2000, count: 1, resolution: 16 })
            .unwrap();

        let recorder = Recorder::default();
        driver.run_loop(&recorder, &CancellationToken::new()).unwrap();

        let seqs: Vec<i64> = recorder.frames.lock().iter().map(|(seq, _)| *seq).collect();
        assert_eq!(seqs.len(), 25);
        assert_eq!(&seqs[8..12], &[8, 9, 11, 12]);

        let events = recorder.events.lock();
        assert_eq!(
            events.last(),
            Some(&DeviceEvent::Disconnect { reason: DisconnectReason::Timeout })
        );
        let toggles = events.iter().filter(|e| matches!(e, DeviceEvent::DigitalInputUpdate { .. })).count();
        assert_eq!(toggles, 5);
    }

    #[test]
    fn parameters_are_recorded() {
        let driver = connected(SimulatedBehavior::default());
        driver.set_parameter(0, 3, &[1, 0]).unwrap();
        assert_eq!(driver.parameter(0, 3), Some(vec![1, 0]));
        assert!(driver.set_parameter(1, 0, &[]).is_err());
    }
}
