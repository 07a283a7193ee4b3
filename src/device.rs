//! Device driver seam
//!
//! The native device API (Bluetooth/USB transport, handshake, protocol decoding) is
//! an external collaborator. It is reached through [`DeviceDriver`], and it reports
//! data back through the [`FrameSink`] handed to its communication loop.

use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::types::{AcquisitionConfig, DeviceEvent, DeviceInfo, ScanDomain};

/// Producer-side callbacks invoked by the driver's communication loop
///
/// Implementations must return promptly and must not panic: they run on the
/// driver's own thread, inside a loop that tolerates neither long pauses nor
/// unwinding. Every failure is recorded as a fault instead of being returned.
pub trait FrameSink: Send + Sync {
    /// A decoded sample package
    fn on_raw_frame(&self, seq: i64, values: &[i32]);

    /// The driver hit an unrecoverable internal condition
    fn on_fault(&self, code: i32, message: &str);

    /// Disconnect or digital-input event
    fn on_event(&self, event: DeviceEvent);
}

/// Native acquisition device API
///
/// All methods take `&self`: `interrupt` and `is_communication_active` are called
/// from the consumer thread while `run_loop` blocks on the acquisition thread, so
/// implementations synchronize internally.
pub trait DeviceDriver: Send + Sync + 'static {
    /// Discover devices on one transport
    ///
    /// Returns driver identifiers, prefixed with the domain (`BTH00:07:80:...`).
    fn scan(&self, domain: ScanDomain) -> Result<Vec<String>>;

    /// Establish the link to a device
    fn connect(&self, address: &str) -> Result<()>;

    /// Drop the link; may fail when the device is already unreachable
    fn disconnect(&self) -> Result<()>;

    /// Configure the device and arm acquisition
    fn start_acquisition(&self, config: &AcquisitionConfig) -> Result<()>;

    /// Blocking communication loop
    ///
    /// Delivers packages to `sink` until interrupted, cancelled or failed. The
    /// loop should check `cancel` between frames so a forced stop can end it.
    fn run_loop(&self, sink: &dyn FrameSink, cancel: &CancellationToken) -> Result<()>;

    /// Ask the communication loop to exit
    fn interrupt(&self) -> Result<()>;

    /// Whether the driver still considers its loop running
    fn is_communication_active(&self) -> bool;

    /// Disarm acquisition once the loop has exited
    fn stop_acquisition(&self) -> Result<()>;

    /// Device type, product id, battery level and channel count
    fn device_info(&self) -> Result<DeviceInfo>;

    /// Write a sensor (`port` > 0) or system (`port` = 0) parameter
    fn set_parameter(&self, port: u8, index: u8, data: &[i32]) -> Result<()>;
}
