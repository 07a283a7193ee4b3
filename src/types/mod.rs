//! Core types shared between the driver seam, the session and the host.
//!
//! ## Overview
//!
//! - [`SamplePackage`] is one device tick of channel readings, shared via `Arc`
//! - [`AcquisitionConfig`] selects how the device is configured when acquisition starts
//! - [`DeviceEvent`] carries disconnect and digital-input events from the driver
//! - [`SessionState`] and [`ConnectionState`] are the lifecycle states published to the host
//! - [`ScanDomain`], [`DeviceAddress`] and [`DeviceInfo`] describe devices
//!
//! ## Usage Example
//!
//! ```rust
//! use biostream::types::{AcquisitionConfig, SamplePackage};
//!
//! let config = AcquisitionConfig::Channels {
//!     sampling_rate: 1000,
//!     channels: vec![1, 2, 3],
//!     resolution: 16,
//! };
//! config.validate().unwrap();
//! assert_eq!(config.channel_mask().as_deref(), Some("11100000000"));
//!
//! let package = SamplePackage::new(0, vec![512, 498, 530]);
//! assert_eq!(package.channel_count(), config.active_channel_count());
//! ```

mod acquisition;
mod device;
mod event;
mod package;
mod state;

pub use acquisition::{
    AcquisitionConfig, MAX_ANALOG_CHANNELS, MAX_MUSCLE_BAN_CHANNELS, SourceConfig,
};
pub use device::{DeviceAddress, DeviceInfo, ScanDomain};
pub use event::{ClockSource, DeviceEvent, DisconnectReason, EventClock};
pub use package::SamplePackage;
pub use state::{ConnectionState, SessionState, StopOutcome};
