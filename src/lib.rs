//! Sample buffering and acquisition-thread lifecycle control for biosignal devices.
//!
//! biostream sits between a native device driver and a host application that polls
//! for data at its own pace, typically once per rendered frame. The driver's blocking
//! communication loop runs on a dedicated acquisition thread and pushes sample
//! packages into a bounded buffer; the host drains that buffer whenever it likes.
//! Anything that goes wrong on the producer side is recorded as a fault and reported
//! to the host exactly once, on its next poll.
//!
//! # Features
//!
//! - **Bounded buffering**: oldest packages are evicted first, memory stays fixed
//! - **Continuity checking**: sequence gaps are detected and reported without losing data
//! - **Graceful or forced stop**: wait for the driver to confirm, or detach immediately
//! - **Async host API**: scan, connect and acquire from tokio, poll synchronously
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use biostream::{
//!     AcquisitionConfig, DeviceConnection, ManagerConfig, PackageStreamExt, ScanDomain,
//!     SimulatedDriver,
//! };
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = DeviceConnection::new(Arc::new(SimulatedDriver::default()), ManagerConfig::default())?;
//!
//!     let devices = connection.scan(&ScanDomain::ALL).await?;
//!     connection.connect(devices[0].clone()).await?;
//!     connection
//!         .start_acquisition(AcquisitionConfig::Channels {
//!             sampling_rate: 1000,
//!             channels: vec![1, 2],
//!             resolution: 16,
//!         })
//!         .await?;
//!
//!     let mut packages = connection.package_stream(Duration::from_millis(16))?.until_terminal();
//!     while let Some(batch) = packages.next().await {
//!         match batch {
//!             Ok(batch) => println!("{} packages", batch.len()),
//!             Err(e) => eprintln!("fault: {}", e),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod buffer;
mod config;
mod device;
mod error;
mod fault;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

pub mod connection;
pub mod providers;
pub mod session;
pub mod stream;

pub use buffer::{BufferStats, PushOutcome, SampleBuffer};
pub use config::{BufferConfig, DEFAULT_BUFFER_CAPACITY, ManagerConfig, StopPolicy};
pub use device::{DeviceDriver, FrameSink};
pub use error::*;
pub use fault::{Fault, FaultFlag, FaultReport};
pub use types::*;

pub use connection::DeviceConnection;
pub use providers::{SimulatedBehavior, SimulatedDevice, SimulatedDriver};
pub use session::AcquisitionSession;
pub use stream::{PackagePoller, PackageStreamExt};
