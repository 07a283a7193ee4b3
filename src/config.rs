//! Runtime configuration
//!
//! Every field has a default, so an empty YAML document is a valid configuration:
//!
//! ```rust
//! use biostream::ManagerConfig;
//!
//! let config = ManagerConfig::from_yaml_str(
//!     "buffer:\n  capacity: 5000\nstop:\n  timeout_ms: ~\n",
//! ).unwrap();
//! assert_eq!(config.buffer.capacity, 5000);
//! assert_eq!(config.stop.timeout(), None);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::types::AcquisitionConfig;
use crate::{AcquisitionError, Result};

/// Ten seconds of data at 1 kHz
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Sample buffer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(default)]
pub struct BufferConfig {
    /// Maximum resident packages before the oldest is evicted
    pub capacity: usize,
    /// Expected first sequence number; `None` accepts whatever arrives first
    pub sequence_origin: Option<i64>,
    /// Wrap the sequence counter at this value (e.g. 16 for 4-bit counters)
    pub sequence_modulus: Option<u32>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_BUFFER_CAPACITY, sequence_origin: Some(0), sequence_modulus: None }
    }
}

/// How a voluntary stop waits for the driver to leave its communication loop
///
/// The driver offers no blocking "loop stopped" notification, so the session polls
/// `is_communication_active` with exponential backoff between `poll_interval_ms` and
/// `max_poll_interval_ms`. `timeout_ms: None` waits indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(default)]
pub struct StopPolicy {
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub timeout_ms: Option<u64>,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self { poll_interval_ms: 1, max_poll_interval_ms: 50, timeout_ms: Some(5_000) }
    }
}

impl StopPolicy {
    /// Wait for the driver however long it takes
    pub fn unbounded() -> Self {
        Self { timeout_ms: None, ..Self::default() }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms.max(self.poll_interval_ms).max(1))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Delay before poll number `attempt` (0-based): 1x, 2x, 4x ... capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.poll_interval().saturating_mul(factor).min(self.max_poll_interval())
    }
}

/// Top-level configuration for a [`DeviceConnection`](crate::DeviceConnection)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(default)]
pub struct ManagerConfig {
    pub buffer: BufferConfig,
    pub stop: StopPolicy,
    /// Abort a connection attempt after this long; `None` waits for the driver
    pub connect_timeout_ms: Option<u64>,
    /// Device events retained for slow subscribers
    pub event_capacity: usize,
    /// Acquisition profile used by `start_default_acquisition`
    pub acquisition: Option<AcquisitionConfig>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::default(),
            stop: StopPolicy::default(),
            connect_timeout_ms: Some(30_000),
            event_capacity: 64,
            acquisition: None,
        }
    }
}

impl ManagerConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ManagerConfig = if yaml.trim().is_empty() {
            ManagerConfig::default()
        } else {
            serde_yaml_ng::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| AcquisitionError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_yaml_str(&yaml)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer.capacity == 0 {
            return Err(AcquisitionError::invalid_config("buffer capacity must be positive"));
        }
        if self.buffer.sequence_modulus == Some(0) {
            return Err(AcquisitionError::invalid_config("sequence modulus must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(AcquisitionError::invalid_config("event capacity must be positive"));
        }
        if let Some(acquisition) = &self.acquisition {
            acquisition.validate()?;
        }
        Ok(())
    }
}
