//! Lifecycle states published to the host

use serde::{Deserialize, Serialize};

/// State of an acquisition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum SessionState {
    /// No communication loop running
    Idle,

    /// Background thread spawned, loop not yet entered
    Starting,

    /// Communication loop running, samples flowing
    Running,

    /// Stop protocol in progress
    Stopping,
}

impl SessionState {
    /// Whether a communication loop may be running
    pub fn is_active(self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

/// State of the device connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum ConnectionState {
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    Acquiring,
    Disconnecting,
}

impl ConnectionState {
    /// Whether a device link is established
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Acquiring)
    }
}

/// How a `stop` request completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum StopOutcome {
    /// Nothing was running
    AlreadyStopped,

    /// The driver confirmed the loop ended and the thread was joined
    Clean,

    /// The thread was abandoned without consulting the driver
    Forced,

    /// A voluntary stop timed out waiting for the driver and fell back to a forced stop
    Escalated,
}

impl StopOutcome {
    /// Whether the caller should also run device-level disconnect cleanup
    pub fn is_forced(self) -> bool {
        matches!(self, StopOutcome::Forced | StopOutcome::Escalated)
    }
}
