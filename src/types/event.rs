//! Device events raised by the driver alongside sample data

use serde::{Deserialize, Serialize};

/// Why the device dropped the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum DisconnectReason {
    /// Connection timeout elapsed
    Timeout,
    /// The device button was pressed
    ButtonPressed,
    /// Battery discharged
    BatteryDischarged,
}

impl DisconnectReason {
    /// Map the driver's numeric reason code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(DisconnectReason::Timeout),
            2 => Some(DisconnectReason::ButtonPressed),
            4 => Some(DisconnectReason::BatteryDischarged),
            _ => None,
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DisconnectReason::Timeout => "connection timeout",
            DisconnectReason::ButtonPressed => "device button pressed",
            DisconnectReason::BatteryDischarged => "battery discharged",
        };
        f.write_str(text)
    }
}

/// Clock a digital input timestamp was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum ClockSource {
    None,
    Rtc,
    FrameCount,
    Bluetooth,
}

/// Event timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct EventClock {
    pub source: ClockSource,
    pub value: i64,
}

/// Asynchronous event reported by the device driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum DeviceEvent {
    /// The device dropped the link
    Disconnect { reason: DisconnectReason },

    /// A digital input changed state (`state` true means high)
    DigitalInputUpdate { timestamp: EventClock, channel: u8, state: bool },
}
