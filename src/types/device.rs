//! Device discovery and identification types

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::AcquisitionError;

/// Transport searched during a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum ScanDomain {
    /// Classic Bluetooth
    #[serde(rename = "BTH")]
    Bth,
    /// Bluetooth Low Energy
    #[serde(rename = "BLE")]
    Ble,
    /// USB cable
    #[serde(rename = "USB")]
    Usb,
}

impl ScanDomain {
    pub const ALL: [ScanDomain; 3] = [ScanDomain::Bth, ScanDomain::Ble, ScanDomain::Usb];

    /// Prefix the driver uses for this domain
    pub fn as_str(self) -> &'static str {
        match self {
            ScanDomain::Bth => "BTH",
            ScanDomain::Ble => "BLE",
            ScanDomain::Usb => "USB",
        }
    }
}

impl std::fmt::Display for ScanDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanDomain {
    type Err = AcquisitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BTH" => Ok(ScanDomain::Bth),
            "BLE" => Ok(ScanDomain::Ble),
            "USB" => Ok(ScanDomain::Usb),
            other => Err(AcquisitionError::invalid_config(format!(
                "unknown scan domain '{}' (expected BTH, BLE or USB)",
                other
            ))),
        }
    }
}

/// A device found by a scan
///
/// Drivers report devices as a domain prefix followed by the address
/// (`BTH00:07:80:4D:2E:76`). The raw form is what `connect` expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct DeviceAddress {
    raw: String,
    domain: Option<ScanDomain>,
}

impl DeviceAddress {
    /// Parse a driver-reported identifier
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let domain = raw.get(..3).and_then(|prefix| prefix.parse().ok());
        Self { raw, domain }
    }

    /// Identifier as reported by the driver
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Domain the device was found on, when the identifier is prefixed
    pub fn domain(&self) -> Option<ScanDomain> {
        self.domain
    }

    /// Address without the domain prefix
    pub fn address(&self) -> &str {
        match self.domain {
            Some(_) => &self.raw[3..],
            None => &self.raw,
        }
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for DeviceAddress {
    fn from(raw: &str) -> Self {
        DeviceAddress::parse(raw)
    }
}

/// Static information about a connected device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct DeviceInfo {
    /// Device family name (e.g. "biosignalsplux", "BITalino")
    pub device_type: String,
    pub product_id: i32,
    /// Battery charge in percent
    pub battery_level: u8,
    /// Number of channels in the current acquisition
    pub channel_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_addresses() {
        let device = DeviceAddress::parse("BTH00:07:80:4D:2E:76");
        assert_eq!(device.domain(), Some(ScanDomain::Bth));
        assert_eq!(device.address(), "00:07:80:4D:2E:76");
        assert_eq!(device.raw(), "BTH00:07:80:4D:2E:76");

        let bare = DeviceAddress::parse("00:07:80:4D:2E:76");
        assert_eq!(bare.domain(), None);
        assert_eq!(bare.address(), "00:07:80:4D:2E:76");
    }

    #[test]
    fn scan_domain_round_trips_through_strings() {
        for domain in ScanDomain::ALL {
            assert_eq!(domain.as_str().parse::<ScanDomain>().unwrap(), domain);
        }
        assert_eq!(" ble ".parse::<ScanDomain>().unwrap(), ScanDomain::Ble);
        assert!("wifi".parse::<ScanDomain>().is_err());
    }
}
