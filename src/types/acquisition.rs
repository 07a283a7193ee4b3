//! Acquisition configuration modes understood by the device driver

use serde::{Deserialize, Serialize};

use crate::{AcquisitionError, Result};

/// Highest analog port addressable through a channel list
pub const MAX_ANALOG_CHANNELS: u8 = 11;

/// Highest analog port on muscle-band devices
pub const MAX_MUSCLE_BAN_CHANNELS: u8 = 8;

/// Configuration of one acquisition source (a sensor port)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct SourceConfig {
    /// Source port (1..=8 for analog ports, 0 for the default port)
    pub port: u8,
    /// Divisor applied to the base sampling rate (>= 1)
    #[serde(default = "default_freq_divisor")]
    pub freq_divisor: u32,
    /// Sampling resolution in bits (8 or 16)
    #[serde(default = "default_source_bits")]
    pub n_bits: u8,
    /// Bitmask of channels to sample on this port (bit 0 is channel 0)
    #[serde(default = "default_channel_mask")]
    pub channel_mask: u32,
}

fn default_freq_divisor() -> u32 {
    1
}

fn default_source_bits() -> u8 {
    16
}

fn default_channel_mask() -> u32 {
    1
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            port: 0,
            freq_divisor: default_freq_divisor(),
            n_bits: default_source_bits(),
            channel_mask: default_channel_mask(),
        }
    }
}

impl SourceConfig {
    /// Source on `port` sampling channel 0 at 16 bits and the base rate
    pub fn port(port: u8) -> Self {
        Self { port, ..Self::default() }
    }

    fn validate(&self) -> Result<()> {
        if self.freq_divisor == 0 {
            return Err(AcquisitionError::invalid_config(format!(
                "source on port {} has a frequency divisor of 0",
                self.port
            )));
        }
        if self.n_bits != 8 && self.n_bits != 16 {
            return Err(AcquisitionError::invalid_config(format!(
                "source on port {} has resolution {} (expected 8 or 16 bits)",
                self.port, self.n_bits
            )));
        }
        if self.channel_mask == 0 {
            return Err(AcquisitionError::invalid_config(format!(
                "source on port {} samples no channels",
                self.port
            )));
        }
        Ok(())
    }
}

/// How the device should be configured when an acquisition starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AcquisitionConfig {
    /// Per-source configuration (port, divisor, resolution, channel mask)
    Sources { sampling_rate: u32, sources: Vec<SourceConfig> },

    /// Explicit list of active analog ports (1-based) sharing one resolution
    Channels { sampling_rate: u32, channels: Vec<u8>, resolution: u8 },

    /// The first `count` analog ports sharing one resolution
    ChannelCount { sampling_rate: u32, count: u8, resolution: u8 },

    /// Muscle-band devices: active ports plus a subsampling divisor
    MuscleBan { sampling_rate: u32, channels: Vec<u8>, resolution: u8, freq_divisor: u32 },
}

impl AcquisitionConfig {
    /// Base sampling rate in Hz
    pub fn sampling_rate(&self) -> u32 {
        match self {
            AcquisitionConfig::Sources { sampling_rate, .. }
            | AcquisitionConfig::Channels { sampling_rate, .. }
            | AcquisitionConfig::ChannelCount { sampling_rate, .. }
            | AcquisitionConfig::MuscleBan { sampling_rate, .. } => *sampling_rate,
        }
    }

    /// Number of channel readings expected in every sample package
    pub fn active_channel_count(&self) -> usize {
        match self {
            AcquisitionConfig::Sources { sources, .. } => {
                sources.iter().map(|s| s.channel_mask.count_ones() as usize).sum()
            }
            AcquisitionConfig::Channels { channels, .. }
            | AcquisitionConfig::MuscleBan { channels, .. } => {
                let mut unique = channels.clone();
                unique.sort_unstable();
                unique.dedup();
                unique.len()
            }
            AcquisitionConfig::ChannelCount { count, .. } => *count as usize,
        }
    }

    /// Active-channel mask in the driver's string format
    ///
    /// One character per port starting at port 1, `'1'` when active. Only the
    /// channel-list modes have a mask.
    pub fn channel_mask(&self) -> Option<String> {
        let (channels, width) = match self {
            AcquisitionConfig::Channels { channels, .. } => (channels, MAX_ANALOG_CHANNELS),
            AcquisitionConfig::MuscleBan { channels, .. } => (channels, MAX_MUSCLE_BAN_CHANNELS),
            _ => return None,
        };

        Some((1..=width).map(|port| if channels.contains(&port) { '1' } else { '0' }).collect())
    }

    /// Check parameters before they reach the driver
    pub fn validate(&self) -> Result<()> {
        if self.sampling_rate() == 0 {
            return Err(AcquisitionError::invalid_config("sampling rate must be positive"));
        }

        match self {
            AcquisitionConfig::Sources { sources, .. } => {
                if sources.is_empty() {
                    return Err(AcquisitionError::invalid_config("no sources configured"));
                }
                sources.iter().try_for_each(SourceConfig::validate)
            }
            AcquisitionConfig::Channels { channels, resolution, .. } => {
                validate_channels(channels, MAX_ANALOG_CHANNELS)?;
                validate_resolution(*resolution)
            }
            AcquisitionConfig::ChannelCount { count, resolution, .. } => {
                if *count == 0 || *count > MAX_ANALOG_CHANNELS {
                    return Err(AcquisitionError::invalid_config(format!(
                        "channel count {} outside 1..={}",
                        count, MAX_ANALOG_CHANNELS
                    )));
                }
                validate_resolution(*resolution)
            }
            AcquisitionConfig::MuscleBan { channels, resolution, freq_divisor, .. } => {
                validate_channels(channels, MAX_MUSCLE_BAN_CHANNELS)?;
                validate_resolution(*resolution)?;
                if *freq_divisor == 0 {
                    return Err(AcquisitionError::invalid_config("frequency divisor must be >= 1"));
                }
                Ok(())
            }
        }
    }
}

fn validate_channels(channels: &[u8], max: u8) -> Result<()> {
    if channels.is_empty() {
        return Err(AcquisitionError::invalid_config("no active channels"));
    }
    if let Some(bad) = channels.iter().find(|&&c| c == 0 || c > max) {
        return Err(AcquisitionError::invalid_config(format!(
            "channel {} outside 1..={}",
            bad, max
        )));
    }
    Ok(())
}

fn validate_resolution(bits: u8) -> Result<()> {
    if !(8..=16).contains(&bits) {
        return Err(AcquisitionError::invalid_config(format!(
            "resolution {} outside 8..=16 bits",
            bits
        )));
    }
    Ok(())
}
