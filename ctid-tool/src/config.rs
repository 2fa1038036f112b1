/*!
Configuration management for the CTid tool.
*/

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use ctid::{DecoderParams, SynthParams};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub decoder: DecoderConfig,
    pub synth: SynthParams,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Load the configuration if the file exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

/// Waveform decoder and scanner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Sampling frequency of the sample files in Hz
    pub sampling_freq_hz: f64,

    /// Nominal CTid carrier clock in Hz
    pub clock_freq_hz: f64,

    /// Accepted clock deviation in percent
    pub clock_tolerance_pct: f64,

    /// Bit periods without an edge before lock is lost
    pub lock_loss_periods: f64,

    /// Give up on a scan after this much sample time (ms)
    pub scan_timeout_ms: u64,

    /// Sample channel capacity between reader and decoder threads
    pub channel_capacity: usize,
}

impl DecoderConfig {
    pub fn params(&self) -> DecoderParams {
        DecoderParams {
            clock_freq_hz: self.clock_freq_hz,
            clock_tolerance_pct: self.clock_tolerance_pct,
            lock_loss_periods: self.lock_loss_periods,
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        let params = DecoderParams::default();
        Self {
            sampling_freq_hz: 9600.0,
            clock_freq_hz: params.clock_freq_hz,
            clock_tolerance_pct: params.clock_tolerance_pct,
            lock_loss_periods: params.lock_loss_periods,
            scan_timeout_ms: 2500,
            channel_capacity: 4096,
        }
    }
}
