//! Probe configuration, loadable from TOML.

use std::time::Duration;

use mechanic_obd::InterfaceConfig;
use serde::Deserialize;

use crate::error::{ProbeError, ProbeResult};

/// Top-level configuration for the probe.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// CAN interface name (e.g., "can0").
    pub interface: String,
    /// Time between two sampling cycles, in milliseconds.
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
    /// Read the VIN once at startup.
    #[serde(default = "default_read_vin")]
    pub read_vin: bool,
    /// Bus and engine settings.
    #[serde(default)]
    pub bus: InterfaceConfig,
    /// Gauges sampled every cycle.
    #[serde(default)]
    pub gauges: Vec<GaugeConfig>,
}

/// One linearly scaled value shown by the probe.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GaugeConfig {
    pub name: String,
    /// Mode 01 PID.
    pub pid: u8,
    /// Value of raw byte 0.
    pub min: f32,
    /// Value of raw byte 255.
    pub max: f32,
    /// Template for the text form, see `mechanic_obd::format_reading`.
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_sample_interval() -> u64 {
    1000
}

fn default_read_vin() -> bool {
    true
}

fn default_format() -> String {
    "{:.1}".to_string()
}

impl ProbeConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> ProbeResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml(contents: &str) -> ProbeResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    fn validate(&self) -> ProbeResult<()> {
        if self.sample_interval_ms == 0 {
            return Err(ProbeError::Invalid("sample_interval_ms must be > 0".into()));
        }
        for gauge in &self.gauges {
            if gauge.min >= gauge.max {
                return Err(ProbeError::Invalid(format!(
                    "gauge {}: min {} must be below max {}",
                    gauge.name, gauge.min, gauge.max
                )));
            }
            mechanic_obd::format_reading(&gauge.format, gauge.min).map_err(|e| {
                ProbeError::Invalid(format!("gauge {}: {e}", gauge.name))
            })?;
        }
        Ok(())
    }
}
