// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Configuration handling
//!
//! The whole controller is configured from one YAML file. Every section and
//! every field has a default, so a partial file is valid; a missing file gets
//! a fully commented sample written in its place and the start is refused so
//! the operator reviews the bus addresses before anything is energized.

mod bus;
mod control;
mod devices;
mod heatpump;

pub use bus::BusConfig;
pub use control::{
    BufferConfig, ConfiguredMode, ControlConfig, HwThermostatConfig, MixerConfig, PwmConfig,
    ThermostatConfig,
};
pub use devices::{
    DeviceEntry, DevicesConfig, PulsesConfig, SensorEntry, SensorsConfig, SwitchesConfig,
    ValveEntry, ValvesConfig, WiperEntry, WipersConfig,
};
pub use heatpump::{HeatPumpConfig, HeatPumpRegisters, HeatPumpScaling};

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::control::Polycurve;

/// Root configuration object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bus: BusConfig,
    pub devices: DevicesConfig,
    pub control: ControlConfig,
    pub heatpump: HeatPumpConfig,
}

impl Config {
    /// Load the configuration from a YAML file.
    ///
    /// A missing file is not silently replaced by defaults: a sample file is
    /// written at the requested path and an error is returned, so the
    /// controller never drives a real installation with guessed addresses.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Configuration file {} not found, writing a sample",
                path.display()
            );
            Config::default().save_to_file(path)?;
            anyhow::bail!(
                "no configuration at {}; a sample was written there, review the \
                 device addresses and start again",
                path.display()
            );
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        let config: Config = serde_yml::from_str(&contents)
            .with_context(|| format!("failed to parse configuration file {}", path.display()))?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yml::to_string(self).context("failed to serialize configuration")?;
        fs::write(path, yaml)
            .with_context(|| format!("failed to write configuration file {}", path.display()))?;
        Ok(())
    }

    /// Command line overrides, applied after loading.
    pub fn apply_overrides(&mut self, bus_port: Option<&str>, baud_rate: Option<u32>) {
        if let Some(port) = bus_port {
            info!("Bus port overridden from the command line: {}", port);
            self.bus.port = port.to_string();
        }
        if let Some(baud) = baud_rate {
            info!("Bus baud rate overridden from the command line: {}", baud);
            self.bus.baud_rate = baud;
        }
    }

    /// Rules the type system cannot express: curve tables must be valid
    /// interpolation tables, timing values must be non-zero.
    pub fn validate(&self) -> Result<()> {
        curve(&self.control.heating_curve).context("control.heating_curve")?;
        curve(&self.control.floor_curve).context("control.floor_curve")?;
        curve(&self.devices.wipers.heat.curve).context("devices.wipers.heat.curve")?;
        curve(&self.devices.wipers.hw.curve).context("devices.wipers.hw.curve")?;

        if self.control.loop_secs == 0 {
            anyhow::bail!("control.loop_secs must be positive");
        }
        if self.control.pwm.timebase_secs == 0 {
            anyhow::bail!("control.pwm.timebase_secs must be positive");
        }
        if self.control.valve_exercise_hour > 23 {
            anyhow::bail!(
                "control.valve_exercise_hour must be 0-23, got {}",
                self.control.valve_exercise_hour
            );
        }
        if self.bus.baud_rate == 0 {
            anyhow::bail!("bus.baud_rate must be positive");
        }
        Ok(())
    }
}

/// Build a [`Polycurve`] from a configured point table.
pub fn curve(points: &[[f64; 2]]) -> Result<Polycurve> {
    Polycurve::new(points.iter().map(|p| (p[0], p[1])).collect())
        .map_err(|e| anyhow::anyhow!("invalid curve table: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_writes_sample_and_refuses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("controller.yaml");
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("sample"));
        // The sample is a complete, loadable configuration.
        assert!(path.exists());
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.bus.master_address, 1);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("controller.yaml");
        fs::write(&path, "bus:\n  master_address: 7\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.bus.master_address, 7);
        assert_eq!(config.bus.baud_rate, 9600); // default survives
        assert_eq!(config.control.hw_target, 50.0);
    }

    #[test]
    fn bad_curve_table_is_rejected() {
        let mut config = Config::default();
        config.control.heating_curve = vec![[0.0, 55.0]];
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_win() {
        let mut config = Config::default();
        config.apply_overrides(Some("/dev/ttyS5"), Some(19200));
        assert_eq!(config.bus.port, "/dev/ttyS5");
        assert_eq!(config.bus.baud_rate, 19200);
    }
}
