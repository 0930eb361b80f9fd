// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Heat pump configuration
//!
//! The heat pump is the alternative heat source. Unlike the field bus
//! devices it speaks standard Modbus RTU over its own serial port.

use serde::{Deserialize, Serialize};

/// Modbus register numbers of the heat pump, holding unless noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatPumpRegisters {
    /// Operating mode (holding): 0 off, 1 heat, 2 hot water.
    pub mode: u16,
    /// Target temperature (holding), in half-degree steps times ten.
    pub target: u16,
    /// Outgoing water temperature (input).
    pub outgoing: u16,
    /// Return water temperature (input).
    pub return_: u16,
    /// Compressor frequency (input).
    pub frequency: u16,
    /// Current electrical power draw (input).
    pub power: u16,
}

impl Default for HeatPumpRegisters {
    fn default() -> Self {
        Self {
            mode: 0,
            target: 2,
            outgoing: 0,
            return_: 1,
            frequency: 8,
            power: 14,
        }
    }
}

/// Scale factors applied to raw input registers to get engineering units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatPumpScaling {
    pub outgoing: f64,
    pub return_: f64,
    pub frequency: f64,
    pub power: f64,
}

impl Default for HeatPumpScaling {
    fn default() -> Self {
        Self {
            outgoing: 0.1,
            return_: 0.1,
            frequency: 1.0,
            power: 10.0,
        }
    }
}

/// Configuration of the optional heat pump heat source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatPumpConfig {
    /// When disabled the burner is the only heat source.
    pub enabled: bool,

    /// Serial device of the Modbus RTU adapter, e.g. `/dev/ttyUSB1`.
    pub port: String,

    pub baud_rate: u32,

    /// Modbus slave id of the pump.
    pub slave_id: u8,

    pub registers: HeatPumpRegisters,
    pub scaling: HeatPumpScaling,

    /// Minimum seconds between two reads of the same input register.
    pub poll_interval_secs: u64,
}

impl Default for HeatPumpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: "/dev/ttyUSB1".to_string(),
            baud_rate: 19200,
            slave_id: 1,
            registers: HeatPumpRegisters::default(),
            scaling: HeatPumpScaling::default(),
            poll_interval_secs: 5,
        }
    }
}
