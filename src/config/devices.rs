// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Device inventory configuration
//!
//! Bus addresses and per-device parameters of everything attached to the
//! field bus. The defaults describe the reference installation; a real
//! deployment overrides addresses in the YAML file.

use serde::{Deserialize, Serialize};

/// Bus identity of a single device register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub name: String,
    pub location: String,
    pub slave_address: u8,
    pub register_address: u8,
}

impl DeviceEntry {
    fn new(name: &str, location: &str, slave_address: u8, register_address: u8) -> Self {
        Self {
            name: name.to_string(),
            location: location.to_string(),
            slave_address,
            register_address,
        }
    }
}

/// A temperature sensor and its read policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorEntry {
    pub device: DeviceEntry,
    /// Minimum seconds between two actual bus reads; closer calls hit the cache.
    pub min_interval_secs: u64,
    /// Largest believable change between consecutive readings, in °C.
    pub max_jump: f64,
}

impl Default for SensorEntry {
    fn default() -> Self {
        Self {
            device: DeviceEntry::new("sensor", "", 0, 0),
            min_interval_secs: 10,
            max_jump: 10.0,
        }
    }
}

impl SensorEntry {
    fn new(name: &str, location: &str, slave_address: u8, register_address: u8) -> Self {
        Self {
            device: DeviceEntry::new(name, location, slave_address, register_address),
            ..Self::default()
        }
    }
}

/// A magnetic zone valve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValveEntry {
    pub device: DeviceEntry,
    /// Delay before a deferred close actually closes, in seconds.
    pub close_delay_secs: u64,
}

/// A water temperature wiper with its calibration table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WiperEntry {
    pub device: DeviceEntry,
    /// `(°C, raw code)` calibration points, any order.
    pub curve: Vec<[f64; 2]>,
    /// Added to the requested temperature before the curve lookup.
    pub shift: f64,
}

/// All temperature sensors of the installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub external: SensorEntry,
    pub living: SensorEntry,
    pub upstairs: SensorEntry,
    pub living_floor: SensorEntry,
    pub upstairs_floor: SensorEntry,
    pub hw_tank: SensorEntry,
    pub forward: SensorEntry,
    pub return_: SensorEntry,
    pub upper_buffer: SensorEntry,
    pub mixer_forward: SensorEntry,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            external: SensorEntry::new("external", "garden", 21, 0),
            living: SensorEntry::new("living", "living room", 22, 0),
            upstairs: SensorEntry::new("upstairs", "landing", 23, 0),
            living_floor: SensorEntry::new("living_floor", "living room floor", 22, 1),
            upstairs_floor: SensorEntry::new("upstairs_floor", "bathroom floor", 23, 1),
            hw_tank: SensorEntry::new("hw_tank", "boiler room", 24, 0),
            forward: SensorEntry {
                min_interval_secs: 5,
                ..SensorEntry::new("forward", "boiler room", 24, 1)
            },
            return_: SensorEntry::new("return", "boiler room", 24, 2),
            upper_buffer: SensorEntry::new("upper_buffer", "buffer tank", 24, 3),
            mixer_forward: SensorEntry {
                min_interval_secs: 5,
                ..SensorEntry::new("mixer_forward", "boiler room", 24, 4)
            },
        }
    }
}

/// Relays and pumps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchesConfig {
    pub heater_relay: DeviceEntry,
    pub hydr_shift_pump: DeviceEntry,
    pub radiator_pump: DeviceEntry,
    pub floor_pump: DeviceEntry,
}

impl Default for SwitchesConfig {
    fn default() -> Self {
        Self {
            heater_relay: DeviceEntry::new("heater_relay", "boiler room", 11, 0),
            hydr_shift_pump: DeviceEntry::new("hydr_shift_pump", "boiler room", 11, 1),
            radiator_pump: DeviceEntry::new("radiator_pump", "boiler room", 11, 2),
            floor_pump: DeviceEntry::new("floor_pump", "boiler room", 11, 3),
        }
    }
}

/// Zone valves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValvesConfig {
    pub buffer_feed: ValveEntry,
    pub hw: ValveEntry,
}

impl Default for ValvesConfig {
    fn default() -> Self {
        Self {
            buffer_feed: ValveEntry {
                device: DeviceEntry::new("buffer_feed_valve", "buffer tank", 11, 5),
                close_delay_secs: 120,
            },
            hw: ValveEntry {
                device: DeviceEntry::new("hw_valve", "boiler room", 11, 4),
                close_delay_secs: 120,
            },
        }
    }
}

/// Mixer motor pulse outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PulsesConfig {
    pub mixer_open: DeviceEntry,
    pub mixer_close: DeviceEntry,
}

impl Default for PulsesConfig {
    fn default() -> Self {
        Self {
            mixer_open: DeviceEntry::new("mixer_open", "boiler room", 12, 0),
            mixer_close: DeviceEntry::new("mixer_close", "boiler room", 12, 1),
        }
    }
}

/// Boiler setpoint wipers: one for space heating, one for the hot water
/// runs. Each has its own calibration curve and shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WipersConfig {
    pub heat: WiperEntry,
    pub hw: WiperEntry,
}

impl Default for WipersConfig {
    fn default() -> Self {
        Self {
            heat: WiperEntry {
                device: DeviceEntry::new("heat_wiper", "boiler room", 11, 6),
                curve: vec![[20.0, 40.0], [40.0, 105.0], [60.0, 165.0], [85.0, 235.0]],
                shift: 0.0,
            },
            hw: WiperEntry {
                device: DeviceEntry::new("hw_wiper", "boiler room", 11, 7),
                curve: vec![[20.0, 40.0], [40.0, 105.0], [60.0, 165.0], [85.0, 235.0]],
                shift: 0.0,
            },
        }
    }
}

/// The full device inventory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub sensors: SensorsConfig,
    pub switches: SwitchesConfig,
    pub valves: ValvesConfig,
    pub pulses: PulsesConfig,
    pub wipers: WipersConfig,
}
