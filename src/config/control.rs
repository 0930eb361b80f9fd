// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Control loop configuration
//!
//! Setpoints, hysteresis bands, heating curves and the timing of the control
//! core. Temperatures are °C, durations are seconds unless noted.

use serde::{Deserialize, Serialize};

/// A room thermostat band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermostatConfig {
    pub threshold: f64,
    pub hysteresis: f64,
    /// Samples averaged before comparing against the band.
    pub filter_size: usize,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            threshold: 21.0,
            hysteresis: 0.15,
            filter_size: 5,
        }
    }
}

/// The hot water tank thermostat. Asymmetric: the tank is allowed to cool
/// well below the target before a reheat, but the reheat stops close above.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HwThermostatConfig {
    pub threshold: f64,
    pub up_hysteresis: f64,
    pub down_hysteresis: f64,
    pub filter_size: usize,
}

impl Default for HwThermostatConfig {
    fn default() -> Self {
        Self {
            threshold: 50.0,
            up_hysteresis: 2.0,
            down_hysteresis: 5.0,
            filter_size: 3,
        }
    }
}

/// Floor heating PWM scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PwmConfig {
    /// Full PWM cycle length in seconds.
    pub timebase_secs: u64,
    /// Minimum idle stretch before a newcomer may restart the cycle early.
    pub relax_secs: u64,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            timebase_secs: 3600,
            relax_secs: 600,
        }
    }
}

/// Mixer PI loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Pulse seconds per degree of error.
    pub kp: f64,
    /// Integral gain per control round.
    pub ki: f64,
    pub dead_zone: f64,
    pub integral_limit: f64,
    pub min_pulse_millis: u64,
    pub max_pulse_secs: u64,
    /// Cumulative one-way movement treated as reaching an end stop.
    pub unidirectional_limit_secs: u64,
    pub sample_interval_secs: u64,
    pub control_interval_secs: u64,
    pub filter_size: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            kp: 2.0,
            ki: 0.2,
            dead_zone: 0.5,
            integral_limit: 10.0,
            min_pulse_millis: 500,
            max_pulse_secs: 8,
            unidirectional_limit_secs: 90,
            sample_interval_secs: 5,
            control_interval_secs: 60,
            filter_size: 6,
        }
    }
}

/// Buffer tank supervision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Buffer may serve the load alone once it is this far above the target.
    pub overshoot: f64,
    /// Burner resumes once the buffer fell this far below the target.
    pub undershoot: f64,
    /// Minimum dwell between heat source state changes, in seconds.
    pub relax_secs: u64,
    /// Water circulation settle time after a valve/pump change, in seconds.
    pub circulate_secs: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            overshoot: 4.0,
            undershoot: 2.0,
            relax_secs: 180,
            circulate_secs: 20,
        }
    }
}

/// Operating mode requested in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfiguredMode {
    /// Everything off except frost protection of the control loop itself.
    Off,
    /// Space heating only.
    Heat,
    /// Space heating plus domestic hot water.
    HeatHw,
}

/// Top level control core settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub mode: ConfiguredMode,

    pub living: ThermostatConfig,
    pub upstairs: ThermostatConfig,
    /// Floor thermostats act on the floor temperature, not the room air.
    pub living_floor: ThermostatConfig,
    pub upstairs_floor: ThermostatConfig,
    pub hw: HwThermostatConfig,

    pub pwm: PwmConfig,
    pub mixer: MixerConfig,
    pub buffer: BufferConfig,

    /// `(external °C, boiler target °C)` weather compensation curve.
    pub heating_curve: Vec<[f64; 2]>,
    /// `(external °C, mixed floor forward °C)` curve.
    pub floor_curve: Vec<[f64; 2]>,

    /// Domestic hot water target temperature.
    pub hw_target: f64,
    /// Boiler overdrive above the tank target while reheating, °C.
    pub hw_boiler_margin: f64,

    /// Main control loop period, in seconds.
    pub loop_secs: u64,
    /// Minimum dwell between heating state changes, in seconds.
    pub relax_secs: u64,

    /// Post-heat run ends when forward-return delta falls below this.
    pub postheat_min_delta: f64,
    /// Post-heat safety cap, in seconds.
    pub postheat_max_secs: u64,
    /// Post-HW run ends when the forward cooled to target + margin.
    pub posthw_margin: f64,
    pub posthw_max_secs: u64,

    /// Hour of day (0-23) of the daily anti-seize valve exercise.
    pub valve_exercise_hour: u32,
    /// Seconds each valve is driven during the exercise.
    pub valve_exercise_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            mode: ConfiguredMode::HeatHw,
            living: ThermostatConfig::default(),
            upstairs: ThermostatConfig {
                threshold: 20.0,
                ..ThermostatConfig::default()
            },
            living_floor: ThermostatConfig {
                threshold: 25.0,
                hysteresis: 0.5,
                ..ThermostatConfig::default()
            },
            upstairs_floor: ThermostatConfig {
                threshold: 26.0,
                hysteresis: 0.5,
                ..ThermostatConfig::default()
            },
            hw: HwThermostatConfig::default(),
            pwm: PwmConfig::default(),
            mixer: MixerConfig::default(),
            buffer: BufferConfig::default(),
            heating_curve: vec![[-15.0, 75.0], [-5.0, 65.0], [5.0, 55.0], [15.0, 40.0]],
            floor_curve: vec![[-15.0, 38.0], [0.0, 32.0], [15.0, 26.0]],
            hw_target: 50.0,
            hw_boiler_margin: 12.0,
            loop_secs: 10,
            relax_secs: 300,
            postheat_min_delta: 3.0,
            postheat_max_secs: 900,
            posthw_margin: 3.0,
            posthw_max_secs: 600,
            valve_exercise_hour: 12,
            valve_exercise_secs: 10,
        }
    }
}
