// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Control primitives
//!
//! Leaf components the state machines are built from: sliding-window
//! filtering, piecewise-linear lookup curves, trend analysis, hysteresis and
//! PWM thermostats, and the mixer PI loop.

pub mod analyzer;
pub mod filter;
pub mod mixer;
pub mod polycurve;
pub mod pwm;
pub mod thermostat;
pub mod timer;

pub use analyzer::TempAnalyzer;
pub use filter::Filter;
pub use mixer::{MixerControl, MixerTuning};
pub use polycurve::{CurveError, Polycurve};
pub use pwm::{PwmHandle, PwmRegistry};
pub use thermostat::{AsymmetricThermostat, SampleSource, SymmetricThermostat};
pub use timer::TimerSec;
