// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! PI loop for the motorized floor-heating mixer valve.
//!
//! The valve has no position feedback; the loop acts purely on the mixed
//! forward temperature. A sampler thread feeds the filter at its own pace;
//! a separate decision thread computes a pulse length from the filtered
//! error each control round and fires the opening or closing motor via a
//! [`PulseSwitch`]. The split matters because a pulse blocks until the
//! slave reports the movement finished, and the samples taken meanwhile
//! are exactly the ones the next decision needs. A per-direction movement
//! budget models the unknown position: sustained one-way pulsing eventually
//! means the valve is at an end stop, and further pulses in that direction
//! are suppressed until the other direction earns the budget back.
//!
//! The arithmetic lives in [`pi_step`], a pure function over [`PiState`], so
//! the tuning behavior is testable without threads or bus traffic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use super::filter::Filter;
use crate::device::{PulseSwitch, TempSensor};

/// Tuning knobs for the mixer loop, taken from the configuration.
#[derive(Debug, Clone)]
pub struct MixerTuning {
    /// Pulse seconds per degree of error.
    pub kp: f64,
    /// Integral gain, pulse seconds per degree-round of accumulated error.
    pub ki: f64,
    /// Errors inside this band are noise; no pulse, no integration.
    pub dead_zone: f64,
    /// Saturation bound on the integral term, in pulse seconds.
    pub integral_limit: f64,
    /// Pulses shorter than this are not worth the motor wear.
    pub min_pulse: Duration,
    /// Longest single pulse per control round.
    pub max_pulse: Duration,
    /// Cumulative one-way movement after which the valve is assumed to sit
    /// on an end stop.
    pub unidirectional_limit: Duration,
    pub sample_interval: Duration,
    pub control_interval: Duration,
    pub filter_size: usize,
}

impl Default for MixerTuning {
    fn default() -> Self {
        Self {
            kp: 2.0,
            ki: 0.2,
            dead_zone: 0.5,
            integral_limit: 10.0,
            min_pulse: Duration::from_millis(500),
            max_pulse: Duration::from_secs(8),
            unidirectional_limit: Duration::from_secs(90),
            sample_interval: Duration::from_secs(5),
            control_interval: Duration::from_secs(60),
            filter_size: 6,
        }
    }
}

/// Mutable loop state, shared between the control thread and the pure step.
pub struct PiState {
    filter: Filter,
    integral: f64,
    /// Budget already spent moving towards open / towards closed, seconds.
    open_spent: f64,
    close_spent: f64,
}

impl PiState {
    fn new(filter_size: usize) -> Self {
        Self {
            filter: Filter::new(filter_size),
            integral: 0.0,
            open_spent: 0.0,
            close_spent: 0.0,
        }
    }
}

/// What one control round decided to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PiAction {
    Idle,
    /// Pulse the opening motor (raises the mixed temperature).
    Open(Duration),
    /// Pulse the closing motor.
    Close(Duration),
    /// A pulse was warranted but the movement budget says end stop.
    AtEndStop,
}

/// One PI round over the filtered error. Pure: all effects are in `state`
/// and the returned action.
pub fn pi_step(tuning: &MixerTuning, state: &mut PiState, target: f64) -> PiAction {
    let value = match state.filter.value() {
        Some(v) => v,
        None => return PiAction::Idle,
    };
    let error = target - value;

    if error.abs() <= tuning.dead_zone {
        return PiAction::Idle;
    }

    state.integral = (state.integral + error * tuning.ki)
        .clamp(-tuning.integral_limit, tuning.integral_limit);

    let output = error * tuning.kp + state.integral;
    let pulse = Duration::from_secs_f64(output.abs().min(tuning.max_pulse.as_secs_f64()));
    if pulse < tuning.min_pulse {
        return PiAction::Idle;
    }

    let secs = pulse.as_secs_f64();
    let limit = tuning.unidirectional_limit.as_secs_f64();
    if output > 0.0 {
        if state.open_spent + secs > limit {
            return PiAction::AtEndStop;
        }
        state.open_spent += secs;
        state.close_spent = (state.close_spent - secs).max(0.0);
        PiAction::Open(pulse)
    } else {
        if state.close_spent + secs > limit {
            return PiAction::AtEndStop;
        }
        state.close_spent += secs;
        state.open_spent = (state.open_spent - secs).max(0.0);
        PiAction::Close(pulse)
    }
}

struct MixerInner {
    open_motor: Arc<PulseSwitch>,
    close_motor: Arc<PulseSwitch>,
    sensor: Arc<TempSensor>,
    tuning: MixerTuning,
    target: Mutex<f64>,
    state: Mutex<PiState>,
    /// Soft hold: keep sampling, skip pulsing.
    paused: AtomicBool,
    stop: AtomicBool,
}

pub struct MixerControl {
    inner: Arc<MixerInner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MixerControl {
    pub fn new(
        open_motor: Arc<PulseSwitch>,
        close_motor: Arc<PulseSwitch>,
        sensor: Arc<TempSensor>,
        tuning: MixerTuning,
    ) -> Self {
        let filter_size = tuning.filter_size;
        Self {
            inner: Arc::new(MixerInner {
                open_motor,
                close_motor,
                sensor,
                tuning,
                target: Mutex::new(0.0),
                state: Mutex::new(PiState::new(filter_size)),
                paused: AtomicBool::new(true),
                stop: AtomicBool::new(false),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn set_target(&self, target: f64) {
        let mut slot = self.inner.target.lock().unwrap();
        if *slot != target {
            info!("Mixer target changed {:.1} -> {:.1} °C", *slot, target);
            *slot = target;
        }
    }

    pub fn target(&self) -> f64 {
        *self.inner.target.lock().unwrap()
    }

    /// Filtered mixed-forward temperature, if enough samples arrived.
    pub fn value(&self) -> Option<f64> {
        self.inner.state.lock().unwrap().filter.value()
    }

    /// Resume pulsing. The integral and the movement budgets are reset: the
    /// valve may have been moved by hand or drifted while unobserved.
    pub fn resume(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.integral = 0.0;
        state.open_spent = 0.0;
        state.close_spent = 0.0;
        drop(state);
        self.inner.paused.store(false, Ordering::SeqCst);
        debug!("Mixer control resumed");
    }

    /// Hold pulsing, keep the filter warm.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        debug!("Mixer control paused");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Spawn the sampler and decision threads. Idempotent while running.
    pub fn start_control(&self) {
        let mut handles = self.handles.lock().unwrap();
        if !handles.is_empty() {
            return;
        }
        self.inner.stop.store(false, Ordering::SeqCst);

        let sampler = Arc::clone(&self.inner);
        handles.push(
            thread::Builder::new()
                .name("mixer-sampler".into())
                .spawn(move || sampler.sample_loop())
                .expect("failed to spawn mixer sampler thread"),
        );
        let decider = Arc::clone(&self.inner);
        handles.push(
            thread::Builder::new()
                .name("mixer-decision".into())
                .spawn(move || decider.decision_loop())
                .expect("failed to spawn mixer decision thread"),
        );
        info!("Mixer sampler and decision threads started");
    }

    /// Stop and join both mixer threads.
    pub fn stop_control(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        for handle in self.handles.lock().unwrap().drain(..) {
            if handle.join().is_err() {
                warn!("Mixer thread panicked");
            }
        }
        info!("Mixer control stopped");
    }
}

impl MixerInner {
    /// Keeps the filter fed regardless of what the decision thread is doing;
    /// a pulse in flight must not starve the measurement.
    fn sample_loop(&self) {
        while !self.stop.load(Ordering::SeqCst) {
            {
                let mut state = self.state.lock().unwrap();
                state.filter.input_sample(self.sensor.temp());
            }
            self.sleep_unless_stopped(self.tuning.sample_interval);
        }
    }

    fn decision_loop(&self) {
        loop {
            self.sleep_unless_stopped(self.tuning.control_interval);
            if self.stop.load(Ordering::SeqCst) {
                return;
            }
            if !self.paused.load(Ordering::SeqCst) {
                self.control_round();
            }
        }
    }

    fn sleep_unless_stopped(&self, total: Duration) {
        let step = Duration::from_millis(100);
        let mut remaining = total;
        while remaining > Duration::ZERO && !self.stop.load(Ordering::SeqCst) {
            let chunk = remaining.min(step);
            thread::sleep(chunk);
            remaining = remaining.saturating_sub(chunk);
        }
    }

    fn control_round(&self) {
        let target = *self.target.lock().unwrap();
        let action = {
            let mut state = self.state.lock().unwrap();
            pi_step(&self.tuning, &mut state, target)
        };
        match action {
            PiAction::Idle => {}
            PiAction::Open(pulse) => {
                debug!("Mixer opening for {} ms", pulse.as_millis());
                self.open_motor.pulse_block(pulse);
            }
            PiAction::Close(pulse) => {
                debug!("Mixer closing for {} ms", pulse.as_millis());
                self.close_motor.pulse_block(pulse);
            }
            PiAction::AtEndStop => {
                debug!("Mixer pulse suppressed, movement budget exhausted");
            }
        }
    }
}
