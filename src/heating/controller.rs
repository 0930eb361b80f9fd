// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Top level heating control loop.
//!
//! Gathers demand from the room, floor and hot water thermostats, condenses
//! it into a single power class, drives the heating state machine and
//! performs its side effects: heat source mode, circulation pumps, mixer
//! loop, setpoints. Hot water wins over space heating whenever both demand
//! at once; the floor circuits keep no heat of their own during a hot water
//! run, their PWM cycle clock is frozen instead.
//!
//! The decision helpers ([`determine_power_needed`], [`determine_targets`])
//! are pure so every priority rule is table-testable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, Timelike};
use log::{debug, info, warn};

use super::buffer::{BufferHeat, BufferMode};
use super::heating_sm::{transition, HeatingEvent, HeatingState};
use crate::buscomm::bus::sleep_responsive;
use crate::config::ConfiguredMode;
use crate::context::Context;
use crate::control::{
    AsymmetricThermostat, MixerControl, Polycurve, PwmHandle, SymmetricThermostat, TempAnalyzer,
    TimerSec,
};
use crate::device::{MagneticValve, Switch, TempSensor};

/// Condensed demand, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    /// Hot water tank reheat.
    Hw,
    /// Radiators only.
    Rad,
    /// Radiators and floor circuits together.
    RadFloor,
    /// Floor circuits only.
    Floor,
    /// Nothing asked for heat.
    NoNeed,
}

/// Raw thermostat outputs for one loop iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Demand {
    pub hw: bool,
    pub living: bool,
    pub upstairs: bool,
    pub living_floor: bool,
    pub upstairs_floor: bool,
}

/// Collapse the thermostat outputs into one power class under the current
/// operating mode. Hot water preempts everything; a disabled mode masks its
/// demands entirely.
pub fn determine_power_needed(mode: ConfiguredMode, demand: &Demand) -> Power {
    if mode == ConfiguredMode::Off {
        return Power::NoNeed;
    }
    if mode == ConfiguredMode::HeatHw && demand.hw {
        return Power::Hw;
    }
    let radiators = demand.living || demand.upstairs;
    let floor = demand.living_floor || demand.upstairs_floor;
    match (radiators, floor) {
        (true, true) => Power::RadFloor,
        (true, false) => Power::Rad,
        (false, true) => Power::Floor,
        (false, false) => Power::NoNeed,
    }
}

/// Setpoints for one power class at the given external temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Targets {
    /// Heat source forward setpoint, °C.
    pub boiler: f64,
    /// Mixed floor forward setpoint; `None` when the floor is not served.
    pub mixer: Option<f64>,
}

pub fn determine_targets(
    power: Power,
    external: f64,
    heating_curve: &Polycurve,
    floor_curve: &Polycurve,
    hw_boiler_target: f64,
) -> Targets {
    match power {
        Power::Hw => Targets {
            boiler: hw_boiler_target,
            mixer: None,
        },
        Power::Rad => Targets {
            boiler: heating_curve.value(external),
            mixer: None,
        },
        Power::RadFloor | Power::Floor => Targets {
            boiler: heating_curve.value(external),
            mixer: Some(floor_curve.value(external)),
        },
        Power::NoNeed => Targets {
            boiler: heating_curve.value(external),
            mixer: None,
        },
    }
}

/// Everything the controller drives or listens to, wired up by the daemon.
pub struct ControllerParts {
    pub ctx: Arc<Context>,
    pub buffer: Arc<BufferHeat>,
    pub mixer: Arc<MixerControl>,
    pub radiator_pump: Arc<Switch>,
    pub floor_pump: Arc<Switch>,
    pub buffer_feed_valve: Arc<MagneticValve>,
    pub hw_valve: Arc<MagneticValve>,
    pub external: Arc<TempSensor>,
    pub forward: Arc<TempSensor>,
    pub return_line: Arc<TempSensor>,
    pub living_floor_sensor: Arc<TempSensor>,
    pub upstairs_floor_sensor: Arc<TempSensor>,
    pub living: SymmetricThermostat,
    pub upstairs: SymmetricThermostat,
    pub hw: AsymmetricThermostat,
    pub living_floor: PwmHandle,
    pub upstairs_floor: PwmHandle,
    pub heating_curve: Polycurve,
    pub floor_curve: Polycurve,
}

pub struct HeatingController {
    parts: ControllerParts,
    state: HeatingState,
    last_power: Power,
    /// Spaces state machine transitions apart.
    relax: TimerSec,
    /// Caps the post-circulation runs.
    post_timer: TimerSec,
    /// Forward temperature trend over the last ten minutes.
    forward_trend: TempAnalyzer,
    /// Rate limiter for the recurring status line.
    status_log: TimerSec,
    /// Shared stop flag, replaced with the daemon's in [`run`](Self::run).
    running: Arc<AtomicBool>,
    last_exercise: Option<NaiveDate>,
}

/// Trend window of the forward temperature analyzer, seconds.
const FORWARD_TREND_SPAN_SECS: f64 = 600.0;

/// Spacing of the recurring status log line.
const STATUS_LOG_PERIOD: Duration = Duration::from_secs(60);

impl HeatingController {
    pub fn new(parts: ControllerParts) -> Self {
        let relax_secs = parts.ctx.config().control.relax_secs;
        Self {
            parts,
            state: HeatingState::Off,
            last_power: Power::NoNeed,
            relax: TimerSec::new(Duration::from_secs(relax_secs)),
            post_timer: TimerSec::new(Duration::ZERO),
            forward_trend: TempAnalyzer::new(FORWARD_TREND_SPAN_SECS),
            status_log: TimerSec::new(STATUS_LOG_PERIOD),
            running: Arc::new(AtomicBool::new(true)),
            last_exercise: None,
        }
    }

    pub fn state(&self) -> HeatingState {
        self.state
    }

    /// The main control loop. Returns after `running` is cleared or a
    /// shutdown reason was raised; outputs are driven to a safe stop before
    /// returning.
    pub fn run(&mut self, running: Arc<AtomicBool>) {
        info!("Heating controller started");
        self.running = running;
        self.parts.buffer.init();

        while self.running.load(Ordering::SeqCst) && !self.parts.ctx.shutdown.is_set() {
            self.step();
            let loop_secs = self.parts.ctx.config().control.loop_secs;
            sleep_responsive(Duration::from_secs(loop_secs), &self.running);
        }

        if let Some(reason) = self.parts.ctx.shutdown.get() {
            warn!("Heating controller stopping: {}", reason);
        }
        self.all_off();
        info!("Heating controller stopped");
    }

    /// One control loop iteration. Public for the scenario tests.
    pub fn step(&mut self) {
        let config = self.parts.ctx.config();
        let control = &config.control;

        // Sample every input first so all decisions below see one snapshot.
        self.parts.living.update();
        self.parts.upstairs.update();
        self.parts.hw.update();
        self.parts
            .living_floor
            .update_sample(self.parts.living_floor_sensor.temp());
        self.parts
            .upstairs_floor
            .update_sample(self.parts.upstairs_floor_sensor.temp());
        self.parts.living_floor.set_target(control.living_floor.threshold);
        self.parts
            .upstairs_floor
            .set_target(control.upstairs_floor.threshold);
        self.parts.living.set_threshold(control.living.threshold);
        self.parts.upstairs.set_threshold(control.upstairs.threshold);
        self.parts.hw.set_threshold(control.hw.threshold);

        let forward = self.parts.forward.temp();
        self.forward_trend.update(forward);

        let demand = Demand {
            hw: self.parts.hw.is_on(),
            living: self.parts.living.is_on(),
            upstairs: self.parts.upstairs.is_on(),
            living_floor: self.parts.living_floor.is_on(),
            upstairs_floor: self.parts.upstairs_floor.is_on(),
        };
        let power = determine_power_needed(control.mode, &demand);
        debug!("Demand {:?} -> power {:?}", demand, power);

        // The recurring status line repeats every tick otherwise; the log
        // timer keeps it readable at any loop period.
        if self.status_log.expired() {
            let trend = if self.forward_trend.stable() {
                format!("{:+.3} °C/min", self.forward_trend.slope() * 60.0)
            } else {
                "settling".to_string()
            };
            info!(
                "State {}, power {:?}, forward {:.1} °C, trend {}",
                self.state, power, forward, trend
            );
            self.status_log.reset();
        }

        let external = self.parts.external.temp();
        let targets = determine_targets(
            power,
            external,
            &self.parts.heating_curve,
            &self.parts.floor_curve,
            control.hw_target + control.hw_boiler_margin,
        );
        self.parts.buffer.set_target(match power {
            Power::Hw => self.parts.heating_curve.value(external),
            _ => targets.boiler,
        });
        self.parts
            .buffer
            .set_hw_target(control.hw_target + control.hw_boiler_margin);
        if let Some(mixer_target) = targets.mixer {
            self.parts.mixer.set_target(mixer_target);
        }

        match self.state {
            HeatingState::Off => {
                if power != Power::NoNeed && self.relax.expired() {
                    self.fire(HeatingEvent::TurnOn);
                    self.apply_power(power);
                } else {
                    self.maybe_exercise_valves(control.valve_exercise_hour, control.valve_exercise_secs);
                }
            }
            HeatingState::Heating => {
                if power == Power::NoNeed {
                    if self.relax.expired() {
                        let (event, cap) = if self.last_power == Power::Hw {
                            (HeatingEvent::PostHw, control.posthw_max_secs)
                        } else {
                            (HeatingEvent::PostHeat, control.postheat_max_secs)
                        };
                        self.fire(event);
                        self.post_timer.set_duration(Duration::from_secs(cap));
                        self.post_timer.reset();
                        // Heat source off, circulation keeps running.
                        self.parts.buffer.set_mode(BufferMode::Off);
                    }
                } else if power != self.last_power {
                    self.apply_power(power);
                }
            }
            HeatingState::PostHeating => {
                if power != Power::NoNeed {
                    self.fire(HeatingEvent::TurnOn);
                    self.apply_power(power);
                } else {
                    let delta = forward - self.parts.return_line.temp();
                    if delta < control.postheat_min_delta || self.post_timer.expired() {
                        self.fire(HeatingEvent::Expire);
                        self.all_off();
                    }
                }
            }
            HeatingState::PostHwing => {
                if power != Power::NoNeed {
                    self.fire(HeatingEvent::TurnOn);
                    self.apply_power(power);
                } else {
                    let cooled = forward < control.hw_target + control.posthw_margin;
                    if cooled || self.post_timer.expired() {
                        self.fire(HeatingEvent::Expire);
                        self.all_off();
                    }
                }
            }
        }
    }

    fn fire(&mut self, event: HeatingEvent) {
        match transition(self.state, event) {
            Some(next) => {
                info!("Heating {} --{:?}--> {}", self.state, event, next);
                self.state = next;
                self.relax.reset();
            }
            None => warn!("Heating event {:?} ignored in state {}", event, self.state),
        }
    }

    /// Drive pumps, mixer and heat source mode for the given power class.
    fn apply_power(&mut self, power: Power) {
        info!("Applying power class {:?}", power);
        match power {
            Power::Hw => {
                self.parts.buffer.set_mode(BufferMode::Hw);
                self.parts.radiator_pump.off();
                self.parts.floor_pump.off();
                self.parts.mixer.pause();
            }
            Power::Rad => {
                self.parts.buffer.set_mode(BufferMode::Heat);
                self.parts.radiator_pump.on();
                self.parts.floor_pump.off();
                self.parts.mixer.pause();
            }
            Power::RadFloor => {
                self.parts.buffer.set_mode(BufferMode::Heat);
                self.parts.radiator_pump.on();
                self.parts.floor_pump.on();
                self.parts.mixer.resume();
            }
            Power::Floor => {
                self.parts.buffer.set_mode(BufferMode::Heat);
                self.parts.radiator_pump.off();
                self.parts.floor_pump.on();
                self.parts.mixer.resume();
            }
            Power::NoNeed => {}
        }
        self.last_power = power;
    }

    fn all_off(&mut self) {
        self.parts.buffer.set_mode(BufferMode::Off);
        self.parts.radiator_pump.off();
        self.parts.floor_pump.off();
        self.parts.mixer.pause();
        self.last_power = Power::NoNeed;
    }

    /// Daily anti-seize exercise of the magnetic valves, only while nothing
    /// is heating. A demand during the window simply defers it to the next
    /// idle pass inside the hour.
    fn maybe_exercise_valves(&mut self, hour: u32, secs: u64) {
        let now = Local::now();
        let today = now.date_naive();
        if now.hour() != hour || self.last_exercise == Some(today) {
            return;
        }
        info!("Exercising zone valves");
        self.parts.buffer_feed_valve.open();
        self.parts.hw_valve.open();
        wait_interruptible(Duration::from_secs(secs), &self.running, &self.parts.ctx);
        self.parts.buffer_feed_valve.close();
        self.parts.hw_valve.close();
        self.last_exercise = Some(today);
    }
}

/// Chunked wait that returns early when the daemon stops or a shutdown
/// reason is raised, so a long valve exercise cannot delay either.
fn wait_interruptible(total: Duration, running: &AtomicBool, ctx: &Context) {
    let step = Duration::from_millis(100);
    let mut remaining = total;
    while remaining > Duration::ZERO
        && running.load(Ordering::SeqCst)
        && !ctx.shutdown.is_set()
    {
        let chunk = remaining.min(step);
        std::thread::sleep(chunk);
        remaining = remaining.saturating_sub(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::ShutdownReason;
    use std::time::Instant;

    fn all_demand() -> Demand {
        Demand {
            hw: true,
            living: true,
            upstairs: true,
            living_floor: true,
            upstairs_floor: true,
        }
    }

    #[test]
    fn hot_water_preempts_everything() {
        assert_eq!(
            determine_power_needed(ConfiguredMode::HeatHw, &all_demand()),
            Power::Hw
        );
    }

    #[test]
    fn heat_mode_masks_hot_water() {
        assert_eq!(
            determine_power_needed(ConfiguredMode::Heat, &all_demand()),
            Power::RadFloor
        );
        let demand = Demand {
            hw: true,
            ..Demand::default()
        };
        assert_eq!(
            determine_power_needed(ConfiguredMode::Heat, &demand),
            Power::NoNeed
        );
    }

    #[test]
    fn off_mode_masks_all_demand() {
        assert_eq!(
            determine_power_needed(ConfiguredMode::Off, &all_demand()),
            Power::NoNeed
        );
    }

    #[test]
    fn power_classes_from_single_demands() {
        let base = Demand::default();
        assert_eq!(
            determine_power_needed(ConfiguredMode::HeatHw, &base),
            Power::NoNeed
        );
        assert_eq!(
            determine_power_needed(
                ConfiguredMode::HeatHw,
                &Demand {
                    living: true,
                    ..base
                }
            ),
            Power::Rad
        );
        assert_eq!(
            determine_power_needed(
                ConfiguredMode::HeatHw,
                &Demand {
                    upstairs_floor: true,
                    ..base
                }
            ),
            Power::Floor
        );
        assert_eq!(
            determine_power_needed(
                ConfiguredMode::HeatHw,
                &Demand {
                    upstairs: true,
                    living_floor: true,
                    ..base
                }
            ),
            Power::RadFloor
        );
    }

    #[test]
    fn exercise_wait_returns_when_the_daemon_stops() {
        let ctx = Context::new(Config::default());
        let running = AtomicBool::new(false);
        let start = Instant::now();
        wait_interruptible(Duration::from_secs(30), &running, &ctx);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn exercise_wait_returns_on_a_shutdown_reason() {
        let ctx = Context::new(Config::default());
        ctx.shutdown.raise(ShutdownReason::UserRequested);
        let running = AtomicBool::new(true);
        let start = Instant::now();
        wait_interruptible(Duration::from_secs(30), &running, &ctx);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn targets_follow_the_curves() {
        let heating = Polycurve::new(vec![(-15.0, 75.0), (15.0, 45.0)]).unwrap();
        let floor = Polycurve::new(vec![(-15.0, 38.0), (15.0, 26.0)]).unwrap();

        let t = determine_targets(Power::Rad, 0.0, &heating, &floor, 62.0);
        assert_eq!(t.boiler, 60.0);
        assert_eq!(t.mixer, None);

        let t = determine_targets(Power::RadFloor, 0.0, &heating, &floor, 62.0);
        assert_eq!(t.boiler, 60.0);
        assert_eq!(t.mixer, Some(32.0));

        let t = determine_targets(Power::Hw, 0.0, &heating, &floor, 62.0);
        assert_eq!(t.boiler, 62.0);
        assert_eq!(t.mixer, None);
    }
}
