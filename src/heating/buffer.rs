// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Buffer tank and heat source supervision.
//!
//! Owns the plumbing around the heat source: the hydraulic shift pump, the
//! buffer feed and hot water valves, the boiler setpoint. The decision logic
//! lives in the pure [`buffer_sm`](super::buffer_sm) transition table; this
//! module is its executor and also watches the buffer temperature to decide
//! when the tank can serve the load with the burner off.
//!
//! All transitions run under one lock, including the circulation settle
//! waits, so no observer ever sees a half-performed valve sequence.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::buffer_sm::{transition, BufferCommand, BufferEvent, BufferState};
use crate::context::{Context, ShutdownReason};
use crate::control::TimerSec;
use crate::device::{MagneticValve, Switch, TempSensor, WaterTemp};
use crate::heatpump::HeatPump;

/// What the heat is made with.
pub enum HeatSource {
    /// Gas burner: an enable relay plus one setpoint wiper per regime,
    /// space heating and hot water.
    Burner {
        relay: Arc<Switch>,
        wiper: Arc<WaterTemp>,
        hw_wiper: Arc<WaterTemp>,
    },
    /// Modbus heat pump.
    Pump(Arc<HeatPump>),
}

impl HeatSource {
    fn set_running(&self, ctx: &Context, on: bool) {
        match self {
            HeatSource::Burner { relay, .. } => {
                if on {
                    relay.on();
                } else {
                    relay.off();
                }
            }
            HeatSource::Pump(hp) => {
                if let Err(err) = hp.set_heating(on) {
                    error!("Heat pump mode change failed: {:#}", err);
                    ctx.shutdown
                        .raise(ShutdownReason::CommFailure(format!("heat pump: {}", err)));
                }
            }
        }
    }

    fn set_target(&self, ctx: &Context, temp: f64) {
        match self {
            HeatSource::Burner { wiper, .. } => {
                wiper.set_water_temp(temp);
            }
            HeatSource::Pump(hp) => self.pump_target(ctx, hp, temp),
        }
    }

    /// Hot water runs go through their own wiper with its own calibration;
    /// the heat pump has a single setpoint register for both regimes.
    fn set_hw_target(&self, ctx: &Context, temp: f64) {
        match self {
            HeatSource::Burner { hw_wiper, .. } => {
                hw_wiper.set_water_temp(temp);
            }
            HeatSource::Pump(hp) => self.pump_target(ctx, hp, temp),
        }
    }

    fn pump_target(&self, ctx: &Context, hp: &HeatPump, temp: f64) {
        if let Err(err) = hp.set_target(temp) {
            error!("Heat pump setpoint write failed: {:#}", err);
            ctx.shutdown
                .raise(ShutdownReason::CommFailure(format!("heat pump: {}", err)));
        }
    }
}

/// What the controller currently wants from the heat source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    Off,
    Heat,
    Hw,
}

/// Timing and thresholds, from `control.buffer` in the configuration.
#[derive(Debug, Clone)]
pub struct BufferSettings {
    pub overshoot: f64,
    pub undershoot: f64,
    pub relax: Duration,
    pub circulate: Duration,
}

struct CtrlState {
    state: BufferState,
    mode: BufferMode,
    /// Boiler setpoint for space heating, °C.
    target: f64,
    /// Boiler setpoint while reheating the hot water tank, °C.
    hw_target: f64,
    relax: TimerSec,
    /// Rate limiter for the recurring status line.
    status_log: TimerSec,
}

/// Spacing of the recurring status log line.
const STATUS_LOG_PERIOD: Duration = Duration::from_secs(60);

pub struct BufferHeat {
    ctx: Arc<Context>,
    source: HeatSource,
    hydr_shift_pump: Arc<Switch>,
    buffer_feed_valve: Arc<MagneticValve>,
    hw_valve: Arc<MagneticValve>,
    upper_buffer: Arc<TempSensor>,
    settings: BufferSettings,
    ctrl: Mutex<CtrlState>,
}

impl BufferHeat {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: Arc<Context>,
        source: HeatSource,
        hydr_shift_pump: Arc<Switch>,
        buffer_feed_valve: Arc<MagneticValve>,
        hw_valve: Arc<MagneticValve>,
        upper_buffer: Arc<TempSensor>,
        settings: BufferSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            source,
            hydr_shift_pump,
            buffer_feed_valve,
            hw_valve,
            upper_buffer,
            settings,
            ctrl: Mutex::new(CtrlState {
                state: BufferState::Unstarted,
                mode: BufferMode::Off,
                target: 0.0,
                hw_target: 0.0,
                relax: TimerSec::new(Duration::ZERO),
                status_log: TimerSec::new(STATUS_LOG_PERIOD),
            }),
        })
    }

    /// Drive all outputs to known-off. Must run once before any mode change.
    pub fn init(&self) {
        let mut ctrl = self.ctrl.lock().unwrap();
        ctrl.relax.set_duration(self.settings.relax);
        self.fire(&mut ctrl, BufferEvent::Init);
    }

    /// Change what the heat source is for. Chained transitions (for example
    /// leaving hot water before direct heating can start) run back to back.
    pub fn set_mode(&self, mode: BufferMode) {
        let mut ctrl = self.ctrl.lock().unwrap();
        if ctrl.mode == mode {
            return;
        }
        info!("Heat source mode {:?} -> {:?}", ctrl.mode, mode);
        ctrl.mode = mode;
        match mode {
            BufferMode::Off => {
                self.fire(&mut ctrl, BufferEvent::TurnOff);
            }
            BufferMode::Heat => {
                if ctrl.state == BufferState::Hw {
                    self.fire(&mut ctrl, BufferEvent::TurnOff);
                }
                let event = if self.buffer_can_serve(&ctrl) {
                    BufferEvent::UseBuffer
                } else {
                    BufferEvent::Direct
                };
                self.fire(&mut ctrl, event);
            }
            BufferMode::Hw => {
                self.fire(&mut ctrl, BufferEvent::HotWater);
            }
        }
    }

    /// Space heating boiler setpoint; applied on the next steady tick.
    pub fn set_target(&self, target: f64) {
        self.ctrl.lock().unwrap().target = target;
    }

    /// Boiler setpoint while serving the hot water tank.
    pub fn set_hw_target(&self, target: f64) {
        self.ctrl.lock().unwrap().hw_target = target;
    }

    pub fn state(&self) -> BufferState {
        self.ctrl.lock().unwrap().state
    }

    /// Periodic supervision: switch between direct and buffer-served heating
    /// and keep the setpoint fresh. The relax timer spaces state changes so
    /// the plumbing settles between them.
    pub fn tick(&self) {
        if self.ctx.shutdown.is_set() {
            return;
        }
        let mut ctrl = self.ctrl.lock().unwrap();

        // Every tick would repeat this otherwise; the log timer spaces it.
        if ctrl.status_log.expired() {
            info!(
                "Buffer {:?}, mode {:?}, target {:.1} °C, buffer top {:.1} °C",
                ctrl.state,
                ctrl.mode,
                ctrl.target,
                self.upper_buffer.temp()
            );
            ctrl.status_log.reset();
        }

        if ctrl.mode == BufferMode::Heat && ctrl.relax.expired() {
            match ctrl.state {
                BufferState::Normal if self.buffer_can_serve(&ctrl) => {
                    info!("Buffer hot enough, serving the load from the tank");
                    self.fire(&mut ctrl, BufferEvent::UseBuffer);
                    return;
                }
                BufferState::FromBuffer if self.buffer_exhausted(&ctrl) => {
                    info!("Buffer exhausted, back to direct heating");
                    self.fire(&mut ctrl, BufferEvent::Direct);
                    return;
                }
                _ => {}
            }
        }

        // Steady state: the weather compensated target moves continuously,
        // push it through (the wiper suppresses unchanged codes).
        match ctrl.state {
            BufferState::Normal => self.source.set_target(&self.ctx, ctrl.target),
            BufferState::Hw => self.source.set_hw_target(&self.ctx, ctrl.hw_target),
            _ => {}
        }
    }

    fn buffer_can_serve(&self, ctrl: &CtrlState) -> bool {
        self.upper_buffer.temp() > ctrl.target + self.settings.overshoot
    }

    fn buffer_exhausted(&self, ctrl: &CtrlState) -> bool {
        self.upper_buffer.temp() < ctrl.target - self.settings.undershoot
    }

    /// Run one transition and its command list. The ctrl lock stays held
    /// through the circulation waits on purpose.
    fn fire(&self, ctrl: &mut CtrlState, event: BufferEvent) {
        match transition(ctrl.state, event) {
            Some((next, commands)) => {
                info!(
                    "Buffer plumbing {:?} --{:?}--> {:?}",
                    ctrl.state, event, next
                );
                for command in &commands {
                    self.execute(ctrl, *command);
                }
                ctrl.state = next;
                ctrl.relax.reset();
            }
            None => {
                warn!(
                    "Buffer event {:?} ignored in state {:?}",
                    event, ctrl.state
                );
            }
        }
    }

    fn execute(&self, ctrl: &CtrlState, command: BufferCommand) {
        debug!("Buffer command {:?}", command);
        match command {
            BufferCommand::SetHeater(on) => self.source.set_running(&self.ctx, on),
            BufferCommand::SetHydrShiftPump(on) => {
                if on {
                    self.hydr_shift_pump.on();
                } else {
                    self.hydr_shift_pump.off();
                }
            }
            BufferCommand::OpenBufferFeedValve => {
                self.buffer_feed_valve.open();
            }
            BufferCommand::DelayedCloseBufferFeedValve => {
                self.buffer_feed_valve.delayed_close();
            }
            BufferCommand::OpenHwValve => {
                self.hw_valve.open();
            }
            BufferCommand::DelayedCloseHwValve => {
                self.hw_valve.delayed_close();
            }
            BufferCommand::ApplyHeatTarget => self.source.set_target(&self.ctx, ctrl.target),
            BufferCommand::ApplyHwTarget => self.source.set_hw_target(&self.ctx, ctrl.hw_target),
            BufferCommand::ResetHwTarget => self.source.set_target(&self.ctx, ctrl.target),
            BufferCommand::Circulate => self.circulate(),
        }
    }

    /// Settle wait, cut short when a shutdown was raised meanwhile.
    fn circulate(&self) {
        let step = Duration::from_millis(200);
        let mut remaining = self.settings.circulate;
        while remaining > Duration::ZERO && !self.ctx.shutdown.is_set() {
            let chunk = remaining.min(step);
            thread::sleep(chunk);
            remaining -= chunk;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buscomm::Buscomm;
    use crate::device::testutil::{scripted_bus, test_context};
    use crate::device::DeviceInfo;
    use crate::control::Polycurve;
    use std::sync::Mutex as StdMutex;

    fn build(
        bus: &Arc<Buscomm>,
        ctx: &Arc<Context>,
        settings: BufferSettings,
    ) -> Arc<BufferHeat> {
        let relay = Switch::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new("heater_relay", "boiler room", 11, 0),
        );
        let wiper = WaterTemp::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new("heat_wiper", "boiler room", 11, 6),
            Polycurve::new(vec![(0.0, 0.0), (100.0, 250.0)]).unwrap(),
            0.0,
        );
        let hw_wiper = WaterTemp::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new("hw_wiper", "boiler room", 11, 7),
            Polycurve::new(vec![(0.0, 0.0), (100.0, 250.0)]).unwrap(),
            0.0,
        );
        let upper_buffer = TempSensor::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new("upper_buffer", "buffer tank", 24, 3),
            Duration::ZERO,
            1000.0,
        );
        BufferHeat::new(
            ctx.clone(),
            HeatSource::Burner {
                relay,
                wiper,
                hw_wiper,
            },
            Switch::new(
                bus.clone(),
                ctx.clone(),
                DeviceInfo::new("hydr_shift_pump", "boiler room", 11, 1),
            ),
            MagneticValve::new(
                bus.clone(),
                ctx.clone(),
                DeviceInfo::new("buffer_feed_valve", "buffer tank", 11, 5),
                Duration::from_millis(5),
            ),
            MagneticValve::new(
                bus.clone(),
                ctx.clone(),
                DeviceInfo::new("hw_valve", "boiler room", 11, 4),
                Duration::from_millis(5),
            ),
            upper_buffer,
            settings,
        )
    }

    fn fast_settings() -> BufferSettings {
        BufferSettings {
            overshoot: 4.0,
            undershoot: 2.0,
            relax: Duration::ZERO,
            circulate: Duration::ZERO,
        }
    }

    fn set_buffer_temp(slave: &Arc<StdMutex<crate::device::testutil::FakeSlaveState>>, temp: f64) {
        let raw = (temp * 16.0) as u8;
        slave.lock().unwrap().registers.insert((24, 3), raw);
    }

    #[test]
    fn heat_mode_runs_the_burner_directly() {
        let (bus, slave) = scripted_bus();
        let ctx = test_context();
        let buffer = build(&bus, &ctx, fast_settings());
        buffer.init();
        buffer.set_target(5.0);

        buffer.set_mode(BufferMode::Heat);
        assert_eq!(buffer.state(), BufferState::Normal);
        let st = slave.lock().unwrap();
        // Relay on, shift pump on, wiper set.
        assert_eq!(st.registers.get(&(11, 0)), Some(&1));
        assert_eq!(st.registers.get(&(11, 1)), Some(&1));
        assert!(st.registers.contains_key(&(11, 6)));
        drop(st);
        bus.stop();
    }

    #[test]
    fn hot_buffer_takes_over_and_exhausts() {
        let (bus, slave) = scripted_bus();
        let ctx = test_context();
        let buffer = build(&bus, &ctx, fast_settings());
        buffer.init();
        buffer.set_target(5.0);
        buffer.set_mode(BufferMode::Heat);
        assert_eq!(buffer.state(), BufferState::Normal);

        // 12 °C buffer against a 5 °C target with 4 °C overshoot.
        set_buffer_temp(&slave, 12.0);
        buffer.tick();
        assert_eq!(buffer.state(), BufferState::FromBuffer);
        // Burner off, feed valve open.
        assert_eq!(slave.lock().unwrap().registers.get(&(11, 0)), Some(&0));
        assert_eq!(slave.lock().unwrap().registers.get(&(11, 5)), Some(&1));

        // Below target - undershoot the burner resumes.
        set_buffer_temp(&slave, 2.0);
        buffer.tick();
        assert_eq!(buffer.state(), BufferState::Normal);
        assert_eq!(slave.lock().unwrap().registers.get(&(11, 0)), Some(&1));
        bus.stop();
    }

    #[test]
    fn hw_run_uses_the_hw_wiper() {
        let (bus, slave) = scripted_bus();
        let ctx = test_context();
        let buffer = build(&bus, &ctx, fast_settings());
        buffer.init();
        buffer.set_target(5.0);
        buffer.set_hw_target(9.0);

        buffer.set_mode(BufferMode::Hw);
        assert_eq!(buffer.state(), BufferState::Hw);
        let st = slave.lock().unwrap();
        // The hot water setpoint lands on the HW wiper; the heating wiper
        // has not been touched yet.
        assert!(st.registers.contains_key(&(11, 7)));
        assert!(!st.registers.contains_key(&(11, 6)));
        drop(st);

        // Leaving Hw resets the heating wiper to the space heating target.
        buffer.set_mode(BufferMode::Off);
        assert!(slave.lock().unwrap().registers.contains_key(&(11, 6)));
        bus.stop();
    }

    #[test]
    fn hw_mode_is_not_left_by_buffer_logic() {
        let (bus, slave) = scripted_bus();
        let ctx = test_context();
        let buffer = build(&bus, &ctx, fast_settings());
        buffer.init();
        buffer.set_target(5.0);
        buffer.set_hw_target(9.0);
        buffer.set_mode(BufferMode::Hw);
        assert_eq!(buffer.state(), BufferState::Hw);
        assert_eq!(slave.lock().unwrap().registers.get(&(11, 4)), Some(&1));

        // A scorching buffer must not preempt a hot water run.
        set_buffer_temp(&slave, 15.0);
        buffer.tick();
        assert_eq!(buffer.state(), BufferState::Hw);

        buffer.set_mode(BufferMode::Off);
        assert_eq!(buffer.state(), BufferState::Off);
        assert_eq!(slave.lock().unwrap().registers.get(&(11, 0)), Some(&0));
        bus.stop();
    }

    #[test]
    fn relax_spaces_state_changes() {
        let (bus, slave) = scripted_bus();
        let ctx = test_context();
        let mut settings = fast_settings();
        settings.relax = Duration::from_secs(600);
        let buffer = build(&bus, &ctx, settings);
        buffer.init();
        buffer.set_target(5.0);
        buffer.set_mode(BufferMode::Heat);

        set_buffer_temp(&slave, 12.0);
        buffer.tick();
        // Hot buffer, but the relax dwell since the last change blocks it.
        assert_eq!(buffer.state(), BufferState::Normal);
        bus.stop();
    }
}
