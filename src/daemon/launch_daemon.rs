// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Service wiring and lifecycle.
//!
//! [`Daemon::launch`] builds every driver from the configuration, wires the
//! control core together and spawns one thread per service. The wiring is
//! deliberately all in one place so the dependency shape of the whole
//! controller is readable top to bottom.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};

use crate::buscomm::bus::sleep_responsive;
use crate::buscomm::Buscomm;
use crate::config::{Config, SensorEntry};
use crate::context::Context;
use crate::control::{
    AsymmetricThermostat, MixerControl, MixerTuning, PwmRegistry, SymmetricThermostat,
};
use crate::device::{
    DeviceChecker, DeviceInfo, MagneticValve, PulseSwitch, Switch, TempSensor, WaterTemp,
};
use crate::heating::{
    BufferHeat, BufferSettings, BufferState, ControllerParts, HeatSource, HeatingController,
};
use crate::heatpump::HeatPump;

/// Coordinates the controller's background threads.
///
/// The `running` flag is shared with every thread; `shutdown` clears it and
/// `join` waits for all of them before stopping the bus reader.
pub struct Daemon {
    threads: Vec<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    bus: Option<Arc<Buscomm>>,
    mixer: Option<Arc<MixerControl>>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    pub fn new() -> Self {
        Daemon {
            threads: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            bus: None,
            mixer: None,
        }
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Build all drivers and start every service thread.
    pub fn launch(&mut self, ctx: Arc<Context>) -> Result<()> {
        let config = ctx.config();

        let bus = Buscomm::open(&config.bus)?;
        self.bus = Some(bus.clone());

        self.start_keepalive(&ctx, &bus, &config);
        let checker = DeviceChecker::new(
            bus.clone(),
            ctx.clone(),
            Duration::from_secs(config.bus.checker_period_secs),
            Duration::from_millis(config.bus.checker_backoff_millis),
        );

        // Device layer.
        let sensor = |entry: &SensorEntry| {
            TempSensor::new(
                bus.clone(),
                ctx.clone(),
                device_info(entry),
                Duration::from_secs(entry.min_interval_secs),
                entry.max_jump,
            )
        };
        let switch = |entry: &crate::config::DeviceEntry| {
            Switch::new(
                bus.clone(),
                ctx.clone(),
                DeviceInfo::new(
                    &entry.name,
                    &entry.location,
                    entry.slave_address,
                    entry.register_address,
                ),
            )
        };

        let sensors = &config.devices.sensors;
        let external = sensor(&sensors.external);
        let living_sensor = sensor(&sensors.living);
        let upstairs_sensor = sensor(&sensors.upstairs);
        let living_floor_sensor = sensor(&sensors.living_floor);
        let upstairs_floor_sensor = sensor(&sensors.upstairs_floor);
        let hw_tank = sensor(&sensors.hw_tank);
        let forward = sensor(&sensors.forward);
        let return_line = sensor(&sensors.return_);
        let upper_buffer = sensor(&sensors.upper_buffer);
        let mixer_forward = sensor(&sensors.mixer_forward);

        let switches = &config.devices.switches;
        let heater_relay = switch(&switches.heater_relay);
        let hydr_shift_pump = switch(&switches.hydr_shift_pump);
        let radiator_pump = switch(&switches.radiator_pump);
        let floor_pump = switch(&switches.floor_pump);

        let valves = &config.devices.valves;
        let buffer_feed_valve = MagneticValve::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new(
                &valves.buffer_feed.device.name,
                &valves.buffer_feed.device.location,
                valves.buffer_feed.device.slave_address,
                valves.buffer_feed.device.register_address,
            ),
            Duration::from_secs(valves.buffer_feed.close_delay_secs),
        );
        let hw_valve = MagneticValve::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new(
                &valves.hw.device.name,
                &valves.hw.device.location,
                valves.hw.device.slave_address,
                valves.hw.device.register_address,
            ),
            Duration::from_secs(valves.hw.close_delay_secs),
        );

        let wipers = &config.devices.wipers;
        let heat_wiper = WaterTemp::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new(
                &wipers.heat.device.name,
                &wipers.heat.device.location,
                wipers.heat.device.slave_address,
                wipers.heat.device.register_address,
            ),
            crate::config::curve(&wipers.heat.curve)?,
            wipers.heat.shift,
        );
        let hw_wiper = WaterTemp::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new(
                &wipers.hw.device.name,
                &wipers.hw.device.location,
                wipers.hw.device.slave_address,
                wipers.hw.device.register_address,
            ),
            crate::config::curve(&wipers.hw.curve)?,
            wipers.hw.shift,
        );

        let pulses = &config.devices.pulses;
        let mixer_open = PulseSwitch::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new(
                &pulses.mixer_open.name,
                &pulses.mixer_open.location,
                pulses.mixer_open.slave_address,
                pulses.mixer_open.register_address,
            ),
        );
        let mixer_close = PulseSwitch::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new(
                &pulses.mixer_close.name,
                &pulses.mixer_close.location,
                pulses.mixer_close.slave_address,
                pulses.mixer_close.register_address,
            ),
        );

        checker.register(heater_relay.clone());
        checker.register(hydr_shift_pump.clone());
        checker.register(radiator_pump.clone());
        checker.register(floor_pump.clone());
        checker.register(buffer_feed_valve.clone());
        checker.register(hw_valve.clone());
        checker.register(heat_wiper.clone());
        checker.register(hw_wiper.clone());
        self.threads.push(checker.spawn(self.running.clone()));

        // Heat source: burner by default, Modbus heat pump when configured.
        let source = if config.heatpump.enabled {
            info!("Heat source: heat pump on {}", config.heatpump.port);
            HeatSource::Pump(HeatPump::new(config.heatpump.clone()))
        } else {
            info!("Heat source: burner relay '{}'", heater_relay.name());
            HeatSource::Burner {
                relay: heater_relay,
                wiper: heat_wiper,
                hw_wiper,
            }
        };

        let buffer = BufferHeat::new(
            ctx.clone(),
            source,
            hydr_shift_pump,
            buffer_feed_valve.clone(),
            hw_valve.clone(),
            upper_buffer,
            BufferSettings {
                overshoot: config.control.buffer.overshoot,
                undershoot: config.control.buffer.undershoot,
                relax: Duration::from_secs(config.control.buffer.relax_secs),
                circulate: Duration::from_secs(config.control.buffer.circulate_secs),
            },
        );

        // Mixer PI loop over its own forward sensor.
        let mixer_cfg = &config.control.mixer;
        let mixer = Arc::new(MixerControl::new(
            mixer_open,
            mixer_close,
            mixer_forward,
            MixerTuning {
                kp: mixer_cfg.kp,
                ki: mixer_cfg.ki,
                dead_zone: mixer_cfg.dead_zone,
                integral_limit: mixer_cfg.integral_limit,
                min_pulse: Duration::from_millis(mixer_cfg.min_pulse_millis),
                max_pulse: Duration::from_secs(mixer_cfg.max_pulse_secs),
                unidirectional_limit: Duration::from_secs(mixer_cfg.unidirectional_limit_secs),
                sample_interval: Duration::from_secs(mixer_cfg.sample_interval_secs),
                control_interval: Duration::from_secs(mixer_cfg.control_interval_secs),
                filter_size: mixer_cfg.filter_size,
            },
        ));
        mixer.start_control();
        self.mixer = Some(mixer.clone());

        // Floor circuits: one PWM cohort whose cycle clock freezes while the
        // heat goes into the hot water tank.
        let buffer_for_busy = buffer.clone();
        let pwm = PwmRegistry::new(
            config.control.pwm.timebase_secs,
            config.control.pwm.relax_secs,
            Box::new(move || buffer_for_busy.state() == BufferState::Hw),
        );
        // Linear duty: full on two degrees below target, off at target.
        let duty = || Box::new(|value: f64, target: f64| (target - value) / 2.0);
        let living_floor = pwm.register("living_floor", duty());
        let upstairs_floor = pwm.register("upstairs_floor", duty());
        self.start_pwm_clock(pwm);

        let control = &config.control;
        let controller = HeatingController::new(ControllerParts {
            ctx: ctx.clone(),
            buffer: buffer.clone(),
            mixer,
            radiator_pump,
            floor_pump,
            buffer_feed_valve,
            hw_valve,
            external,
            forward,
            return_line,
            living_floor_sensor,
            upstairs_floor_sensor,
            living: SymmetricThermostat::new(
                living_sensor,
                control.living.threshold,
                control.living.hysteresis,
                control.living.filter_size,
            ),
            upstairs: SymmetricThermostat::new(
                upstairs_sensor,
                control.upstairs.threshold,
                control.upstairs.hysteresis,
                control.upstairs.filter_size,
            ),
            hw: AsymmetricThermostat::new(
                hw_tank,
                control.hw.threshold,
                control.hw.up_hysteresis,
                control.hw.down_hysteresis,
                control.hw.filter_size,
            ),
            living_floor,
            upstairs_floor,
            heating_curve: crate::config::curve(&control.heating_curve)?,
            floor_curve: crate::config::curve(&control.floor_curve)?,
        });
        self.start_buffer_tick(buffer);
        self.start_controller(controller);
        self.start_heartbeat(&ctx, &bus);

        Ok(())
    }

    fn start_keepalive(&mut self, ctx: &Arc<Context>, bus: &Arc<Buscomm>, config: &Config) {
        info!("Starting bus keepalive");
        self.threads.push(bus.spawn_keepalive(
            ctx.clone(),
            self.running.clone(),
            Duration::from_secs(config.bus.keepalive_secs),
            Duration::from_secs(config.bus.keepalive_idle_secs),
        ));
    }

    /// The PWM cohort measures duty in seconds; tick it once per second.
    fn start_pwm_clock(&mut self, pwm: Arc<PwmRegistry>) {
        let running = self.running.clone();
        self.threads.push(
            thread::Builder::new()
                .name("pwm-clock".into())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        pwm.tick();
                        thread::sleep(Duration::from_secs(1));
                    }
                })
                .expect("failed to spawn pwm clock thread"),
        );
    }

    fn start_buffer_tick(&mut self, buffer: Arc<BufferHeat>) {
        let running = self.running.clone();
        self.threads.push(
            thread::Builder::new()
                .name("buffer-tick".into())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        buffer.tick();
                        sleep_responsive(Duration::from_secs(5), &running);
                    }
                })
                .expect("failed to spawn buffer tick thread"),
        );
    }

    fn start_controller(&mut self, mut controller: HeatingController) {
        let running = self.running.clone();
        self.threads.push(
            thread::Builder::new()
                .name("heating-controller".into())
                .spawn(move || controller.run(running))
                .expect("failed to spawn controller thread"),
        );
    }

    /// Periodic liveness log with the bus exchange counters.
    fn start_heartbeat(&mut self, ctx: &Arc<Context>, bus: &Arc<Buscomm>) {
        info!("Starting heartbeat monitor");
        let running = self.running.clone();
        let bus = bus.clone();
        let ctx = ctx.clone();
        self.threads.push(
            thread::Builder::new()
                .name("heartbeat".into())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        sleep_responsive(Duration::from_secs(60), &running);
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        let stats = bus.stats();
                        info!(
                            "Heartbeat: {} exchanges, {} retries, {} failures{}",
                            stats.exchanges,
                            stats.retries,
                            stats.failures,
                            match ctx.shutdown.get() {
                                Some(reason) => format!(", shutting down ({})", reason),
                                None => String::new(),
                            }
                        );
                    }
                })
                .expect("failed to spawn heartbeat thread"),
        );
    }

    /// Signal all threads to stop. Does not wait; call [`join`](Self::join).
    pub fn shutdown(&self) {
        info!("Daemon shutdown requested");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for every service thread, then stop the mixer and the bus reader.
    pub fn join(&mut self) {
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
            match handle.join() {
                Ok(()) => info!("Thread '{}' finished", name),
                Err(_) => error!("Thread '{}' panicked", name),
            }
        }
        if let Some(mixer) = self.mixer.take() {
            mixer.stop_control();
        }
        if let Some(bus) = self.bus.take() {
            bus.stop();
        }
        warn!("All daemon services stopped");
    }
}

fn device_info(entry: &SensorEntry) -> DeviceInfo {
    DeviceInfo::new(
        &entry.device.name,
        &entry.device.location,
        entry.device.slave_address,
        entry.device.register_address,
    )
}
