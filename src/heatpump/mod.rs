// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Modbus RTU heat pump client.
//!
//! The heat pump speaks standard Modbus on its own serial line, unrelated to
//! the field bus. The connection is opened lazily on first use and dropped
//! on any error so the next call reconnects; writes are suppressed while the
//! commanded value is unchanged, reads of the measurement registers are
//! cached behind the configured poll interval.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context as AnyhowContext, Result};
use log::{debug, info};
use tokio_modbus::client::sync::{self, Context as ModbusContext, Reader, Writer};
use tokio_modbus::Slave;

use crate::config::HeatPumpConfig;

/// Input registers exposed as engineering values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurement {
    /// Outgoing water temperature, °C.
    Outgoing,
    /// Return water temperature, °C.
    Return,
    /// Compressor frequency, Hz.
    Frequency,
    /// Electrical power draw, W.
    Power,
}

struct PumpState {
    conn: Option<ModbusContext>,
    /// Last written mode/target, for write suppression.
    mode: Option<u16>,
    target_raw: Option<u16>,
    cache: HashMap<Measurement, (Instant, f64)>,
}

pub struct HeatPump {
    config: HeatPumpConfig,
    state: Mutex<PumpState>,
}

impl HeatPump {
    pub fn new(config: HeatPumpConfig) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            config,
            state: Mutex::new(PumpState {
                conn: None,
                mode: None,
                target_raw: None,
                cache: HashMap::new(),
            }),
        })
    }

    /// Start or stop heat production. The pump's own controller handles the
    /// compressor ramp; this only flips the Modbus mode register.
    pub fn set_heating(&self, on: bool) -> Result<()> {
        let mode = if on { 1 } else { 0 };
        let mut state = self.state.lock().unwrap();
        if state.mode == Some(mode) {
            return Ok(());
        }
        self.write(&mut state, self.config.registers.mode, mode)
            .context("heat pump mode register write failed")?;
        info!("Heat pump mode set to {}", mode);
        state.mode = Some(mode);
        Ok(())
    }

    /// Set the outgoing water target. The pump accepts half-degree steps in
    /// tenths of a degree; the requested value is rounded up so the pump
    /// never undershoots the controller's demand.
    pub fn set_target(&self, temp: f64) -> Result<()> {
        let raw = ((temp * 2.0).ceil() * 5.0).clamp(0.0, u16::MAX as f64) as u16;
        let mut state = self.state.lock().unwrap();
        if state.target_raw == Some(raw) {
            return Ok(());
        }
        self.write(&mut state, self.config.registers.target, raw)
            .context("heat pump target register write failed")?;
        info!("Heat pump target set to {:.1} °C (raw {})", temp, raw);
        state.target_raw = Some(raw);
        Ok(())
    }

    /// Read one measurement, scaled to engineering units. Values younger
    /// than the poll interval come from the cache.
    pub fn read(&self, what: Measurement) -> Result<f64> {
        let mut state = self.state.lock().unwrap();
        let max_age = Duration::from_secs(self.config.poll_interval_secs);
        if let Some((at, value)) = state.cache.get(&what) {
            if at.elapsed() < max_age {
                return Ok(*value);
            }
        }

        let (register, scale) = self.register_of(what);
        let raw = self
            .read_input(&mut state, register)
            .with_context(|| format!("heat pump read of {:?} failed", what))?;
        // Temperatures are signed on the wire.
        let value = (raw as i16) as f64 * scale;
        debug!("Heat pump {:?} = {:.1} (raw {})", what, value, raw);
        state.cache.insert(what, (Instant::now(), value));
        Ok(value)
    }

    fn register_of(&self, what: Measurement) -> (u16, f64) {
        let r = &self.config.registers;
        let s = &self.config.scaling;
        match what {
            Measurement::Outgoing => (r.outgoing, s.outgoing),
            Measurement::Return => (r.return_, s.return_),
            Measurement::Frequency => (r.frequency, s.frequency),
            Measurement::Power => (r.power, s.power),
        }
    }

    /// Lazy connect. Errors drop the connection so the next call retries
    /// from scratch.
    fn connect(&self, state: &mut PumpState) -> Result<()> {
        if state.conn.is_some() {
            return Ok(());
        }
        let builder = tokio_serial::new(&self.config.port, self.config.baud_rate);
        let conn = sync::rtu::connect_slave(&builder, Slave(self.config.slave_id))
            .with_context(|| format!("failed to open heat pump port {}", self.config.port))?;
        info!(
            "Heat pump connected on {} at {} baud, slave {}",
            self.config.port, self.config.baud_rate, self.config.slave_id
        );
        state.conn = Some(conn);
        Ok(())
    }

    fn write(&self, state: &mut PumpState, register: u16, value: u16) -> Result<()> {
        self.connect(state)?;
        let conn = state.conn.as_mut().unwrap();
        let result = conn.write_single_register(register, value);
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(exception)) => {
                state.conn = None;
                Err(anyhow::anyhow!("modbus exception: {}", exception))
            }
            Err(err) => {
                state.conn = None;
                Err(err.into())
            }
        }
    }

    fn read_input(&self, state: &mut PumpState, register: u16) -> Result<u16> {
        self.connect(state)?;
        let conn = state.conn.as_mut().unwrap();
        let result = conn.read_input_registers(register, 1);
        match result {
            Ok(Ok(words)) => words
                .first()
                .copied()
                .ok_or_else(|| anyhow::anyhow!("empty modbus response")),
            Ok(Err(exception)) => {
                state.conn = None;
                Err(anyhow::anyhow!("modbus exception: {}", exception))
            }
            Err(err) => {
                state.conn = None;
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    /// Raw target register values are half-degree steps in tenths,
    /// rounded up.
    #[test]
    fn target_rounds_up_to_half_degrees() {
        let raw = |temp: f64| ((temp * 2.0).ceil() * 5.0) as u16;
        assert_eq!(raw(50.0), 500);
        assert_eq!(raw(50.1), 505); // rounds up to 50.5
        assert_eq!(raw(50.5), 505);
        assert_eq!(raw(50.6), 510);
    }
}
