// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Water temperature wiper actuator.
//!
//! The boiler exposes its setpoint as a potentiometer wiper position; the
//! mapping from desired °C to raw wiper code is a calibration curve measured
//! per installation, plus a constant shift for the domestic hot water
//! variant. Writes are suppressed while the computed code is unchanged.

use std::sync::{Arc, Mutex};

use log::{debug, info};

use super::checker::ConsistencyCheck;
use super::{escalate_comm_failure, write_register, DeviceInfo};
use crate::buscomm::{BusError, Buscomm};
use crate::context::Context;
use crate::control::Polycurve;

struct WiperState {
    target: f64,
    /// Raw code last written, `None` before the first write.
    code: Option<u8>,
}

pub struct WaterTemp {
    bus: Arc<Buscomm>,
    ctx: Arc<Context>,
    info: DeviceInfo,
    curve: Polycurve,
    shift: f64,
    state: Mutex<WiperState>,
}

impl WaterTemp {
    pub fn new(
        bus: Arc<Buscomm>,
        ctx: Arc<Context>,
        info: DeviceInfo,
        curve: Polycurve,
        shift: f64,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            ctx,
            info,
            curve,
            shift,
            state: Mutex::new(WiperState {
                target: 0.0,
                code: None,
            }),
        })
    }

    /// Command the boiler setpoint. Returns `true` when a write was actually
    /// performed; an unchanged wiper code is a no-op.
    pub fn set_water_temp(&self, target: f64) -> bool {
        let code = self.curve.value(target + self.shift).round().clamp(0.0, 255.0) as u8;

        let mut state = self.state.lock().unwrap();
        state.target = target;
        if state.code == Some(code) {
            debug!(
                "Wiper '{}' target {:.1} maps to unchanged code {}",
                self.info.name, target, code
            );
            return false;
        }
        match write_register(&self.bus, &self.info, code) {
            Ok(_) => {
                info!(
                    "Wiper '{}' set to {:.1} °C (code {})",
                    self.info.name, target, code
                );
                state.code = Some(code);
                true
            }
            Err(err) => {
                escalate_comm_failure(&self.ctx, &self.info, &err);
                false
            }
        }
    }

    /// Last commanded setpoint in °C.
    pub fn target(&self) -> f64 {
        self.state.lock().unwrap().target
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }
}

impl ConsistencyCheck for WaterTemp {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn expected_raw(&self) -> Option<u8> {
        self.state.lock().unwrap().code
    }

    fn reassert(&self) -> Result<(), BusError> {
        let state = self.state.lock().unwrap();
        if let Some(code) = state.code {
            write_register(&self.bus, &self.info, code)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testutil::{scripted_bus, test_context};

    fn calibration() -> Polycurve {
        // 20 °C -> code 40, 80 °C -> code 220, linear in between.
        Polycurve::new(vec![(20.0, 40.0), (80.0, 220.0)]).unwrap()
    }

    #[test]
    fn writes_curve_mapped_code_once() {
        let (bus, slave) = scripted_bus();
        let wiper = WaterTemp::new(
            bus.clone(),
            test_context(),
            DeviceInfo::new("heat_wiper", "boiler room", 11, 6),
            calibration(),
            0.0,
        );

        assert!(wiper.set_water_temp(50.0)); // midpoint -> code 130
        assert!(!wiper.set_water_temp(50.0)); // unchanged, no write
        assert_eq!(slave.lock().unwrap().writes, vec![(11, 6, 130)]);

        assert!(wiper.set_water_temp(80.0));
        assert_eq!(slave.lock().unwrap().writes.len(), 2);
        assert_eq!(wiper.expected_raw(), Some(220));
        bus.stop();
    }

    #[test]
    fn shift_moves_the_lookup_point() {
        let (bus, slave) = scripted_bus();
        let wiper = WaterTemp::new(
            bus.clone(),
            test_context(),
            DeviceInfo::new("hw_wiper", "boiler room", 11, 7),
            calibration(),
            10.0,
        );
        // 40 + 10 shift looks up the curve at 50 °C.
        assert!(wiper.set_water_temp(40.0));
        assert_eq!(slave.lock().unwrap().writes, vec![(11, 7, 130)]);
        assert_eq!(wiper.target(), 40.0);
        bus.stop();
    }

    #[test]
    fn out_of_curve_targets_are_clamped() {
        let (bus, slave) = scripted_bus();
        let wiper = WaterTemp::new(
            bus.clone(),
            test_context(),
            DeviceInfo::new("heat_wiper", "boiler room", 11, 6),
            calibration(),
            0.0,
        );
        assert!(wiper.set_water_temp(150.0));
        assert_eq!(slave.lock().unwrap().writes, vec![(11, 6, 220)]);
        bus.stop();
    }
}
