// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Background device consistency checker.
//!
//! Drivers trust their cached state between commands; relay boards do brown
//! out or lose a register to noise. The checker walks the registered
//! actuators round-robin, reads the hardware register back and compares it
//! with the driver's expectation. A mismatch is repaired by rewriting the
//! expected value, with a bounded number of attempts; a device that stays
//! wrong takes the controller down rather than run the burner on unverified
//! actuator state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use super::{read_register, DeviceInfo};
use crate::buscomm::constants::CHECK_RETRY_COUNT;
use crate::buscomm::{BusError, Buscomm};
use crate::context::{Context, ShutdownReason};

/// Implemented by actuators whose register content is predictable from their
/// cached state. Sensors are not checkable: they have no expected value.
pub trait ConsistencyCheck {
    fn info(&self) -> &DeviceInfo;

    /// Raw value the hardware register should currently hold, or `None`
    /// while the driver has not yet commanded anything.
    fn expected_raw(&self) -> Option<u8>;

    /// Rewrite the expected value to the hardware.
    fn reassert(&self) -> Result<(), BusError>;
}

pub struct DeviceChecker {
    bus: Arc<Buscomm>,
    ctx: Arc<Context>,
    devices: Mutex<Vec<Arc<dyn ConsistencyCheck + Send + Sync>>>,
    /// One full round over all registered devices takes this long.
    period: Duration,
    /// Base delay between repair attempts, scaled by the attempt number.
    retry_backoff: Duration,
}

impl DeviceChecker {
    pub fn new(
        bus: Arc<Buscomm>,
        ctx: Arc<Context>,
        period: Duration,
        retry_backoff: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            ctx,
            devices: Mutex::new(Vec::new()),
            period,
            retry_backoff,
        })
    }

    pub fn register(&self, device: Arc<dyn ConsistencyCheck + Send + Sync>) {
        debug!("Checker now covering device '{}'", device.info().name);
        self.devices.lock().unwrap().push(device);
    }

    /// Spawn the checker thread. One device is verified per slot so a full
    /// round spreads evenly over `period`.
    pub fn spawn(self: &Arc<Self>, running: Arc<AtomicBool>) -> JoinHandle<()> {
        let checker = Arc::clone(self);
        thread::Builder::new()
            .name("device-checker".into())
            .spawn(move || {
                info!("Device consistency checker started");
                let mut cursor = 0usize;
                while running.load(Ordering::SeqCst) {
                    let device = {
                        let devices = checker.devices.lock().unwrap();
                        if devices.is_empty() {
                            None
                        } else {
                            cursor = (cursor + 1) % devices.len();
                            Some((devices[cursor].clone(), devices.len()))
                        }
                    };
                    let slot = match &device {
                        Some((_, n)) => checker.period / *n as u32,
                        None => checker.period,
                    };
                    if let Some((device, _)) = device {
                        checker.check_one(device.as_ref());
                    }
                    crate::buscomm::bus::sleep_responsive(slot, &running);
                }
                info!("Device consistency checker stopped");
            })
            .expect("failed to spawn checker thread")
    }

    fn check_one(&self, device: &(dyn ConsistencyCheck + Send + Sync)) {
        let expected = match device.expected_raw() {
            Some(v) => v,
            // Nothing commanded yet, nothing to verify.
            None => return,
        };
        let info = device.info();

        match self.read_actual(info) {
            Some(actual) if actual == expected => {}
            Some(actual) => self.repair(device, expected, actual),
            None => {}
        }
    }

    /// Low byte of the register, or `None` on an exchange failure (the bus
    /// layer has already escalated it).
    fn read_actual(&self, info: &DeviceInfo) -> Option<u8> {
        match read_register(&self.bus, info) {
            Ok(resp) => resp.payload().first().copied(),
            Err(err) => {
                error!(
                    "Checker could not read device '{}' ({}): {}",
                    info.name, info.location, err
                );
                self.ctx.shutdown.raise(ShutdownReason::CommFailure(format!(
                    "checker read of '{}' failed: {}",
                    info.name, err
                )));
                None
            }
        }
    }

    fn repair(&self, device: &(dyn ConsistencyCheck + Send + Sync), expected: u8, actual: u8) {
        let info = device.info();
        warn!(
            "Device '{}' ({}) inconsistent: register holds {}, expected {}",
            info.name, info.location, actual, expected
        );

        for attempt in 1..=CHECK_RETRY_COUNT {
            thread::sleep(self.retry_backoff * attempt);
            if let Err(err) = device.reassert() {
                error!("Repair write to '{}' failed: {}", info.name, err);
                break;
            }
            match self.read_actual(info) {
                Some(readback) if readback == expected => {
                    info!(
                        "Device '{}' repaired on attempt {}/{}",
                        info.name, attempt, CHECK_RETRY_COUNT
                    );
                    return;
                }
                Some(readback) => warn!(
                    "Device '{}' still holds {} after repair attempt {}/{}",
                    info.name, readback, attempt, CHECK_RETRY_COUNT
                ),
                None => break,
            }
        }

        self.ctx
            .shutdown
            .raise(ShutdownReason::DeviceInconsistent(format!(
                "device '{}' at {} stuck at {}, expected {}",
                info.name, info.location, actual, expected
            )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::switch::Switch;
    use crate::device::testutil::{scripted_bus, test_context};

    #[test]
    fn matching_device_passes_silently() {
        let (bus, slave) = scripted_bus();
        let ctx = test_context();
        let sw = Switch::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new("radiator_pump", "boiler room", 11, 2),
        );
        sw.on();

        let checker = DeviceChecker::new(
            bus.clone(),
            ctx.clone(),
            Duration::from_secs(60),
            Duration::from_millis(1),
        );
        checker.check_one(sw.as_ref());
        assert!(!ctx.shutdown.is_set());
        assert_eq!(slave.lock().unwrap().reads, 1);
        bus.stop();
    }

    #[test]
    fn drifted_register_is_repaired() {
        let (bus, slave) = scripted_bus();
        let ctx = test_context();
        let sw = Switch::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new("heater_relay", "boiler room", 11, 0),
        );
        sw.on();
        // Simulate a brown-out: hardware lost the register.
        slave.lock().unwrap().registers.insert((11, 0), 0);

        let checker = DeviceChecker::new(
            bus.clone(),
            ctx.clone(),
            Duration::from_secs(60),
            Duration::from_millis(1),
        );
        checker.check_one(sw.as_ref());
        assert!(!ctx.shutdown.is_set());
        assert_eq!(slave.lock().unwrap().registers.get(&(11, 0)), Some(&1));
        bus.stop();
    }

    #[test]
    fn unrepairable_device_is_fatal() {
        let (bus, slave) = scripted_bus();
        let ctx = test_context();
        let sw = Switch::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new("heater_relay", "boiler room", 11, 0),
        );
        sw.on();
        {
            let mut st = slave.lock().unwrap();
            st.registers.insert((11, 0), 0);
            st.stuck = true; // repair writes are acknowledged but ignored
        }

        let checker = DeviceChecker::new(
            bus.clone(),
            ctx.clone(),
            Duration::from_secs(60),
            Duration::from_millis(1),
        );
        checker.check_one(sw.as_ref());
        match ctx.shutdown.get() {
            Some(ShutdownReason::DeviceInconsistent(msg)) => {
                assert!(msg.contains("heater_relay"))
            }
            other => panic!("expected DeviceInconsistent, got {:?}", other),
        }
        bus.stop();
    }

    #[test]
    fn uncommanded_device_is_skipped() {
        let (bus, slave) = scripted_bus();
        let ctx = test_context();
        let sw = Switch::new(
            bus.clone(),
            ctx.clone(),
            DeviceInfo::new("floor_pump", "boiler room", 11, 3),
        );
        let checker = DeviceChecker::new(
            bus.clone(),
            ctx,
            Duration::from_secs(60),
            Duration::from_millis(1),
        );
        checker.check_one(sw.as_ref());
        assert_eq!(slave.lock().unwrap().reads, 0);
        bus.stop();
    }
}
