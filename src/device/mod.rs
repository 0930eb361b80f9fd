// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Typed drivers for the bus devices.
//!
//! Every driver wraps [`Buscomm::send_message`] with device semantics and a
//! cached last-known state. The cache is what the rest of the controller
//! trusts, so a background consistency checker re-reads the hardware and
//! repairs drift; devices that cannot be repaired take the whole controller
//! down, since a heating system must not run on unverified actuator state.
//!
//! Communication failures never propagate as errors out of this layer:
//! callers get a degraded-but-safe value (last good reading, "write failed")
//! while the process-wide shutdown reason is raised.

pub mod checker;
pub mod pulse_switch;
pub mod switch;
pub mod temp_sensor;
pub mod valve;
pub mod water_temp;

pub use checker::{ConsistencyCheck, DeviceChecker};
pub use pulse_switch::PulseSwitch;
pub use switch::Switch;
pub use temp_sensor::TempSensor;
pub use valve::MagneticValve;
pub use water_temp::WaterTemp;

use crate::buscomm::constants::{READ_REGISTER, SET_REGISTER};
use crate::buscomm::{BusError, Buscomm, Response};
use crate::context::{Context, ShutdownReason};
use log::error;

/// Bus identity of one physical device register.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub location: String,
    pub slave_address: u8,
    pub register_address: u8,
}

impl DeviceInfo {
    pub fn new(name: &str, location: &str, slave_address: u8, register_address: u8) -> Self {
        Self {
            name: name.to_string(),
            location: location.to_string(),
            slave_address,
            register_address,
        }
    }
}

pub(crate) fn write_register(
    bus: &Buscomm,
    info: &DeviceInfo,
    value: u8,
) -> Result<Response, BusError> {
    bus.send_message(
        info.slave_address,
        SET_REGISTER,
        &[info.register_address, value],
    )
}

pub(crate) fn read_register(bus: &Buscomm, info: &DeviceInfo) -> Result<Response, BusError> {
    bus.send_message(info.slave_address, READ_REGISTER, &[info.register_address])
}

/// Log a retry-exhausted exchange with full device context and raise the
/// process-wide shutdown reason.
pub(crate) fn escalate_comm_failure(ctx: &Context, info: &DeviceInfo, err: &BusError) {
    error!(
        "Communication with device '{}' ({}, slave {} register {}) failed: {}",
        info.name, info.location, info.slave_address, info.register_address, err
    );
    ctx.shutdown.raise(ShutdownReason::CommFailure(format!(
        "device '{}' at {}: {}",
        info.name, info.location, err
    )));
}
