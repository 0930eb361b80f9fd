// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Relay/pump switch driver.

use std::sync::{Arc, Mutex};

use log::{debug, info};

use super::checker::ConsistencyCheck;
use super::{escalate_comm_failure, write_register, DeviceInfo};
use crate::buscomm::{BusError, Buscomm};
use crate::context::Context;

/// A single on/off register. Mutations are serialized on the internal lock
/// and idempotent: commanding the already-cached state performs no bus
/// traffic and returns `false`.
pub struct Switch {
    bus: Arc<Buscomm>,
    ctx: Arc<Context>,
    info: DeviceInfo,
    /// `None` until the first successful write settles the hardware state.
    state: Mutex<Option<bool>>,
}

impl Switch {
    pub fn new(bus: Arc<Buscomm>, ctx: Arc<Context>, info: DeviceInfo) -> Arc<Self> {
        Arc::new(Self {
            bus,
            ctx,
            info,
            state: Mutex::new(None),
        })
    }

    /// Returns `true` when a write was actually performed.
    pub fn on(&self) -> bool {
        self.set(true)
    }

    pub fn off(&self) -> bool {
        self.set(false)
    }

    fn set(&self, target: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == Some(target) {
            debug!("Switch '{}' already {}", self.info.name, onoff(target));
            return false;
        }
        match write_register(&self.bus, &self.info, target as u8) {
            Ok(_) => {
                info!("Switch '{}' turned {}", self.info.name, onoff(target));
                *state = Some(target);
                true
            }
            Err(err) => {
                escalate_comm_failure(&self.ctx, &self.info, &err);
                false
            }
        }
    }

    /// Cached state; `false` while still unknown.
    pub fn is_on(&self) -> bool {
        self.state.lock().unwrap().unwrap_or(false)
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }
}

fn onoff(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

impl ConsistencyCheck for Switch {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn expected_raw(&self) -> Option<u8> {
        self.state.lock().unwrap().map(|on| on as u8)
    }

    fn reassert(&self) -> Result<(), BusError> {
        let state = self.state.lock().unwrap();
        if let Some(on) = *state {
            write_register(&self.bus, &self.info, on as u8)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testutil::{scripted_bus, test_context};

    #[test]
    fn on_is_idempotent() {
        let (bus, slave) = scripted_bus();
        let sw = Switch::new(
            bus.clone(),
            test_context(),
            DeviceInfo::new("radiator_pump", "boiler room", 11, 2),
        );

        assert!(sw.on());
        assert!(!sw.on()); // second call: no-op, no bus write
        assert_eq!(slave.lock().unwrap().writes.len(), 1);
        assert!(sw.is_on());

        assert!(sw.off());
        assert_eq!(slave.lock().unwrap().writes.len(), 2);
        assert_eq!(
            slave.lock().unwrap().registers.get(&(11, 2)).copied(),
            Some(0)
        );
        bus.stop();
    }
}
