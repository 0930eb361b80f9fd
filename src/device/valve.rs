// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Magnetic zone valve with delayed close.
//!
//! Closing a magnetic valve against a running pump bangs the pipework, so a
//! close can be deferred: the valve stays open while circulation winds down
//! and a detached timer thread performs the actual close. At most one
//! delayed close is pending per valve, tracked by an explicit atomic flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;

use super::checker::ConsistencyCheck;
use super::switch::Switch;
use super::DeviceInfo;
use crate::buscomm::{BusError, Buscomm};
use crate::context::Context;

pub struct MagneticValve {
    switch: Arc<Switch>,
    close_pending: AtomicBool,
    close_delay: Duration,
}

impl MagneticValve {
    pub fn new(
        bus: Arc<Buscomm>,
        ctx: Arc<Context>,
        info: DeviceInfo,
        close_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            switch: Switch::new(bus, ctx, info),
            close_pending: AtomicBool::new(false),
            close_delay,
        })
    }

    pub fn open(&self) -> bool {
        self.switch.on()
    }

    /// Immediate close. Cancels nothing: a pending delayed close will find
    /// the valve already closed and no-op through Switch idempotence.
    pub fn close(&self) -> bool {
        self.switch.off()
    }

    /// Schedule a close after the configured delay. Returns `false` when a
    /// delayed close is already pending.
    pub fn delayed_close(self: &Arc<Self>) -> bool {
        if self.close_pending.swap(true, Ordering::SeqCst) {
            debug!(
                "Valve '{}' delayed close already pending",
                self.switch.name()
            );
            return false;
        }
        let valve = Arc::clone(self);
        thread::Builder::new()
            .name(format!("valve-close-{}", self.switch.name()))
            .spawn(move || {
                thread::sleep(valve.close_delay);
                valve.switch.off();
                valve.close_pending.store(false, Ordering::SeqCst);
            })
            .expect("failed to spawn valve close thread");
        true
    }

    pub fn is_open(&self) -> bool {
        self.switch.is_on()
    }

    pub fn name(&self) -> &str {
        self.switch.name()
    }
}

impl ConsistencyCheck for MagneticValve {
    fn info(&self) -> &DeviceInfo {
        self.switch.info()
    }

    fn expected_raw(&self) -> Option<u8> {
        self.switch.expected_raw()
    }

    fn reassert(&self) -> Result<(), BusError> {
        self.switch.reassert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testutil::{scripted_bus, test_context};

    #[test]
    fn only_one_delayed_close_pending() {
        let (bus, slave) = scripted_bus();
        let valve = MagneticValve::new(
            bus.clone(),
            test_context(),
            DeviceInfo::new("hw_valve", "boiler room", 11, 4),
            Duration::from_millis(30),
        );

        assert!(valve.open());
        assert!(valve.delayed_close());
        assert!(!valve.delayed_close()); // second request rejected

        thread::sleep(Duration::from_millis(120));
        assert!(!valve.is_open());
        // open + one close
        assert_eq!(slave.lock().unwrap().writes.len(), 2);
        // After completion a new delayed close may be scheduled.
        assert!(valve.delayed_close());
        bus.stop();
    }
}
