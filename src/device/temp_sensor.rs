// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Temperature sensor driver.
//!
//! Readings are cached behind a minimum re-read interval so the many
//! consumers of one sensor do not hammer the shared bus. A plausibility
//! filter drops single-sample spikes: an out-of-range value or an implausible
//! jump from the previous reading is ignored unless it persists for
//! `SPIKE_SKIP_LIMIT` consecutive reads.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::{escalate_comm_failure, read_register, DeviceInfo};
use crate::buscomm::Buscomm;
use crate::context::Context;
use crate::control::thermostat::SampleSource;

/// Raw sensor counts are sixteenths of a degree Celsius.
const RAW_SCALE: f64 = 16.0;
/// Physical range of the probes; anything outside is sensor garbage.
const MIN_PLAUSIBLE: f64 = -55.0;
const MAX_PLAUSIBLE: f64 = 125.0;
/// Reads a suspicious value must survive before being believed.
const SPIKE_SKIP_LIMIT: u32 = 2;
/// Reading reported before the first successful exchange.
const DEFAULT_TEMP: f64 = 85.0;

struct SensorState {
    value: f64,
    initialized: bool,
    last_read: Option<Instant>,
    skipped: u32,
}

pub struct TempSensor {
    bus: Arc<Buscomm>,
    ctx: Arc<Context>,
    info: DeviceInfo,
    min_interval: Duration,
    max_jump: f64,
    state: Mutex<SensorState>,
}

impl TempSensor {
    pub fn new(
        bus: Arc<Buscomm>,
        ctx: Arc<Context>,
        info: DeviceInfo,
        min_interval: Duration,
        max_jump: f64,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            ctx,
            info,
            min_interval,
            max_jump,
            state: Mutex::new(SensorState {
                value: DEFAULT_TEMP,
                initialized: false,
                last_read: None,
                skipped: 0,
            }),
        })
    }

    /// Current temperature in °C. Serves the cache inside the re-read
    /// interval; on communication failure returns the last good value while
    /// escalating the failure.
    pub fn temp(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        if let Some(at) = state.last_read {
            if at.elapsed() < self.min_interval {
                return state.value;
            }
        }

        match read_register(&self.bus, &self.info) {
            Ok(resp) => {
                state.last_read = Some(Instant::now());
                let payload = resp.payload();
                if payload.len() < 2 {
                    warn!(
                        "Sensor '{}' returned a short payload ({} bytes)",
                        self.info.name,
                        payload.len()
                    );
                    return state.value;
                }
                let raw = i16::from_le_bytes([payload[0], payload[1]]);
                let reading = raw as f64 / RAW_SCALE;
                self.accept(&mut state, reading)
            }
            Err(err) => {
                escalate_comm_failure(&self.ctx, &self.info, &err);
                state.last_read = Some(Instant::now());
                state.value
            }
        }
    }

    fn accept(&self, state: &mut SensorState, reading: f64) -> f64 {
        let implausible = !(MIN_PLAUSIBLE..=MAX_PLAUSIBLE).contains(&reading)
            || (state.initialized && (reading - state.value).abs() > self.max_jump);

        if implausible && state.skipped < SPIKE_SKIP_LIMIT {
            state.skipped += 1;
            debug!(
                "Sensor '{}': suspicious reading {:.2} (last good {:.2}), skip {}/{}",
                self.info.name, reading, state.value, state.skipped, SPIKE_SKIP_LIMIT
            );
            return state.value;
        }

        // Either plausible, or the "spike" persisted long enough to be real.
        if implausible {
            warn!(
                "Sensor '{}': accepting sustained out-of-band reading {:.2}",
                self.info.name, reading
            );
        }
        state.value = reading;
        state.initialized = true;
        state.skipped = 0;
        reading
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }
}

impl SampleSource for TempSensor {
    fn sample(&self) -> f64 {
        self.temp()
    }
}
