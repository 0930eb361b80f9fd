// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Field bus configuration
//!
//! Serial adapter settings for the RS-485 device bus plus the timing of the
//! two background bus services (keepalive and the consistency checker).

use serde::{Deserialize, Serialize};

/// Configuration for the RS-485 field bus.
///
/// # Fields
///
/// * `port` - Serial device path of the RS-485 adapter
/// * `baud_rate` - Line speed; the response timeout is derived from it
/// * `master_address` - Our own bus address, stamped into every frame
/// * `keepalive_secs` - Period of the background PING round
/// * `keepalive_idle_secs` - Only slaves silent for this long get pinged
/// * `checker_period_secs` - One full consistency-check round over all actuators
/// * `checker_backoff_millis` - Base delay between repair attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Serial device of the RS-485 adapter, e.g. `/dev/ttyUSB0`.
    pub port: String,

    /// Line speed in baud. Also selects the per-exchange response timeout.
    pub baud_rate: u32,

    /// Bus address this controller claims as master.
    pub master_address: u8,

    /// How often the keepalive round runs, in seconds.
    pub keepalive_secs: u64,

    /// A slave is pinged only when no exchange reached it for this long.
    pub keepalive_idle_secs: u64,

    /// Duration of one full consistency-check round, in seconds.
    pub checker_period_secs: u64,

    /// Base backoff between consistency repair attempts, in milliseconds.
    pub checker_backoff_millis: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            master_address: 1,
            keepalive_secs: 60,
            keepalive_idle_secs: 120,
            checker_period_secs: 120,
            checker_backoff_millis: 500,
        }
    }
}
