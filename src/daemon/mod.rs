// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Daemon management
//!
//! Runs the controller's background services as plain OS threads: the bus
//! keepalive, the device consistency checker, the PWM cycle clock, the
//! buffer supervision tick, the mixer loop, the main heating control loop
//! and a heartbeat. All of them share one `running` flag for cooperative
//! shutdown; the heating loop additionally watches the shutdown-reason cell
//! and stops the moment any service raises a fatal condition.

pub mod launch_daemon;

pub use launch_daemon::Daemon;
