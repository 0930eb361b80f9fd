// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Boiler controller library
//!
//! Control daemon for a residential boiler, buffer tank and floor heating
//! installation. Field devices are reached over a custom half-duplex RS-485
//! protocol, an optional heat pump over Modbus RTU.

pub mod buscomm;
pub mod config;
pub mod context;
pub mod control;
pub mod daemon;
pub mod device;
pub mod heating;
pub mod heatpump;
