// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! The control core: hierarchical state machines over the device layer.
//!
//! Two pure transition tables carry the decisions. The top level machine
//! ([`heating_sm`]) tracks whether the installation is heating, running a
//! post-circulation pass or off; below it the buffer machine ([`buffer_sm`])
//! decides the hydraulic path of the heat. Their executors
//! ([`HeatingController`], [`BufferHeat`]) own the side effects and the
//! timing guards.

pub mod buffer;
pub mod buffer_sm;
pub mod controller;
pub mod heating_sm;

pub use buffer::{BufferHeat, BufferMode, BufferSettings, HeatSource};
pub use buffer_sm::{BufferCommand, BufferEvent, BufferState};
pub use controller::{
    determine_power_needed, determine_targets, ControllerParts, Demand, HeatingController, Power,
    Targets,
};
pub use heating_sm::{HeatingEvent, HeatingState};
