// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Top level heating state machine.
//!
//! A pure transition table: the controller derives events from thermostat
//! demand and timers, feeds them here and performs the side effects itself.
//! Illegal event/state pairs return `None` and change nothing, which is how
//! the controller ignores stale demand during a post-circulation run.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatingState {
    /// No demand; everything except frost watch is stopped.
    Off,
    /// A heat source is running against live demand.
    Heating,
    /// Demand ended after space heating; pumps run on to move the residual
    /// heat out of the boiler.
    PostHeating,
    /// Demand ended after a hot water run; circulation cools the forward
    /// line back down so the next space-heating start is not scalding.
    PostHwing,
}

impl fmt::Display for HeatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeatingState::Off => "off",
            HeatingState::Heating => "heating",
            HeatingState::PostHeating => "post-heating",
            HeatingState::PostHwing => "post-hw",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatingEvent {
    /// Demand appeared (or reappeared during a post run).
    TurnOn,
    /// Demand disappeared while heating spaces.
    PostHeat,
    /// Demand disappeared while serving hot water.
    PostHw,
    /// The post-circulation run finished or timed out.
    Expire,
    /// Hard stop, skipping the post run (mode change or shutdown).
    TurnOff,
}

/// The next state for a legal pair, `None` for an ignored event.
pub fn transition(state: HeatingState, event: HeatingEvent) -> Option<HeatingState> {
    use HeatingEvent::*;
    use HeatingState::*;
    match (state, event) {
        (Off, TurnOn) => Some(Heating),
        (Heating, TurnOff) => Some(Off),
        (Heating, PostHeat) => Some(PostHeating),
        (Heating, PostHw) => Some(PostHwing),
        (PostHeating, TurnOn) => Some(Heating),
        (PostHwing, TurnOn) => Some(Heating),
        (PostHeating, Expire) => Some(Off),
        (PostHwing, Expire) => Some(Off),
        _ => None,
    }
}
