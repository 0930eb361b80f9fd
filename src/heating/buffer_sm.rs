// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Buffer tank plumbing state machine.
//!
//! Decides which hydraulic path the heat takes: straight from the heat
//! source, out of the buffer tank, or into the hot water tank. Pure like the
//! heating machine; each legal transition yields the command list the
//! executor performs, built as exit commands of the old state followed by
//! entry commands of the new one.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Before `Init`; no assumptions about valve or relay positions.
    Unstarted,
    /// Heat source idle, paths closed.
    Off,
    /// Heat source feeds the circuits directly.
    Normal,
    /// Circuits are served from the buffer tank, heat source off.
    FromBuffer,
    /// Heat source feeds the hot water tank.
    Hw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferEvent {
    /// First transition after startup; forces all outputs to known-off.
    Init,
    TurnOff,
    /// Direct heating demanded.
    Direct,
    /// The buffer is hot enough to serve the load alone.
    UseBuffer,
    /// Hot water reheat demanded.
    HotWater,
}

/// Side effects the executor performs for a transition, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferCommand {
    SetHeater(bool),
    SetHydrShiftPump(bool),
    OpenBufferFeedValve,
    DelayedCloseBufferFeedValve,
    OpenHwValve,
    DelayedCloseHwValve,
    /// Command the boiler to the space heating setpoint.
    ApplyHeatTarget,
    /// Command the boiler to the hot water setpoint.
    ApplyHwTarget,
    /// Drop the hot water overdrive back to the heating setpoint.
    ResetHwTarget,
    /// Let the water circulate and settle before the next command.
    Circulate,
}

fn entry(state: BufferState) -> Vec<BufferCommand> {
    use BufferCommand::*;
    match state {
        BufferState::Unstarted => vec![],
        BufferState::Off => vec![SetHeater(false), Circulate, SetHydrShiftPump(false)],
        BufferState::Normal => vec![
            SetHydrShiftPump(true),
            Circulate,
            ApplyHeatTarget,
            SetHeater(true),
        ],
        BufferState::FromBuffer => vec![
            SetHeater(false),
            OpenBufferFeedValve,
            Circulate,
            SetHydrShiftPump(false),
        ],
        BufferState::Hw => vec![
            SetHydrShiftPump(false),
            OpenHwValve,
            Circulate,
            ApplyHwTarget,
            SetHeater(true),
        ],
    }
}

fn exit(state: BufferState) -> Vec<BufferCommand> {
    use BufferCommand::*;
    match state {
        BufferState::FromBuffer => vec![DelayedCloseBufferFeedValve],
        BufferState::Hw => vec![ResetHwTarget, DelayedCloseHwValve, Circulate],
        _ => vec![],
    }
}

/// Legal transitions return the next state and the ordered command list;
/// everything else is `None`.
pub fn transition(
    state: BufferState,
    event: BufferEvent,
) -> Option<(BufferState, Vec<BufferCommand>)> {
    use BufferEvent::*;
    use BufferState::*;
    let next = match (state, event) {
        (Unstarted, Init) => Off,
        (Off, Direct) => Normal,
        (Off, UseBuffer) => FromBuffer,
        (Off, HotWater) => Hw,
        (Normal, UseBuffer) => FromBuffer,
        (FromBuffer, Direct) => Normal,
        (Normal, HotWater) | (FromBuffer, HotWater) => Hw,
        (Normal, TurnOff) | (FromBuffer, TurnOff) | (Hw, TurnOff) => Off,
        _ => return None,
    };
    let mut commands = exit(state);
    commands.extend(entry(next));
    Some((next, commands))
}

#[cfg(test)]
mod tests {
    use super::*;
    use BufferCommand::*;
    use BufferEvent::*;
    use BufferState::*;

    #[test]
    fn init_forces_known_off_state() {
        let (next, commands) = transition(Unstarted, Init).unwrap();
        assert_eq!(next, Off);
        assert_eq!(
            commands,
            vec![SetHeater(false), Circulate, SetHydrShiftPump(false)]
        );
    }

    #[test]
    fn init_is_one_shot() {
        assert!(transition(Off, Init).is_none());
        assert!(transition(Normal, Init).is_none());
    }

    #[test]
    fn direct_heating_sequence() {
        let (next, commands) = transition(Off, Direct).unwrap();
        assert_eq!(next, Normal);
        // Pump first, settle, setpoint, burner last.
        assert_eq!(
            commands,
            vec![
                SetHydrShiftPump(true),
                Circulate,
                ApplyHeatTarget,
                SetHeater(true)
            ]
        );
    }

    #[test]
    fn switching_to_buffer_stops_the_heater_first() {
        let (next, commands) = transition(Normal, UseBuffer).unwrap();
        assert_eq!(next, FromBuffer);
        assert_eq!(commands[0], SetHeater(false));
        assert!(commands.contains(&OpenBufferFeedValve));
    }

    #[test]
    fn leaving_buffer_defers_the_valve_close() {
        let (next, commands) = transition(FromBuffer, Direct).unwrap();
        assert_eq!(next, Normal);
        assert_eq!(commands[0], DelayedCloseBufferFeedValve);
        // The heater only comes back after the pump change settled.
        let heater_on = commands.iter().position(|c| *c == SetHeater(true)).unwrap();
        let pump_on = commands
            .iter()
            .position(|c| *c == SetHydrShiftPump(true))
            .unwrap();
        assert!(pump_on < heater_on);
    }

    #[test]
    fn hot_water_overdrive_applied_and_reset() {
        let (next, commands) = transition(Normal, HotWater).unwrap();
        assert_eq!(next, Hw);
        assert!(commands.contains(&ApplyHwTarget));
        assert!(commands.contains(&OpenHwValve));

        let (next, commands) = transition(Hw, TurnOff).unwrap();
        assert_eq!(next, Off);
        assert_eq!(commands[0], ResetHwTarget);
        assert!(commands.contains(&DelayedCloseHwValve));
    }

    #[test]
    fn hot_water_cannot_be_preempted_by_demand_events() {
        // Leaving Hw is only ever an explicit TurnOff from the controller.
        assert!(transition(Hw, Direct).is_none());
        assert!(transition(Hw, UseBuffer).is_none());
        assert!(transition(Hw, HotWater).is_none());
    }

    #[test]
    fn off_ignores_repeated_turn_off() {
        assert!(transition(Off, TurnOff).is_none());
    }
}
