// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! PWM thermostats.
//!
//! Floor circuits modulate on a slow duty cycle instead of a deadband: each
//! cohort member gets `timebase * duty` seconds of on-time per cycle, where
//! `duty` comes from an injected value function over the filtered sensor
//! reading and the target.
//!
//! The whole cohort shares one [`PwmRegistry`] (explicit object, passed to
//! every member) and one cycle clock, stepped once per simulated second by
//! the PWM task. A shared busy predicate pauses the elapsed counter so duty
//! is measured against time actually available for heating; members that are
//! currently off absorb that pause disproportionately, which is accepted.

use std::sync::{Arc, Mutex};

use log::debug;

use super::filter::Filter;

/// Duty function: `(filtered_value, target) -> duty in [0, 1]`.
pub type ValueProc = Box<dyn Fn(f64, f64) -> f64 + Send>;

const FILTER_SIZE: usize = 6;

struct PwmSlot {
    name: String,
    filter: Filter,
    target: Option<f64>,
    value_proc: ValueProc,
    threshold: u64,
    on: bool,
    /// Whether this slot had both a sample and a target at cycle start.
    armed: bool,
}

impl PwmSlot {
    fn ready(&mut self) -> bool {
        self.target.is_some() && self.filter.value().is_some()
    }
}

struct PwmCore {
    timebase: u64,
    relax: u64,
    elapsed: u64,
    cycle_started: bool,
    restart_countdown: Option<u64>,
    slots: Vec<PwmSlot>,
}

impl PwmCore {
    fn start_cycle(&mut self) {
        self.elapsed = 0;
        self.cycle_started = true;
        self.restart_countdown = None;
        for slot in self.slots.iter_mut() {
            let ready = slot.ready();
            if ready {
                let value = slot.filter.value().unwrap_or(0.0);
                let target = slot.target.unwrap_or(0.0);
                let duty = (slot.value_proc)(value, target).clamp(0.0, 1.0);
                slot.threshold = (self.timebase as f64 * duty).round() as u64;
                slot.armed = true;
                debug!(
                    "PWM cycle start: {} duty {:.2} -> {} s of {} s",
                    slot.name, duty, slot.threshold, self.timebase
                );
            } else {
                slot.threshold = 0;
                slot.armed = false;
            }
        }
    }

    fn step(&mut self, busy: bool) {
        if !self.cycle_started || self.elapsed >= self.timebase {
            self.start_cycle();
        } else if let Some(count) = self.restart_countdown {
            if count == 0 {
                // A member finished initializing mid-cycle; restart early
                // instead of letting it idle out the remainder.
                self.start_cycle();
            } else {
                self.restart_countdown = Some(count - 1);
            }
        }

        if self.restart_countdown.is_none() {
            let newcomer = self
                .slots
                .iter_mut()
                .any(|s| !s.armed && s.ready());
            if newcomer {
                self.restart_countdown = Some(self.relax);
            }
        }

        for slot in self.slots.iter_mut() {
            slot.on = slot.armed && self.elapsed < slot.threshold;
        }

        // Busy (HW production, valve movement) freezes cycle time.
        if !busy {
            self.elapsed += 1;
        }
    }
}

/// Shared cohort state for a set of PWM thermostats.
pub struct PwmRegistry {
    core: Mutex<PwmCore>,
    busy: Box<dyn Fn() -> bool + Send + Sync>,
}

impl PwmRegistry {
    /// `timebase` is the cycle length in seconds, `relax` the delay before an
    /// early cycle restart triggered by a newly initialized member.
    pub fn new(
        timebase: u64,
        relax: u64,
        busy: Box<dyn Fn() -> bool + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: Mutex::new(PwmCore {
                timebase,
                relax,
                elapsed: 0,
                cycle_started: false,
                restart_countdown: None,
                slots: Vec::new(),
            }),
            busy,
        })
    }

    /// Add a cohort member; the handle is the member's only interface.
    pub fn register(self: &Arc<Self>, name: &str, value_proc: ValueProc) -> PwmHandle {
        let mut core = self.core.lock().unwrap();
        core.slots.push(PwmSlot {
            name: name.to_string(),
            filter: Filter::new(FILTER_SIZE),
            target: None,
            value_proc,
            threshold: 0,
            on: false,
            armed: false,
        });
        PwmHandle {
            registry: self.clone(),
            index: core.slots.len() - 1,
        }
    }

    /// Advance the shared cycle clock by one second.
    pub fn tick(&self) {
        let busy = (self.busy)();
        self.core.lock().unwrap().step(busy);
    }

    /// Seconds into the current cycle; pauses while busy.
    pub fn elapsed_in_cycle(&self) -> u64 {
        self.core.lock().unwrap().elapsed
    }
}

/// One PWM thermostat within a cohort.
#[derive(Clone)]
pub struct PwmHandle {
    registry: Arc<PwmRegistry>,
    index: usize,
}

impl PwmHandle {
    pub fn update_sample(&self, sample: f64) {
        let mut core = self.registry.core.lock().unwrap();
        core.slots[self.index].filter.input_sample(sample);
    }

    pub fn set_target(&self, target: f64) {
        let mut core = self.registry.core.lock().unwrap();
        core.slots[self.index].target = Some(target);
    }

    pub fn is_on(&self) -> bool {
        self.registry.core.lock().unwrap().slots[self.index].on
    }

    pub fn value(&self) -> Option<f64> {
        self.registry.core.lock().unwrap().slots[self.index]
            .filter
            .value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_duty_registry(timebase: u64) -> (Arc<PwmRegistry>, PwmHandle) {
        let registry = PwmRegistry::new(timebase, 0, Box::new(|| false));
        let handle = registry.register("floor", Box::new(|_, _| 0.5));
        handle.set_target(22.0);
        handle.update_sample(21.0);
        (registry, handle)
    }

    #[test]
    fn duty_law_over_one_cycle() {
        let (registry, handle) = half_duty_registry(3600);
        let mut on_seconds = 0u64;
        for _ in 0..3600 {
            registry.tick();
            if handle.is_on() {
                on_seconds += 1;
            }
        }
        assert_eq!(on_seconds, 1800);
    }

    #[test]
    fn busy_predicate_freezes_cycle_time() {
        let busy = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let busy_for_pred = busy.clone();
        let registry = PwmRegistry::new(
            3600,
            0,
            Box::new(move || busy_for_pred.load(std::sync::atomic::Ordering::SeqCst)),
        );
        let handle = registry.register("floor", Box::new(|_, _| 0.5));
        handle.set_target(22.0);
        handle.update_sample(21.0);

        for _ in 0..100 {
            registry.tick();
            assert!(handle.is_on());
        }
        // Elapsed time did not advance while busy.
        assert_eq!(registry.elapsed_in_cycle(), 0);

        busy.store(false, std::sync::atomic::Ordering::SeqCst);
        registry.tick();
        assert_eq!(registry.elapsed_in_cycle(), 1);
    }

    #[test]
    fn zero_duty_member_stays_off() {
        let registry = PwmRegistry::new(100, 0, Box::new(|| false));
        let handle = registry.register("floor", Box::new(|_, _| 0.0));
        handle.set_target(22.0);
        handle.update_sample(25.0);
        for _ in 0..100 {
            registry.tick();
            assert!(!handle.is_on());
        }
    }

    #[test]
    fn newcomer_triggers_early_cycle_restart() {
        let registry = PwmRegistry::new(10_000, 5, Box::new(|| false));
        let ready = registry.register("a", Box::new(|_, _| 1.0));
        ready.set_target(22.0);
        ready.update_sample(20.0);
        let late = registry.register("b", Box::new(|_, _| 1.0));

        registry.tick(); // first cycle starts without b
        assert!(ready.is_on());
        assert!(!late.is_on());

        // b finishes initializing mid-cycle.
        late.set_target(22.0);
        late.update_sample(20.0);

        // Restart after the relaxation delay, far before the 10000 s cycle
        // would have ended on its own.
        for _ in 0..8 {
            registry.tick();
        }
        assert!(late.is_on());
        assert!(registry.elapsed_in_cycle() < 10);
    }
}
